use std::time::Duration;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const OPENAI_BETA_HEADER: &str = "OpenAI-Beta";
pub const OPENAI_BETA_REALTIME: &str = "realtime=v1";

pub const LLM_BASE_URL: &str = "wss://api.openai.com/v1";
pub const LLM_DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";
pub const LLM_AUDIO_FORMAT: &str = "pcm16";
pub const LLM_TRANSCRIPTION_MODEL: &str = "whisper-1";

pub const RETELL_DEFAULT_LISTEN: &str = "127.0.0.1:8766";

pub const VOICEFLOW_BASE_URL: &str = "https://general-runtime.voiceflow.com";
pub const VOICEFLOW_VERSION_HEADER: &str = "versionID";
pub const DEFAULT_VERSION_ID: &str = "production";

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8765";
pub const DEFAULT_SAMPLE_RATE: u32 = voice_relay_utils::audio::REALTIME_API_PCM16_SAMPLE_RATE;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_GREETING: &str = "Hi! How can I help you today?";
pub const DEFAULT_ERROR_REPLY: &str = "Sorry, I couldn't process your message. Please try again later.";

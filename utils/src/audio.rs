use base64::Engine;
use bytes::Bytes;

/// Sample rate of the pcm16 audio the realtime API speaks.
pub const REALTIME_API_PCM16_SAMPLE_RATE: u32 = 24000;

/// Encodes raw audio bytes as standard base64.
pub fn encode(audio: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(audio)
}

/// Decodes a base64 audio fragment. The bytes are returned untouched; no
/// sample conversion happens here.
pub fn decode(fragment: &str) -> Result<Bytes, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(fragment.trim())
        .map(Bytes::from)
}

/// Builds a `data:<mime>;base64,<payload>` URL.
pub fn encode_data_url(mime: &str, audio: &[u8]) -> String {
    format!("data:{};base64,{}", mime, encode(audio))
}

/// Extracts the audio bytes from a base64 `data:` URL.
///
/// Returns `None` when the URL is not a base64 data URL (VoiceFlow also hands
/// out plain https links to hosted audio, which the relay does not fetch).
pub fn decode_data_url(url: &str) -> Option<Bytes> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    decode(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_is_byte_exact() {
        let audio = [0u8, 1, 2, 254, 255, 128];
        let encoded = encode(&audio);
        assert_eq!(decode(&encoded).unwrap().as_ref(), &audio);
    }

    #[test]
    fn data_url_roundtrip() {
        let url = encode_data_url("audio/mpeg", &[9, 8, 7]);
        assert!(url.starts_with("data:audio/mpeg;base64,"));
        assert_eq!(decode_data_url(&url).unwrap().as_ref(), &[9, 8, 7]);
    }

    #[test]
    fn plain_links_are_not_data_urls() {
        assert!(decode_data_url("https://cdn.example.com/a.mp3").is_none());
        assert!(decode_data_url("data:audio/mpeg,rawtext").is_none());
    }
}

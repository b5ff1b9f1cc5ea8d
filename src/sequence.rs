use voice_relay_types::InternalEvent;

/// Result of checking one audio chunk against its direction's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    InOrder,
    /// Chunks were missing before this one.
    Gap { missing: u64 },
    /// Older than a chunk already seen. Still forwarded, never reordered.
    OutOfOrder,
}

/// Stamps and checks audio sequence numbers for one direction of a session.
///
/// Chunks without a wire sequence (`0`) get the next number. Gaps and
/// regressions are logged and counted, nothing is held back.
#[derive(Debug)]
pub struct SequenceTracker {
    direction: &'static str,
    last: u64,
    gaps: u64,
    out_of_order: u64,
}

impl SequenceTracker {
    pub fn new(direction: &'static str) -> Self {
        Self {
            direction,
            last: 0,
            gaps: 0,
            out_of_order: 0,
        }
    }

    /// Non-audio events pass through as [`SequenceCheck::InOrder`].
    pub fn observe(&mut self, event: &mut InternalEvent) -> SequenceCheck {
        let chunk = match event {
            InternalEvent::AudioChunk(chunk) => chunk,
            _ => return SequenceCheck::InOrder,
        };
        if chunk.sequence == 0 {
            self.last += 1;
            chunk.sequence = self.last;
            return SequenceCheck::InOrder;
        }

        let seq = chunk.sequence;
        if seq <= self.last {
            self.out_of_order += 1;
            tracing::warn!(direction = self.direction, seq, last = self.last, "audio chunk out of order");
            return SequenceCheck::OutOfOrder;
        }
        let missing = seq - self.last - 1;
        self.last = seq;
        if missing > 0 {
            self.gaps += missing;
            tracing::warn!(direction = self.direction, seq, missing, "gap in audio sequence");
            return SequenceCheck::Gap { missing };
        }
        SequenceCheck::InOrder
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    /// Total number of missing chunks seen so far.
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u64) -> InternalEvent {
        InternalEvent::audio(vec![0u8; 4], seq, 16000)
    }

    #[test]
    fn unstamped_chunks_are_numbered_from_one() {
        let mut tracker = SequenceTracker::new("client");
        let mut events = vec![chunk(0), chunk(0), chunk(0)];
        for event in events.iter_mut() {
            assert_eq!(tracker.observe(event), SequenceCheck::InOrder);
        }
        let seqs: Vec<u64> = events
            .iter()
            .map(|e| match e {
                InternalEvent::AudioChunk(c) => c.sequence,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn gaps_and_regressions_are_counted() {
        let mut tracker = SequenceTracker::new("backend");
        assert_eq!(tracker.observe(&mut chunk(1)), SequenceCheck::InOrder);
        assert_eq!(tracker.observe(&mut chunk(4)), SequenceCheck::Gap { missing: 2 });
        assert_eq!(tracker.observe(&mut chunk(3)), SequenceCheck::OutOfOrder);
        assert_eq!(tracker.observe(&mut chunk(5)), SequenceCheck::InOrder);
        assert_eq!(tracker.gaps(), 2);
        assert_eq!(tracker.out_of_order(), 1);
        assert_eq!(tracker.last(), 5);
    }
}

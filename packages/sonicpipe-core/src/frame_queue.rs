//! Quality-mode bounded byte-capped FIFO of encoded frames (§4.G).
//!
//! Only instantiated when the session's [`crate::policy::StreamingPolicy`]
//! disallows drops; the realtime policy never touches this type.

use std::collections::VecDeque;

/// Bounded FIFO tracked by total byte count, with hysteretic trim (§3,
/// §4.G).
pub struct FrameQueue {
    max_bytes: usize,
    target_bytes: usize,
    frames: VecDeque<Vec<u8>>,
    bytes: usize,
    overflow_drops: u64,
}

impl FrameQueue {
    pub fn new(max_bytes: usize, target_bytes: usize) -> Self {
        Self {
            max_bytes,
            target_bytes,
            frames: VecDeque::new(),
            bytes: 0,
            overflow_drops: 0,
        }
    }

    /// Appends `frame`, trimming from the front if the byte cap is
    /// exceeded (§4.G: "if bytes > max call trim").
    pub fn enqueue(&mut self, frame: Vec<u8>) {
        self.bytes += frame.len();
        self.frames.push_back(frame);
        if self.bytes > self.max_bytes {
            self.trim();
        }
    }

    /// Drops oldest frames until `bytes <= target` using a single bulk
    /// `VecDeque::drain` call — O(n), not O(n^2) (§4.G, §9).
    fn trim(&mut self) {
        let mut dropped_bytes = 0usize;
        let mut drop_count = 0usize;
        for frame in &self.frames {
            if self.bytes - dropped_bytes <= self.target_bytes {
                break;
            }
            dropped_bytes += frame.len();
            drop_count += 1;
        }
        if drop_count > 0 {
            self.frames.drain(..drop_count);
            self.bytes -= dropped_bytes;
            self.overflow_drops += drop_count as u64;
        }
    }

    /// Sends oldest-first while `can_send` (driven by the caller's WS
    /// high-water check) allows it, bulk-removing the sent prefix (§4.G:
    /// "flush(socket): send oldest-first while socket.buffered <
    /// highWater; bulk-remove sent prefix").
    pub fn drain_while<F: FnMut(&[u8]) -> bool>(&mut self, mut can_send: F) -> Vec<Vec<u8>> {
        let mut sent_count = 0usize;
        for frame in &self.frames {
            if !can_send(frame) {
                break;
            }
            sent_count += 1;
        }
        if sent_count == 0 {
            return Vec::new();
        }
        let sent: Vec<Vec<u8>> = self.frames.drain(..sent_count).collect();
        self.bytes -= sent.iter().map(Vec::len).sum::<usize>();
        sent
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_tracks_byte_count() {
        let mut q = FrameQueue::new(1000, 750);
        q.enqueue(vec![0u8; 100]);
        q.enqueue(vec![0u8; 200]);
        assert_eq!(q.bytes(), 300);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn trim_drops_oldest_until_at_or_under_target() {
        let mut q = FrameQueue::new(100, 50);
        q.enqueue(vec![0u8; 40]);
        q.enqueue(vec![0u8; 40]);
        q.enqueue(vec![0u8; 40]); // 120 > 100 -> trim to <= 50

        assert!(q.bytes() <= 50);
        assert_eq!(q.len(), 1);
        assert_eq!(q.overflow_drops(), 2);
    }

    #[test]
    fn trim_uses_bulk_removal_and_keeps_invariant() {
        let mut q = FrameQueue::new(800, 600);
        for _ in 0..10 {
            q.enqueue(vec![0u8; 100]);
        }
        assert!(q.bytes() <= 800);
    }

    #[test]
    fn drain_while_sends_oldest_first_and_bulk_removes() {
        let mut q = FrameQueue::new(10_000, 8_000);
        q.enqueue(vec![1u8; 100]);
        q.enqueue(vec![2u8; 100]);
        q.enqueue(vec![3u8; 100]);

        let mut sent_budget = 250usize;
        let sent = q.drain_while(|frame| {
            if frame.len() <= sent_budget {
                sent_budget -= frame.len();
                true
            } else {
                false
            }
        });

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][0], 1);
        assert_eq!(sent[1][0], 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.bytes(), 100);
    }

    #[test]
    fn drain_while_stops_at_first_refusal() {
        let mut q = FrameQueue::new(10_000, 8_000);
        q.enqueue(vec![0u8; 100]);
        q.enqueue(vec![0u8; 100]);
        let sent = q.drain_while(|_| false);
        assert!(sent.is_empty());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn overflow_drops_is_monotone() {
        let mut q = FrameQueue::new(100, 50);
        let mut last = 0u64;
        for _ in 0..5 {
            q.enqueue(vec![0u8; 60]);
            assert!(q.overflow_drops() >= last);
            last = q.overflow_drops();
        }
    }
}

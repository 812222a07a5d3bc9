use std::collections::VecDeque;

pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 1000;

/// Bounded FIFO of outbound payloads.
///
/// When full, the oldest entry is dropped to admit the newest. Overflow is a
/// lossy policy, not an error; `dropped()` counts evictions.
#[derive(Debug)]
pub struct WriteQueue {
    entries: VecDeque<Vec<u8>>,
    capacity: usize,
    dropped: u64,
}

impl WriteQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity.min(64)), capacity, dropped: 0 }
    }

    /// Encode `text` plus the line terminator and append it.
    pub fn enqueue_line(&mut self, text: &str) {
        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(b'\n');
        self.push(payload);
    }

    pub fn push(&mut self, payload: Vec<u8>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
            log::debug!("Write queue full ({}), dropped oldest entry", self.capacity);
        }
        self.entries.push_back(payload);
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.entries.pop_front()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|e| e.as_slice())
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut queue = WriteQueue::new(1000);
        for i in 0..1001 {
            queue.enqueue_line(&format!("cmd{}", i));
        }
        assert_eq!(queue.len(), 1000);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.iter().next(), Some(&b"cmd1\n"[..]));
        assert_eq!(queue.iter().last(), Some(&b"cmd1000\n"[..]));
    }

    #[test]
    fn test_fifo_order_and_terminator() {
        let mut queue = WriteQueue::default();
        queue.enqueue_line("LED ON");
        queue.enqueue_line("LED OFF");
        assert_eq!(queue.pop().as_deref(), Some(&b"LED ON\n"[..]));
        assert_eq!(queue.pop().as_deref(), Some(&b"LED OFF\n"[..]));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut queue = WriteQueue::new(0);
        queue.enqueue_line("a");
        queue.enqueue_line("b");
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.pop().as_deref(), Some(&b"b\n"[..]));
    }

    #[test]
    fn test_clear_reports_discarded() {
        let mut queue = WriteQueue::new(4);
        queue.enqueue_line("x");
        queue.enqueue_line("y");
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}

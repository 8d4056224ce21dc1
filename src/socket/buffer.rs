//! Pending-message buffer with a byte threshold.

use std::mem;

/// Ordered buffer of messages awaiting the next flush.
#[derive(Debug)]
pub struct MessageBuffer {
    messages: Vec<String>,
    bytes: usize,
    max_bytes: usize,
}

impl MessageBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            messages: Vec::new(),
            bytes: 0,
            max_bytes,
        }
    }

    /// Append a message. Returns `true` when the buffered bytes (delimiters
    /// excluded) now exceed the threshold and an eager flush is due.
    pub fn push(&mut self, message: String) -> bool {
        self.bytes += message.len();
        self.messages.push(message);
        self.bytes > self.max_bytes
    }

    /// Take the whole batch, leaving an empty buffer behind.
    pub fn take(&mut self) -> Vec<String> {
        self.bytes = 0;
        mem::take(&mut self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(20, &[15], false)]
    #[case(20, &[15, 15], true)]
    #[case(20, &[10, 10], false)]
    #[case(20, &[10, 11], true)]
    #[case(1, &[2], true)]
    fn push_reports_threshold_crossing(
        #[case] max_bytes: usize,
        #[case] sizes: &[usize],
        #[case] expect_flush: bool,
    ) {
        let mut buffer = MessageBuffer::new(max_bytes);
        let mut due = false;
        for size in sizes {
            due = buffer.push("x".repeat(*size));
        }
        assert_eq!(due, expect_flush);
    }

    #[rstest]
    fn take_drains_in_order() {
        let mut buffer = MessageBuffer::new(100);
        buffer.push("a".into());
        buffer.push("b".into());
        assert_eq!(buffer.bytes(), 2);
        assert_eq!(buffer.take(), vec!["a".to_owned(), "b".to_owned()]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.bytes(), 0);
        assert_eq!(buffer.len(), 0);
    }

    #[rstest]
    fn size_counts_bytes_not_chars() {
        let mut buffer = MessageBuffer::new(100);
        buffer.push("é".into());
        assert_eq!(buffer.bytes(), 2);
    }
}

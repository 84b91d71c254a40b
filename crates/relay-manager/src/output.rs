//! Append-only per-worker output buffer with cursor-based reads.

use std::sync::Mutex;

/// An append-only text buffer guarded by its own mutex, independent of
/// the worker table's lock. Readers take a snapshot from an arbitrary
/// cursor position rather than subscribing to updates.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: Mutex<String>,
}

impl OutputBuffer {
    /// An empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the buffer.
    pub fn append(&self, chunk: &str) {
        self.text
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_str(chunk);
    }

    /// Returns the text written since `since_cursor`, plus the cursor to
    /// pass on the next read. `since_cursor` past the end of the buffer
    /// yields an empty slice and the buffer's current length.
    #[must_use]
    pub fn read_since(&self, since_cursor: usize) -> (String, usize) {
        let text = self
            .text
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let len = text.len();
        if since_cursor >= len {
            return (String::new(), len);
        }
        (text[since_cursor..].to_string(), len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_since_zero_returns_everything_written_so_far() {
        let buffer = OutputBuffer::new();
        buffer.append("hello ");
        buffer.append("world");
        let (text, cursor) = buffer.read_since(0);
        assert_eq!(text, "hello world");
        assert_eq!(cursor, 11);
    }

    #[test]
    fn read_since_a_cursor_returns_only_the_new_tail() {
        let buffer = OutputBuffer::new();
        buffer.append("hello ");
        let (_, cursor) = buffer.read_since(0);
        buffer.append("world");
        let (text, new_cursor) = buffer.read_since(cursor);
        assert_eq!(text, "world");
        assert_eq!(new_cursor, 11);
    }

    #[test]
    fn read_since_past_the_end_is_empty() {
        let buffer = OutputBuffer::new();
        buffer.append("abc");
        let (text, cursor) = buffer.read_since(100);
        assert_eq!(text, "");
        assert_eq!(cursor, 3);
    }
}

use std::collections::VecDeque;

/// Default number of lines retained per component
pub const DEFAULT_MAX_MESSAGES: usize = 1000;

/// Bounded per-component message history.
///
/// Appends past capacity evict the oldest lines first, so the log always
/// holds the most recent `capacity` lines in insertion order.
#[derive(Debug, Clone)]
pub struct MessageLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

/// Ordered holding queue for work issued before its target is ready.
///
/// Key properties:
/// - Strict FIFO: items drain in the order they were pushed.
/// - Optional backpressure via a deterministic maximum pending length.
/// - Discarding empties the queue without running anything.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingQueueFull {
    pub max_len: usize,
}

impl std::fmt::Display for PendingQueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pending queue full ({} items)", self.max_len)
    }
}

impl std::error::Error for PendingQueueFull {}

#[derive(Debug)]
pub struct PendingQueue<T> {
    items: Vec<T>,
    max_len: Option<usize>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            max_len: None,
        }
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, payload: T) {
        self.items.push(payload);
    }

    pub fn try_push(&mut self, payload: T) -> Result<(), PendingQueueFull> {
        if let Some(max_len) = self.max_len
            && self.len() >= max_len
        {
            return Err(PendingQueueFull { max_len });
        }
        self.push(payload);
        Ok(())
    }

    /// Iterates items in push order without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Removes and returns every item in push order.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Drops every item without handing it out. Returns how many were
    /// discarded.
    pub fn discard(&mut self) -> usize {
        let n = self.len();
        self.items.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::{PendingQueue, PendingQueueFull};

    #[test]
    fn drains_in_insertion_order() {
        let mut q = PendingQueue::new();
        q.push("a");
        q.push("b");
        q.push("c");
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(q.drain(), vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn backpressure_rejects_when_full() {
        let mut q = PendingQueue::with_max_len(2);
        assert!(q.try_push("a").is_ok());
        assert!(q.try_push("b").is_ok());
        assert_eq!(q.try_push("c").unwrap_err(), PendingQueueFull { max_len: 2 });
        assert_eq!(q.drain(), vec!["a", "b"]);
        assert!(q.try_push("c").is_ok());
    }

    #[test]
    fn discard_empties_without_yielding() {
        let mut q = PendingQueue::new();
        q.push(1);
        q.push(2);
        assert_eq!(q.discard(), 2);
        assert!(q.drain().is_empty());
    }
}

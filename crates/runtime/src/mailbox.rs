use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// A message stamped with its posting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    pub seq: u64,
    pub message: T,
}

#[derive(Debug)]
struct Shared<T> {
    queue: RefCell<VecDeque<Envelope<T>>>,
    next_seq: Cell<u64>,
    closed: Cell<bool>,
}

/// Single-threaded inbox that serializes callbacks into ordered messages.
///
/// Producers (engine listeners) hold a [`Sender`] and only ever append; the
/// owner drains on the control thread. Draining never holds a borrow while
/// the caller processes messages, so handlers may post again re-entrantly.
#[derive(Debug)]
pub struct Mailbox<T> {
    shared: Rc<Shared<T>>,
}

/// Cloneable posting half of a [`Mailbox`].
#[derive(Debug)]
pub struct Sender<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            shared: Rc::new(Shared {
                queue: RefCell::new(VecDeque::new()),
                next_seq: Cell::new(0),
                closed: Cell::new(false),
            }),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> Sender<T> {
        Sender {
            shared: Rc::clone(&self.shared),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.get()
    }

    pub fn pop(&self) -> Option<Envelope<T>> {
        self.shared.queue.borrow_mut().pop_front()
    }

    /// Takes every queued message in posting order.
    pub fn drain(&self) -> Vec<Envelope<T>> {
        self.shared.queue.borrow_mut().drain(..).collect()
    }

    /// Stops accepting messages and discards whatever is queued.
    ///
    /// Returns the number of discarded messages.
    pub fn close(&self) -> usize {
        self.shared.closed.set(true);
        let mut q = self.shared.queue.borrow_mut();
        let n = q.len();
        q.clear();
        n
    }
}

impl<T> Sender<T> {
    /// Appends a message. Returns `false` once the mailbox is closed.
    pub fn post(&self, message: T) -> bool {
        if self.shared.closed.get() {
            return false;
        }
        let seq = self.shared.next_seq.get();
        self.shared.next_seq.set(seq.wrapping_add(1));
        self.shared
            .queue
            .borrow_mut()
            .push_back(Envelope { seq, message });
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.get()
    }
}

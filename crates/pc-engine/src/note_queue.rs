//! Fixed-capacity queue of live note events.

use heapless::Deque;
use pc_ir::NoteEvent;

/// Live note events held before new ones are dropped.
pub const NOTE_QUEUE_CAPACITY: usize = 256;

/// Notes queued by the control plane, drained at the start of each tick.
///
/// Fixed capacity: events pushed while full are dropped.
#[derive(Debug)]
pub struct NoteQueue {
    events: Deque<NoteEvent, NOTE_QUEUE_CAPACITY>,
    dropped: u64,
}

impl Default for NoteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteQueue {
    pub const fn new() -> Self {
        Self { events: Deque::new(), dropped: 0 }
    }

    /// Queue an event. Returns false if it was dropped.
    pub fn push(&mut self, event: NoteEvent) -> bool {
        if self.events.push_back(event).is_err() {
            if self.dropped == 0 {
                log::warn!("note queue full, dropping live input");
            }
            self.dropped += 1;
            return false;
        }
        true
    }

    pub fn pop(&mut self) -> Option<NoteEvent> {
        self.events.pop_front()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events lost to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut queue = NoteQueue::new();
        queue.push(NoteEvent::on(0, 1, 48));
        queue.push(NoteEvent::off(0));
        assert_eq!(queue.pop(), Some(NoteEvent::on(0, 1, 48)));
        assert_eq!(queue.pop(), Some(NoteEvent::off(0)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn drops_when_full() {
        let mut queue = NoteQueue::new();
        for i in 0..NOTE_QUEUE_CAPACITY {
            assert!(queue.push(NoteEvent::on(i % 4, 0, 60)));
        }
        assert!(!queue.push(NoteEvent::off(0)));
        assert_eq!(queue.len(), NOTE_QUEUE_CAPACITY);
        assert_eq!(queue.dropped(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }
}

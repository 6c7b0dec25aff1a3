//! In-process buffer between capture producers and the batch sender.

use crate::event::Event;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Multi-producer, single-consumer event buffer.
///
/// Cloning the queue yields another handle onto the same buffer, so each
/// producer can own one. The buffer is unbounded: producers never block and
/// never fail. `len()` is exposed so a shell can watch for growth.
#[derive(Debug, Clone)]
pub struct EventQueue {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Append an event to the tail of the queue.
    pub fn enqueue(&self, event: Event) {
        // Both ends live in `self`, so the channel can never be disconnected here.
        let _ = self.sender.send(event);
    }

    /// Remove and return everything currently queued, oldest first.
    ///
    /// Events enqueued while the drain is running land either in this batch
    /// or in the next one, never both.
    pub fn drain_all(&self) -> Vec<Event> {
        let pending = self.receiver.len();
        let mut events = Vec::with_capacity(pending);
        // Bounded by the length observed at entry so a busy producer cannot
        // keep the drain spinning forever.
        for _ in 0..pending {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }

    /// Number of events waiting to be drained.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn numbered(i: usize) -> Event {
        Event::keyboard(i.to_string())
    }

    fn data(event: &Event) -> String {
        event.get("data").and_then(|v| v.as_str()).unwrap().to_string()
    }

    #[test]
    fn test_drain_is_fifo() {
        let queue = EventQueue::new();
        for i in 0..5 {
            queue.enqueue(numbered(i));
        }
        assert_eq!(queue.len(), 5);

        let drained: Vec<String> = queue.drain_all().iter().map(data).collect();
        assert_eq!(drained, vec!["0", "1", "2", "3", "4"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_empty() {
        let queue = EventQueue::new();
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = EventQueue::new();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.enqueue(numbered(p * 1000 + i));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while producers.iter().any(|h| !h.is_finished()) {
            seen.extend(queue.drain_all());
        }
        for handle in producers {
            handle.join().unwrap();
        }
        seen.extend(queue.drain_all());

        assert_eq!(seen.len(), 1000);
        let unique: HashSet<String> = seen.iter().map(data).collect();
        assert_eq!(unique.len(), 1000);

        // Per-producer order is preserved.
        for p in 0..4 {
            let order: Vec<usize> = seen
                .iter()
                .map(|e| data(e).parse::<usize>().unwrap())
                .filter(|n| n / 1000 == p)
                .collect();
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(order, sorted);
        }
    }
}

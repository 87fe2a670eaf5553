//! Tuple queues between operators, with optional replay backup.
//!
//! A stream marked backed-up keeps a copy of every tuple it receives in a
//! backup buffer. Dequeuing does not touch the backup, so after an abort
//! the scheduler can rewind the queue to the backup contents and replay.
//! Backup entries are dropped only by explicit low-water-mark eviction.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::tuple::{Timestamp, TupleRef};

/// Shared stream handle.
pub type StreamRef = Arc<Stream>;

#[derive(Debug, Default)]
struct StreamState {
    queue: VecDeque<TupleRef>,
    backup: VecDeque<TupleRef>,
    backed_up: bool,
}

/// A FIFO of tuples guarded by its own lock.
#[derive(Debug)]
pub struct Stream {
    name: String,
    state: Mutex<StreamState>,
    ready: Condvar,
}

impl Stream {
    /// Creates an empty stream.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(StreamState::default()),
            ready: Condvar::new(),
        }
    }

    /// Creates an empty shared stream.
    #[must_use]
    pub fn shared(name: &str) -> StreamRef {
        Arc::new(Self::new(name))
    }

    /// Returns the stream name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a tuple, recording it in the backup when backed up.
    pub fn enqueue(&self, tuple: TupleRef) {
        let mut state = self.state.lock();
        if state.backed_up {
            state.backup.push_back(Arc::clone(&tuple));
        }
        state.queue.push_back(tuple);
        drop(state);
        self.ready.notify_one();
    }

    /// Removes the head tuple without blocking.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<TupleRef> {
        self.state.lock().queue.pop_front()
    }

    /// Returns the head tuple without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<TupleRef> {
        self.state.lock().queue.front().cloned()
    }

    /// Removes the head tuple, blocking until one is available.
    #[must_use]
    pub fn dequeue(&self) -> TupleRef {
        let mut state = self.state.lock();
        loop {
            if let Some(tuple) = state.queue.pop_front() {
                return tuple;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Removes the head tuple, waiting at most `timeout`.
    #[must_use]
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<TupleRef> {
        let mut state = self.state.lock();
        if state.queue.is_empty() {
            let _ = self.ready.wait_for(&mut state, timeout);
        }
        state.queue.pop_front()
    }

    /// Returns the number of queued tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns `true` if no tuple is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Drops every queued tuple. The backup is kept.
    pub fn clear(&self) {
        self.state.lock().queue.clear();
    }

    /// Turns replay backup on or off.
    pub fn set_backed_up(&self, backed_up: bool) {
        let mut state = self.state.lock();
        state.backed_up = backed_up;
        if !backed_up {
            state.backup.clear();
        }
    }

    /// Returns `true` if the stream retains a replay backup.
    #[must_use]
    pub fn is_backed_up(&self) -> bool {
        self.state.lock().backed_up
    }

    /// Returns the number of tuples held in the backup.
    #[must_use]
    pub fn backup_len(&self) -> usize {
        self.state.lock().backup.len()
    }

    /// Replaces the queue with the backup contents, oldest first.
    pub fn recover_from_backup(&self) {
        let mut state = self.state.lock();
        let StreamState { queue, backup, .. } = &mut *state;
        queue.clear();
        queue.extend(backup.iter().cloned());
    }

    /// Drops backup tuples whose low-water mark is below `mark`.
    pub fn evict_backup_older_than(&self, mark: Timestamp) {
        self.state.lock().backup.retain(|t| t.lwm() >= mark);
    }

    /// Evicts the backup below `mark` and rewinds the queue to what remains,
    /// as a single step under the stream lock.
    pub fn evict_and_rewind(&self, mark: Timestamp) {
        let mut state = self.state.lock();
        let StreamState { queue, backup, .. } = &mut *state;
        backup.retain(|t| t.lwm() >= mark);
        queue.clear();
        queue.extend(backup.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::tuple::Tuple;
    use crate::value::{Value, ValueType};

    /// Helper to create a single-int tuple arriving at `ts`.
    fn tuple(v: i64, ts: Timestamp) -> TupleRef {
        Tuple::new(Schema::of(&[("v", ValueType::Int)]), vec![Value::Int(v)], ts).unwrap()
    }

    fn drain(stream: &Stream) -> Vec<i64> {
        std::iter::from_fn(|| stream.try_dequeue())
            .map(|t| match t.value(0) {
                Some(Value::Int(v)) => *v,
                _ => panic!("unexpected value"),
            })
            .collect()
    }

    #[test]
    fn test_fifo_order() {
        let s = Stream::new("s");
        s.enqueue(tuple(1, 0));
        s.enqueue(tuple(2, 1));
        assert_eq!(s.len(), 2);
        assert_eq!(drain(&s), vec![1, 2]);
        assert!(s.is_empty());
    }

    #[test]
    fn test_backup_round_trip() {
        let s = Stream::new("s");
        s.set_backed_up(true);
        s.enqueue(tuple(1, 0));
        s.enqueue(tuple(2, 1));
        s.enqueue(tuple(3, 2));
        assert_eq!(drain(&s), vec![1, 2, 3]);
        s.recover_from_backup();
        assert_eq!(drain(&s), vec![1, 2, 3]);
    }

    #[test]
    fn test_backup_eviction() {
        let s = Stream::new("s");
        s.set_backed_up(true);
        for i in 0..5 {
            s.enqueue(tuple(i, i));
        }
        s.evict_backup_older_than(2);
        s.clear();
        s.recover_from_backup();
        assert_eq!(drain(&s), vec![2, 3, 4]);
    }

    #[test]
    fn test_eviction_is_monotonic() {
        let twice = Stream::new("twice");
        let once = Stream::new("once");
        for s in [&twice, &once] {
            s.set_backed_up(true);
            for i in 0..8 {
                s.enqueue(tuple(i, i));
            }
        }
        twice.evict_backup_older_than(3);
        twice.evict_backup_older_than(6);
        twice.evict_backup_older_than(4);
        once.evict_backup_older_than(6);
        twice.recover_from_backup();
        once.recover_from_backup();
        assert_eq!(drain(&twice), drain(&once));
    }

    #[test]
    fn test_no_backup_unless_marked() {
        let s = Stream::new("s");
        s.enqueue(tuple(1, 0));
        assert_eq!(s.backup_len(), 0);
        let _ = s.try_dequeue();
        s.recover_from_backup();
        assert!(s.is_empty());
    }

    #[test]
    fn test_evict_and_rewind() {
        let s = Stream::new("s");
        s.set_backed_up(true);
        for i in 0..4 {
            s.enqueue(tuple(i, i));
        }
        let _ = s.try_dequeue();
        s.evict_and_rewind(1);
        assert_eq!(drain(&s), vec![1, 2, 3]);
    }

    #[test]
    fn test_blocking_dequeue() {
        let s = Stream::shared("s");
        let producer = Arc::clone(&s);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            producer.enqueue(tuple(42, 0));
        });
        let t = s.dequeue();
        assert_eq!(t.value(0), Some(&Value::Int(42)));
        handle.join().unwrap();
        assert!(s.dequeue_timeout(Duration::from_millis(1)).is_none());
    }
}

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::AudioChunk;

/// Bounded, time-ordered queue of audio chunks shared between the capture
/// thread and one consumer.
///
/// Overflow behavior: drops the oldest chunk.
#[derive(Debug)]
pub struct ChunkQueue {
    inner: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<AudioChunk>,
    dropped: u64,
}

impl ChunkQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueState {
                chunks: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Append a chunk, dropping the oldest if the queue is full.
    pub fn push(&self, chunk: AudioChunk) {
        let mut state = self.inner.lock();
        while state.chunks.len() >= self.capacity {
            state.chunks.pop_front();
            state.dropped += 1;
        }
        state.chunks.push_back(chunk);
        drop(state);
        self.ready.notify_all();
    }

    /// Remove and return the oldest chunk without blocking.
    pub fn pop(&self) -> Option<AudioChunk> {
        self.inner.lock().chunks.pop_front()
    }

    /// Block until at least one chunk is queued or `timeout` elapses.
    /// Does not consume. Returns whether data is available.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let mut state = self.inner.lock();
        if state.chunks.is_empty() {
            self.ready
                .wait_while_for(&mut state, |s| s.chunks.is_empty(), timeout);
        }
        !state.chunks.is_empty()
    }

    /// Wake any thread blocked in [`ChunkQueue::wait_for_data`].
    pub fn notify(&self) {
        self.ready.notify_all();
    }

    pub fn clear(&self) {
        self.inner.lock().chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }

    /// Chunks discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn chunk(ts: i64) -> AudioChunk {
        AudioChunk {
            ts,
            duration: 10,
            pcm: vec![0; 4],
        }
    }

    #[test]
    fn push_pop_in_order() {
        let queue = ChunkQueue::new(4);
        queue.push(chunk(0));
        queue.push(chunk(10));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|c| c.ts), Some(0));
        assert_eq!(queue.pop().map(|c| c.ts), Some(10));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = ChunkQueue::new(3);
        for i in 0..5 {
            queue.push(chunk(i * 10));
            assert!(queue.len() <= 3);
        }

        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.pop().map(|c| c.ts), Some(20));
        assert_eq!(queue.pop().map(|c| c.ts), Some(30));
        assert_eq!(queue.pop().map(|c| c.ts), Some(40));
    }

    #[test]
    fn wait_times_out_when_empty() {
        let queue = ChunkQueue::new(2);
        let start = Instant::now();
        assert!(!queue.wait_for_data(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn wait_does_not_consume() {
        let queue = ChunkQueue::new(2);
        queue.push(chunk(0));
        assert!(queue.wait_for_data(Duration::from_millis(1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn wait_wakes_on_push() {
        let queue = Arc::new(ChunkQueue::new(2));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(chunk(5));
            })
        };

        assert!(queue.wait_for_data(Duration::from_secs(5)));
        producer.join().unwrap();
        assert_eq!(queue.pop().map(|c| c.ts), Some(5));
    }

    #[test]
    fn clear_empties_queue() {
        let queue = ChunkQueue::new(2);
        queue.push(chunk(0));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 2);
    }
}

//! Micro-batch accumulator for batchable requests.
//!
//! Collects eligible non-critical requests and flushes a chunk when the
//! classifier's current suggested size is reached or the oldest buffered
//! request has lingered past the time window, whichever comes first. This
//! balances throughput (larger evaluator calls) with latency (time-bounded
//! dispatch).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::request::Request;

pub(crate) struct AdaptiveBatcher {
    buffer: VecDeque<Request>,
    max_wait: Duration,
    batch_started: Option<Instant>,
}

impl AdaptiveBatcher {
    pub(crate) fn new(max_wait: Duration) -> Self {
        Self {
            buffer: VecDeque::new(),
            max_wait,
            batch_started: None,
        }
    }

    /// Add requests to the buffer. Starts the linger timer on the first
    /// non-empty push.
    pub(crate) fn push(&mut self, requests: Vec<Request>) {
        if self.batch_started.is_none() && !requests.is_empty() {
            self.batch_started = Some(Instant::now());
        }
        self.buffer.extend(requests);
    }

    /// Tightest declared deadline among buffered requests, for the
    /// classifier's batch-size decision.
    pub(crate) fn tightest_deadline_ms(&self) -> Option<u64> {
        self.buffer.iter().filter_map(|r| r.deadline_ms).min()
    }

    /// Whether a chunk of the given size should be flushed now.
    pub(crate) fn should_flush(&self, size: usize) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        if self.buffer.len() >= size.max(1) {
            return true;
        }
        matches!(self.batch_started, Some(started) if started.elapsed() >= self.max_wait)
    }

    /// Remove and return up to `size` requests, oldest first.
    ///
    /// The linger timer restarts for any remainder and clears when the
    /// buffer empties.
    pub(crate) fn flush_chunk(&mut self, size: usize) -> Vec<Request> {
        let take = size.max(1).min(self.buffer.len());
        let chunk: Vec<Request> = self.buffer.drain(..take).collect();
        self.batch_started = if self.buffer.is_empty() {
            None
        } else {
            Some(Instant::now())
        };
        chunk
    }

    /// Empty the buffer entirely (shutdown paths).
    pub(crate) fn drain_all(&mut self) -> Vec<Request> {
        self.batch_started = None;
        self.buffer.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use urteil_core::RequestId;

    use crate::completion::Completion;

    fn request(deadline_ms: Option<u64>) -> Request {
        Request {
            id: RequestId::new(),
            cache_key: "k".into(),
            payload: Bytes::from_static(b"{}"),
            deadline_ms,
            enqueued_at: Instant::now(),
            completion: Completion::new(),
        }
    }

    fn requests(count: usize) -> Vec<Request> {
        (0..count).map(|_| request(None)).collect()
    }

    #[test]
    fn flushes_at_size() {
        let mut b = AdaptiveBatcher::new(Duration::from_secs(60));
        b.push(requests(3));
        assert!(b.should_flush(3));
        assert!(!b.should_flush(4));
    }

    #[test]
    fn flushes_on_linger() {
        let mut b = AdaptiveBatcher::new(Duration::from_millis(10));
        b.push(requests(1));
        assert!(!b.should_flush(100));
        std::thread::sleep(Duration::from_millis(20));
        assert!(b.should_flush(100));
    }

    #[test]
    fn empty_buffer_never_flushes() {
        let b = AdaptiveBatcher::new(Duration::from_millis(0));
        assert!(!b.should_flush(1));
    }

    #[test]
    fn chunk_respects_size_and_keeps_remainder() {
        let mut b = AdaptiveBatcher::new(Duration::from_secs(60));
        b.push(requests(5));
        let chunk = b.flush_chunk(3);
        assert_eq!(chunk.len(), 3);
        assert_eq!(b.len(), 2);
        let rest = b.flush_chunk(3);
        assert_eq!(rest.len(), 2);
        assert!(b.is_empty());
    }

    #[test]
    fn timer_clears_when_buffer_empties() {
        let mut b = AdaptiveBatcher::new(Duration::from_millis(1));
        b.push(requests(2));
        b.flush_chunk(2);
        std::thread::sleep(Duration::from_millis(5));
        // Timer was cleared; an empty push later must not inherit it.
        b.push(vec![]);
        assert!(!b.should_flush(10));
    }

    #[test]
    fn tightest_deadline_is_the_minimum() {
        let mut b = AdaptiveBatcher::new(Duration::from_secs(60));
        b.push(vec![request(None), request(Some(800)), request(Some(300))]);
        assert_eq!(b.tightest_deadline_ms(), Some(300));
    }

    #[test]
    fn no_deadlines_means_none() {
        let mut b = AdaptiveBatcher::new(Duration::from_secs(60));
        b.push(requests(3));
        assert_eq!(b.tightest_deadline_ms(), None);
    }

    #[test]
    fn drain_all_resets_state() {
        let mut b = AdaptiveBatcher::new(Duration::from_secs(60));
        b.push(requests(4));
        let all = b.drain_all();
        assert_eq!(all.len(), 4);
        assert!(b.is_empty());
        assert!(!b.should_flush(1));
    }
}

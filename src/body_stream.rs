//! Backpressured byte stream for one entry body.
//!
//! [`EntryBodyStream`] is a plain state machine: the producer pushes chunks
//! with [`write`](EntryBodyStream::write) and [`end`](EntryBodyStream::end),
//! the consumer pulls [`BodySignal`]s with
//! [`next_signal`](EntryBodyStream::next_signal). Nothing in here knows about
//! threads or futures, so the same object drives both the blocking and the
//! tokio listing paths.
//!
//! ## Protocol
//!
//! - `write` returns `false` when the producer should stop pushing. A
//!   [`BodySignal::Drain`] is emitted once the backlog has been consumed.
//! - At most one [`BodySignal::Data`] is outstanding at a time; the next chunk
//!   is released only after the consumer pulls the previous one.
//! - Bytes past the declared entry size are cut off. A write when nothing is
//!   left to receive produces [`StreamError::PastDeclaredEnd`] instead.
//! - After `end`, exactly one [`BodySignal::End`] follows the last chunk.

use std::collections::VecDeque;

use crate::error::StreamError;

/// Undelivered chunk count above which delivered slots are compacted away.
pub const DEFAULT_MAX_BUFFERED: usize = 64;

/// One event observed by the consumer of a body stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySignal {
    /// A chunk of body bytes, in write order.
    Data(Vec<u8>),
    /// Backpressure was asserted and the backlog is now empty.
    Drain,
    /// No more data will follow.
    End,
    /// The producer misused the stream. The stream itself stays usable.
    Error(StreamError),
}

/// Observable state of a body stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Flowing,
    Paused,
    /// `end` was called but buffered chunks remain.
    Ending,
    Ended,
}

#[derive(Debug)]
pub struct EntryBodyStream {
    declared: u64,
    remain: u64,
    paused: bool,
    ending: bool,
    ended: bool,
    /// A `Data` signal is waiting in the outbox.
    in_flight: bool,
    need_drain: bool,
    buffer: Vec<Option<Vec<u8>>>,
    head: usize,
    max_buffered: usize,
    outbox: VecDeque<BodySignal>,
}

impl EntryBodyStream {
    /// Create a stream expecting exactly `size` body bytes.
    pub fn new(size: u64) -> Self {
        Self::with_max_buffered(size, DEFAULT_MAX_BUFFERED)
    }

    pub fn with_max_buffered(size: u64, max_buffered: usize) -> Self {
        Self {
            declared: size,
            remain: size,
            paused: false,
            ending: false,
            ended: false,
            in_flight: false,
            need_drain: false,
            buffer: Vec::new(),
            head: 0,
            max_buffered: max_buffered.max(1),
            outbox: VecDeque::new(),
        }
    }

    /// Push body bytes. Returns `false` when the producer should wait for a
    /// [`BodySignal::Drain`] before writing again.
    pub fn write(&mut self, chunk: &[u8]) -> bool {
        if self.ending || self.ended {
            self.outbox.push_back(BodySignal::Error(StreamError::WriteAfterEnd));
            return false;
        }
        if self.remain == 0 {
            self.outbox.push_back(BodySignal::Error(StreamError::PastDeclaredEnd {
                declared: self.declared,
            }));
            return false;
        }

        // trailing block padding is cut here
        let take = chunk.len().min(usize::try_from(self.remain).unwrap_or(usize::MAX));
        self.remain -= take as u64;
        if take > 0 {
            self.buffer.push(Some(chunk[..take].to_vec()));
            self.compact();
        }
        self.flush();

        let ok = !self.paused && self.undelivered() == 0;
        if !ok {
            self.need_drain = true;
        }
        ok
    }

    /// Optionally write a final chunk, then mark the stream as ending.
    pub fn end(&mut self, chunk: Option<&[u8]>) {
        if let Some(chunk) = chunk {
            self.write(chunk);
        }
        if self.ended {
            return;
        }
        self.ending = true;
        self.flush();
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume delivery. Returns `true` if chunks are still waiting.
    pub fn resume(&mut self) -> bool {
        self.paused = false;
        self.flush();
        self.undelivered() > 0
    }

    /// Pull the next signal, releasing buffered data as the consumer keeps up.
    pub fn next_signal(&mut self) -> Option<BodySignal> {
        if self.outbox.is_empty() {
            self.flush();
        }
        let signal = self.outbox.pop_front()?;
        if matches!(signal, BodySignal::Data(_)) {
            self.in_flight = false;
        }
        Some(signal)
    }

    pub fn state(&self) -> StreamState {
        if self.ended {
            StreamState::Ended
        } else if self.paused {
            StreamState::Paused
        } else if self.ending {
            StreamState::Ending
        } else {
            StreamState::Flowing
        }
    }

    /// Bytes still expected before the declared size is reached.
    pub fn remain(&self) -> u64 {
        self.remain
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn undelivered(&self) -> usize {
        self.buffer.len() - self.head
    }

    /// Delivery attempt: releases at most one chunk.
    fn flush(&mut self) {
        if self.paused || self.ended || self.in_flight {
            return;
        }

        if self.head < self.buffer.len() {
            let chunk = self.buffer[self.head].take().unwrap_or_default();
            self.head += 1;
            if self.head == self.buffer.len() {
                self.buffer.clear();
                self.head = 0;
            }
            self.outbox.push_back(BodySignal::Data(chunk));
            self.in_flight = true;
            return;
        }

        if self.need_drain {
            self.need_drain = false;
            self.outbox.push_back(BodySignal::Drain);
        }
        if self.ending {
            self.ended = true;
            self.outbox.push_back(BodySignal::End);
        }
    }

    fn compact(&mut self) {
        if self.undelivered() > self.max_buffered && self.head > 0 {
            self.buffer.drain(..self.head);
            self.head = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_all(stream: &mut EntryBodyStream) -> Vec<BodySignal> {
        std::iter::from_fn(|| stream.next_signal()).collect()
    }

    #[test]
    fn test_truncates_to_declared_size() {
        let mut s = EntryBodyStream::new(5);
        s.write(b"hello world");
        s.end(None);
        assert_eq!(
            drain_all(&mut s),
            vec![BodySignal::Data(b"hello".to_vec()), BodySignal::End]
        );
        assert_eq!(s.remain(), 0);
    }

    #[test]
    fn test_single_end_after_ordered_data() {
        let mut s = EntryBodyStream::new(9);
        assert!(s.write(b"abc"));
        assert!(!s.write(b"def"));
        assert!(!s.write(b"ghi"));
        s.end(None);
        s.end(None);

        let signals = drain_all(&mut s);
        assert_eq!(
            signals,
            vec![
                BodySignal::Data(b"abc".to_vec()),
                BodySignal::Data(b"def".to_vec()),
                BodySignal::Data(b"ghi".to_vec()),
                BodySignal::Drain,
                BodySignal::End,
            ]
        );
        assert_eq!(s.state(), StreamState::Ended);
        assert!(s.next_signal().is_none());
    }

    #[test]
    fn test_write_past_declared_end() {
        let mut s = EntryBodyStream::new(2);
        s.write(b"ab");
        assert!(!s.write(b"c"));
        let signals = drain_all(&mut s);
        assert!(signals.contains(&BodySignal::Error(StreamError::PastDeclaredEnd { declared: 2 })));
    }

    #[test]
    fn test_write_after_end() {
        let mut s = EntryBodyStream::new(0);
        s.end(None);
        assert!(!s.write(b"x"));
        assert_eq!(
            drain_all(&mut s),
            vec![BodySignal::End, BodySignal::Error(StreamError::WriteAfterEnd)]
        );
    }

    #[test]
    fn test_pause_holds_data() {
        let mut s = EntryBodyStream::new(4);
        s.pause();
        assert!(!s.write(b"ab"));
        assert_eq!(s.state(), StreamState::Paused);
        assert!(s.next_signal().is_none());

        assert!(!s.resume());
        assert_eq!(s.next_signal(), Some(BodySignal::Data(b"ab".to_vec())));
        assert_eq!(s.next_signal(), Some(BodySignal::Drain));
    }

    #[test]
    fn test_resume_reports_backlog() {
        let mut s = EntryBodyStream::new(4);
        s.pause();
        s.write(b"a");
        s.write(b"b");
        // one chunk released, one still queued
        assert!(s.resume());
    }

    #[test]
    fn test_state_precedence() {
        let mut s = EntryBodyStream::new(1);
        assert_eq!(s.state(), StreamState::Flowing);
        s.pause();
        s.write(b"x");
        s.end(None);
        assert_eq!(s.state(), StreamState::Paused);
        s.resume();
        assert_eq!(s.state(), StreamState::Ending);
        drain_all(&mut s);
        assert_eq!(s.state(), StreamState::Ended);
    }

    #[test]
    fn test_compaction_bounds_buffer() {
        let mut s = EntryBodyStream::with_max_buffered(100, 2);
        s.pause();
        s.write(b"a");
        s.write(b"b");
        s.resume();
        assert_eq!(s.next_signal(), Some(BodySignal::Data(b"a".to_vec())));
        s.pause();
        // "a" is spent but still occupies slot 0
        assert_eq!(s.head, 1);

        s.write(b"c");
        assert_eq!(s.head, 1);
        s.write(b"d");
        // three undelivered > 2: the spent slot is evicted
        assert_eq!(s.head, 0);
        assert_eq!(s.buffer.len(), 3);

        s.resume();
        let data: Vec<_> = drain_all(&mut s)
            .into_iter()
            .filter_map(|sig| match sig {
                BodySignal::Data(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(data, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }
}

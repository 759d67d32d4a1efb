//! Fixed-capacity host buffer filled from record-mode chunks.
//!
//! Each chunk the device reports is copied at the write cursor. A chunk that
//! runs past the end is split in two copies, the second one landing at index 0,
//! and the wrap counter goes up by one. Capacity never changes after creation.

use crate::dwf::DwfError;
use serde::Deserialize;
use std::{fmt, ops::Range};

/// What to do when one poll reports more samples than the buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Stop the run and report the overflow.
    #[default]
    Abort,
    /// Skip the oldest part of the chunk and keep the newest `capacity` samples.
    KeepNewest,
}

/// Where the samples of one chunk go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Samples at the start of the chunk that are not copied.
    pub skipped: usize,
    /// Destination of the first copy, always starting at the cursor.
    pub first: Range<usize>,
    /// Destination of the wrapped copy, always starting at 0.
    pub second: Option<Range<usize>>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.first.len() + self.second.as_ref().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    Lost { stream: String, count: usize },
    Corrupted { stream: String, count: usize },
    Overflow {
        stream: String,
        available: usize,
        capacity: usize,
    },
    Device(DwfError),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lost { stream, count } => {
                write!(f, "{stream}: {count} samples were lost, reduce the sample rate")
            }
            Self::Corrupted { stream, count } => write!(
                f,
                "{stream}: {count} samples could be corrupted, reduce the sample rate"
            ),
            Self::Overflow {
                stream,
                available,
                capacity,
            } => write!(
                f,
                "{stream}: too much data ({available} > {capacity}), increase the buffer size"
            ),
            Self::Device(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<DwfError> for RecordError {
    fn from(value: DwfError) -> Self {
        Self::Device(value)
    }
}

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    cursor: usize,
    wraps: u64,
    total: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// # Panics
    /// If `capacity` is 0.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: vec![T::default(); capacity],
            cursor: 0,
            wraps: 0,
            total: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Next write index.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Times the cursor went past the end.
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    /// Samples written since creation.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Raw storage, in buffer order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Number of valid samples held.
    pub fn len(&self) -> usize {
        if self.wraps > 0 {
            self.capacity()
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Works out where `available` samples go without touching the buffer.
    pub fn plan(&self, available: usize, policy: OverflowPolicy) -> Result<ChunkPlan, usize> {
        let capacity = self.capacity();
        let (skipped, count) = if available > capacity {
            match policy {
                OverflowPolicy::Abort => return Err(capacity),
                OverflowPolicy::KeepNewest => (available - capacity, capacity),
            }
        } else {
            (0, available)
        };

        let end = self.cursor + count;
        if end > capacity {
            Ok(ChunkPlan {
                skipped,
                first: self.cursor..capacity,
                second: Some(0..end - capacity),
            })
        } else {
            Ok(ChunkPlan {
                skipped,
                first: self.cursor..end,
                second: None,
            })
        }
    }

    /// Copies one chunk in. `copy(dst, offset)` fills `dst` with the chunk
    /// samples starting at `offset`; it is called once or twice.
    pub fn ingest<F>(
        &mut self,
        stream: &str,
        available: usize,
        policy: OverflowPolicy,
        mut copy: F,
    ) -> Result<ChunkPlan, RecordError>
    where
        F: FnMut(&mut [T], usize) -> Result<(), DwfError>,
    {
        let plan = self
            .plan(available, policy)
            .map_err(|capacity| RecordError::Overflow {
                stream: stream.to_string(),
                available,
                capacity,
            })?;
        if plan.is_empty() {
            return Ok(plan);
        }
        if plan.skipped > 0 {
            log::warn!("{stream}: dropping {} oldest samples of chunk", plan.skipped);
        }

        copy(&mut self.data[plan.first.clone()], plan.skipped)?;
        if let Some(second) = &plan.second {
            copy(&mut self.data[second.clone()], plan.skipped + plan.first.len())?;
        }
        self.advance(plan.len());
        Ok(plan)
    }

    /// Copies a host slice in, as if it were a device chunk. Only the
    /// newest `capacity` samples of a longer slice are kept.
    pub fn push_slice(&mut self, samples: &[T]) -> Result<ChunkPlan, RecordError> {
        self.ingest("slice", samples.len(), OverflowPolicy::KeepNewest, |dst, offset| {
            dst.copy_from_slice(&samples[offset..offset + dst.len()]);
            Ok(())
        })
    }

    fn advance(&mut self, count: usize) {
        let capacity = self.capacity();
        let next = self.cursor + count;
        if next >= capacity {
            self.wraps += 1;
        }
        self.cursor = next % capacity;
        self.total += count as u64;
    }

    /// Valid samples from oldest to newest.
    pub fn ordered(&self) -> Vec<T> {
        if self.wraps == 0 {
            return self.data[..self.cursor].to_vec();
        }
        let mut out = Vec::with_capacity(self.capacity());
        out.extend_from_slice(&self.data[self.cursor..]);
        out.extend_from_slice(&self.data[..self.cursor]);
        out
    }

    /// The newest `n` samples, oldest first.
    pub fn latest(&self, n: usize) -> Vec<T> {
        let n = n.min(self.len());
        let mut out = Vec::with_capacity(n);
        if n <= self.cursor {
            out.extend_from_slice(&self.data[self.cursor - n..self.cursor]);
        } else {
            let head = n - self.cursor;
            out.extend_from_slice(&self.data[self.capacity() - head..]);
            out.extend_from_slice(&self.data[..self.cursor]);
        }
        out
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
        self.wraps = 0;
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_copy(next: &mut u64) -> impl FnMut(&mut [u64], usize) -> Result<(), DwfError> + '_ {
        move |dst, _| {
            for slot in dst.iter_mut() {
                *slot = *next;
                *next += 1;
            }
            Ok(())
        }
    }

    #[test]
    fn straddling_chunk_splits_in_two() {
        let mut ring = RingBuffer::<u64>::with_capacity(100);
        let mut next = 0;
        ring.ingest("t", 90, OverflowPolicy::Abort, counting_copy(&mut next))
            .unwrap();
        assert_eq!(ring.cursor(), 90);
        assert_eq!(ring.wraps(), 0);

        let mut calls = Vec::new();
        let plan = ring
            .ingest("t", 30, OverflowPolicy::Abort, |dst, offset| {
                calls.push((dst.len(), offset));
                dst.fill(7);
                Ok(())
            })
            .unwrap();
        assert_eq!(plan.first, 90..100);
        assert_eq!(plan.second, Some(0..20));
        assert_eq!(calls, vec![(10, 0), (20, 10)]);
        assert_eq!(ring.cursor(), 20);
        assert_eq!(ring.wraps(), 1);
        assert!(ring.as_slice()[90..100].iter().all(|&v| v == 7));
        assert!(ring.as_slice()[0..20].iter().all(|&v| v == 7));
        assert_eq!(ring.as_slice()[20], 20);
    }

    #[test]
    fn cursor_and_wraps_follow_total() {
        for capacity in [1usize, 7, 64, 100] {
            let chunks = [3usize, 0, 17, 1, 50, 99, 2, 64, 31];
            let mut ring = RingBuffer::<u8>::with_capacity(capacity);
            let mut total = 0usize;
            for &chunk in &chunks {
                let chunk = chunk.min(capacity);
                ring.ingest("t", chunk, OverflowPolicy::Abort, |_, _| Ok(()))
                    .unwrap();
                total += chunk;
                assert_eq!(ring.cursor(), total % capacity);
                assert_eq!(ring.wraps(), (total / capacity) as u64);
                assert_eq!(ring.total(), total as u64);
            }
        }
    }

    #[test]
    fn split_lengths_sum_to_available() {
        let mut ring = RingBuffer::<u8>::with_capacity(50);
        ring.ingest("t", 45, OverflowPolicy::Abort, |_, _| Ok(()))
            .unwrap();
        for available in 0..=50 {
            let plan = ring.plan(available, OverflowPolicy::Abort).unwrap();
            assert_eq!(plan.len(), available);
            assert_eq!(plan.first.start, 45);
            assert!(plan.first.end <= 50);
            if let Some(second) = plan.second {
                assert_eq!(second.start, 0);
                assert_eq!(plan.first.end, 50);
            }
        }
    }

    #[test]
    fn oversized_chunk_aborts_without_writing() {
        let mut ring = RingBuffer::<u8>::with_capacity(10);
        let mut called = false;
        let err = ring
            .ingest("analog", 11, OverflowPolicy::Abort, |_, _| {
                called = true;
                Ok(())
            })
            .unwrap_err();
        assert!(!called);
        assert_eq!(
            err,
            RecordError::Overflow {
                stream: "analog".into(),
                available: 11,
                capacity: 10
            }
        );
        assert_eq!(ring.total(), 0);
    }

    #[test]
    fn oversized_chunk_keeps_newest() {
        let mut ring = RingBuffer::<u64>::with_capacity(10);
        ring.push_slice(&[100, 101, 102]).unwrap();
        let chunk: Vec<u64> = (0..25).collect();
        let plan = ring
            .ingest("t", chunk.len(), OverflowPolicy::KeepNewest, |dst, offset| {
                dst.copy_from_slice(&chunk[offset..offset + dst.len()]);
                Ok(())
            })
            .unwrap();
        assert_eq!(plan.skipped, 15);
        assert_eq!(plan.first, 3..10);
        assert_eq!(plan.second, Some(0..3));
        assert_eq!(ring.cursor(), 3);
        assert_eq!(ring.wraps(), 1);
        assert_eq!(ring.ordered(), (15..25).collect::<Vec<u64>>());
    }

    #[test]
    fn ordered_and_latest_before_and_after_wrap() {
        let mut ring = RingBuffer::<u64>::with_capacity(5);
        ring.push_slice(&[1, 2, 3]).unwrap();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.ordered(), vec![1, 2, 3]);
        ring.push_slice(&[4, 5, 6, 7]).unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.ordered(), vec![3, 4, 5, 6, 7]);
        assert_eq!(ring.latest(2), vec![6, 7]);
        assert_eq!(ring.latest(3), vec![5, 6, 7]);
        assert_eq!(ring.latest(9), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn long_slice_keeps_its_tail() {
        let mut ring = RingBuffer::<u64>::with_capacity(4);
        let plan = ring.push_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(plan.skipped, 2);
        assert_eq!(ring.ordered(), vec![3, 4, 5, 6]);
        assert!(ring.push_slice(&[]).unwrap().is_empty());
        assert_eq!(ring.total(), 4);
    }

    #[test]
    fn exact_fill_wraps_once() {
        let mut ring = RingBuffer::<u8>::with_capacity(8);
        let plan = ring.push_slice(&[0; 8]).unwrap();
        assert_eq!(plan.first, 0..8);
        assert_eq!(plan.second, None);
        assert_eq!(ring.cursor(), 0);
        assert_eq!(ring.wraps(), 1);
    }

    #[test]
    fn copy_failure_leaves_cursor() {
        let mut ring = RingBuffer::<u8>::with_capacity(8);
        let err = ring
            .ingest("t", 4, OverflowPolicy::Abort, |_, _| Err(DwfError::BusError))
            .unwrap_err();
        assert_eq!(err, RecordError::Device(DwfError::BusError));
        assert_eq!(ring.cursor(), 0);
        assert_eq!(ring.total(), 0);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _ = RingBuffer::<u8>::with_capacity(0);
    }
}

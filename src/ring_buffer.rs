//! # Ring Buffer Module
//!
//! Fixed-capacity per-device history of triaxial samples used for charting.
//! Storage is four parallel arrays (timestamps, X, Y, Z) addressed by `head`
//! and `tail` cursors; when full, `append` silently overwrites the oldest sample.
//!
//! `SharedRingBuffer` wraps a ring in an `RwLock` so the ingestion side and a
//! rendering thread can hold the same buffer: appends take the write lock,
//! reads take the read lock and should finish quickly.

use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::OutOfRange;

/// One triaxial reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: i64,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Sample {
    pub fn new(timestamp: i64, x: i16, y: i16, z: i16) -> Self {
        Self { timestamp, x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn all() -> [Axis; 3] {
        [Axis::X, Axis::Y, Axis::Z]
    }

    fn pick(self, sample: &Sample) -> i16 {
        match self {
            Axis::X => sample.x,
            Axis::Y => sample.y,
            Axis::Z => sample.z,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RingBuffer {
    capacity: usize,
    head: usize,
    tail: usize,
    // One slot more than `capacity` so a full ring is distinguishable from an empty one.
    timestamps: Box<[i64]>,
    data_x: Box<[i16]>,
    data_y: Box<[i16]>,
    data_z: Box<[i16]>,
}

impl RingBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        let slots = capacity + 1;
        Self {
            capacity,
            head: 0,
            tail: 0,
            timestamps: vec![0; slots].into_boxed_slice(),
            data_x: vec![0; slots].into_boxed_slice(),
            data_y: vec![0; slots].into_boxed_slice(),
            data_z: vec![0; slots].into_boxed_slice(),
        }
    }

    fn slots(&self) -> usize {
        self.timestamps.len()
    }

    pub fn append(&mut self, sample: Sample) {
        let tail = self.tail;
        self.timestamps[tail] = sample.timestamp;
        self.data_x[tail] = sample.x;
        self.data_y[tail] = sample.y;
        self.data_z[tail] = sample.z;
        self.tail = (tail + 1) % self.slots();
        if self.tail == self.head {
            self.head = (self.head + 1) % self.slots();
        }
    }

    /// Forget every sample; storage is kept
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    pub fn size(&self) -> usize {
        (self.tail + self.slots() - self.head) % self.slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn read_slot(&self, slot: usize) -> Sample {
        Sample {
            timestamp: self.timestamps[slot],
            x: self.data_x[slot],
            y: self.data_y[slot],
            z: self.data_z[slot],
        }
    }

    /// Sample `index` positions after the oldest one
    #[allow(dead_code)]
    pub fn at(&self, index: usize) -> Result<Sample, OutOfRange> {
        self.get(index).ok_or(OutOfRange {
            index,
            size: self.size(),
        })
    }

    pub fn get(&self, index: usize) -> Option<Sample> {
        if index >= self.size() {
            return None;
        }
        Some(self.read_slot((self.head + index) % self.slots()))
    }

    #[allow(dead_code)]
    pub fn last(&self) -> Option<Sample> {
        self.size().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Oldest-first iteration
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            buffer: self,
            front: 0,
            back: self.size(),
        }
    }

    /// (min, max) timestamp over the stored samples, for chart axes
    pub fn time_range(&self) -> Option<(i64, i64)> {
        self.iter().fold(None, |acc, s| match acc {
            None => Some((s.timestamp, s.timestamp)),
            Some((min, max)) => Some((min.min(s.timestamp), max.max(s.timestamp))),
        })
    }

    /// (min, max) value of one axis over the stored samples
    pub fn value_range(&self, axis: Axis) -> Option<(i16, i16)> {
        self.iter().map(|s| axis.pick(&s)).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        })
    }
}

pub struct Iter<'a> {
    buffer: &'a RingBuffer,
    front: usize,
    back: usize,
}

impl Iterator for Iter<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.front >= self.back {
            return None;
        }
        let sample = self.buffer.get(self.front);
        self.front += 1;
        sample
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Sample> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.buffer.get(self.back)
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a RingBuffer {
    type Item = Sample;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Ring buffer shared between the ingestion side and readers on other threads
#[derive(Debug)]
pub struct SharedRingBuffer {
    inner: RwLock<RingBuffer>,
}

impl SharedRingBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: RwLock::new(RingBuffer::new(capacity)),
        }
    }

    // A panicking reader cannot leave the cursors half-updated, so a poisoned
    // lock still guards a consistent ring.
    fn write(&self) -> RwLockWriteGuard<'_, RingBuffer> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Hold the read lock for a traversal; appends wait until the guard drops
    pub fn read(&self) -> RwLockReadGuard<'_, RingBuffer> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, sample: Sample) {
        self.write().append(sample);
    }

    #[allow(dead_code)]
    pub fn clear(&self) {
        self.write().clear();
    }

    #[allow(dead_code)]
    pub fn size(&self) -> usize {
        self.read().size()
    }

    #[allow(dead_code)]
    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    /// Copy of the current contents, oldest first
    #[allow(dead_code)]
    pub fn snapshot(&self) -> Vec<Sample> {
        self.read().iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let mut buffer = RingBuffer::new(cap(3));
        buffer.append(Sample::new(1, 10, 1, 1));
        buffer.append(Sample::new(2, 20, 2, 2));
        buffer.append(Sample::new(3, 30, 3, 3));
        buffer.append(Sample::new(4, 40, 4, 4));

        assert_eq!(buffer.size(), 3);
        assert_eq!(buffer.at(0), Ok(Sample::new(2, 20, 2, 2)));
        assert_eq!(buffer.at(2), Ok(Sample::new(4, 40, 4, 4)));
    }

    #[test]
    fn test_size_and_iteration_match_last_appends() {
        for capacity in 1..6 {
            for n in 0usize..15 {
                let mut buffer = RingBuffer::new(cap(capacity));
                for i in 0..n {
                    buffer.append(Sample::new(i as i64, i as i16, 0, 0));
                }
                let expected: Vec<i64> = (n.saturating_sub(capacity)..n).map(|i| i as i64).collect();
                let got: Vec<i64> = buffer.iter().map(|s| s.timestamp).collect();

                assert_eq!(buffer.size(), n.min(capacity));
                assert_eq!(got, expected, "capacity {} appends {}", capacity, n);
            }
        }
    }

    #[test]
    fn test_out_of_range() {
        let mut buffer = RingBuffer::new(cap(2));
        assert_eq!(buffer.at(0), Err(OutOfRange { index: 0, size: 0 }));

        buffer.append(Sample::new(5, 1, 2, 3));
        assert!(buffer.at(0).is_ok());
        assert_eq!(buffer.at(1), Err(OutOfRange { index: 1, size: 1 }));
    }

    #[test]
    fn test_clear_behaves_like_new() {
        let mut reused = RingBuffer::new(cap(4));
        for i in 0..9 {
            reused.append(Sample::new(i, 0, 0, 0));
        }
        reused.clear();
        assert!(reused.is_empty());

        let mut fresh = RingBuffer::new(cap(4));
        for i in 100..106 {
            reused.append(Sample::new(i, 1, 2, 3));
            fresh.append(Sample::new(i, 1, 2, 3));
        }
        assert_eq!(reused.size(), fresh.size());
        assert!(reused.iter().eq(fresh.iter()));
        assert_eq!(reused.capacity(), 4);
    }

    #[test]
    fn test_reverse_iteration_and_last() {
        let mut buffer = RingBuffer::new(cap(3));
        for i in 0..5 {
            buffer.append(Sample::new(i, 0, 0, 0));
        }
        let reversed: Vec<i64> = buffer.iter().rev().map(|s| s.timestamp).collect();
        assert_eq!(reversed, vec![4, 3, 2]);
        assert_eq!(buffer.last().map(|s| s.timestamp), Some(4));
        assert_eq!(buffer.iter().len(), 3);
    }

    #[test]
    fn test_ranges() {
        let mut buffer = RingBuffer::new(cap(8));
        assert_eq!(buffer.time_range(), None);

        buffer.append(Sample::new(10, -5, 7, 0));
        buffer.append(Sample::new(30, 12, -3, 0));
        buffer.append(Sample::new(20, 4, 1, 0));

        assert_eq!(buffer.time_range(), Some((10, 30)));
        assert_eq!(buffer.value_range(Axis::X), Some((-5, 12)));
        assert_eq!(buffer.value_range(Axis::Y), Some((-3, 7)));
        assert_eq!(buffer.value_range(Axis::Z), Some((0, 0)));
    }

    #[test]
    fn test_shared_buffer_concurrent_appends() {
        let shared = Arc::new(SharedRingBuffer::new(cap(50)));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        shared.append(Sample::new(w * 1000 + i, 0, 0, 0));
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            let guard = shared.read();
            assert!(guard.size() <= 50);
            assert_eq!(guard.iter().count(), guard.size());
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(shared.size(), 50);
        assert_eq!(shared.capacity(), 50);
        shared.clear();
        assert_eq!(shared.size(), 0);
    }
}

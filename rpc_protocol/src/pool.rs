// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Pooled packet allocation.
//!
//! Two size classes are kept as free lists of reusable buffers: `small` for requests that fit
//! comfortably (most NFS/MOUNT calls) and `large` for anything bigger (bulk READ/WRITE
//! payloads). Each class has a maximum population (`-1` meaning unlimited) and a count of
//! buffers currently allocated from it. `allocate` grows the class on demand — handing out a
//! freshly allocated buffer — as long as it's under its max; it blocks on a condition variable
//! only once the free list is empty *and* the class is already at its max. This bounds total
//! memory use under load once a max is configured, while still letting an unlimited pool (the
//! `-1` default) satisfy every request without ever blocking.

use std::sync::{Arc, Condvar, Mutex};

use log::trace;

use crate::packet::RpcPacket;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Small,
    Large,
}

struct PoolState {
    small_free: Vec<Vec<u8>>,
    large_free: Vec<Vec<u8>>,
    small_allocated: usize,
    large_allocated: usize,
}

/// A pool of reusable packet buffers with two size classes, each independently bounded (or
/// unbounded) by a maximum population.
pub struct PacketPool {
    state: Mutex<PoolState>,
    not_empty: Condvar,
    small_max: isize,
    large_max: isize,
    small_size: usize,
    large_size: usize,
}

impl PacketPool {
    /// Builds a pool whose small class hands out `small_size`-byte buffers up to `small_max` of
    /// them (`-1` for unlimited), and whose large class hands out `large_size`-byte buffers up
    /// to `large_max` of them. No buffers are pre-allocated; they're created the first time
    /// they're needed.
    pub fn new(small_max: isize, large_max: isize, small_size: usize, large_size: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                small_free: Vec::new(),
                large_free: Vec::new(),
                small_allocated: 0,
                large_allocated: 0,
            }),
            not_empty: Condvar::new(),
            small_max,
            large_max,
            small_size,
            large_size,
        }
    }

    fn class_for(&self, requested_size: usize) -> Result<SizeClass, Error> {
        if requested_size <= self.small_size {
            Ok(SizeClass::Small)
        } else if requested_size <= self.large_size {
            Ok(SizeClass::Large)
        } else {
            Err(Error::NoPooledMemory)
        }
    }

    fn size_of(&self, class: SizeClass) -> usize {
        match class {
            SizeClass::Small => self.small_size,
            SizeClass::Large => self.large_size,
        }
    }

    fn max_of(&self, class: SizeClass) -> isize {
        match class {
            SizeClass::Small => self.small_max,
            SizeClass::Large => self.large_max,
        }
    }

    /// Checks out a buffer able to hold at least `requested_size` bytes, blocking until one is
    /// available. Returns [`Error::NoPooledMemory`] only when `requested_size` exceeds the large
    /// size class entirely — within a size class, the pool only ever makes the caller wait, it
    /// never fails the request outright.
    pub fn allocate(self: Arc<Self>, requested_size: usize) -> Result<RpcPacket, Error> {
        let class = self.class_for(requested_size)?;
        let max = self.max_of(class);
        let size = self.size_of(class);
        let mut state = self.state.lock().unwrap();

        loop {
            let (free_list, allocated) = match class {
                SizeClass::Small => (&mut state.small_free, &mut state.small_allocated),
                SizeClass::Large => (&mut state.large_free, &mut state.large_allocated),
            };

            if let Some(buffer) = free_list.pop() {
                trace!("pool: reused {class:?} buffer, {} remaining free, {allocated} allocated", free_list.len());
                return Ok(RpcPacket::from_pool(buffer, class, self.clone()));
            }

            if max < 0 || (*allocated as isize) < max {
                *allocated += 1;
                trace!("pool: grew {class:?} to {allocated} allocated (max {max})");
                return Ok(RpcPacket::from_pool(vec![0u8; size], class, self.clone()));
            }

            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Like [`Self::allocate`] but never blocks; returns `None` if the class has no free buffer
    /// and is already at its max.
    pub fn try_allocate(self: Arc<Self>, requested_size: usize) -> Result<Option<RpcPacket>, Error> {
        let class = self.class_for(requested_size)?;
        let max = self.max_of(class);
        let size = self.size_of(class);
        let mut state = self.state.lock().unwrap();
        let (free_list, allocated) = match class {
            SizeClass::Small => (&mut state.small_free, &mut state.small_allocated),
            SizeClass::Large => (&mut state.large_free, &mut state.large_allocated),
        };

        if let Some(buffer) = free_list.pop() {
            return Ok(Some(RpcPacket::from_pool(buffer, class, self.clone())));
        }
        if max < 0 || (*allocated as isize) < max {
            *allocated += 1;
            return Ok(Some(RpcPacket::from_pool(vec![0u8; size], class, self.clone())));
        }
        Ok(None)
    }

    /// Returns a buffer to its free list and wakes one waiter, if any. The buffer's allocated
    /// count is unaffected — release never shrinks the pool, it only makes the buffer available
    /// for reuse.
    pub(crate) fn release(&self, mut buffer: Vec<u8>, class: SizeClass) {
        buffer.resize(self.size_of(class), 0);

        let mut state = self.state.lock().unwrap();
        match class {
            SizeClass::Small => state.small_free.push(buffer),
            SizeClass::Large => state.large_free.push(buffer),
        }
        drop(state);
        self.not_empty.notify_one();
    }

    pub fn small_available(&self) -> usize {
        self.state.lock().unwrap().small_free.len()
    }

    pub fn large_available(&self) -> usize {
        self.state.lock().unwrap().large_free.len()
    }

    pub fn small_allocated(&self) -> usize {
        self.state.lock().unwrap().small_allocated
    }

    pub fn large_allocated(&self) -> usize {
        self.state.lock().unwrap().large_allocated
    }

    pub fn small_size(&self) -> usize {
        self.small_size
    }

    pub fn large_size(&self) -> usize {
        self.large_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn allocate_grows_up_to_max_then_blocks() {
        let pool = Arc::new(PacketPool::new(1, 0, 128, 1024));
        let pkt = pool.clone().allocate(64).unwrap();
        assert_eq!(pool.small_allocated(), 1);
        assert_eq!(pool.small_available(), 0);

        let pool2 = pool.clone();
        let handle = thread::spawn(move || {
            let _second = pool2.allocate(64).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished(), "a second allocation past max should block");

        drop(pkt);
        handle.join().unwrap();
        assert_eq!(pool.small_allocated(), 1, "the freed buffer should be reused, not grown past max");
    }

    #[test]
    fn unlimited_max_never_blocks() {
        let pool = Arc::new(PacketPool::new(-1, -1, 128, 1024));
        let a = pool.clone().allocate(64).unwrap();
        let b = pool.clone().allocate(64).unwrap();
        assert_eq!(pool.small_allocated(), 2);
        drop(a);
        drop(b);
    }

    #[test]
    fn oversized_request_rejected() {
        let pool = Arc::new(PacketPool::new(1, 1, 128, 1024));
        assert!(matches!(pool.allocate(2048), Err(Error::NoPooledMemory)));
    }

    #[test]
    fn try_allocate_does_not_block_past_max() {
        let pool = Arc::new(PacketPool::new(0, 0, 128, 1024));
        assert!(pool.try_allocate(64).unwrap().is_none());
    }

    #[test]
    fn released_buffer_is_reused_before_growing() {
        let pool = Arc::new(PacketPool::new(-1, -1, 128, 1024));
        let pkt = pool.clone().allocate(64).unwrap();
        drop(pkt);
        assert_eq!(pool.small_available(), 1);
        let _reused = pool.clone().allocate(64).unwrap();
        assert_eq!(pool.small_allocated(), 1, "reuse shouldn't grow the allocated count");
        assert_eq!(pool.small_available(), 0);
    }
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Pooled packet buffers.
//!
//! An [`RpcPacket`] is a fixed-size buffer checked out of a [`crate::pool::PacketPool`], together
//! with the bookkeeping a connection handler needs to read a request into it, hand it to a
//! worker, and reuse (or alias) the same buffer for the reply.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::pool::{PacketPool, SizeClass};

/// Where a packet arrived from / will be sent back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// Addressing information carried alongside a packet so a worker can reply without needing a
/// handle back to the connection that produced the request.
#[derive(Debug, Clone)]
pub struct ClientEndpoint {
    pub transport: Transport,
    pub peer: SocketAddr,
    /// For TCP, the session this packet belongs to (see [`crate::tcp::SessionHandler`]).
    pub session_id: Option<u64>,
}

/// A buffer checked out of a [`PacketPool`].
///
/// Invariant: `offset <= position <= end <= buffer.len()`. `offset` marks where the XDR payload
/// begins (after any transport framing has been stripped), `position` is the read/write cursor,
/// and `end` is one past the last valid byte.
pub struct RpcPacket {
    buffer: Vec<u8>,
    offset: usize,
    position: usize,
    end: usize,
    class: SizeClass,
    pool: Option<Arc<PacketPool>>,
    from_pool: bool,
    pub client: Option<ClientEndpoint>,
}

impl RpcPacket {
    /// Constructs a packet around a freshly allocated buffer, not backed by a pool. Used for
    /// client-role calls and tests.
    pub fn standalone(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity],
            offset: 0,
            position: 0,
            end: 0,
            class: SizeClass::Large,
            pool: None,
            from_pool: false,
            client: None,
        }
    }

    pub(crate) fn from_pool(buffer: Vec<u8>, class: SizeClass, pool: Arc<PacketPool>) -> Self {
        Self {
            buffer,
            offset: 0,
            position: 0,
            end: 0,
            class,
            pool: Some(pool),
            from_pool: true,
            client: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn size_class(&self) -> SizeClass {
        self.class
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        debug_assert!(offset <= self.buffer.len());
        self.offset = offset;
        self.position = self.position.max(offset);
        self.end = self.end.max(offset);
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        debug_assert!(self.offset <= position && position <= self.end);
        self.position = position;
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn set_end(&mut self, end: usize) {
        debug_assert!(end <= self.buffer.len());
        self.end = end;
    }

    /// The occupied region of the buffer, from `offset` to `end`.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.offset..self.end]
    }

    /// The whole backing buffer, for reading a transport record directly into.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn raw(&self) -> &[u8] {
        &self.buffer
    }

    /// Resets the packet to an empty state so the same buffer can be reused for a reply,
    /// supporting the UDP fast path where the request and reply packet are the same allocation.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.position = 0;
        self.end = 0;
    }

    /// Returns this packet to its pool, if it came from one. Idempotent: calling it twice, or on
    /// a standalone packet, is a no-op.
    pub fn release(&mut self) {
        if self.from_pool {
            if let Some(pool) = self.pool.clone() {
                let buffer = std::mem::take(&mut self.buffer);
                pool.release(buffer, self.class);
            }
            self.from_pool = false;
        }
    }
}

impl Drop for RpcPacket {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RpcPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcPacket")
            .field("capacity", &self.buffer.len())
            .field("offset", &self.offset)
            .field("position", &self.position)
            .field("end", &self.end)
            .field("class", &self.class)
            .field("from_pool", &self.from_pool)
            .field("client", &self.client)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PacketPool;

    #[test]
    fn standalone_roundtrip() {
        let mut pkt = RpcPacket::standalone(1024);
        pkt.set_end(100);
        pkt.set_position(10);
        assert_eq!(pkt.payload().len(), 100);
    }

    #[test]
    fn pooled_release_returns_buffer() {
        let pool = Arc::new(PacketPool::new(1, 1, 256, 4096));
        let mut pkt = pool.clone().allocate(256).unwrap();
        pkt.release();
        assert_eq!(pool.small_available(), 1);
    }

    #[test]
    fn drop_releases_automatically() {
        let pool = Arc::new(PacketPool::new(1, 1, 256, 4096));
        {
            let _pkt = pool.clone().allocate(256).unwrap();
            assert_eq!(pool.small_available(), 0);
        }
        assert_eq!(pool.small_available(), 1);
    }
}

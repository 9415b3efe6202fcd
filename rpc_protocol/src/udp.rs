// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! UDP front end.
//!
//! Unlike the TCP path, UDP calls are handled inline on the receiving thread rather than fanned
//! out to the worker pool: a single datagram always carries a complete call (there's no record
//! marking to reassemble), and NFS/MOUNT's UDP traffic is dominated by small idempotent requests
//! where the dispatch cost is dwarfed by the syscall round trip. Each datagram's packet is pulled
//! from the pool, the reply is written back into the *same* buffer (`recv`'s buffer doubles as
//! the `send`'s buffer), and the packet is released exactly once after the reply is sent.

use std::net::UdpSocket;
use std::sync::Arc;

use log::{debug, warn};

use crate::dispatch::RpcDispatcher;
use crate::pool::PacketPool;
use crate::Error;

pub struct UdpHandler {
    socket: UdpSocket,
    dispatcher: Arc<RpcDispatcher>,
    pool: Arc<PacketPool>,
}

impl UdpHandler {
    pub fn bind(addr: &str, dispatcher: Arc<RpcDispatcher>, pool: Arc<PacketPool>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Self { socket, dispatcher, pool })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Services datagrams until the socket errors. Blocks the calling thread.
    pub fn run_forever(&self) {
        loop {
            if let Err(e) = self.handle_one() {
                warn!("udp: {e}");
            }
        }
    }

    fn handle_one(&self) -> Result<(), Error> {
        let mut packet = self.pool.clone().allocate(self.pool.large_size())?;

        let (len, peer) = self.socket.recv_from(packet.raw_mut())?;
        debug!("udp: received {len} bytes from {peer}");

        let request = packet.raw()[..len].to_vec();
        let reply = match crate::decode_call(&request) {
            Ok(call) => self.dispatcher.dispatch(&call),
            Err(Error::Protocol(crate::ProtocolError::WrongRpcVersion)) => {
                let xid = if request.len() >= 4 {
                    u32::from_be_bytes(request[0..4].try_into().unwrap())
                } else {
                    0
                };
                crate::rpc_mismatch_reply(xid)
            }
            Err(e) => {
                debug!("udp: malformed call from {peer}: {e}");
                packet.release();
                return Ok(());
            }
        };

        if reply.len() <= packet.capacity() {
            packet.raw_mut()[..reply.len()].copy_from_slice(&reply);
            self.socket.send_to(&packet.raw()[..reply.len()], peer)?;
        } else {
            self.socket.send_to(&reply, peer)?;
        }

        packet.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DefaultAuthenticator;
    use crate::dispatch::null_procedure;
    use std::thread;

    #[test]
    fn null_call_round_trips_over_udp() {
        let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        dispatcher.register(1, 1, vec![Some(Arc::new(null_procedure))]);
        let pool = Arc::new(PacketPool::new(2, 2, 2048, 65536));

        let handler = UdpHandler::bind("127.0.0.1:0", Arc::new(dispatcher), pool).unwrap();
        let addr = handler.local_addr().unwrap();
        thread::spawn(move || handler.run_forever());

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let bytes = crate::encode_call_header(9, 1, 1, 0, crate::OpaqueAuth::none(), crate::OpaqueAuth::none());
        client.send_to(&bytes, addr).unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(len, 24);
    }
}

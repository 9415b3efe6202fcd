// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! TCP front end: an accept loop handing each connection to its own reader thread, which
//! reassembles record-marked messages and submits decoded calls to the worker pool for dispatch.
//! Replies are serialized through a per-connection write mutex so two workers finishing calls on
//! the same connection out of order don't interleave their writes.

use std::collections::HashMap;
use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};
use nix::sys::socket::{setsockopt, sockopt::TcpNoDelay};
use std::os::fd::AsFd;

use crate::dispatch::RpcDispatcher;
use crate::pool::PacketPool;
use crate::{record, warn_io};

struct Session {
    id: u64,
    writer: Mutex<TcpStream>,
}

impl Session {
    fn send(&self, message: &[u8]) {
        let mut writer = self.writer.lock().unwrap();
        if let Err(e) = record::write_message(&mut *writer, message) {
            warn_io(&format!("session {} write failed", self.id), &io_error(&e));
        }
    }
}

fn io_error(e: &crate::Error) -> std::io::Error {
    match e {
        crate::Error::Io(io) => std::io::Error::new(io.kind(), io.to_string()),
        other => std::io::Error::other(other.to_string()),
    }
}

/// Owns the listening socket and the registry of live sessions.
pub struct TcpSessionHandler {
    listener: TcpListener,
    dispatcher: Arc<RpcDispatcher>,
    workers: Arc<crate::worker::WorkerPool>,
    pool: Arc<PacketPool>,
    sessions: Arc<Mutex<HashMap<u64, Arc<Session>>>>,
    next_session_id: AtomicU64,
}

impl TcpSessionHandler {
    pub fn bind(
        addr: &str,
        dispatcher: Arc<RpcDispatcher>,
        workers: Arc<crate::worker::WorkerPool>,
        pool: Arc<PacketPool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            dispatcher,
            workers,
            pool,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_session_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Accepts connections until the listener errors (e.g. because it was closed from another
    /// thread on shutdown).
    pub fn run_forever(&self) {
        for incoming in self.listener.incoming() {
            match incoming {
                Ok(stream) => self.accept(stream),
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn accept(&self, stream: TcpStream) {
        if let Err(e) = setsockopt(&stream.as_fd(), TcpNoDelay, &true) {
            warn!("failed to set TCP_NODELAY: {e}");
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let peer = stream.peer_addr().ok();
        info!("session {id} accepted from {peer:?}");

        let writer_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                warn!("session {id}: failed to clone stream: {e}");
                return;
            }
        };

        let session = Arc::new(Session { id, writer: Mutex::new(writer_stream) });
        self.sessions.lock().unwrap().insert(id, session.clone());

        let dispatcher = self.dispatcher.clone();
        let workers = self.workers.clone();
        let pool = self.pool.clone();
        let sessions = self.sessions.clone();

        thread::Builder::new()
            .name(format!("tcp-reader-{id}"))
            .spawn(move || {
                read_loop(id, stream, dispatcher, workers, pool, session);
                sessions.lock().unwrap().remove(&id);
                info!("session {id} closed");
            })
            .expect("failed to spawn TCP reader thread");
    }
}

fn read_loop(
    id: u64,
    stream: TcpStream,
    dispatcher: Arc<RpcDispatcher>,
    workers: Arc<crate::worker::WorkerPool>,
    pool: Arc<PacketPool>,
    session: Arc<Session>,
) {
    let mut reader = BufReader::new(stream);
    loop {
        let message = match record::read_message(&mut reader) {
            Ok(m) => m,
            Err(crate::Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return,
            Err(e) => {
                debug!("session {id}: read failed: {e}");
                return;
            }
        };

        // Per §4.6/§4.4: every request is carried in a packet drawn from the shared pool, and
        // released back to it (via `RpcPacket::drop`) once dispatch for that request completes.
        let mut packet = match pool.clone().allocate(message.len().max(1)) {
            Ok(p) => p,
            Err(e) => {
                debug!("session {id}: pool allocation failed: {e}");
                return;
            }
        };
        packet.raw_mut()[..message.len()].copy_from_slice(&message);
        packet.set_end(message.len());

        let session = session.clone();
        let dispatcher = dispatcher.clone();
        workers.submit(move || {
            let packet = packet;
            match crate::decode_call(packet.payload()) {
                Ok(call) => {
                    let reply = dispatcher.dispatch(&call);
                    session.send(&reply);
                }
                Err(crate::Error::Protocol(crate::ProtocolError::WrongRpcVersion)) => {
                    let xid = peek_xid(packet.payload());
                    session.send(&crate::rpc_mismatch_reply(xid));
                }
                Err(e) => {
                    debug!("session {id}: malformed call: {e}");
                }
            }
            // `packet` drops here, releasing its buffer back to the pool. The reply bytes are a
            // freshly encoded `Vec`, not a second pooled buffer, so there's nothing else to
            // release — unlike the UDP path there's no reply-aliases-request fast path to undo.
        });
    }
}

/// Best-effort extraction of the xid from an otherwise-unparseable call, so a version-mismatch
/// reply can still echo the xid the client used (RFC 1831 requires this even on RPC_MISMATCH).
fn peek_xid(message: &[u8]) -> u32 {
    if message.len() >= 4 {
        u32::from_be_bytes(message[0..4].try_into().unwrap())
    } else {
        0
    }
}

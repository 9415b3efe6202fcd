// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Interfaces the oplock manager consumes to reach the SMB session layer, without depending on
//! it. The manager only needs to be able to (a) send a break request down a live session and (b)
//! hold onto whatever a caller handed it for a request it couldn't satisfy immediately.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use crate::details::OplockType;

/// A live SMB session capable of carrying an asynchronous oplock break to its client.
pub trait OplockSession: Send + Sync {
    fn session_id(&self) -> u64;

    /// Sends a break request for `path`, asking the client to downgrade to `break_to`. Returns
    /// an error only if the break couldn't be sent at all (e.g. the connection is already gone);
    /// a successfully sent break says nothing about whether the client will ever acknowledge it.
    fn send_break(&self, path: &Path, break_to: OplockType) -> Result<(), std::io::Error>;
}

/// Resolves a session id to a live [`OplockSession`], so the manager can reach a session it only
/// knows about via the owner records stored on an [`crate::details::OpLockDetails`].
pub trait SessionDirectory: Send + Sync {
    fn lookup(&self, session_id: u64) -> Option<Arc<dyn OplockSession>>;
}

/// A request that couldn't be granted immediately and is queued pending a break acknowledgement
/// or timeout. The packet is opaque to the oplock manager — it's whatever the SMB request
/// dispatcher needs to resume the operation (typically a pooled request buffer) — and is handed
/// back verbatim when the request is ready to be retried.
pub struct DeferredRequest {
    pub session: Arc<dyn OplockSession>,
    pub packet: Box<dyn Any + Send>,
}

impl DeferredRequest {
    pub fn new(session: Arc<dyn OplockSession>, packet: Box<dyn Any + Send>) -> Self {
        Self { session, packet }
    }
}

impl std::fmt::Debug for DeferredRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredRequest").field("session_id", &self.session.session_id()).finish()
    }
}

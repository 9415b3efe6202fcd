// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The state the manager tracks per path.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

use crate::owner::OplockOwner;
use crate::session::DeferredRequest;

/// The oplock's current caching level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OplockType {
    None,
    LevelII,
    Exclusive,
    Batch,
}

impl OplockType {
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive | Self::Batch)
    }
}

/// Requests queued behind a break that hasn't resolved yet. Bounded: a path with many
/// simultaneous conflicting opens beyond this capacity gets its overflow rejected immediately
/// rather than building an unbounded backlog behind one slow client.
pub const DEFERRED_QUEUE_CAPACITY: usize = 3;

/// The oplock state held for a single path.
pub struct OpLockDetails {
    pub oplock_type: OplockType,
    pub path: PathBuf,
    pub is_folder: bool,
    /// Exactly one entry for `Exclusive`/`Batch`; one or more for `LevelII`; empty for `None`.
    pub owners: Vec<OplockOwner>,
    pub deferred: VecDeque<DeferredRequest>,
    /// When the current break was initiated, if one is in progress.
    pub break_sent_at: Option<Instant>,
    /// Set once a break has timed out without an acknowledgement, so the next request at this
    /// path is refused with an access-denied error rather than retried against a client that has
    /// already shown it won't respond.
    pub failed_break: bool,
}

impl OpLockDetails {
    pub fn new(path: PathBuf, is_folder: bool) -> Self {
        Self {
            oplock_type: OplockType::None,
            path,
            is_folder,
            owners: Vec::new(),
            deferred: VecDeque::new(),
            break_sent_at: None,
            failed_break: false,
        }
    }

    pub fn is_breaking(&self) -> bool {
        self.break_sent_at.is_some()
    }

    pub fn push_deferred(&mut self, request: DeferredRequest) -> Result<(), crate::error::OplockError> {
        if self.deferred.len() >= DEFERRED_QUEUE_CAPACITY {
            return Err(crate::error::OplockError::DeferredQueueFull);
        }
        self.deferred.push_back(request);
        Ok(())
    }

    pub fn take_deferred(&mut self) -> VecDeque<DeferredRequest> {
        std::mem::take(&mut self.deferred)
    }

    /// True once the path is back to a clean, unheld, unbreaking state and can be dropped from
    /// the manager's map entirely.
    pub fn is_idle(&self) -> bool {
        self.oplock_type == OplockType::None && self.owners.is_empty() && self.deferred.is_empty() && !self.is_breaking()
    }
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The identity of a client holding or requesting an oplock.

use crate::details::OplockType;

/// Identifies one open handle: the SMB session it arrived on, the tree connect (share) it was
/// opened through, the authenticated user, and the client-side process that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OplockOwner {
    pub session_id: u64,
    pub tree_id: u32,
    pub user_id: u32,
    pub process_id: u64,
}

impl OplockOwner {
    pub fn new(session_id: u64, tree_id: u32, user_id: u32, process_id: u64) -> Self {
        Self { session_id, tree_id, user_id, process_id }
    }

    /// Whether `self` and `other` should be treated as "the same owner" for the purposes of a
    /// given oplock type.
    ///
    /// An exclusive or batch oplock has exactly one owner, so a request from the identical
    /// handle (same session/tree/user/process) is a re-request rather than a conflict, and
    /// compares every field. A Level II oplock is shared across any number of readers keyed by
    /// (session, tree, process) — the same process reopening the same share on the same session
    /// is the same reader, regardless of which user id it authenticated as.
    pub fn same_owner(&self, other: &Self, oplock_type: OplockType) -> bool {
        match oplock_type {
            OplockType::Exclusive | OplockType::Batch => self == other,
            OplockType::LevelII => {
                self.session_id == other.session_id
                    && self.tree_id == other.tree_id
                    && self.process_id == other.process_id
            }
            OplockType::None => false,
        }
    }
}

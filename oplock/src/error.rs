// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OplockError {
    /// No oplock is held at this path.
    NotHeld,
    /// The caller isn't an owner of the oplock held at this path.
    NotOwner,
    /// A deferred request couldn't be queued because the path's deferred queue is already at
    /// capacity.
    DeferredQueueFull,
    /// An acknowledgement named a level that doesn't follow from the break in progress.
    InvalidBreakAck,
    /// The oplock at this path isn't currently breaking.
    NoBreakInProgress,
}

impl fmt::Display for OplockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::NotHeld => "no oplock held at this path",
                Self::NotOwner => "caller does not own this oplock",
                Self::DeferredQueueFull => "deferred request queue is full",
                Self::InvalidBreakAck => "break acknowledgement does not match the pending break",
                Self::NoBreakInProgress => "no break is in progress at this path",
            }
        )
    }
}

impl std::error::Error for OplockError {}

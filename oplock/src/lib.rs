// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Opportunistic lock coordination for the SMB side of the file server.
//!
//! This crate owns oplock state and the grant/break/acknowledge/timeout state machine; it knows
//! nothing about SMB wire messages or session transport. Callers reach it through
//! [`session::OplockSession`]/[`session::SessionDirectory`] and get back
//! [`manager::GrantOutcome`]/[`session::DeferredRequest`] values to act on.

pub mod details;
pub mod error;
pub mod manager;
pub mod owner;
pub mod session;

pub use details::{OpLockDetails, OplockType, DEFERRED_QUEUE_CAPACITY};
pub use error::OplockError;
pub use manager::{GrantOutcome, OpLockManager};
pub use owner::OplockOwner;
pub use session::{DeferredRequest, OplockSession, SessionDirectory};

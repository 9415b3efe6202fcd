// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Wire types and procedure tables for the MOUNT and NFS programs, built on top of
//! `rpc_protocol`'s dispatch layer.
//!
//! Deep NFS filesystem semantics (full v3 procedure coverage, file handle resolution against a
//! real filesystem) are out of scope here; this crate wires up enough of MOUNT and NFS to prove
//! the transport and dispatch layers against a real client, the same way the teacher's `nfs3`
//! crate did for its own codegen'd XDR types.

pub mod mount;
pub mod nfs3_proto;

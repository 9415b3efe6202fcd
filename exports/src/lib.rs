// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Export tables: which paths are shared, and which clients may reach them.
//!
//! This crate only answers "is this client allowed, and with what options" — it has no opinion
//! on filesystem layout, file handles, or NFS procedure semantics, all of which are consumed
//! through the RPC dispatch layer in `rpc_protocol` and the procedure implementations built on
//! top of it.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use cidr::Ipv4Cidr;
use log::debug;
use serde::{Deserialize, Serialize};

/// An NFS export: a path on this server, and the clients permitted to mount it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    pub path: PathBuf,
    pub clients: Vec<ExportClient>,
}

/// A client or group of clients permitted to access an export, together with the options applied
/// to that access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportClient {
    pub client: ClientId,
    pub options: ExportOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientId {
    Name(String),
    Addr(IpAddr),
    Netgroup(String),
    Network(Ipv4Cidr),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Whether to deny write access to the export.
    pub read_only: bool,
    /// If true, map the root user to the anonymous user.
    pub root_squash: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { read_only: true, root_squash: true }
    }
}

/// What a client asked about an export resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Denied,
    Allowed(AccessOptions),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOptions {
    pub read_only: bool,
    pub root_squash: bool,
}

impl Export {
    /// Resolves what access `client_addr` (and, if known, reverse-resolved `client_name`) has to
    /// this export. The first matching [`ExportClient`] entry wins, matching the usual
    /// first-match-wins semantics of an exports table.
    pub fn access_for(&self, client_addr: IpAddr, client_name: Option<&str>) -> AccessDecision {
        for entry in &self.clients {
            if entry.client.matches(client_addr, client_name) {
                debug!("{:?}: client {client_addr} matched {:?}", self.path, entry.client);
                return AccessDecision::Allowed(AccessOptions {
                    read_only: entry.options.read_only,
                    root_squash: entry.options.root_squash,
                });
            }
        }
        AccessDecision::Denied
    }

    pub fn contains_path(&self, candidate: &Path) -> bool {
        candidate.starts_with(&self.path)
    }
}

impl ClientId {
    pub fn matches(&self, addr: IpAddr, name: Option<&str>) -> bool {
        match self {
            Self::Addr(a) => *a == addr,
            Self::Network(net) => match addr {
                IpAddr::V4(v4) => net.contains(&v4),
                IpAddr::V6(_) => false,
            },
            Self::Name(expected) => name.is_some_and(|n| n.eq_ignore_ascii_case(expected)),
            // Netgroup resolution (NIS/LDAP) is an external directory lookup this crate doesn't
            // perform; exports naming a netgroup never match until that's wired in by the caller.
            Self::Netgroup(_) => false,
        }
    }
}

/// An export table: the set of exports this server advertises, consulted by the MOUNT and NFS
/// procedure implementations and by `showmount`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportTable {
    pub exports: Vec<Export>,
}

impl ExportTable {
    pub fn find(&self, path: &Path) -> Option<&Export> {
        self.exports.iter().find(|e| e.path == path)
    }

    pub fn access_for(&self, path: &Path, client_addr: IpAddr, client_name: Option<&str>) -> AccessDecision {
        match self.find(path) {
            Some(export) => export.access_for(client_addr, client_name),
            None => AccessDecision::Denied,
        }
    }
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Wire types and an in-memory service table for a standalone portmapper server (the `rpcbindd`
//! binary). This is separate from [`crate::portmap::PortmapperClient`], which is the client side
//! any program uses to register itself; this module is the server side that answers those
//! registrations and answers `DUMP` queries such as `rpcinfo -p`.
//!
//! Entries use the version-2 `mapping` shape (`program, version, protocol, port`), the same one
//! [`crate::portmap::PortMapping`] encodes for `SET`/`UNSET`/`GETPORT` — this implementation does
//! not speak the richer rpcbind v3/v4 universal-address format.

use std::sync::Mutex;

use crate::portmap::PortMapping;
use crate::Error;

/// The live set of registrations. Lookups are a linear scan, matching the scale of a single
/// host's portmapper table.
pub struct RpcbindTable {
    entries: Mutex<Vec<PortMapping>>,
}

impl Default for RpcbindTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcbindTable {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    /// Replaces any existing entry for `(program, version, protocol)`.
    pub fn set(&self, mapping: PortMapping) -> bool {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| !(e.program == mapping.program && e.version == mapping.version && e.protocol == mapping.protocol));
        entries.push(mapping);
        true
    }

    /// Removes every entry for `program` (optionally narrowed to `version`; `version == 0` means
    /// "all versions", matching UNSET semantics).
    pub fn unset(&self, program: u32, version: u32) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !(e.program == program && (version == 0 || e.version == version)));
        entries.len() != before
    }

    pub fn getport(&self, program: u32, version: u32, protocol: u32) -> u32 {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.program == program && e.version == version && e.protocol == protocol)
            .map(|e| e.port)
            .unwrap_or(0)
    }

    pub fn dump(&self) -> Vec<PortMapping> {
        self.entries.lock().unwrap().clone()
    }
}

fn decode_mapping(src: &mut &[u8]) -> Result<PortMapping, Error> {
    Ok(PortMapping {
        program: crate::codec::read_u32(src)?,
        version: crate::codec::read_u32(src)?,
        protocol: crate::codec::read_u32(src)?,
        port: crate::codec::read_u32(src)?,
    })
}

/// Decodes a `SET`/`UNSET`/`GETPORT` argument body into the `mapping` it carries.
pub fn decode_mapping_arg(arg: &[u8]) -> Result<PortMapping, Error> {
    let mut rest = arg;
    decode_mapping(&mut rest)
}

fn encode_mapping(buf: &mut Vec<u8>, mapping: &PortMapping) {
    crate::codec::write_u32(buf, mapping.program).unwrap();
    crate::codec::write_u32(buf, mapping.version).unwrap();
    crate::codec::write_u32(buf, mapping.protocol).unwrap();
    crate::codec::write_u32(buf, mapping.port).unwrap();
}

/// Encodes the `pmaplist` linked-list reply for `DUMP`: each entry is preceded by a `1` (more
/// follow) and the list is terminated by a `0`.
pub fn encode_dump_reply(entries: &[PortMapping]) -> Vec<u8> {
    let mut buf = Vec::new();
    for entry in entries {
        crate::codec::write_u32(&mut buf, 1).unwrap();
        encode_mapping(&mut buf, entry);
    }
    crate::codec::write_u32(&mut buf, 0).unwrap();
    buf
}

/// Decodes a `DUMP` reply produced by [`encode_dump_reply`], used by `rpcinfo`.
pub fn decode_dump_reply(mut src: &[u8]) -> Result<Vec<PortMapping>, Error> {
    let mut out = Vec::new();
    loop {
        let more = crate::codec::read_u32(&mut src)?;
        if more == 0 {
            return Ok(out);
        }
        out.push(decode_mapping(&mut src)?);
    }
}

pub fn default_service_list(nfs_port: u32, mount_port: u32) -> Vec<PortMapping> {
    use crate::portmap::{IPPROTO_TCP, PROG_MOUNT, PROG_NFS};
    vec![
        PortMapping { program: PROG_NFS, version: 3, protocol: IPPROTO_TCP, port: nfs_port },
        PortMapping { program: PROG_MOUNT, version: 3, protocol: IPPROTO_TCP, port: mount_port },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portmap::{IPPROTO_TCP, PROG_NFS};

    #[test]
    fn set_then_dump_round_trips() {
        let table = RpcbindTable::new();
        let mapping = PortMapping { program: PROG_NFS, version: 3, protocol: IPPROTO_TCP, port: 2049 };
        assert!(table.set(mapping));
        assert_eq!(table.dump(), vec![mapping]);
    }

    #[test]
    fn unset_removes_matching_entries() {
        let table = RpcbindTable::new();
        table.set(PortMapping { program: 100003, version: 3, protocol: IPPROTO_TCP, port: 2049 });
        assert!(table.unset(100003, 0));
        assert!(table.dump().is_empty());
    }

    #[test]
    fn getport_returns_zero_when_unregistered() {
        let table = RpcbindTable::new();
        assert_eq!(table.getport(100003, 3, IPPROTO_TCP), 0);
    }

    #[test]
    fn dump_reply_round_trips_through_wire() {
        let entries = default_service_list(2049, 20048);
        let encoded = encode_dump_reply(&entries);
        let decoded = decode_dump_reply(&encoded).unwrap();
        assert_eq!(decoded, entries);
    }
}

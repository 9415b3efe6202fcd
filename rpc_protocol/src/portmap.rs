// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Portmapper (rpcbind, program 100000 version 2) client used to register and deregister this
//! server's services with the local portmapper at process start/stop.

use std::net::TcpStream;
use std::sync::OnceLock;
use std::sync::Mutex;

use log::{info, warn};

use crate::codec::Cursor;
use crate::{client, Error};

pub const PMAP_PROG: u32 = 100000;
pub const PMAP_VERS: u32 = 2;

pub const PMAP_PROC_NULL: u32 = 0;
pub const PMAP_PROC_SET: u32 = 1;
pub const PMAP_PROC_UNSET: u32 = 2;
pub const PMAP_PROC_GETPORT: u32 = 3;
pub const PMAP_PROC_DUMP: u32 = 4;

/// Well-known program numbers this suite registers.
pub const PROG_PORTMAP: u32 = 100000;
pub const PROG_MOUNT: u32 = 100005;
pub const PROG_NFS: u32 = 100003;

pub const IPPROTO_TCP: u32 = 6;
pub const IPPROTO_UDP: u32 = 17;

/// A single `(program, version, protocol, port)` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub program: u32,
    pub version: u32,
    pub protocol: u32,
    pub port: u32,
}

impl PortMapping {
    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 16];
        let mut cursor = Cursor::new(&mut buf);
        cursor.write_u32(self.program).unwrap();
        cursor.write_u32(self.version).unwrap();
        cursor.write_u32(self.protocol).unwrap();
        cursor.write_u32(self.port).unwrap();
        buf
    }
}

/// Process-wide lock serializing portmapper registration calls, since the local portmapper
/// itself is a singleton resource that several server components (NFS, MOUNT) register against
/// independently during startup.
static REGISTER_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn register_lock() -> &'static Mutex<()> {
    REGISTER_LOCK.get_or_init(|| Mutex::new(()))
}

/// A client for the local portmapper. Registration is a no-op when `port` is negative, so a
/// server can be run standalone (e.g. in tests) without a portmapper present.
pub struct PortmapperClient {
    address: String,
    enabled: bool,
}

impl PortmapperClient {
    /// `portmapper_port == -1` disables all registration; this is also useful when the caller
    /// wants to point at a non-default portmapper endpoint for testing.
    pub fn new(portmapper_host: &str, portmapper_port: i32) -> Self {
        if portmapper_port < 0 {
            return Self { address: String::new(), enabled: false };
        }
        Self { address: format!("{portmapper_host}:{portmapper_port}"), enabled: true }
    }

    pub fn localhost() -> Self {
        Self::new("127.0.0.1", 111)
    }

    fn call(&self, procedure: u32, arg: &[u8]) -> Result<Vec<u8>, Error> {
        let mut stream = TcpStream::connect(&self.address)?;
        client::do_rpc_call(&mut stream, PMAP_PROG, PMAP_VERS, procedure, arg)
    }

    /// Registers `mapping` with the local portmapper. Returns `Ok(false)` (not an error) if the
    /// portmapper reports the registration failed, e.g. because the mapping already exists.
    pub fn set(&self, mapping: PortMapping) -> Result<bool, Error> {
        if !self.enabled {
            return Ok(true);
        }
        let _guard = register_lock().lock().unwrap();
        let reply = self.call(PMAP_PROC_SET, &mapping.encode())?;
        let accepted = decode_bool_reply(&reply)?;
        info!(
            "portmap SET program={} version={} protocol={} port={} -> {accepted}",
            mapping.program, mapping.version, mapping.protocol, mapping.port
        );
        Ok(accepted)
    }

    /// Deregisters `mapping`. `version`/`protocol`/`port` are ignored by a conforming portmapper
    /// for UNSET (only `program` matters) but are accepted here for symmetry with [`Self::set`].
    pub fn unset(&self, mapping: PortMapping) -> Result<bool, Error> {
        if !self.enabled {
            return Ok(true);
        }
        let _guard = register_lock().lock().unwrap();
        match self.call(PMAP_PROC_UNSET, &mapping.encode()) {
            Ok(reply) => {
                let accepted = decode_bool_reply(&reply)?;
                info!("portmap UNSET program={} -> {accepted}", mapping.program);
                Ok(accepted)
            }
            Err(e) => {
                warn!("portmap UNSET program={} failed: {e}", mapping.program);
                Err(e)
            }
        }
    }

    /// Looks up the port a `(program, version, protocol)` triple is registered on. Returns 0 if
    /// nothing is registered.
    pub fn getport(&self, program: u32, version: u32, protocol: u32) -> Result<u32, Error> {
        let mapping = PortMapping { program, version, protocol, port: 0 };
        let reply = self.call(PMAP_PROC_GETPORT, &mapping.encode())?;
        let mut buf = reply;
        let mut cursor = Cursor::new(&mut buf);
        cursor.read_u32()
    }
}

fn decode_bool_reply(reply: &[u8]) -> Result<bool, Error> {
    let mut buf = reply.to_vec();
    let mut cursor = Cursor::new(&mut buf);
    Ok(cursor.read_u32()? != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_client_is_a_no_op() {
        let client = PortmapperClient::new("127.0.0.1", -1);
        let mapping = PortMapping { program: PROG_NFS, version: 3, protocol: IPPROTO_TCP, port: 2049 };
        assert!(client.set(mapping).unwrap());
        assert!(client.unset(mapping).unwrap());
    }

    #[test]
    fn mapping_encodes_as_four_words() {
        let mapping = PortMapping { program: PROG_NFS, version: 3, protocol: IPPROTO_TCP, port: 2049 };
        assert_eq!(mapping.encode().len(), 16);
    }
}

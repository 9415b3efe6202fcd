// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The MOUNT protocol (program 100005, version 3): NULL, MNT, DUMP, UMNT, UMNTALL, EXPORT.
//!
//! File handles here are just the export-relative path bytes. Resolving a handle back into an
//! open file descriptor, and enforcing the oplock/export ACL machinery against it, is NFS
//! procedure territory and happens in [`crate::nfs3_proto`], not here.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{info, warn};

use exports::ExportTable;
use rpc_protocol::auth::ClientInfo;
use rpc_protocol::codec::{read_opaque_var, read_u32, write_opaque_var, write_u32};
use rpc_protocol::dispatch::ProcResult;
use rpc_protocol::Call;

pub const MOUNT_PROGRAM: u32 = 100_005;
pub const MOUNT_V3: u32 = 3;

pub const MOUNTPROC3_NULL: u32 = 0;
pub const MOUNTPROC3_MNT: u32 = 1;
pub const MOUNTPROC3_DUMP: u32 = 2;
pub const MOUNTPROC3_UMNT: u32 = 3;
pub const MOUNTPROC3_UMNTALL: u32 = 4;
pub const MOUNTPROC3_EXPORT: u32 = 5;

const MAX_PATH_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStat3 {
    Ok,
    ErrPerm,
    ErrNoEnt,
    ErrIo,
    ErrAcces,
    ErrNotDir,
    ErrInval,
    ErrNameTooLong,
    ErrNotSupp,
    ErrServerFault,
}

impl MountStat3 {
    fn to_u32(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::ErrPerm => 1,
            Self::ErrNoEnt => 2,
            Self::ErrIo => 5,
            Self::ErrAcces => 13,
            Self::ErrNotDir => 20,
            Self::ErrInval => 22,
            Self::ErrNameTooLong => 63,
            Self::ErrNotSupp => 10_004,
            Self::ErrServerFault => 10_006,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MountEntry {
    pub host_name: String,
    pub directory: String,
}

/// The state `mountd` carries: the export table it advertises and the mount list it reports
/// through DUMP/clears through UMNT/UMNTALL.
pub struct MountState {
    pub exports: ExportTable,
    mounts: Mutex<Vec<MountEntry>>,
}

impl MountState {
    pub fn new(exports: ExportTable) -> Self {
        Self { exports, mounts: Mutex::new(Vec::new()) }
    }

    fn record_mount(&self, host_name: &str, directory: &str) {
        let mut mounts = self.mounts.lock().unwrap();
        if !mounts.iter().any(|e| e.host_name == host_name && e.directory == directory) {
            mounts.push(MountEntry { host_name: host_name.to_string(), directory: directory.to_string() });
        }
    }
}

fn encode_mount_result(status: MountStat3, handle: Option<&[u8]>, auth_flavors: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    write_u32(&mut out, status.to_u32()).unwrap();
    if let Some(handle) = handle {
        write_opaque_var(&mut out, handle).unwrap();
        write_u32(&mut out, auth_flavors.len() as u32).unwrap();
        for flavor in auth_flavors {
            write_u32(&mut out, *flavor).unwrap();
        }
    }
    out
}

fn encode_mount_list(entries: &[MountEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        write_u32(&mut out, 1).unwrap(); // value-follows
        write_opaque_var(&mut out, entry.host_name.as_bytes()).unwrap();
        write_opaque_var(&mut out, entry.directory.as_bytes()).unwrap();
    }
    write_u32(&mut out, 0).unwrap(); // end of list
    out
}

fn encode_export_list(table: &ExportTable) -> Vec<u8> {
    let mut out = Vec::new();
    for export in &table.exports {
        write_u32(&mut out, 1).unwrap();
        let dir = export.path.to_string_lossy();
        write_opaque_var(&mut out, dir.as_bytes()).unwrap();
        for client in &export.clients {
            write_u32(&mut out, 1).unwrap();
            write_opaque_var(&mut out, client_label(client).as_bytes()).unwrap();
        }
        write_u32(&mut out, 0).unwrap();
    }
    write_u32(&mut out, 0).unwrap();
    out
}

fn client_label(client: &exports::ExportClient) -> String {
    match &client.client {
        exports::ClientId::Name(n) => n.clone(),
        exports::ClientId::Addr(a) => a.to_string(),
        exports::ClientId::Network(n) => n.to_string(),
        exports::ClientId::Netgroup(g) => g.clone(),
    }
}

fn decode_dirpath(mut arg: &[u8]) -> Result<String, ()> {
    let raw = read_opaque_var(&mut arg, MAX_PATH_LEN).map_err(|_| ())?;
    String::from_utf8(raw).map_err(|_| ())
}

pub fn null(_call: &Call, _client: &ClientInfo, _state: &MountState) -> ProcResult {
    ProcResult::Success(Vec::new())
}

pub fn mnt(call: &Call, _client: &ClientInfo, state: &MountState) -> ProcResult {
    let Ok(dirpath) = decode_dirpath(call.arg) else {
        return ProcResult::GarbageArgs;
    };

    match state.exports.find(Path::new(&dirpath)) {
        Some(_) => {
            state.record_mount("unknown", &dirpath);
            info!("mount granted for {dirpath:?}");
            ProcResult::Success(encode_mount_result(MountStat3::Ok, Some(dirpath.as_bytes()), &[1]))
        }
        None => {
            warn!("mount denied, no such export {dirpath:?}");
            ProcResult::Success(encode_mount_result(MountStat3::ErrAcces, None, &[]))
        }
    }
}

pub fn dump(_call: &Call, _client: &ClientInfo, state: &MountState) -> ProcResult {
    let mounts = state.mounts.lock().unwrap();
    ProcResult::Success(encode_mount_list(&mounts))
}

pub fn umnt(call: &Call, _client: &ClientInfo, state: &MountState) -> ProcResult {
    let Ok(dirpath) = decode_dirpath(call.arg) else {
        return ProcResult::GarbageArgs;
    };
    state.mounts.lock().unwrap().retain(|e| e.directory != dirpath);
    ProcResult::Success(Vec::new())
}

pub fn umntall(_call: &Call, _client: &ClientInfo, state: &MountState) -> ProcResult {
    state.mounts.lock().unwrap().clear();
    ProcResult::Success(Vec::new())
}

pub fn export(_call: &Call, _client: &ClientInfo, state: &MountState) -> ProcResult {
    ProcResult::Success(encode_export_list(&state.exports))
}

/// Decodes an EXPORT reply on the client side into `(directory, group labels)` pairs.
pub fn decode_export_list(mut src: &[u8]) -> Result<Vec<(String, Vec<String>)>, rpc_protocol::Error> {
    let mut out = Vec::new();
    while read_u32(&mut src)? == 1 {
        let dir = String::from_utf8(read_opaque_var(&mut src, MAX_PATH_LEN)?)
            .map_err(|_| rpc_protocol::Error::Protocol(rpc_protocol::ProtocolError::MalformedMessage))?;
        let mut groups = Vec::new();
        while read_u32(&mut src)? == 1 {
            let g = String::from_utf8(read_opaque_var(&mut src, MAX_PATH_LEN)?)
                .map_err(|_| rpc_protocol::Error::Protocol(rpc_protocol::ProtocolError::MalformedMessage))?;
            groups.push(g);
        }
        out.push((dir, groups));
    }
    Ok(out)
}

pub fn default_export_table(path: impl Into<PathBuf>) -> ExportTable {
    ExportTable {
        exports: vec![exports::Export {
            path: path.into(),
            clients: vec![exports::ExportClient {
                client: exports::ClientId::Name("localhost".into()),
                options: exports::ExportOptions::default(),
            }],
        }],
    }
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The NFS program (100003, version 3): NULL and GETATTR only.
//!
//! A file handle here is the export-relative path, exactly as handed out by
//! [`crate::mount::mnt`]. Resolving it against the real filesystem and consulting the oplock
//! manager before returning attributes is deliberately out of scope for this module — GETATTR
//! here reports whatever `std::fs::metadata` says, with no handle-to-fd cache and no locking.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::UNIX_EPOCH;

use log::warn;

use rpc_protocol::auth::ClientInfo;
use rpc_protocol::codec::{read_opaque_var, write_opaque_var, write_u32};
use rpc_protocol::dispatch::ProcResult;
use rpc_protocol::Call;

pub const NFS_PROGRAM: u32 = 100_003;
pub const NFS_V3: u32 = 3;

pub const NFSPROC3_NULL: u32 = 0;
pub const NFSPROC3_GETATTR: u32 = 1;

const MAX_HANDLE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nfsstat3 {
    Ok,
    ErrPerm,
    ErrNoEnt,
    ErrIo,
    ErrAcces,
    ErrServerFault,
}

impl Nfsstat3 {
    fn to_u32(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::ErrPerm => 1,
            Self::ErrNoEnt => 2,
            Self::ErrIo => 5,
            Self::ErrAcces => 13,
            Self::ErrServerFault => 10_006,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileAttributes {
    pub file_type: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub used: u64,
    pub fsid: u64,
    pub fileid: u64,
    pub mtime_secs: u32,
}

impl FileAttributes {
    fn from_metadata(meta: &fs::Metadata) -> Self {
        let file_type = if meta.is_dir() { 2 } else { 1 };
        let mtime_secs = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        Self {
            file_type,
            mode: meta.mode(),
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            used: meta.blocks() * 512,
            fsid: meta.dev(),
            fileid: meta.ino(),
            mtime_secs,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.file_type).unwrap();
        write_u32(out, self.mode).unwrap();
        write_u32(out, self.nlink).unwrap();
        write_u32(out, self.uid).unwrap();
        write_u32(out, self.gid).unwrap();
        write_u32(out, (self.size >> 32) as u32).unwrap();
        write_u32(out, self.size as u32).unwrap();
        write_u32(out, (self.used >> 32) as u32).unwrap();
        write_u32(out, self.used as u32).unwrap();
        write_u32(out, (self.fsid >> 32) as u32).unwrap();
        write_u32(out, self.fsid as u32).unwrap();
        write_u32(out, (self.fileid >> 32) as u32).unwrap();
        write_u32(out, self.fileid as u32).unwrap();
        write_u32(out, self.mtime_secs).unwrap();
    }
}

fn encode_getattr_reply(status: Nfsstat3, attrs: Option<&FileAttributes>) -> Vec<u8> {
    let mut out = Vec::new();
    write_u32(&mut out, status.to_u32()).unwrap();
    if let Some(attrs) = attrs {
        attrs.encode(&mut out);
    }
    out
}

fn decode_handle(mut arg: &[u8]) -> Result<Vec<u8>, ()> {
    read_opaque_var(&mut arg, MAX_HANDLE_LEN).map_err(|_| ())
}

/// Encodes a GETATTR argument (a file handle) for client-side use, mirroring
/// [`decode_handle`]'s wire format.
pub fn encode_getattr_args(handle: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_opaque_var(&mut out, handle).unwrap();
    out
}

/// State shared by NFS procedure handlers: the export root each file handle (an export-relative
/// path) is resolved against.
pub struct Nfs3State {
    pub export_root: std::path::PathBuf,
}

pub fn null(_call: &Call, _client: &ClientInfo, _state: &Nfs3State) -> ProcResult {
    ProcResult::Success(Vec::new())
}

pub fn getattr(call: &Call, _client: &ClientInfo, state: &Nfs3State) -> ProcResult {
    let Ok(handle) = decode_handle(call.arg) else {
        return ProcResult::GarbageArgs;
    };
    let Ok(relative) = std::str::from_utf8(&handle) else {
        return ProcResult::GarbageArgs;
    };

    let resolved = state.export_root.join(relative.trim_start_matches('/'));
    match fs::metadata(&resolved) {
        Ok(meta) => ProcResult::Success(encode_getattr_reply(Nfsstat3::Ok, Some(&FileAttributes::from_metadata(&meta)))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ProcResult::Success(encode_getattr_reply(Nfsstat3::ErrNoEnt, None))
        }
        Err(e) => {
            warn!("getattr({resolved:?}) failed: {e}");
            ProcResult::Success(encode_getattr_reply(Nfsstat3::ErrIo, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_protocol::codec::read_u32;
    use rpc_protocol::{decode_call, encode_call_header, OpaqueAuth};

    fn call_with_handle(handle: &str) -> Vec<u8> {
        let mut bytes =
            encode_call_header(7, NFS_PROGRAM, NFS_V3, NFSPROC3_GETATTR, OpaqueAuth::none(), OpaqueAuth::none());
        bytes.extend(encode_getattr_args(handle.as_bytes()));
        bytes
    }

    #[test]
    fn getattr_on_root_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let state = Nfs3State { export_root: dir.path().to_path_buf() };

        let bytes = call_with_handle("/");
        let call = decode_call(&bytes).unwrap();
        let ProcResult::Success(reply) = getattr(&call, &ClientInfo::Anonymous, &state) else {
            panic!("expected success")
        };
        let mut rest: &[u8] = &reply;
        assert_eq!(read_u32(&mut rest).unwrap(), Nfsstat3::Ok.to_u32());
    }

    #[test]
    fn getattr_missing_path_reports_noent() {
        let dir = tempfile::tempdir().unwrap();
        let state = Nfs3State { export_root: dir.path().to_path_buf() };

        let bytes = call_with_handle("/nope/nope");
        let call = decode_call(&bytes).unwrap();
        let ProcResult::Success(reply) = getattr(&call, &ClientInfo::Anonymous, &state) else {
            panic!("expected success")
        };
        let mut rest: &[u8] = &reply;
        assert_eq!(read_u32(&mut rest).unwrap(), Nfsstat3::ErrNoEnt.to_u32());
    }
}

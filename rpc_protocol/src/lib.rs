// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! ONC/RPC (RFC 1831) transport and dispatch core: wire codec, pooled packets, a worker thread
//! pool, TCP/UDP front ends, the program/version dispatcher, the portmapper client, and a
//! pluggable authenticator.

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod packet;
pub mod pool;
pub mod portmap;
pub mod record;
pub mod rpcbind_wire;
pub mod tcp;
pub mod udp;
pub mod worker;

use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, warn};

pub use auth::{AuthError, Authenticator, ClientInfo};
pub use packet::{ClientEndpoint, RpcPacket, Transport};
pub use pool::PacketPool;

/// Only supported version of the RPC protocol.
pub const RPC_VERSION: u32 = 2;

/// The possible errors that can arise from trying to read, write, or dispatch an RPC message.
#[derive(Debug)]
pub enum Error {
    /// Protocol errors are returned by the transport/dispatch core itself, before procedure code
    /// is ever invoked.
    Protocol(ProtocolError),

    /// A reply that the server wants to send back verbatim (reject replies, auth errors, and the
    /// like).
    Rpc(ReplyBody),

    /// Authentication was refused by the configured [`Authenticator`].
    Auth(AuthError),

    /// Pool exhaustion: the caller asked for a packet larger than the large size class, or a
    /// bounded class was at its maximum and the caller chose not to block.
    NoPooledMemory,

    /// I/O failures from the underlying socket.
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Rpc(e) => write!(f, "RPC error: {e:?}"),
            Self::Auth(e) => write!(f, "authentication error: {e:?}"),
            Self::NoPooledMemory => write!(f, "no pooled memory available"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[derive(Debug)]
pub enum ProtocolError {
    /// Generic decoding error.
    MalformedMessage,
    /// A read ran past the end of the available bytes.
    TruncatedMessage,
    /// Message's RPC Version was not 2, the only version this implementation supports.
    WrongRpcVersion,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::MalformedMessage => "malformed message",
                Self::TruncatedMessage => "truncated message",
                Self::WrongRpcVersion => "only RPC protocol version 2 is supported",
            }
        )
    }
}

/// Credential/verifier flavor, per RFC 1831 §8.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlavor {
    None,
    Sys,
    Short,
    Dh,
    RpcSecGss,
    Other(u32),
}

impl AuthFlavor {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Sys,
            2 => Self::Short,
            3 => Self::Dh,
            6 => Self::RpcSecGss,
            other => Self::Other(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Sys => 1,
            Self::Short => 2,
            Self::Dh => 3,
            Self::RpcSecGss => 6,
            Self::Other(v) => v,
        }
    }
}

/// Opaque credential or verifier: a flavor tag plus an opaque byte blob.
///
/// Equality is flavor-and-byte equality, per §3 of the data model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueAuth {
    pub flavor: AuthFlavor,
    pub body: Vec<u8>,
}

const MAX_AUTH_SIZE: usize = 400;

impl OpaqueAuth {
    pub fn none() -> Self {
        Self { flavor: AuthFlavor::None, body: Vec::new() }
    }

    fn decode<R: Read>(src: &mut R) -> Result<Self, Error> {
        let flavor = AuthFlavor::from_u32(codec::read_u32(src)?);
        let body = codec::read_opaque_var(src, MAX_AUTH_SIZE)?;
        Ok(Self { flavor, body })
    }

    fn encode<W: Write>(&self, dst: &mut W) -> Result<(), Error> {
        codec::write_u32(dst, self.flavor.to_u32())?;
        codec::write_opaque_var(dst, &self.body)
    }
}

/// Authentication status codes used in `AUTH_ERROR` reject replies (RFC 1831 §8.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStat {
    Ok = 0,
    BadCred = 1,
    RejectedCred = 2,
    BadVerf = 3,
    RejectedVerf = 4,
    TooWeak = 5,
    InvalidResp = 6,
    Failed = 7,
}

/// The call half of an RPC message (RFC 1831 §8).
#[derive(Debug, Clone)]
pub struct CallBody {
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: OpaqueAuth,
    pub verf: OpaqueAuth,
}

/// `PROG_MISMATCH` carries the range of versions the server does support.
#[derive(Debug, Clone, Copy)]
pub struct ProgMismatchBody {
    pub low: u32,
    pub high: u32,
}

/// Body of an `ACCEPTED` reply (RFC 1831 §8.1).
#[derive(Debug)]
pub enum AcceptedReplyBody {
    Success(Vec<u8>),
    ProgUnavail,
    ProgMismatch(ProgMismatchBody),
    ProcUnavail,
    GarbageArgs,
    SystemErr,
}

#[derive(Debug)]
pub struct AcceptedReply {
    pub verf: OpaqueAuth,
    pub reply_data: AcceptedReplyBody,
}

/// `RPC_MISMATCH` carries the range of RPC protocol versions the server supports.
#[derive(Debug, Clone, Copy)]
pub struct MismatchInfo {
    pub low: u32,
    pub high: u32,
}

#[derive(Debug)]
pub enum RejectedReply {
    RpcMismatch(MismatchInfo),
    AuthError(AuthStat),
}

#[derive(Debug)]
pub enum ReplyBody {
    Accepted(AcceptedReply),
    Denied(RejectedReply),
}

impl ReplyBody {
    pub fn accepted(reply_data: AcceptedReplyBody) -> Self {
        Self::Accepted(AcceptedReply { verf: OpaqueAuth::none(), reply_data })
    }

    pub fn rpc_mismatch(low: u32, high: u32) -> Self {
        Self::Denied(RejectedReply::RpcMismatch(MismatchInfo { low, high }))
    }

    pub fn auth_error(stat: AuthStat) -> Self {
        Self::Denied(RejectedReply::AuthError(stat))
    }
}

#[derive(Debug)]
enum RpcMessageBody {
    Call(CallBody),
    Reply(ReplyBody),
}

#[derive(Debug)]
struct RpcMessage {
    xid: u32,
    body: RpcMessageBody,
}

impl RpcMessage {
    fn decode<R: Read>(src: &mut R) -> Result<Self, Error> {
        let xid = codec::read_u32(src)?;
        let mtype = codec::read_u32(src)?;

        let body = match mtype {
            0 => RpcMessageBody::Call(Self::decode_call_body(src)?),
            1 => RpcMessageBody::Reply(Self::decode_reply_body(src)?),
            _ => return Err(Error::Protocol(ProtocolError::MalformedMessage)),
        };

        Ok(Self { xid, body })
    }

    fn decode_call_body<R: Read>(src: &mut R) -> Result<CallBody, Error> {
        Ok(CallBody {
            rpcvers: codec::read_u32(src)?,
            prog: codec::read_u32(src)?,
            vers: codec::read_u32(src)?,
            proc: codec::read_u32(src)?,
            cred: OpaqueAuth::decode(src)?,
            verf: OpaqueAuth::decode(src)?,
        })
    }

    fn decode_reply_body<R: Read>(src: &mut R) -> Result<ReplyBody, Error> {
        let reply_stat = codec::read_u32(src)?;
        match reply_stat {
            0 => {
                let verf = OpaqueAuth::decode(src)?;
                let accept_stat = codec::read_u32(src)?;
                let reply_data = match accept_stat {
                    0 => AcceptedReplyBody::Success(Vec::new()),
                    1 => AcceptedReplyBody::ProgUnavail,
                    2 => {
                        let low = codec::read_u32(src)?;
                        let high = codec::read_u32(src)?;
                        AcceptedReplyBody::ProgMismatch(ProgMismatchBody { low, high })
                    }
                    3 => AcceptedReplyBody::ProcUnavail,
                    4 => AcceptedReplyBody::GarbageArgs,
                    5 => AcceptedReplyBody::SystemErr,
                    _ => return Err(Error::Protocol(ProtocolError::MalformedMessage)),
                };
                Ok(ReplyBody::Accepted(AcceptedReply { verf, reply_data }))
            }
            1 => {
                let reject_stat = codec::read_u32(src)?;
                match reject_stat {
                    0 => {
                        let low = codec::read_u32(src)?;
                        let high = codec::read_u32(src)?;
                        Ok(ReplyBody::Denied(RejectedReply::RpcMismatch(MismatchInfo { low, high })))
                    }
                    1 => {
                        let stat = codec::read_u32(src)?;
                        let stat = auth_stat_from_u32(stat)?;
                        Ok(ReplyBody::Denied(RejectedReply::AuthError(stat)))
                    }
                    _ => Err(Error::Protocol(ProtocolError::MalformedMessage)),
                }
            }
            _ => Err(Error::Protocol(ProtocolError::MalformedMessage)),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        codec::write_u32(buf, self.xid)?;
        match &self.body {
            RpcMessageBody::Call(call) => {
                codec::write_u32(buf, 0)?;
                codec::write_u32(buf, call.rpcvers)?;
                codec::write_u32(buf, call.prog)?;
                codec::write_u32(buf, call.vers)?;
                codec::write_u32(buf, call.proc)?;
                call.cred.encode(buf)?;
                call.verf.encode(buf)?;
            }
            RpcMessageBody::Reply(reply) => {
                codec::write_u32(buf, 1)?;
                Self::encode_reply_body(buf, reply)?;
            }
        }
        Ok(())
    }

    fn encode_reply_body(buf: &mut Vec<u8>, reply: &ReplyBody) -> Result<(), Error> {
        match reply {
            ReplyBody::Accepted(accepted) => {
                codec::write_u32(buf, 0)?;
                accepted.verf.encode(buf)?;
                match &accepted.reply_data {
                    AcceptedReplyBody::Success(data) => {
                        codec::write_u32(buf, 0)?;
                        buf.extend_from_slice(data);
                    }
                    AcceptedReplyBody::ProgUnavail => codec::write_u32(buf, 1)?,
                    AcceptedReplyBody::ProgMismatch(m) => {
                        codec::write_u32(buf, 2)?;
                        codec::write_u32(buf, m.low)?;
                        codec::write_u32(buf, m.high)?;
                    }
                    AcceptedReplyBody::ProcUnavail => codec::write_u32(buf, 3)?,
                    AcceptedReplyBody::GarbageArgs => codec::write_u32(buf, 4)?,
                    AcceptedReplyBody::SystemErr => codec::write_u32(buf, 5)?,
                }
            }
            ReplyBody::Denied(rejected) => {
                codec::write_u32(buf, 1)?;
                match rejected {
                    RejectedReply::RpcMismatch(m) => {
                        codec::write_u32(buf, 0)?;
                        codec::write_u32(buf, m.low)?;
                        codec::write_u32(buf, m.high)?;
                    }
                    RejectedReply::AuthError(stat) => {
                        codec::write_u32(buf, 1)?;
                        codec::write_u32(buf, *stat as u32)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn auth_stat_from_u32(v: u32) -> Result<AuthStat, Error> {
    Ok(match v {
        0 => AuthStat::Ok,
        1 => AuthStat::BadCred,
        2 => AuthStat::RejectedCred,
        3 => AuthStat::BadVerf,
        4 => AuthStat::RejectedVerf,
        5 => AuthStat::TooWeak,
        6 => AuthStat::InvalidResp,
        7 => AuthStat::Failed,
        _ => return Err(Error::Protocol(ProtocolError::MalformedMessage)),
    })
}

/// A decoded RPC call, ready for dispatch. Borrows its encoded argument bytes from the packet
/// that owns the message buffer.
#[derive(Debug)]
pub struct Call<'a> {
    xid: u32,
    inner: CallBody,
    pub arg: &'a [u8],
}

impl Call<'_> {
    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn program(&self) -> u32 {
        self.inner.prog
    }

    pub fn version(&self) -> u32 {
        self.inner.vers
    }

    pub fn procedure(&self) -> u32 {
        self.inner.proc
    }

    pub fn credential(&self) -> &OpaqueAuth {
        &self.inner.cred
    }
}

/// Decodes a complete RPC call record (the record-mark framing, if any, must already have been
/// stripped by the caller).
pub fn decode_call(data: &[u8]) -> Result<Call<'_>, Error> {
    let mut rest = data;
    let message = RpcMessage::decode(&mut rest)?;

    let RpcMessageBody::Call(call) = message.body else {
        return Err(Error::Protocol(ProtocolError::MalformedMessage));
    };

    debug!(
        "CALL xid={} program={} version={} procedure={} arg_len={}",
        message.xid,
        call.prog,
        call.vers,
        call.proc,
        rest.len()
    );

    if call.rpcvers != RPC_VERSION {
        debug!("CALL with unexpected RPC version: {}", call.rpcvers);
        return Err(Error::Protocol(ProtocolError::WrongRpcVersion));
    }

    Ok(Call { xid: message.xid, inner: call, arg: rest })
}

/// Encodes a `CALL` message with a zero-length argument area, leaving the caller to append the
/// encoded procedure argument afterward.
pub fn encode_call_header(
    xid: u32,
    prog: u32,
    vers: u32,
    proc: u32,
    cred: OpaqueAuth,
    verf: OpaqueAuth,
) -> Vec<u8> {
    let message = RpcMessage {
        xid,
        body: RpcMessageBody::Call(CallBody { rpcvers: RPC_VERSION, prog, vers, proc, cred, verf }),
    };
    let mut buf = Vec::new();
    message.encode(&mut buf).expect("encoding into a Vec cannot fail");
    buf
}

/// Encodes a full `ACCEPTED`/`SUCCESS` reply, appending `result` (which must already be padded to
/// a 4-byte boundary) after the header.
pub fn encode_success_reply(xid: u32, result: &[u8]) -> Vec<u8> {
    assert_eq!(result.len() % 4, 0, "XDR results must be 4-byte padded");
    let message = RpcMessage {
        xid,
        body: RpcMessageBody::Reply(ReplyBody::accepted(AcceptedReplyBody::Success(Vec::new()))),
    };
    let mut buf = Vec::new();
    message.encode(&mut buf).expect("encoding into a Vec cannot fail");
    buf.extend_from_slice(result);
    buf
}

/// Encodes an arbitrary reply (accept or reject) with no trailing result bytes.
pub fn encode_reply(xid: u32, reply: ReplyBody) -> Vec<u8> {
    let message = RpcMessage { xid, body: RpcMessageBody::Reply(reply) };
    let mut buf = Vec::new();
    message.encode(&mut buf).expect("encoding into a Vec cannot fail");
    buf
}

/// Convenience for the `RPC_MISMATCH(2, 2)` reply this server always sends: this implementation
/// supports only RPC version 2.
pub fn rpc_mismatch_reply(xid: u32) -> Vec<u8> {
    encode_reply(xid, ReplyBody::rpc_mismatch(RPC_VERSION, RPC_VERSION))
}

/// Process-wide xid generator for client-role calls (the portmapper client, `rpcinfo`, tests).
static NEXT_XID: AtomicU32 = AtomicU32::new(1);

pub fn next_xid() -> u32 {
    NEXT_XID.fetch_add(1, Ordering::Relaxed)
}

/// Writes a 4-byte placeholder record mark, to be patched by [`finalize_record_mark`] once the
/// total message length is known.
pub fn buf_with_dummy_record_mark() -> Vec<u8> {
    vec![0, 0, 0, 0]
}

/// Patches the record mark written by [`buf_with_dummy_record_mark`] with the real length and
/// sets the last-fragment bit, per §4.1.
pub fn finalize_record_mark(buf: &mut [u8]) {
    let message_len = u32::try_from(buf.len() - 4).expect("RPC message too large to frame");
    let mark = message_len | (1 << 31);
    buf[..4].copy_from_slice(&mark.to_be_bytes());
}

pub(crate) fn warn_io(context: &str, e: &std::io::Error) {
    if e.kind() != std::io::ErrorKind::UnexpectedEof {
        warn!("{context}: {e}");
    }
}

/// Test-only helpers for decoding messages this crate produced, used by other modules' unit
/// tests to assert on exact reply shapes without duplicating the wire format.
#[cfg(test)]
pub mod test_support {
    use super::*;

    pub fn decode_reply(src: &mut &[u8]) -> ReplyBody {
        let message = RpcMessage::decode(src).expect("decoding a reply this crate produced");
        match message.body {
            RpcMessageBody::Reply(reply) => reply,
            RpcMessageBody::Call(_) => panic!("expected a reply message"),
        }
    }

    pub fn decode_xid(src: &mut &[u8]) -> u32 {
        read_u32_peek(src)
    }

    fn read_u32_peek(src: &mut &[u8]) -> u32 {
        codec::read_u32(src).expect("decoding xid")
    }
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A minimal synchronous RPC client, used by the portmapper client and the `rpcinfo` binary.

use std::io::{Read, Write};

use log::debug;

use crate::{next_xid, record, AcceptedReplyBody, Error, OpaqueAuth, ProtocolError, ReplyBody};

/// Sends a single call over `stream` and returns the decoded `SUCCESS` result bytes, or an error
/// if the server rejected the call or returned a non-success accept status.
pub fn do_rpc_call<S: Read + Write>(
    stream: &mut S,
    program: u32,
    version: u32,
    procedure: u32,
    arg: &[u8],
) -> Result<Vec<u8>, Error> {
    let xid = next_xid();
    let mut header = crate::encode_call_header(xid, program, version, procedure, OpaqueAuth::none(), OpaqueAuth::none());
    header.extend_from_slice(arg);

    debug!("client call xid={xid} program={program} version={version} procedure={procedure}");
    record::write_message(stream, &header)?;

    let reply_bytes = record::read_message(stream)?;
    let mut rest: &[u8] = &reply_bytes;
    let reply_xid = crate::codec::read_u32(&mut rest)?;
    if reply_xid != xid {
        return Err(Error::Protocol(ProtocolError::MalformedMessage));
    }

    let mtype = crate::codec::read_u32(&mut rest)?;
    if mtype != 1 {
        return Err(Error::Protocol(ProtocolError::MalformedMessage));
    }

    let reply = decode_reply_for_client(&mut rest)?;
    match reply {
        ReplyBody::Accepted(accepted) => match accepted.reply_data {
            AcceptedReplyBody::Success(_) => Ok(rest.to_vec()),
            other => Err(Error::Rpc(ReplyBody::Accepted(crate::AcceptedReply {
                verf: OpaqueAuth::none(),
                reply_data: other,
            }))),
        },
        denied @ ReplyBody::Denied(_) => Err(Error::Rpc(denied)),
    }
}

fn decode_reply_for_client(rest: &mut &[u8]) -> Result<ReplyBody, Error> {
    let reply_stat = crate::codec::read_u32(rest)?;
    match reply_stat {
        0 => {
            let _verf = OpaqueAuthView::decode(rest)?;
            let accept_stat = crate::codec::read_u32(rest)?;
            let reply_data = match accept_stat {
                0 => AcceptedReplyBody::Success(Vec::new()),
                1 => AcceptedReplyBody::ProgUnavail,
                2 => {
                    let low = crate::codec::read_u32(rest)?;
                    let high = crate::codec::read_u32(rest)?;
                    AcceptedReplyBody::ProgMismatch(crate::ProgMismatchBody { low, high })
                }
                3 => AcceptedReplyBody::ProcUnavail,
                4 => AcceptedReplyBody::GarbageArgs,
                5 => AcceptedReplyBody::SystemErr,
                _ => return Err(Error::Protocol(ProtocolError::MalformedMessage)),
            };
            Ok(ReplyBody::Accepted(crate::AcceptedReply { verf: OpaqueAuth::none(), reply_data }))
        }
        1 => {
            let reject_stat = crate::codec::read_u32(rest)?;
            match reject_stat {
                0 => {
                    let low = crate::codec::read_u32(rest)?;
                    let high = crate::codec::read_u32(rest)?;
                    Ok(ReplyBody::rpc_mismatch(low, high))
                }
                1 => {
                    let stat = crate::codec::read_u32(rest)?;
                    Ok(ReplyBody::auth_error(auth_stat_from_u32(stat)?))
                }
                _ => Err(Error::Protocol(ProtocolError::MalformedMessage)),
            }
        }
        _ => Err(Error::Protocol(ProtocolError::MalformedMessage)),
    }
}

fn auth_stat_from_u32(v: u32) -> Result<crate::AuthStat, Error> {
    use crate::AuthStat;
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

/// Local stand-in so this module doesn't need `OpaqueAuth::decode` (crate-private) exposed.
struct OpaqueAuthView;

impl OpaqueAuthView {
    fn decode(rest: &mut &[u8]) -> Result<(), Error> {
        let _flavor = crate::codec::read_u32(rest)?;
        let _body = crate::codec::read_opaque_var(rest, 400)?;
        Ok(())
    }
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Property 4: for every call with an unknown program/version/procedure, the reply's status
//! fields match the table in the dispatch algorithm exactly. This decodes replies by hand using
//! only the public wire-level helpers, the same way a real client would.

use std::sync::Arc;

use rpc_protocol::auth::DefaultAuthenticator;
use rpc_protocol::codec::read_u32;
use rpc_protocol::dispatch::{null_procedure, RpcDispatcher};
use rpc_protocol::{decode_call, encode_call_header, OpaqueAuth};

struct DecodedReply {
    xid: u32,
    accept_stat: Option<u32>,
    reject_stat: Option<u32>,
}

fn decode_reply_stats(reply: &[u8]) -> DecodedReply {
    let mut rest = reply;
    let xid = read_u32(&mut rest).unwrap();
    assert_eq!(read_u32(&mut rest).unwrap(), 1, "mtype should be REPLY");
    let reply_stat = read_u32(&mut rest).unwrap();
    match reply_stat {
        0 => {
            // verf: flavor + opaque length (zero for AUTH_NONE)
            read_u32(&mut rest).unwrap();
            read_u32(&mut rest).unwrap();
            DecodedReply { xid, accept_stat: Some(read_u32(&mut rest).unwrap()), reject_stat: None }
        }
        1 => DecodedReply { xid, accept_stat: None, reject_stat: Some(read_u32(&mut rest).unwrap()) },
        other => panic!("unexpected reply_stat {other}"),
    }
}

fn dispatch_bytes(dispatcher: &RpcDispatcher, program: u32, version: u32, proc: u32) -> Vec<u8> {
    let bytes = encode_call_header(99, program, version, proc, OpaqueAuth::none(), OpaqueAuth::none());
    let call = decode_call(&bytes).unwrap();
    dispatcher.dispatch(&call)
}

#[test]
fn unknown_program_is_prog_unavail() {
    let dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    let reply = dispatch_bytes(&dispatcher, 12345, 1, 0);
    let decoded = decode_reply_stats(&reply);
    assert_eq!(decoded.xid, 99);
    assert_eq!(decoded.accept_stat, Some(1), "PROG_UNAVAIL");
}

#[test]
fn unknown_version_is_prog_mismatch() {
    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    dispatcher.register(1, 3, vec![Some(Arc::new(null_procedure))]);
    let reply = dispatch_bytes(&dispatcher, 1, 9, 0);
    let decoded = decode_reply_stats(&reply);
    assert_eq!(decoded.accept_stat, Some(2), "PROG_MISMATCH");
}

#[test]
fn unknown_procedure_is_proc_unavail() {
    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    dispatcher.register(1, 1, vec![Some(Arc::new(null_procedure))]);
    let reply = dispatch_bytes(&dispatcher, 1, 1, 99);
    let decoded = decode_reply_stats(&reply);
    assert_eq!(decoded.accept_stat, Some(3), "PROC_UNAVAIL");
}

#[test]
fn registered_null_procedure_succeeds() {
    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    dispatcher.register(1, 1, vec![Some(Arc::new(null_procedure))]);
    let reply = dispatch_bytes(&dispatcher, 1, 1, 0);
    let decoded = decode_reply_stats(&reply);
    assert_eq!(decoded.accept_stat, Some(0), "SUCCESS");
    assert!(decoded.reject_stat.is_none());
}

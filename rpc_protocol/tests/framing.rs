// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! End-to-end framing scenarios run against live sockets, the way the teacher's own
//! `tests/rpc.rs`/`tests/rpcbind.rs` exercised the wire protocol.

use std::io::Write as _;
use std::net::{TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread;

use rpc_protocol::auth::DefaultAuthenticator;
use rpc_protocol::codec::read_u32;
use rpc_protocol::dispatch::{null_procedure, RpcDispatcher};
use rpc_protocol::pool::PacketPool;
use rpc_protocol::tcp::TcpSessionHandler;
use rpc_protocol::udp::UdpHandler;
use rpc_protocol::worker::WorkerPool;
use rpc_protocol::{encode_call_header, record, OpaqueAuth};

/// S1: a UDP NULL call against program 100000 version 2 gets back exactly a 24-byte
/// ACCEPTED/SUCCESS reply with the same xid.
#[test]
fn udp_null_call_reply_is_24_bytes() {
    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    dispatcher.register(100_000, 2, vec![Some(Arc::new(null_procedure))]);
    let pool = Arc::new(PacketPool::new(4, 2, 2048, 65536));

    let handler = UdpHandler::bind("127.0.0.1:0", Arc::new(dispatcher), pool).unwrap();
    let addr = handler.local_addr().unwrap();
    thread::spawn(move || handler.run_forever());

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    let xid = 0x1122_3344;
    let bytes = encode_call_header(xid, 100_000, 2, 0, OpaqueAuth::none(), OpaqueAuth::none());
    client.send_to(&bytes, addr).unwrap();

    let mut buf = [0u8; 256];
    let (len, _) = client.recv_from(&mut buf).unwrap();
    assert_eq!(len, 24);

    let mut reply = &buf[..len];
    assert_eq!(read_u32(&mut reply).unwrap(), xid);
    assert_eq!(read_u32(&mut reply).unwrap(), 1, "mtype should be REPLY");
    assert_eq!(read_u32(&mut reply).unwrap(), 0, "reply_stat should be MSG_ACCEPTED");
}

/// S2: a TCP call carrying an unsupported `rpcvers` gets DENIED/RPC_MISMATCH(2, 2), and the
/// connection stays open for further calls on the same session.
#[test]
fn tcp_wrong_rpc_version_is_rpc_mismatch_without_closing() {
    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    dispatcher.register(1, 1, vec![Some(Arc::new(null_procedure))]);
    let workers = Arc::new(WorkerPool::new(4));
    let pool = Arc::new(PacketPool::new(-1, -1, 2048, 65536));

    let handler = TcpSessionHandler::bind("127.0.0.1:0", Arc::new(dispatcher), workers, pool).unwrap();
    let addr = handler.local_addr().unwrap();
    let handler = Arc::new(handler);
    let run_handler = handler.clone();
    thread::spawn(move || run_handler.run_forever());

    let mut client = TcpStream::connect(addr).unwrap();

    // Hand-build a call with rpcvers=1 instead of the supported 2.
    let mut bad_call = Vec::new();
    rpc_protocol::codec::write_u32(&mut bad_call, 55).unwrap(); // xid
    rpc_protocol::codec::write_u32(&mut bad_call, 0).unwrap(); // mtype = CALL
    rpc_protocol::codec::write_u32(&mut bad_call, 1).unwrap(); // rpcvers = 1 (unsupported)
    rpc_protocol::codec::write_u32(&mut bad_call, 1).unwrap(); // prog
    rpc_protocol::codec::write_u32(&mut bad_call, 1).unwrap(); // vers
    rpc_protocol::codec::write_u32(&mut bad_call, 0).unwrap(); // proc
    rpc_protocol::codec::write_u32(&mut bad_call, 0).unwrap(); // cred flavor
    rpc_protocol::codec::write_u32(&mut bad_call, 0).unwrap(); // cred len
    rpc_protocol::codec::write_u32(&mut bad_call, 0).unwrap(); // verf flavor
    rpc_protocol::codec::write_u32(&mut bad_call, 0).unwrap(); // verf len

    record::write_message(&mut client, &bad_call).unwrap();
    client.flush().unwrap();

    let reply = record::read_message(&mut client).unwrap();
    let mut rest: &[u8] = &reply;
    assert_eq!(read_u32(&mut rest).unwrap(), 55, "xid must be echoed even on RPC_MISMATCH");
    assert_eq!(read_u32(&mut rest).unwrap(), 1, "mtype should be REPLY");
    assert_eq!(read_u32(&mut rest).unwrap(), 1, "reply_stat should be MSG_DENIED");
    assert_eq!(read_u32(&mut rest).unwrap(), 0, "reject_stat should be RPC_MISMATCH");
    assert_eq!(read_u32(&mut rest).unwrap(), 2, "low");
    assert_eq!(read_u32(&mut rest).unwrap(), 2, "high");

    // The connection is still usable: a well-formed call on the same stream gets a normal reply.
    let good = encode_call_header(56, 1, 1, 0, OpaqueAuth::none(), OpaqueAuth::none());
    record::write_message(&mut client, &good).unwrap();
    client.flush().unwrap();
    let reply2 = record::read_message(&mut client).unwrap();
    assert_eq!(reply2.len(), 24);
}

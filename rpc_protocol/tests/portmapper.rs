// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! S3: portmapper SET/GETPORT/UNSET round-trip against a live `rpcbind_wire` server.

use std::sync::Arc;
use std::thread;

use rpc_protocol::auth::DefaultAuthenticator;
use rpc_protocol::dispatch::{null_procedure, ProcResult, RpcDispatcher};
use rpc_protocol::pool::PacketPool;
use rpc_protocol::portmap::{PortMapping, PortmapperClient, IPPROTO_TCP, PMAP_PROG, PMAP_VERS};
use rpc_protocol::rpcbind_wire::{decode_mapping_arg, RpcbindTable};
use rpc_protocol::tcp::TcpSessionHandler;
use rpc_protocol::worker::WorkerPool;

fn encode_bool(v: bool) -> Vec<u8> {
    (if v { 1u32 } else { 0u32 }).to_be_bytes().to_vec()
}

fn spawn_rpcbind_server() -> std::net::SocketAddr {
    let table = Arc::new(RpcbindTable::new());
    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));

    let set_table = table.clone();
    let unset_table = table.clone();
    let getport_table = table.clone();

    dispatcher.register(
        PMAP_PROG,
        PMAP_VERS,
        vec![
            Some(Arc::new(null_procedure)),
            Some(Arc::new(move |call: &rpc_protocol::Call, _client: &rpc_protocol::ClientInfo| {
                match decode_mapping_arg(call.arg) {
                    Ok(mapping) => ProcResult::Success(encode_bool(set_table.set(mapping))),
                    Err(_) => ProcResult::GarbageArgs,
                }
            })),
            Some(Arc::new(move |call: &rpc_protocol::Call, _client: &rpc_protocol::ClientInfo| {
                match decode_mapping_arg(call.arg) {
                    Ok(mapping) => ProcResult::Success(encode_bool(unset_table.unset(mapping.program, mapping.version))),
                    Err(_) => ProcResult::GarbageArgs,
                }
            })),
            Some(Arc::new(move |call: &rpc_protocol::Call, _client: &rpc_protocol::ClientInfo| {
                match decode_mapping_arg(call.arg) {
                    Ok(mapping) => {
                        let port = getport_table.getport(mapping.program, mapping.version, mapping.protocol);
                        ProcResult::Success(port.to_be_bytes().to_vec())
                    }
                    Err(_) => ProcResult::GarbageArgs,
                }
            })),
        ],
    );

    let workers = Arc::new(WorkerPool::new(4));
    let pool = Arc::new(PacketPool::new(-1, -1, 512, 32 * 1024));
    let handler = TcpSessionHandler::bind("127.0.0.1:0", Arc::new(dispatcher), workers, pool).unwrap();
    let addr = handler.local_addr().unwrap();
    let handler = Arc::new(handler);
    let run_handler = handler.clone();
    thread::spawn(move || run_handler.run_forever());
    addr
}

#[test]
fn set_then_getport_returns_registered_port_and_zero_after_unset() {
    let addr = spawn_rpcbind_server();
    let client = PortmapperClient::new(&addr.ip().to_string(), addr.port() as i32);

    let mapping = PortMapping { program: 100_005, version: 3, protocol: IPPROTO_TCP, port: 2049 };
    assert!(client.set(mapping).unwrap());

    let port = client.getport(100_005, 3, IPPROTO_TCP).unwrap();
    assert_eq!(port, 2049);

    assert!(client.unset(mapping).unwrap());
    let port_after_unset = client.getport(100_005, 3, IPPROTO_TCP).unwrap();
    assert_eq!(port_after_unset, 0);
}

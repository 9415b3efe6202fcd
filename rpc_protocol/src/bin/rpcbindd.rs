// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A standalone portmapper (program 100000, version 2) server.

use std::sync::Arc;

use clap::Parser;
use log::info;
use rpc_protocol::auth::{ClientInfo, DefaultAuthenticator};
use rpc_protocol::dispatch::{null_procedure, ProcResult, RpcDispatcher};
use rpc_protocol::pool::PacketPool;
use rpc_protocol::portmap::{PMAP_PROG, PMAP_VERS};
use rpc_protocol::rpcbind_wire::{decode_mapping_arg, encode_dump_reply, RpcbindTable};
use rpc_protocol::tcp::TcpSessionHandler;
use rpc_protocol::worker::WorkerPool;
use rpc_protocol::Call;

#[derive(Parser)]
#[command(about = "Standalone ONC/RPC portmapper")]
struct Args {
    #[arg(long, default_value = "0.0.0.0:111")]
    bind: String,

    #[arg(long, default_value_t = 8)]
    workers: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let table = Arc::new(RpcbindTable::new());
    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));

    let set_table = table.clone();
    let unset_table = table.clone();
    let getport_table = table.clone();
    let dump_table = table.clone();

    dispatcher.register(
        PMAP_PROG,
        PMAP_VERS,
        vec![
            Some(Arc::new(null_procedure)),
            Some(Arc::new(move |call: &Call, _client: &ClientInfo| match decode_mapping_arg(call.arg) {
                Ok(mapping) => {
                    let accepted = set_table.set(mapping);
                    ProcResult::Success(encode_bool(accepted))
                }
                Err(_) => ProcResult::GarbageArgs,
            })),
            Some(Arc::new(move |call: &Call, _client: &ClientInfo| match decode_mapping_arg(call.arg) {
                Ok(mapping) => {
                    let removed = unset_table.unset(mapping.program, mapping.version);
                    ProcResult::Success(encode_bool(removed))
                }
                Err(_) => ProcResult::GarbageArgs,
            })),
            Some(Arc::new(move |call: &Call, _client: &ClientInfo| match decode_mapping_arg(call.arg) {
                Ok(mapping) => {
                    let port = getport_table.getport(mapping.program, mapping.version, mapping.protocol);
                    ProcResult::Success(port.to_be_bytes().to_vec())
                }
                Err(_) => ProcResult::GarbageArgs,
            })),
            Some(Arc::new(move |_call: &Call, _client: &ClientInfo| {
                ProcResult::Success(encode_dump_reply(&dump_table.dump()))
            })),
        ],
    );

    let dispatcher = Arc::new(dispatcher);
    let workers = Arc::new(WorkerPool::new(args.workers));
    let pool = Arc::new(PacketPool::new(-1, -1, 512, 32 * 1024));

    let handler =
        TcpSessionHandler::bind(&args.bind, dispatcher, workers, pool).expect("failed to bind portmapper socket");
    info!("rpcbindd listening on {}", args.bind);
    handler.run_forever();
}

fn encode_bool(v: bool) -> Vec<u8> {
    (if v { 1u32 } else { 0u32 }).to_be_bytes().to_vec()
}

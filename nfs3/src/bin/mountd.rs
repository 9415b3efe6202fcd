// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use rpc_protocol::auth::DefaultAuthenticator;
use rpc_protocol::dispatch::{null_procedure, RpcDispatcher};
use rpc_protocol::pool::PacketPool;
use rpc_protocol::portmap::{PortMapping, PortmapperClient, IPPROTO_TCP, PROG_MOUNT};
use rpc_protocol::tcp::TcpSessionHandler;
use rpc_protocol::worker::WorkerPool;

use nfs3::mount::{self, MountState, MOUNT_PROGRAM, MOUNT_V3};

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0:20048")]
    bind: String,

    #[arg(long, default_value = "/srv/nfs/export")]
    export: PathBuf,

    #[arg(long, default_value_t = 4)]
    workers: usize,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let state = Arc::new(MountState::new(mount::default_export_table(args.export)));

    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    dispatcher.register(MOUNT_PROGRAM, MOUNT_V3, vec![
        Some(Arc::new(null_procedure)),
        Some(proc_with_state(state.clone(), mount::mnt)),
        Some(proc_with_state(state.clone(), mount::dump)),
        Some(proc_with_state(state.clone(), mount::umnt)),
        Some(proc_with_state(state.clone(), mount::umntall)),
        Some(proc_with_state(state.clone(), mount::export)),
    ]);

    let workers = Arc::new(WorkerPool::new(args.workers));
    let pool = Arc::new(PacketPool::new(-1, -1, 512, 32 * 1024));
    let handler = TcpSessionHandler::bind(&args.bind, Arc::new(dispatcher), workers, pool)
        .expect("failed to bind mountd TCP listener");

    if let Err(e) = announce_self() {
        log::warn!("could not register mountd with the portmapper: {e}");
    }

    handler.run_forever();
}

fn proc_with_state(
    state: Arc<MountState>,
    f: impl Fn(&rpc_protocol::Call, &rpc_protocol::auth::ClientInfo, &MountState) -> rpc_protocol::dispatch::ProcResult
        + Send
        + Sync
        + 'static,
) -> rpc_protocol::dispatch::Procedure {
    Arc::new(move |call, client| f(call, client, &state))
}

fn announce_self() -> Result<(), rpc_protocol::Error> {
    let portmapper = PortmapperClient::localhost();
    portmapper.set(PortMapping { program: PROG_MOUNT, version: MOUNT_V3, protocol: IPPROTO_TCP, port: 20048 })?;
    Ok(())
}

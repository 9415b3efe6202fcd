// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;

use rpc_protocol::auth::DefaultAuthenticator;
use rpc_protocol::config::RpcServerConfig;
use rpc_protocol::dispatch::{null_procedure, RpcDispatcher};
use rpc_protocol::pool::PacketPool;
use rpc_protocol::portmap::{PortMapping, PortmapperClient, IPPROTO_TCP, IPPROTO_UDP, PROG_NFS};
use rpc_protocol::tcp::TcpSessionHandler;
use rpc_protocol::udp::UdpHandler;
use rpc_protocol::worker::WorkerPool;

use nfs3::nfs3_proto::{self, Nfs3State, NFS_PROGRAM, NFS_V3};

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value = "config/rpc_server.toml")]
    config: PathBuf,

    #[arg(long, default_value = "/srv/nfs/export")]
    export_root: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let config = RpcServerConfig::from_file(&args.config).unwrap_or_else(|e| {
        log::warn!("using default configuration: {e}");
        RpcServerConfig::default()
    });

    let state = Arc::new(Nfs3State { export_root: args.export_root });

    let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
    let getattr_state = state.clone();
    dispatcher.register(
        NFS_PROGRAM,
        NFS_V3,
        vec![
            Some(Arc::new(null_procedure)),
            Some(Arc::new(move |call, client| nfs3_proto::getattr(call, client, &getattr_state))),
        ],
    );
    let dispatcher = Arc::new(dispatcher);

    let workers = Arc::new(WorkerPool::new(config.worker_threads));
    let pool = Arc::new(PacketPool::new(
        config.small_pkt_max,
        config.large_pkt_max,
        config.small_packet_size,
        config.large_packet_size,
    ));

    let tcp = Arc::new(
        TcpSessionHandler::bind(&config.tcp_bind_address, dispatcher.clone(), workers.clone(), pool.clone())
            .expect("failed to bind NFS TCP listener"),
    );
    let udp =
        Arc::new(UdpHandler::bind(&config.udp_bind_address, dispatcher, pool).expect("failed to bind NFS UDP socket"));

    if config.register_with_portmapper {
        let portmapper = PortmapperClient::new(&config.portmapper_host, config.portmapper_port);
        let _ = portmapper.set(PortMapping { program: PROG_NFS, version: NFS_V3, protocol: IPPROTO_TCP, port: 2049 });
        let _ = portmapper.set(PortMapping { program: PROG_NFS, version: NFS_V3, protocol: IPPROTO_UDP, port: 2049 });
    }

    let tcp_thread = {
        let tcp = tcp.clone();
        thread::spawn(move || tcp.run_forever())
    };
    let udp_thread = thread::spawn(move || udp.run_forever());

    let _ = tcp_thread.join();
    let _ = udp_thread.join();
}

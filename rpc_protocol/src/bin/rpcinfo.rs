// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! `rpcinfo -p`: lists the program/version mappings a portmapper knows about.

use std::net::TcpStream;

use clap::Parser;
use log::error;
use rpc_protocol::client::do_rpc_call;
use rpc_protocol::portmap::{PMAP_PROC_DUMP, PMAP_PROG, PMAP_VERS};
use rpc_protocol::rpcbind_wire::decode_dump_reply;

#[derive(Parser)]
#[command(about = "Query a portmapper's registered program mappings")]
struct Args {
    #[arg(long, default_value = "localhost")]
    hostname: String,

    #[arg(long, default_value_t = 111)]
    port: u16,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.hostname, args.port);
    let mut stream = match TcpStream::connect(&address) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to connect to {address}: {e}");
            std::process::exit(1);
        }
    };

    let reply = match do_rpc_call(&mut stream, PMAP_PROG, PMAP_VERS, PMAP_PROC_DUMP, &[]) {
        Ok(r) => r,
        Err(e) => {
            error!("DUMP call failed: {e}");
            std::process::exit(1);
        }
    };

    match decode_dump_reply(&reply) {
        Ok(entries) => {
            println!("{:<10} {:<8} {:<6} {:<10} owner", "program", "version", "netid", "address");
            for entry in entries {
                println!(
                    "{:<10} {:<8} {:<6} {:<10} {}",
                    entry.program, entry.version, entry.netid, entry.address, entry.owner
                );
            }
        }
        Err(e) => {
            error!("failed to decode DUMP reply: {e}");
            std::process::exit(1);
        }
    }
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::net::TcpStream;

use clap::Parser;

use nfs3::mount::{self, MOUNT_PROGRAM, MOUNTPROC3_EXPORT, MOUNT_V3};
use rpc_protocol::client::do_rpc_call;

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value = "localhost")]
    hostname: String,

    #[arg(long, default_value_t = 20048)]
    port: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let mut stream = TcpStream::connect(format!("{}:{}", args.hostname, args.port))?;

    let reply = do_rpc_call(&mut stream, MOUNT_PROGRAM, MOUNT_V3, MOUNTPROC3_EXPORT, &[])?;
    let entries = mount::decode_export_list(&reply)?;

    println!("Export list for {}:", args.hostname);
    for (directory, groups) in entries {
        print!("{directory} ");
        for group in groups {
            print!("{group} ");
        }
        println!();
    }

    Ok(())
}

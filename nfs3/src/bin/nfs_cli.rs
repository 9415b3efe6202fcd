// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::net::TcpStream;

use clap::{Parser, Subcommand};

use nfs3::nfs3_proto::{encode_getattr_args, NFSPROC3_GETATTR, NFS_PROGRAM, NFS_V3};
use rpc_protocol::client::do_rpc_call;
use rpc_protocol::codec::read_u32;

#[derive(Debug, Parser)]
struct Cli {
    #[arg(long, default_value = "localhost")]
    hostname: String,

    #[arg(long, default_value_t = 2049)]
    port: u16,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetches attributes for a file handle (an export-relative path).
    Getattr {
        #[arg(short, long)]
        handle: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Cli::parse();
    let mut stream = TcpStream::connect(format!("{}:{}", args.hostname, args.port))?;

    match args.command {
        Command::Getattr { handle } => do_getattr(&mut stream, &handle)?,
    }
    Ok(())
}

fn do_getattr(stream: &mut TcpStream, handle: &str) -> Result<(), Box<dyn std::error::Error>> {
    let arg = encode_getattr_args(handle.as_bytes());
    let reply = do_rpc_call(stream, NFS_PROGRAM, NFS_V3, NFSPROC3_GETATTR, &arg)?;

    let mut rest: &[u8] = &reply;
    let status = read_u32(&mut rest)?;
    if status == 0 {
        println!("getattr({handle}) ok, {} bytes of attributes follow", rest.len());
    } else {
        println!("getattr({handle}) failed: nfsstat3={status}");
    }
    Ok(())
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! TCP record marking (RFC 1831 §10). Each record is preceded by a 4-byte header: the high bit
//! marks the last fragment of the message, the low 31 bits hold the fragment's byte length.

use std::io::{Read, Write};

use crate::{Error, ProtocolError};

const LAST_FRAGMENT_BIT: u32 = 1 << 31;

/// Reads one complete RPC message from `stream`, reassembling however many fragments it took.
///
/// Blocks until either a last-fragment record has been read, or the stream is exhausted or
/// errors.
pub fn read_message<S: Read>(stream: &mut S) -> Result<Vec<u8>, Error> {
    let mut message = Vec::new();

    loop {
        let mut header_bytes = [0u8; 4];
        stream.read_exact(&mut header_bytes)?;
        let header = u32::from_be_bytes(header_bytes);
        let is_last = header & LAST_FRAGMENT_BIT != 0;
        let frag_len = (header & !LAST_FRAGMENT_BIT) as usize;

        let mut fragment = vec![0u8; frag_len];
        stream.read_exact(&mut fragment)?;
        message.extend_from_slice(&fragment);

        if is_last {
            return Ok(message);
        }
    }
}

/// Writes `message` to `stream` as a single-fragment record with the last-fragment bit set.
pub fn write_message<S: Write>(stream: &mut S, message: &[u8]) -> Result<(), Error> {
    let len = u32::try_from(message.len()).map_err(|_| Error::Protocol(ProtocolError::MalformedMessage))?;
    let header = (len | LAST_FRAGMENT_BIT).to_be_bytes();
    stream.write_all(&header)?;
    stream.write_all(message)?;
    Ok(())
}

/// Splits `message` into `fragments` chunks and encodes each as its own record, setting the
/// last-fragment bit on only the final one. Used by tests to exercise reassembly under arbitrary
/// fragmentations (§8, property 1).
pub fn encode_fragmented(message: &[u8], fragments: usize) -> Vec<u8> {
    assert!(fragments >= 1);
    let mut out = Vec::new();
    let chunk = message.len().div_ceil(fragments).max(1);
    let mut chunks: Vec<&[u8]> = message.chunks(chunk).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    for (i, piece) in chunks.iter().enumerate() {
        let is_last = i + 1 == chunks.len();
        let mut header = piece.len() as u32;
        if is_last {
            header |= LAST_FRAGMENT_BIT;
        }
        out.extend_from_slice(&header.to_be_bytes());
        out.extend_from_slice(piece);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn single_fragment_roundtrip() {
        let msg = b"hello world".to_vec();
        let mut encoded = Vec::new();
        write_message(&mut encoded, &msg).unwrap();

        let mut cur = Cursor::new(encoded);
        let decoded = read_message(&mut cur).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn arbitrary_fragmentation_reassembles() {
        let msg: Vec<u8> = (0..257u32).map(|b| b as u8).collect();
        for fragments in 1..=9 {
            let encoded = encode_fragmented(&msg, fragments);
            let mut cur = Cursor::new(encoded);
            let decoded = read_message(&mut cur).unwrap();
            assert_eq!(decoded, msg, "fragments={fragments}");
        }
    }

    #[test]
    fn empty_message_roundtrip() {
        let encoded = encode_fragmented(&[], 1);
        let mut cur = Cursor::new(encoded);
        let decoded = read_message(&mut cur).unwrap();
        assert!(decoded.is_empty());
    }
}

//! `Content-Encoding` decoding for diffed bodies.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;

/// Encodings declared by `Content-Encoding` header values, in declared order.
/// `identity` is dropped.
pub fn encoding_chain(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e != "identity")
        .collect()
}

/// Decode `body` through every encoding of the chain, in declared order.
/// Returns `None` if any step fails or an encoding is unknown.
///
/// This departs from RFC 9110, where `Content-Encoding` lists codings in the
/// order they were applied and a decoder undoes them last to first. A body
/// sent as `br, gzip` is taken to be gzip inside brotli.
pub fn decode_body(body: &[u8], chain: &[String]) -> Option<Vec<u8>> {
    let mut current = body.to_vec();
    for encoding in chain {
        current = match encoding.as_str() {
            "gzip" | "x-gzip" => read_all(GzDecoder::new(current.as_slice()))?,
            "br" => read_all(brotli::Decompressor::new(current.as_slice(), 4096))?,
            "deflate" => read_all(ZlibDecoder::new(current.as_slice()))
                .or_else(|| read_all(DeflateDecoder::new(current.as_slice())))?,
            _ => return None,
        };
    }
    Some(current)
}

fn read_all(mut reader: impl Read) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).ok()?;
    Some(out)
}

//! Tolerant frame payload decoding.
//!
//! The venue's framing is undocumented and applies zero or more of
//! base64/gzip/raw-deflate interchangeably. Every transform is attempted
//! cheaply; individual failures are swallowed and the caller gets whatever
//! subset succeeded, possibly empty.

use std::io::Read;

use base64::Engine;
use flate2::read::{DeflateDecoder, GzDecoder};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::FramePayload;

static BASE64_CHARSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/=\s]+$").unwrap());

/// Decompressed payloads are capped to keep a hostile frame from ballooning.
const MAX_INFLATED_BYTES: u64 = 4 * 1024 * 1024;

/// Produce a deduplicated list of plausible text candidates for a payload.
/// Never fails; an undecodable payload yields an empty list.
pub fn decode_candidates(payload: &FramePayload) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    match payload {
        FramePayload::Text(text) => {
            push_unique(&mut out, text.clone());
            if BASE64_CHARSET.is_match(text) {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(&compact) {
                    if let Ok(decoded) = String::from_utf8(bytes) {
                        push_unique(&mut out, decoded);
                    }
                }
            }
        }
        FramePayload::Binary(bytes) => {
            push_unique(&mut out, String::from_utf8_lossy(bytes).into_owned());
            if let Some(text) = inflate(GzDecoder::new(bytes.as_slice())) {
                push_unique(&mut out, text);
            }
            if let Some(text) = inflate(DeflateDecoder::new(bytes.as_slice())) {
                push_unique(&mut out, text);
            }
        }
    }

    out
}

fn inflate<R: Read>(reader: R) -> Option<String> {
    let mut buf = Vec::new();
    reader
        .take(MAX_INFLATED_BYTES)
        .read_to_end(&mut buf)
        .ok()?;
    String::from_utf8(buf).ok()
}

fn push_unique(out: &mut Vec<String>, candidate: String) {
    if !candidate.is_empty() && !out.iter().any(|c| c == &candidate) {
        out.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder};
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn text_passes_through() {
        let cands = decode_candidates(&FramePayload::Text("42[\"ping\"]".to_string()));
        assert_eq!(cands, vec!["42[\"ping\"]".to_string()]);
    }

    #[test]
    fn base64_text_yields_both_forms() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("{\"symbol\":\"EURUSD\"}");
        let cands = decode_candidates(&FramePayload::Text(encoded.clone()));
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0], encoded);
        assert_eq!(cands[1], "{\"symbol\":\"EURUSD\"}");
    }

    #[test]
    fn base64_with_whitespace_still_decodes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("hello frames");
        let spaced = format!("{}\n  {}", &encoded[..4], &encoded[4..]);
        let cands = decode_candidates(&FramePayload::Text(spaced));
        assert!(cands.iter().any(|c| c == "hello frames"));
    }

    #[test]
    fn gzip_binary_surfaces_embedded_text() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"[\"EURUSD_otc\",1.07]").unwrap();
        let bytes = enc.finish().unwrap();
        let cands = decode_candidates(&FramePayload::Binary(bytes));
        assert!(cands.iter().any(|c| c == "[\"EURUSD_otc\",1.07]"));
    }

    #[test]
    fn raw_deflate_binary_surfaces_embedded_text() {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"{\"pair\":\"GBP/USD\",\"price\":1.27}").unwrap();
        let bytes = enc.finish().unwrap();
        let cands = decode_candidates(&FramePayload::Binary(bytes));
        assert!(cands
            .iter()
            .any(|c| c == "{\"pair\":\"GBP/USD\",\"price\":1.27}"));
    }

    #[test]
    fn garbage_binary_never_panics() {
        let cands = decode_candidates(&FramePayload::Binary(vec![0xff, 0xfe, 0x00, 0x9c]));
        // lossy utf-8 of the raw bytes may survive, but nothing inflates
        assert!(cands.len() <= 1);
    }

    #[test]
    fn empty_payload_yields_nothing() {
        assert!(decode_candidates(&FramePayload::Text(String::new())).is_empty());
        assert!(decode_candidates(&FramePayload::Binary(Vec::new())).is_empty());
    }

    #[test]
    fn duplicate_candidates_are_collapsed() {
        let cands = decode_candidates(&FramePayload::Text("plain text!".to_string()));
        assert_eq!(cands.len(), 1);
    }
}

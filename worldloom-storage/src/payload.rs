//! Transparent payload compression for stored versions.
//!
//! Documents above a size threshold are stored gzip-compressed; callers
//! always see plain JSON. `decode(encode(doc)) == doc` structurally.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use worldloom_core::{LoomResult, StoreError, VersionPayload};

/// Serialized payloads larger than this are stored compressed.
const COMPRESSION_THRESHOLD: usize = 4 * 1024;

/// Encode a document for storage, compressing when it pays off.
pub fn encode(document: &serde_json::Value) -> LoomResult<VersionPayload> {
    let raw = serde_json::to_vec(document).map_err(|e| StoreError::Codec {
        reason: e.to_string(),
    })?;

    if raw.len() <= COMPRESSION_THRESHOLD {
        return Ok(VersionPayload::Plain(document.clone()));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).map_err(|e| StoreError::Codec {
        reason: e.to_string(),
    })?;
    let compressed = encoder.finish().map_err(|e| StoreError::Codec {
        reason: e.to_string(),
    })?;
    Ok(VersionPayload::Gzip(compressed))
}

/// Decode a stored payload back to its document.
pub fn decode(payload: &VersionPayload) -> LoomResult<serde_json::Value> {
    match payload {
        VersionPayload::Plain(document) => Ok(document.clone()),
        VersionPayload::Gzip(compressed) => {
            let mut decoder = GzDecoder::new(compressed.as_slice());
            let mut raw = Vec::new();
            decoder.read_to_end(&mut raw).map_err(|e| StoreError::Codec {
                reason: e.to_string(),
            })?;
            serde_json::from_slice(&raw).map_err(|e| {
                StoreError::Codec {
                    reason: e.to_string(),
                }
                .into()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn large_document() -> serde_json::Value {
        // Comfortably past the threshold once serialized.
        let routes: Vec<serde_json::Value> = (0..512)
            .map(|i| serde_json::json!({"name": format!("route-{i}"), "value": i}))
            .collect();
        serde_json::json!({"config": {"trade": {"routes": routes}}})
    }

    #[test]
    fn test_small_documents_stay_plain() {
        let document = serde_json::json!({"population": 1000});
        let payload = encode(&document).unwrap();
        assert!(!payload.is_compressed());
        assert_eq!(decode(&payload).unwrap(), document);
    }

    #[test]
    fn test_large_documents_compress_and_round_trip() {
        let document = large_document();
        let payload = encode(&document).unwrap();
        assert!(payload.is_compressed());
        assert_eq!(decode(&payload).unwrap(), document);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let payload = VersionPayload::Gzip(vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(decode(&payload).is_err());
    }
}

//! Dataset payload filters: chunked zstd compression and CRC32 checksums.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::options::{Compression, StorageOptions};
use crate::path::NodePath;

/// A dataset payload as held by a store, after filters have been applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilteredPayload {
    compressed: bool,
    /// Uncompressed length in bytes.
    raw_len: u64,
    crc32: Option<u32>,
    chunks: Vec<Vec<u8>>,
}

impl FilteredPayload {
    /// Apply the filters in `options` to `raw`.
    pub fn encode(raw: &[u8], options: &StorageOptions) -> StoreResult<Self> {
        let crc32 = options.checksum.then(|| crc32fast::hash(raw));
        let chunk_len = options.chunk_len.filter(|&n| n > 0).unwrap_or(raw.len().max(1));
        let (compressed, chunks) = match options.compression {
            Compression::None => (false, vec![raw.to_vec()]),
            Compression::Zstd { level } => {
                let chunks = raw
                    .chunks(chunk_len)
                    .map(|chunk| {
                        zstd::encode_all(chunk, level)
                            .map_err(|e| StoreError::CompressionFailed(e.to_string()))
                    })
                    .collect::<StoreResult<Vec<_>>>()?;
                (true, chunks)
            }
        };
        Ok(Self {
            compressed,
            raw_len: raw.len() as u64,
            crc32,
            chunks,
        })
    }

    /// Reverse the filters, verifying the checksum if one was recorded.
    pub fn decode(&self, path: &NodePath) -> StoreResult<Vec<u8>> {
        // `raw_len` comes from the file; size the buffer from what is held.
        let capacity = usize::try_from(self.raw_len)
            .unwrap_or(usize::MAX)
            .min(self.stored_len());
        let mut raw = Vec::with_capacity(capacity);
        for chunk in &self.chunks {
            if self.compressed {
                let plain = zstd::decode_all(chunk.as_slice()).map_err(|e| {
                    StoreError::DecompressionFailed {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                raw.extend_from_slice(&plain);
            } else {
                raw.extend_from_slice(chunk);
            }
        }
        if raw.len() as u64 != self.raw_len {
            return Err(StoreError::DecompressionFailed {
                path: path.clone(),
                reason: format!("expected {} bytes, got {}", self.raw_len, raw.len()),
            });
        }
        if let Some(expected) = self.crc32 {
            let computed = crc32fast::hash(&raw);
            if computed != expected {
                return Err(StoreError::ChecksumMismatch {
                    path: path.clone(),
                    expected,
                    computed,
                });
            }
        }
        Ok(raw)
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes held after filtering.
    pub fn stored_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&mut self) {
        if let Some(byte) = self.chunks.iter_mut().flat_map(|c| c.iter_mut()).next() {
            *byte ^= 0xff;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path() -> NodePath {
        NodePath::parse("/data").unwrap()
    }

    #[test]
    fn passthrough_without_filters() {
        let p = FilteredPayload::encode(b"abc", &StorageOptions::default()).unwrap();
        assert!(!p.is_compressed());
        assert_eq!(p.decode(&path()).unwrap(), b"abc");
    }

    #[test]
    fn zstd_chunks_roundtrip() {
        let raw: Vec<u8> = (0..10_000u32).map(|i| (i % 7) as u8).collect();
        let opts = StorageOptions::zstd(3).with_chunk_len(1024);
        let p = FilteredPayload::encode(&raw, &opts).unwrap();
        assert_eq!(p.chunk_count(), 10);
        assert!(p.stored_len() < raw.len());
        assert_eq!(p.decode(&path()).unwrap(), raw);
    }

    #[test]
    fn empty_payload_compresses() {
        let p = FilteredPayload::encode(&[], &StorageOptions::zstd(1)).unwrap();
        assert_eq!(p.decode(&path()).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn checksum_detects_corruption() {
        let mut p =
            FilteredPayload::encode(b"payload", &StorageOptions::default().with_checksum(true))
                .unwrap();
        p.corrupt_for_test();
        assert!(matches!(
            p.decode(&path()),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn oversized_recorded_length_is_an_error() {
        let mut p = FilteredPayload::encode(b"abc", &StorageOptions::zstd(1)).unwrap();
        p.raw_len = u64::MAX;
        let err = p.decode(&path()).unwrap_err();
        assert!(matches!(err, StoreError::DecompressionFailed { ref reason, .. } if reason.contains("got 3")));
    }

    proptest! {
        #[test]
        fn filters_are_transparent(
            raw in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk in 1usize..600,
            compress in any::<bool>(),
            checksum in any::<bool>(),
        ) {
            let mut opts = if compress { StorageOptions::zstd(1) } else { StorageOptions::default() };
            opts = opts.with_checksum(checksum).with_chunk_len(chunk);
            let payload = FilteredPayload::encode(&raw, &opts).unwrap();
            prop_assert_eq!(payload.decode(&path()).unwrap(), raw);
        }
    }
}

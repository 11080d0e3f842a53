use serde::{Deserialize, Serialize};

/// Compression filter applied to dataset payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zstd {
        #[serde(default = "default_zstd_level")]
        level: i32,
    },
}

fn default_zstd_level() -> i32 {
    3
}

/// Per-dataset storage filters.
///
/// Options are forwarded verbatim from the caller to every data node an
/// encoder creates; scalar encoders drop them via
/// [`StorageOptions::without_filters`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub compression: Compression,
    /// Record a CRC32 of the uncompressed payload and verify it on read.
    pub checksum: bool,
    /// Compress in chunks of this many bytes instead of one block.
    pub chunk_len: Option<usize>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            checksum: false,
            chunk_len: None,
        }
    }
}

impl StorageOptions {
    /// Zstd compression at `level`.
    pub fn zstd(level: i32) -> Self {
        Self {
            compression: Compression::Zstd { level },
            ..Self::default()
        }
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = Some(chunk_len);
        self
    }

    /// The same options with every filter stripped.
    pub fn without_filters(&self) -> Self {
        Self::default()
    }

    pub fn has_filters(&self) -> bool {
        self.compression != Compression::None || self.checksum
    }
}

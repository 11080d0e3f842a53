//! Single-file persistence of a node tree.
//!
//! # File layout
//!
//! ```text
//! "HKLC"            4 bytes magic
//! version           u32 big-endian
//! body_len          u64 big-endian
//! body              bincode Vec<(NodePath, NodeRecord)>
//! checksum          32-byte BLAKE3 of everything above
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attrs::{AttrValue, Attrs};
use crate::dataset::Dataset;
use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryNodeStore, NodeRecord};
use crate::options::StorageOptions;
use crate::path::NodePath;
use crate::traits::{NodeKind, NodeStore};

const MAGIC: &[u8; 4] = b"HKLC";
const CONTAINER_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8;
const TRAILER_LEN: usize = 32;

/// How a container file is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Existing file, read-only.
    Read,
    /// Truncate or create.
    Write,
    /// Open an existing file for update, or create it.
    Append,
}

impl std::str::FromStr for OpenMode {
    type Err = StoreError;

    /// Accepts the short forms `r`, `w` and `a` as well as full names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            "a" | "append" => Ok(OpenMode::Append),
            other => Err(StoreError::InvalidContainer(format!(
                "unknown open mode {other:?}"
            ))),
        }
    }
}

/// Encoder and decoder for the container byte format.
pub struct ContainerFile;

impl ContainerFile {
    /// Serialize a store into container bytes.
    pub fn encode(store: &InMemoryNodeStore) -> StoreResult<Vec<u8>> {
        let records: Vec<(&NodePath, &NodeRecord)> = store.records().collect();
        let body =
            bincode::serialize(&records).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len() + TRAILER_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&CONTAINER_VERSION.to_be_bytes());
        out.extend_from_slice(&(body.len() as u64).to_be_bytes());
        out.extend_from_slice(&body);

        let checksum = *blake3::hash(&out).as_bytes();
        out.extend_from_slice(&checksum);
        Ok(out)
    }

    /// Parse container bytes, verifying magic, version and checksum.
    pub fn decode(data: &[u8]) -> StoreResult<InMemoryNodeStore> {
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(StoreError::InvalidContainer(format!(
                "file too short: {} bytes",
                data.len()
            )));
        }
        if &data[0..4] != MAGIC {
            return Err(StoreError::InvalidContainer(format!(
                "bad magic: expected {:?}, got {:?}",
                String::from_utf8_lossy(MAGIC),
                String::from_utf8_lossy(&data[0..4])
            )));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != CONTAINER_VERSION {
            return Err(StoreError::InvalidContainer(format!(
                "unsupported container version {version}"
            )));
        }

        let content_end = data.len() - TRAILER_LEN;
        let computed = blake3::hash(&data[..content_end]);
        if computed.as_bytes() != &data[content_end..] {
            return Err(StoreError::InvalidContainer("checksum mismatch".into()));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&data[8..16]);
        let body_len = u64::from_be_bytes(len_bytes) as usize;
        if HEADER_LEN + body_len != content_end {
            return Err(StoreError::InvalidContainer(format!(
                "body length {body_len} does not match file size"
            )));
        }

        let records: Vec<(NodePath, NodeRecord)> =
            bincode::deserialize(&data[HEADER_LEN..content_end])
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
        InMemoryNodeStore::from_records(records)
    }
}

/// A node store persisted to a single container file.
///
/// The tree is held in memory and written out by [`FileNodeStore::flush`].
/// A writable store with unsaved changes flushes itself when dropped;
/// failures at that point can only be logged, so call `flush` explicitly
/// when the outcome matters.
pub struct FileNodeStore {
    path: PathBuf,
    mode: OpenMode,
    inner: InMemoryNodeStore,
    dirty: bool,
}

impl FileNodeStore {
    /// Open `path` in `mode`.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (inner, dirty) = match mode {
            OpenMode::Read => {
                let mut inner = ContainerFile::decode(&std::fs::read(&path)?)?;
                inner.set_read_only(true);
                (inner, false)
            }
            OpenMode::Write => (InMemoryNodeStore::new(), true),
            OpenMode::Append => {
                if path.exists() {
                    (ContainerFile::decode(&std::fs::read(&path)?)?, false)
                } else {
                    (InMemoryNodeStore::new(), true)
                }
            }
        };
        info!(path = %path.display(), ?mode, nodes = inner.len(), "container opened");
        let mut store = Self {
            path,
            mode,
            inner,
            dirty,
        };
        if mode == OpenMode::Write {
            // Truncate immediately so a failed dump never leaves stale content.
            store.flush()?;
        }
        Ok(store)
    }

    /// Write the tree to disk if it changed since the last flush.
    pub fn flush(&mut self) -> StoreResult<()> {
        if self.inner.is_read_only() || !self.dirty {
            return Ok(());
        }
        let bytes = ContainerFile::encode(&self.inner)?;
        std::fs::write(&self.path, &bytes)?;
        self.dirty = false;
        info!(path = %self.path.display(), bytes = bytes.len(), "container flushed");
        Ok(())
    }

    /// Flush and release the file.
    pub fn close(mut self) -> StoreResult<()> {
        self.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether there are changes not yet flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn touch(&mut self) {
        self.dirty = true;
    }
}

impl NodeStore for FileNodeStore {
    fn create_group(&mut self, path: &NodePath) -> StoreResult<()> {
        self.inner.create_group(path)?;
        self.touch();
        Ok(())
    }

    fn create_dataset(
        &mut self,
        path: &NodePath,
        dataset: &Dataset,
        options: &StorageOptions,
    ) -> StoreResult<()> {
        self.inner.create_dataset(path, dataset, options)?;
        self.touch();
        Ok(())
    }

    fn read_dataset(&self, path: &NodePath) -> StoreResult<Dataset> {
        self.inner.read_dataset(path)
    }

    fn node_kind(&self, path: &NodePath) -> StoreResult<Option<NodeKind>> {
        self.inner.node_kind(path)
    }

    fn children(&self, path: &NodePath) -> StoreResult<Vec<String>> {
        self.inner.children(path)
    }

    fn attrs(&self, path: &NodePath) -> StoreResult<Attrs> {
        self.inner.attrs(path)
    }

    fn set_attr(&mut self, path: &NodePath, name: &str, value: AttrValue) -> StoreResult<()> {
        self.inner.set_attr(path, name, value)?;
        self.touch();
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }
}

impl Drop for FileNodeStore {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush container on drop");
        } else {
            debug!(path = %self.path.display(), "container flushed on drop");
        }
    }
}

impl std::fmt::Debug for FileNodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileNodeStore")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("node_count", &self.inner.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn sample_store() -> InMemoryNodeStore {
        let mut store = InMemoryNodeStore::new();
        store.create_group(&p("/data")).unwrap();
        store
            .create_dataset(
                &p("/data/x"),
                &Dataset::from_slice(&[1i64, 2, 3]),
                &StorageOptions::zstd(3),
            )
            .unwrap();
        store
            .set_attr(&p("/data"), "type", "builtins.list".into())
            .unwrap();
        store
    }

    // -----------------------------------------------------------------------
    // Byte format
    // -----------------------------------------------------------------------

    #[test]
    fn encode_decode_roundtrip() {
        let store = sample_store();
        let bytes = ContainerFile::encode(&store).unwrap();
        assert_eq!(&bytes[0..4], b"HKLC");
        let back = ContainerFile::decode(&bytes).unwrap();
        assert_eq!(back.paths(), store.paths());
        assert_eq!(
            back.read_dataset(&p("/data/x")).unwrap().to_elements::<i64>().unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(back.attrs(&p("/data")).unwrap().get_str("type"), Some("builtins.list"));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = ContainerFile::encode(&sample_store()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            ContainerFile::decode(&bytes),
            Err(StoreError::InvalidContainer(_))
        ));
    }

    #[test]
    fn flipped_body_byte_fails_checksum() {
        let mut bytes = ContainerFile::encode(&sample_store()).unwrap();
        let mid = HEADER_LEN + 3;
        bytes[mid] ^= 0x01;
        let err = ContainerFile::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn truncated_file_rejected() {
        assert!(ContainerFile::decode(b"HKLC").is_err());
    }

    // -----------------------------------------------------------------------
    // File modes
    // -----------------------------------------------------------------------

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.hkl");
        {
            let mut store = FileNodeStore::open(&path, OpenMode::Write).unwrap();
            store.create_group(&p("/g")).unwrap();
            store.close().unwrap();
        }
        let store = FileNodeStore::open(&path, OpenMode::Read).unwrap();
        assert!(store.is_read_only());
        assert_eq!(store.children(&NodePath::root()).unwrap(), vec!["g"]);
    }

    #[test]
    fn read_mode_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro.hkl");
        FileNodeStore::open(&path, OpenMode::Write).unwrap().close().unwrap();
        let mut store = FileNodeStore::open(&path, OpenMode::Read).unwrap();
        assert!(matches!(store.create_group(&p("/g")), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn read_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = FileNodeStore::open(dir.path().join("nope.hkl"), OpenMode::Read).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn append_keeps_existing_nodes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.hkl");
        {
            let mut store = FileNodeStore::open(&path, OpenMode::Append).unwrap();
            store.create_group(&p("/first")).unwrap();
        }
        {
            let mut store = FileNodeStore::open(&path, OpenMode::Append).unwrap();
            store.create_group(&p("/second")).unwrap();
        }
        let store = FileNodeStore::open(&path, OpenMode::Read).unwrap();
        assert_eq!(store.children(&NodePath::root()).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn write_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.hkl");
        {
            let mut store = FileNodeStore::open(&path, OpenMode::Write).unwrap();
            store.create_group(&p("/old")).unwrap();
        }
        FileNodeStore::open(&path, OpenMode::Write).unwrap().close().unwrap();
        let store = FileNodeStore::open(&path, OpenMode::Read).unwrap();
        assert!(store.children(&NodePath::root()).unwrap().is_empty());
    }

    #[test]
    fn open_mode_short_forms() {
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert_eq!("a".parse::<OpenMode>().unwrap(), OpenMode::Append);
        assert_eq!("read".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert!("x".parse::<OpenMode>().is_err());
    }
}

//! File persistence for documents.
//!
//! A saved document is the CBOR-encoded register state, zstd-compressed,
//! with a SHA-256 hex digest in a `<file>.sha256` sidecar. Loading verifies
//! the digest when the sidecar is present and fails closed on mismatch.

use std::io::{Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::doc::{DocUpdate, Document};

/// Errors from document file persistence.
#[derive(Debug, thiserror::Error)]
pub enum DocStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
}

/// Write a document's full state to `path`, plus the integrity sidecar.
pub fn save_document(doc: &Document, path: &Path) -> Result<(), DocStoreError> {
    let update = doc.export();
    let mut cbor = Vec::new();
    ciborium::into_writer(&update, &mut cbor)
        .map_err(|e| DocStoreError::CborEncode(e.to_string()))?;
    let compressed = zstd_compress(&cbor)?;

    std::fs::write(path, &compressed)?;
    std::fs::write(sidecar_path(path), sha256_hex(&compressed))?;
    tracing::debug!(path = %path.display(), registers = update.len(), "document saved");
    Ok(())
}

/// Load a document from `path` as replica `replica`.
///
/// The register stamps in the file are preserved, so a write made after
/// loading wins over everything the file contained.
pub fn load_document(path: &Path, replica: u64) -> Result<Document, DocStoreError> {
    let compressed = std::fs::read(path)?;

    let sidecar = sidecar_path(path);
    if sidecar.exists() {
        let expected = std::fs::read_to_string(&sidecar)?.trim().to_string();
        let actual = sha256_hex(&compressed);
        if expected != actual {
            return Err(DocStoreError::IntegrityMismatch { expected, actual });
        }
    }

    let cbor = zstd_decompress(&compressed)?;
    let update: DocUpdate =
        ciborium::from_reader(cbor.as_slice()).map_err(|e| DocStoreError::CborDecode(e.to_string()))?;
    Ok(Document::from_update(replica, &update))
}

fn sidecar_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sha256");
    std::path::PathBuf::from(name)
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, DocStoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, DocStoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::DocPath;
    use serde_json::json;

    #[test]
    fn save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("scene.cospace");

        let doc = Document::new(1);
        doc.mutate(None, |tx| {
            tx.write(DocPath::new(["a", "b"]), json!(1.5));
            tx.write(DocPath::new(["a", "c"]), json!("text"));
        });
        doc.mutate(None, |tx| tx.delete(DocPath::new(["a", "c"])));

        save_document(&doc, &file).unwrap();
        let loaded = load_document(&file, 2).unwrap();

        assert_eq!(loaded.read(&DocPath::new(["a", "b"])), Some(json!(1.5)));
        assert_eq!(loaded.read(&DocPath::new(["a", "c"])), None);
        // Tombstones are preserved, not just live values.
        assert_eq!(loaded.export().len(), doc.export().len());
    }

    #[test]
    fn corruption_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("scene.cospace");

        let doc = Document::new(1);
        doc.mutate(None, |tx| tx.write(DocPath::new(["k"]), json!(1)));
        save_document(&doc, &file).unwrap();

        let mut data = std::fs::read(&file).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&file, &data).unwrap();

        assert!(matches!(
            load_document(&file, 2),
            Err(DocStoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn load_without_sidecar_skips_verification() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("scene.cospace");

        let doc = Document::new(1);
        doc.mutate(None, |tx| tx.write(DocPath::new(["k"]), json!(1)));
        save_document(&doc, &file).unwrap();
        std::fs::remove_file(super::sidecar_path(&file)).unwrap();

        let loaded = load_document(&file, 2).unwrap();
        assert_eq!(loaded.read(&DocPath::new(["k"])), Some(json!(1)));
    }

    #[test]
    fn loaded_replica_wins_future_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("scene.cospace");

        let original = Document::new(1);
        original.mutate(None, |tx| tx.write(DocPath::new(["k"]), json!("old")));
        save_document(&original, &file).unwrap();

        let loaded = load_document(&file, 2).unwrap();
        loaded.mutate(None, |tx| tx.write(DocPath::new(["k"]), json!("new")));

        original.merge_from(&loaded);
        assert_eq!(original.read(&DocPath::new(["k"])), Some(json!("new")));
    }
}

//! Content Hasher & File Store
//!
//! Stable content hashing and crash-safe atomic reads/writes for every
//! on-disk artifact the harness owns. No other module should touch its
//! own state files through raw `std::fs` calls once this module covers
//! the path — a hash mismatch across a session boundary means something
//! mutated a file the harness did not authorize.

use crate::harness::error::{HarnessError, HarnessResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Printable width used for catalog/checkpoint manifest digests.
pub const SHORT_DIGEST_LEN: usize = 16;

/// A BLAKE3 digest, retained in full width for byte-for-byte comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Full 64-character hex encoding.
    pub fn to_hex(self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Hex encoding truncated to [`SHORT_DIGEST_LEN`] characters, suitable
    /// for catalog/checkpoint manifests where a shorter printable id is
    /// preferred over full collision resistance.
    pub fn to_short_hex(self) -> String {
        self.to_hex()[..SHORT_DIGEST_LEN].to_string()
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash arbitrary bytes.
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    Digest(*blake3::hash(bytes).as_bytes())
}

/// Hash a string (e.g. the serialized form of an artifact).
pub fn hash_str(s: &str) -> Digest {
    hash_bytes(s.as_bytes())
}

/// Hash the contents of a set of test identifiers (order-independent: the
/// set is sorted before hashing, satisfying the Baseline Store's
/// "content-addressed by a hash of its sorted test-id set" requirement).
pub fn hash_id_set<I, S>(ids: I) -> Digest
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sorted: BTreeSet<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
    let joined = sorted.into_iter().collect::<Vec<_>>().join("\n");
    hash_str(&joined)
}

/// Hash the current contents of a file on disk.
pub fn hash_file(path: impl AsRef<Path>) -> HarnessResult<Digest> {
    let bytes = std::fs::read(path.as_ref())?;
    Ok(hash_bytes(&bytes))
}

/// Read a file's full contents.
pub fn read(path: impl AsRef<Path>) -> HarnessResult<Vec<u8>> {
    Ok(std::fs::read(path.as_ref())?)
}

/// Read a file's contents as UTF-8.
pub fn read_to_string(path: impl AsRef<Path>) -> HarnessResult<String> {
    Ok(std::fs::read_to_string(path.as_ref())?)
}

/// Write bytes to `path` using write-temp-then-rename, the crash-safe
/// pattern used throughout the harness for persisted artifacts.
pub fn write(path: impl AsRef<Path>, bytes: &[u8]) -> HarnessResult<()> {
    let path = path.as_ref();
    let tmp_path = tmp_sibling(path);
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Write a string to `path`, atomically.
pub fn write_str(path: impl AsRef<Path>, content: &str) -> HarnessResult<()> {
    write(path, content.as_bytes())
}

/// Copy a file to `dest`, atomically (copy-to-temp then rename).
pub fn copy_atomic(src: impl AsRef<Path>, dest: impl AsRef<Path>) -> HarnessResult<()> {
    let dest = dest.as_ref();
    let tmp_path = tmp_sibling(dest);
    std::fs::copy(src.as_ref(), &tmp_path).map_err(|e| {
        HarnessError::Io(std::io::Error::new(
            e.kind(),
            format!("copy {} -> {}: {e}", src.as_ref().display(), dest.display()),
        ))
    })?;
    std::fs::rename(&tmp_path, dest)?;
    Ok(())
}

/// Verify that the current contents of `path` still hash to `expected`.
/// Returns `Ok(())` on match, `Err` naming the mismatch otherwise.
pub fn verify(path: impl AsRef<Path>, expected: Digest) -> HarnessResult<()> {
    let actual = hash_file(path.as_ref())?;
    if actual != expected {
        return Err(HarnessError::validation(format!(
            "hash mismatch for {}: expected {}, got {}",
            path.as_ref().display(),
            expected.to_short_hex(),
            actual.to_short_hex()
        )));
    }
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = tmp
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    tmp.set_file_name(format!("{file_name}.tmp"));
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn digest_is_stable_and_truncated() {
        let a = hash_str("hello world");
        let b = hash_str("hello world");
        assert_eq!(a, b);
        assert_eq!(a.to_short_hex().len(), SHORT_DIGEST_LEN);
        assert!(a.to_hex().starts_with(&a.to_short_hex()));
    }

    #[test]
    fn different_content_different_digest() {
        assert_ne!(hash_str("a"), hash_str("b"));
    }

    #[test]
    fn id_set_hash_is_order_independent() {
        let a = hash_id_set(["test_1", "test_2", "test_3"]);
        let b = hash_id_set(["test_3", "test_1", "test_2"]);
        assert_eq!(a, b);

        let c = hash_id_set(["test_1", "test_2"]);
        assert_ne!(a, c);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        write_str(&path, "{\"a\":1}").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "{\"a\":1}");
        // no stray temp file left behind
        assert!(!dir.path().join("artifact.json.tmp").exists());
    }

    #[test]
    fn verify_detects_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        write_str(&path, "original").unwrap();
        let digest = hash_file(&path).unwrap();
        verify(&path, digest).unwrap();

        write_str(&path, "mutated").unwrap();
        assert!(verify(&path, digest).is_err());
    }

    #[test]
    fn copy_atomic_preserves_content() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        write_str(&src, "payload").unwrap();
        copy_atomic(&src, &dest).unwrap();
        assert_eq!(read_to_string(&dest).unwrap(), "payload");
    }
}

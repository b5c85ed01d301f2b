//! Local filesystem storage for uploaded files.
//!
//! Every file lives directly under a single storage root and is addressed by
//! its stored name. There is no metadata beyond what the filesystem keeps.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use tokio::fs;
use tokio::io::{self, AsyncRead, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::error::StorageError;

const TEMP_PREFIX: &str = ".upload-";

/// What `store` does when a file with the requested name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Replace the existing file. Last writer wins.
    #[default]
    Overwrite,
    /// Keep the existing file and store under `<stem>-<ulid>.<ext>`.
    Rename,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "rename" => Ok(CollisionPolicy::Rename),
            other => Err(format!("unknown collision policy: {other}")),
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionPolicy::Overwrite => f.write_str("overwrite"),
            CollisionPolicy::Rename => f.write_str("rename"),
        }
    }
}

/// An opened stored file, ready to be streamed.
#[derive(Debug)]
pub struct StoredFile {
    /// Final path component, used for `Content-Disposition`.
    pub name: String,
    pub path: PathBuf,
    pub file: fs::File,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    policy: CollisionPolicy,
}

impl FileStorage {
    /// Creates the storage root if needed. The root is canonicalized so
    /// containment checks in `load` compare like with like.
    pub fn new(root: impl AsRef<Path>, policy: CollisionPolicy) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let display = root.display().to_string();

        std::fs::create_dir_all(root).map_err(|e| StorageError::failure(&display, e))?;
        let root = root
            .canonicalize()
            .map_err(|e| StorageError::failure(&display, e))?;

        info!(root = %root.display(), %policy, "file storage ready");
        Ok(FileStorage { root, policy })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the whole of `reader` under `file_name` and returns the name the
    /// file can be loaded by.
    ///
    /// Bytes go to a temporary file in the root first and are renamed into
    /// place once complete, so concurrent readers see either the old content
    /// or the new one.
    pub async fn store<R>(&self, file_name: &str, mut reader: R) -> Result<String, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        validate_file_name(file_name)?;

        let stored_name = match self.policy {
            CollisionPolicy::Overwrite => file_name.to_string(),
            CollisionPolicy::Rename => {
                let exists = fs::try_exists(self.root.join(file_name))
                    .await
                    .map_err(|e| StorageError::failure(file_name, e))?;
                if exists {
                    disambiguate(file_name)
                } else {
                    file_name.to_string()
                }
            }
        };
        let target = self.root.join(&stored_name);
        let fail = |e: std::io::Error| {
            error!(file = %stored_name, error = %e, "failed to store file");
            StorageError::failure(&stored_name, e)
        };

        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.root)
            .map_err(fail)?;
        let (std_file, temp_path) = temp.into_parts();

        let mut file = fs::File::from_std(std_file);
        let written = io::copy(&mut reader, &mut file).await.map_err(fail)?;
        file.flush().await.map_err(fail)?;
        file.sync_all().await.map_err(fail)?;
        drop(file);

        temp_path.persist(&target).map_err(|e| fail(e.error))?;

        info!(file = %stored_name, bytes = written, "stored file");
        Ok(stored_name)
    }

    /// Opens a previously stored file. Anything that does not resolve to a
    /// regular file inside the root is reported as `NotFound`.
    pub async fn load(&self, file_name: &str) -> Result<StoredFile, StorageError> {
        let not_found = || StorageError::NotFound(file_name.to_string());

        let path = self.resolve(file_name).await.ok_or_else(not_found)?;
        let file = fs::File::open(&path).await.map_err(|_| not_found())?;
        let metadata = file.metadata().await.map_err(|_| not_found())?;
        if !metadata.is_file() {
            warn!(file = %file_name, "refusing to serve non-regular file");
            return Err(not_found());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());

        info!(file = %file_name, bytes = metadata.len(), "loaded file");
        Ok(StoredFile {
            name,
            path,
            file,
            size: metadata.len(),
        })
    }

    async fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let relative = Path::new(file_name);
        let lexically_safe = !file_name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !lexically_safe {
            warn!(file = %file_name, "rejected path outside storage root");
            return None;
        }

        // Symlinks can still point elsewhere, so check the real path too.
        let resolved = fs::canonicalize(self.root.join(relative)).await.ok()?;
        if !resolved.starts_with(&self.root) {
            warn!(file = %file_name, "rejected path outside storage root");
            return None;
        }
        Some(resolved)
    }
}

/// A stored name must be a single plain entry directly under the root.
fn validate_file_name(file_name: &str) -> Result<(), StorageError> {
    let valid = !file_name.is_empty()
        && file_name != "."
        && file_name != ".."
        && !file_name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        warn!(file = %file_name, "rejected upload file name");
        Err(StorageError::InvalidFileName(file_name.to_string()))
    }
}

fn disambiguate(file_name: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let id = ulid::Ulid::new();

    match path.extension() {
        Some(ext) => format!("{stem}-{id}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(storage: &FileStorage, name: &str) -> Vec<u8> {
        let mut stored = storage.load(name).await.unwrap();
        let mut buf = Vec::new();
        stored.file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn store_then_load_returns_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), CollisionPolicy::Overwrite).unwrap();

        let name = storage.store("test.txt", &b"hello world"[..]).await.unwrap();
        assert_eq!(name, "test.txt");

        let stored = storage.load("test.txt").await.unwrap();
        assert_eq!(stored.size, 11);
        assert_eq!(stored.name, "test.txt");
        assert_eq!(read_all(&storage, "test.txt").await, b"hello world");
        assert_eq!(read_all(&storage, "test.txt").await, b"hello world");
    }

    #[tokio::test]
    async fn new_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("uploads");
        let storage = FileStorage::new(&root, CollisionPolicy::Overwrite).unwrap();
        assert!(storage.root().is_dir());
    }

    #[tokio::test]
    async fn overwrite_policy_keeps_last_write() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), CollisionPolicy::Overwrite).unwrap();

        storage.store("dup.bin", &b"first"[..]).await.unwrap();
        let name = storage.store("dup.bin", &b"second"[..]).await.unwrap();

        assert_eq!(name, "dup.bin");
        assert_eq!(read_all(&storage, "dup.bin").await, b"second");
    }

    #[tokio::test]
    async fn rename_policy_keeps_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), CollisionPolicy::Rename).unwrap();

        let first = storage.store("dup.bin", &b"first"[..]).await.unwrap();
        let second = storage.store("dup.bin", &b"second"[..]).await.unwrap();

        assert_eq!(first, "dup.bin");
        assert_ne!(second, "dup.bin");
        assert!(second.starts_with("dup-") && second.ends_with(".bin"));
        assert_eq!(read_all(&storage, &first).await, b"first");
        assert_eq!(read_all(&storage, &second).await, b"second");
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), CollisionPolicy::Overwrite).unwrap();
        storage.store("a.txt", &b"a"[..]).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(storage.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn store_rejects_names_that_leave_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), CollisionPolicy::Overwrite).unwrap();

        for name in ["", ".", "..", "../evil.txt", "a/b.txt", "a\\b.txt"] {
            let err = storage.store(name, &b"x"[..]).await.unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidFileName(_)),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn store_into_removed_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gone");
        let storage = FileStorage::new(&root, CollisionPolicy::Overwrite).unwrap();
        std::fs::remove_dir(&root).unwrap();

        let err = storage.store("a.txt", &b"x"[..]).await.unwrap_err();
        assert!(matches!(err, StorageError::Failure { .. }));
    }

    #[tokio::test]
    async fn load_unknown_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), CollisionPolicy::Overwrite).unwrap();

        let err = storage.load("missing.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(name) if name == "missing.txt"));
    }

    #[tokio::test]
    async fn load_rejects_traversal_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        let storage = FileStorage::new(&root, CollisionPolicy::Overwrite).unwrap();

        let secret = dir.path().join("secret.txt");
        for name in [
            "../secret.txt",
            "sub/../../secret.txt",
            secret.to_str().unwrap(),
            "sub",
            "",
        ] {
            let err = storage.load(name).await.unwrap_err();
            assert!(
                matches!(err, StorageError::NotFound(_)),
                "{name:?} should not resolve"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn load_rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.txt")).unwrap();
        let storage = FileStorage::new(&root, CollisionPolicy::Overwrite).unwrap();

        let err = storage.load("link.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn disambiguate_keeps_extension() {
        let name = disambiguate("report.final.pdf");
        assert!(name.starts_with("report.final-"));
        assert!(name.ends_with(".pdf"));

        let bare = disambiguate("README");
        assert!(bare.starts_with("README-"));
        assert!(!bare.contains('.'));
    }

    #[test]
    fn collision_policy_parses_case_insensitively() {
        assert_eq!("Rename".parse(), Ok(CollisionPolicy::Rename));
        assert_eq!("overwrite".parse(), Ok(CollisionPolicy::Overwrite));
        assert!("skip".parse::<CollisionPolicy>().is_err());
    }
}

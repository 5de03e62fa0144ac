use std::io::{ErrorKind, SeekFrom};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::core::{Backend, Result, StreamError};

/// Files under a local directory. Mostly useful for a mounted remote
/// (e.g. `rclone mount`) and for development.
pub struct LocalBackend {
    root: PathBuf,
    label: String,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = root.display().to_string();
        Self { root, label }
    }

    /// Map a request path below `root`. Anything that could climb out of
    /// the root is treated as missing.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(StreamError::NotFound(path.to_string())),
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn size(&self, path: &str) -> Result<u64> {
        let full = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&full).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StreamError::NotFound(path.to_string()),
            _ => StreamError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(StreamError::NotFound(path.to_string()));
        }
        Ok(metadata.len())
    }

    async fn fetch_chunk(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        let full = self.resolve(path)?;
        let failed = |e: std::io::Error| StreamError::FetchFailed(format!("{path}: {e}"));

        let mut file = tokio::fs::File::open(&full).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StreamError::NotFound(path.to_string()),
            _ => failed(e),
        })?;
        file.seek(SeekFrom::Start(offset)).await.map_err(failed)?;

        let mut buf = BytesMut::with_capacity(length as usize);
        let mut limited = file.take(length);
        while (buf.len() as u64) < length {
            let n = limited.read_buf(&mut buf).await.map_err(failed)?;
            if n == 0 {
                break;
            }
        }
        Ok(buf.freeze())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shows")).unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        std::fs::write(dir.path().join("shows/ep1.mkv"), data).unwrap();
        let backend = LocalBackend::new(dir.path());
        (dir, backend)
    }

    #[tokio::test]
    async fn size_of_existing_file() {
        let (_dir, backend) = fixture();
        assert_eq!(backend.size("shows/ep1.mkv").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn missing_and_directories_are_not_found() {
        let (_dir, backend) = fixture();
        assert!(matches!(
            backend.size("shows/ep2.mkv").await,
            Err(StreamError::NotFound(_))
        ));
        assert!(matches!(
            backend.size("shows").await,
            Err(StreamError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn refuses_to_leave_root() {
        let (_dir, backend) = fixture();
        assert!(matches!(
            backend.size("../etc/passwd").await,
            Err(StreamError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reads_window_and_short_tail() {
        let (_dir, backend) = fixture();
        let chunk = backend.fetch_chunk("shows/ep1.mkv", 256, 4).await.unwrap();
        assert_eq!(&chunk[..], &[0, 1, 2, 3]);

        let tail = backend.fetch_chunk("/shows/ep1.mkv", 990, 64).await.unwrap();
        assert_eq!(tail.len(), 10);
    }
}

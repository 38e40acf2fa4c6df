//! Atomic, locked writes of the rendered interface file to its working
//! copy and (best-effort) the privileged system path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{ConfigError, Result};

/// Serializes writes to the working copy and privileged path so two
/// concurrent renders never interleave a write-temp-then-rename.
#[derive(Debug, Clone)]
pub struct ConfigWriter {
    working_path: PathBuf,
    system_path: Option<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ConfigWriter {
    /// Creates a writer targeting `working_path`, and optionally a
    /// privileged `system_path` that receives a best-effort mirrored write.
    #[must_use]
    pub fn new(working_path: impl Into<PathBuf>, system_path: Option<PathBuf>) -> Self {
        Self {
            working_path: working_path.into(),
            system_path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Writes `contents` to the working copy atomically (write-temp, then
    /// rename), and, if a privileged system path was configured and is
    /// writable, mirrors the same contents there with file mode `0o600`.
    ///
    /// Permission errors on the system-path write are swallowed; any other
    /// I/O error propagates. Errors writing the working copy always
    /// propagate.
    pub async fn write(&self, contents: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        write_atomic(&self.working_path, contents).await?;

        if let Some(ref system_path) = self.system_path {
            match write_atomic(system_path, contents).await {
                Ok(()) => {}
                Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::PermissionDenied => {
                    tracing::warn!(
                        path = %system_path.display(),
                        "permission denied writing privileged config path, skipping"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        Ok(())
    }
}

async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");

    fs::write(&tmp_path, contents)
        .await
        .map_err(|source| ConfigError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|source| ConfigError::Io {
                path: tmp_path.display().to_string(),
                source,
            })?;
    }

    fs::rename(&tmp_path, path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_working_copy_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("wg0.conf");
        let writer = ConfigWriter::new(working.clone(), None);

        writer.write("hello").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&working).await.unwrap(), "hello");
        assert!(!working.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn rewriting_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("wg0.conf");
        let writer = ConfigWriter::new(working.clone(), None);

        writer.write("first").await.unwrap();
        writer.write("second").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&working).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn mirrors_to_system_path_when_writable() {
        let dir = tempfile::tempdir().unwrap();
        let working = dir.path().join("wg0.conf");
        let system = dir.path().join("etc_wg0.conf");
        let writer = ConfigWriter::new(working, Some(system.clone()));

        writer.write("mirrored").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&system).await.unwrap(), "mirrored");
    }
}

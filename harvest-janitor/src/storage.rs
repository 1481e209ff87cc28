use std::io;
use std::path::PathBuf;

use thiserror::Error;

const SHARE_SCHEME: &str = "share://";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("share path without {SHARE_SCHEME} scheme: {0}")]
    UnknownScheme(String),
    #[error("could not remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Physical storage behind the graph's `share://` namespace: a directory
/// mount with the scheme prefix substituted.
#[derive(Debug, Clone)]
pub struct ShareStorage {
    mount: PathBuf,
}

impl ShareStorage {
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        ShareStorage {
            mount: mount.into(),
        }
    }

    pub fn resolve(&self, share_path: &str) -> Option<PathBuf> {
        share_path
            .strip_prefix(SHARE_SCHEME)
            .map(|rest| self.mount.join(rest))
    }

    /// Remove the physical file behind a share path. A file that is already
    /// gone counts as removed.
    pub async fn remove_file(&self, share_path: &str) -> Result<(), StorageError> {
        let Some(path) = self.resolve(share_path) else {
            return Err(StorageError::UnknownScheme(share_path.to_owned()));
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove { path, source }),
        }
    }

    /// Best-effort removal of a job's working directory once its graph
    /// structure is gone. Failure is logged, never fatal.
    pub async fn remove_job_directory(&self, job_id: &str) {
        let directory = self.mount.join(job_id);
        match tokio::fs::remove_dir_all(&directory).await {
            Ok(()) => tracing::info!("removed job directory {}", directory.display()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => tracing::warn!(
                "could not remove job directory {}: {}",
                directory.display(),
                error
            ),
        }
    }
}

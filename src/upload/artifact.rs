//! Request-owned temporary files

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// A finished file waiting to be forwarded.
///
/// The file is removed when the value is dropped, on success and failure
/// alike, so an artifact never outlives the request that created it.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    /// Create an empty artifact with a unique name derived from `filename`
    pub async fn create(temp_dir: &Path, filename: &str) -> std::io::Result<(Self, tokio::fs::File)> {
        tokio::fs::create_dir_all(temp_dir).await?;
        let path = temp_dir.join(format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename)));
        let file = tokio::fs::File::create(&path).await?;
        Ok((Self { path }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file on disk
    pub async fn len(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove artifact"
            ),
        }
    }
}

/// Reduce a client filename to something safe inside the temp directory
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();

    match cleaned.trim_start_matches('.') {
        "" => "upload".to_string(),
        rest => rest.to_string(),
    }
}

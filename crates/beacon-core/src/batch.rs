//! Working files of one rebuild.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::models::DatasetMetadata;
use crate::AppError;

/// Kind of working file held for the current dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    /// Downloaded variant file.
    Variants,
    /// Synthesized dataset metadata.
    Metadata,
}

impl FileCategory {
    fn file_name(self, content_id: &Uuid) -> String {
        match self {
            FileCategory::Variants => format!("dataset-{}", content_id),
            FileCategory::Metadata => format!("metadata-{}.json", content_id),
        }
    }
}

/// Maps file categories to the working paths of the dataset being imported.
///
/// [`release`](Self::release) removes the files after each dataset. Whatever
/// is still registered when the batch is dropped is removed then.
#[derive(Debug)]
pub struct ImportBatch {
    dir: PathBuf,
    files: HashMap<FileCategory, PathBuf>,
}

impl ImportBatch {
    /// Creates a batch in `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: HashMap::new(),
        })
    }

    /// Registers and returns the working path of `category` for a dataset.
    pub fn path_for(&mut self, category: FileCategory, content_id: &Uuid) -> PathBuf {
        let path = self.dir.join(category.file_name(content_id));
        self.files.insert(category, path.clone());
        path
    }

    pub fn path(&self, category: FileCategory) -> Option<&Path> {
        self.files.get(&category).map(PathBuf::as_path)
    }

    /// Writes the metadata file of a dataset and returns its path.
    pub async fn write_metadata(
        &mut self,
        content_id: &Uuid,
        metadata: &DatasetMetadata,
    ) -> Result<PathBuf, AppError> {
        let path = self.path_for(FileCategory::Metadata, content_id);
        let body = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    /// Removes every registered file. Files that were never created are ignored.
    pub fn release(&mut self) -> Result<(), AppError> {
        for (_, path) in self.files.drain() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for ImportBatch {
    fn drop(&mut self) {
        for (_, path) in self.files.drain() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove working file {}: {}", path.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paths_are_keyed_by_content_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = ImportBatch::new(dir.path()).unwrap();
        let id = Uuid::new_v4();

        let variants = batch.path_for(FileCategory::Variants, &id);
        assert_eq!(variants, dir.path().join(format!("dataset-{}", id)));
        assert_eq!(batch.path(FileCategory::Variants), Some(variants.as_path()));
        assert_eq!(batch.path(FileCategory::Metadata), None);
    }

    #[tokio::test]
    async fn test_release_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = ImportBatch::new(dir.path()).unwrap();
        let id = Uuid::new_v4();

        let variants = batch.path_for(FileCategory::Variants, &id);
        std::fs::write(&variants, b"data").unwrap();
        let meta = DatasetMetadata::for_assembly("GRCh38", "usegalaxy.eu", None);
        let metadata = batch.write_metadata(&id, &meta).await.unwrap();
        assert!(metadata.exists());

        batch.release().unwrap();
        assert!(!variants.exists());
        assert!(!metadata.exists());
        assert_eq!(batch.path(FileCategory::Variants), None);
    }

    #[test]
    fn test_release_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = ImportBatch::new(dir.path()).unwrap();
        batch.path_for(FileCategory::Variants, &Uuid::new_v4());

        assert!(batch.release().is_ok());
    }

    #[test]
    fn test_drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut batch = ImportBatch::new(dir.path()).unwrap();
            let path = batch.path_for(FileCategory::Variants, &Uuid::new_v4());
            std::fs::write(&path, b"data").unwrap();
            path
        };
        assert!(!path.exists());
    }
}

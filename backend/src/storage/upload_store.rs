use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum UploadStoreError {
    #[error("Upload storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File too large")]
    FileTooLarge,
    #[error("Empty file")]
    Empty,
}

/// Keeps raw uploads on local disk, named by content hash.
#[derive(Clone)]
pub struct UploadStore {
    upload_dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(upload_dir: PathBuf, max_bytes: usize) -> Self {
        Self {
            upload_dir,
            max_bytes,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    /// Extension of the original filename, lowercased; `png` when there is none.
    pub fn extract_file_extension(filename: &str) -> String {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "png".to_string())
    }

    pub fn validate_image_size(&self, image_data: &[u8]) -> Result<(), UploadStoreError> {
        if image_data.is_empty() {
            return Err(UploadStoreError::Empty);
        }
        if image_data.len() > self.max_bytes {
            return Err(UploadStoreError::FileTooLarge);
        }
        Ok(())
    }

    pub async fn ensure_dir(&self) -> Result<(), UploadStoreError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        Ok(())
    }

    /// Writes the upload and returns the stored file name.
    pub async fn save(&self, image_data: &[u8], filename: &str) -> Result<String, UploadStoreError> {
        self.validate_image_size(image_data)?;
        self.ensure_dir().await?;

        let stored_name = format!(
            "{}.{}",
            Self::calculate_image_hash(image_data),
            Self::extract_file_extension(filename)
        );
        let path = self.upload_dir.join(&stored_name);
        tokio::fs::write(&path, image_data).await?;
        log::debug!("Stored upload '{}' as {}", filename, path.display());
        Ok(stored_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_the_original_name() {
        assert_eq!(UploadStore::extract_file_extension("field.JPG"), "jpg");
        assert_eq!(UploadStore::extract_file_extension("scan.tiff"), "tiff");
        assert_eq!(UploadStore::extract_file_extension("no_extension"), "png");
        assert_eq!(UploadStore::extract_file_extension("odd.p/ng"), "png");
    }

    #[test]
    fn size_limits_are_enforced() {
        let store = UploadStore::new(PathBuf::from("unused"), 4);
        assert!(store.validate_image_size(&[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            store.validate_image_size(&[0; 5]),
            Err(UploadStoreError::FileTooLarge)
        ));
        assert!(matches!(
            store.validate_image_size(&[]),
            Err(UploadStoreError::Empty)
        ));
    }

    #[actix_web::test]
    async fn saves_under_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"), 1024);
        let data = b"pretend png bytes";

        let name = store.save(data, "leaf.PNG").await.unwrap();
        assert_eq!(
            name,
            format!("{}.png", UploadStore::calculate_image_hash(data))
        );
        let written = std::fs::read(store.upload_dir().join(&name)).unwrap();
        assert_eq!(written, data);
    }
}

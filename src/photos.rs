//! Contact photos on the local filesystem.
//!
//! Files live flat in `storage.photos_dir`, named `<uuid>.<ext>`. The
//! contact row only records the file name; URLs are derived from it.

use anyhow::Context;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::{info, warn};

use crm_core::error::{CrmError, CrmResult, Entity};

use crate::config::StorageConfig;
use crate::contacts;
use crate::models::ContactView;

const ALLOWED: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
];

#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl PhotoStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            dir: config.photos_dir.clone(),
            max_bytes: config.max_photo_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check an upload and return the file extension for its type.
    pub fn validate(&self, content_type: Option<&str>, len: usize) -> CrmResult<&'static str> {
        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();
        let ext = ALLOWED
            .iter()
            .find(|(allowed, _)| *allowed == mime)
            .map(|(_, ext)| *ext)
            .ok_or_else(|| {
                CrmError::invalid(format!(
                    "unsupported photo type '{}', expected image/jpeg, image/png or image/webp",
                    mime
                ))
            })?;
        if len == 0 {
            return Err(CrmError::invalid("photo body is empty"));
        }
        if len > self.max_bytes {
            return Err(CrmError::PayloadTooLarge(format!(
                "photo is {} bytes, limit is {}",
                len, self.max_bytes
            )));
        }
        Ok(ext)
    }

    fn path_for(&self, name: &str) -> CrmResult<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(CrmError::invalid("invalid photo name"));
        }
        Ok(self.dir.join(name))
    }

    /// Write `bytes` under a fresh name and return that name.
    pub async fn save(&self, ext: &str, bytes: &[u8]) -> CrmResult<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        let path = self.path_for(&name)?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(name)
    }

    /// Read a stored photo and its content type.
    pub async fn open(&self, name: &str) -> CrmResult<(Vec<u8>, &'static str)> {
        let path = self.path_for(name)?;
        let content_type = name
            .rsplit_once('.')
            .and_then(|(_, ext)| ALLOWED.iter().find(|(_, e)| *e == ext))
            .map(|(mime, _)| *mime)
            .ok_or_else(|| CrmError::not_found(Entity::Photo, name))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok((bytes, content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CrmError::not_found(Entity::Photo, name))
            }
            Err(e) => Err(anyhow::Error::from(e)
                .context(format!("Failed to read {}", path.display()))
                .into()),
        }
    }

    /// Remove a stored photo. A missing file is not an error.
    pub async fn delete(&self, name: &str) {
        let path = match self.path_for(name) {
            Ok(path) => path,
            Err(_) => return,
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove photo"),
        }
    }
}

/// Store an uploaded photo and point the contact at it.
pub async fn upload_photo(
    pool: &SqlitePool,
    photos: &PhotoStore,
    contact_id: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> CrmResult<ContactView> {
    let ext = photos.validate(content_type, bytes.len())?;
    // Fail before writing a file for a contact that does not exist.
    contacts::get_contact(pool, contact_id).await?;

    let name = photos.save(ext, bytes).await?;
    let previous = match contacts::set_photo_path(pool, contact_id, Some(&name)).await {
        Ok(previous) => previous,
        Err(e) => {
            photos.delete(&name).await;
            return Err(e);
        }
    };
    if let Some(previous) = previous {
        photos.delete(&previous).await;
    }
    info!(%contact_id, photo = %name, bytes = bytes.len(), "stored photo");
    contacts::get_contact(pool, contact_id).await
}

/// Clear a contact's photo and delete the file.
pub async fn remove_photo(
    pool: &SqlitePool,
    photos: &PhotoStore,
    contact_id: &str,
) -> CrmResult<ContactView> {
    if let Some(previous) = contacts::set_photo_path(pool, contact_id, None).await? {
        photos.delete(&previous).await;
        info!(%contact_id, photo = %previous, "removed photo");
    }
    contacts::get_contact(pool, contact_id).await
}

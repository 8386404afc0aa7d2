use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use axum_extra::TypedHeader;
use axum_extra::headers::ContentType;
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use vista_types::api::{Ack, Claims, MediaUploaded};
use vista_types::models::{MediaKind, media_url};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_db;

/// Byte storage for uploaded media. Metadata lives in the database; a store
/// only maps media ids to bytes.
pub trait MediaStore: Send + Sync {
    fn put(&self, id: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;
}

/// Each object is a flat file at `{dir}/{media_id}`.
pub struct LocalDiskStore {
    dir: PathBuf,
}

impl LocalDiskStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    fn file_path(&self, id: &str) -> Result<PathBuf> {
        // Ids are uuids; anything else could escape the directory.
        let id: Uuid = id.parse().map_err(|_| anyhow!("invalid media id '{}'", id))?;
        Ok(self.dir.join(id.to_string()))
    }
}

impl MediaStore for LocalDiskStore {
    fn put(&self, id: &str, bytes: &[u8]) -> Result<()> {
        std::fs::write(self.file_path(id)?, bytes)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.file_path(id)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile store kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MediaStore for MemoryStore {
    fn put(&self, id: &str, bytes: &[u8]) -> Result<()> {
        let mut objects = self.objects.lock().map_err(|e| anyhow!("{}", e))?;
        objects.insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let objects = self.objects.lock().map_err(|e| anyhow!("{}", e))?;
        Ok(objects.get(id).cloned())
    }
}

/// POST /media: raw bytes with their `Content-Type`. Returns the new media id.
pub async fn upload_media(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    content_type: Option<TypedHeader<ContentType>>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = content_type
        .map(|TypedHeader(ct)| ct.to_string())
        .unwrap_or_default();
    let kind = MediaKind::from_content_type(&content_type)
        .ok_or_else(|| ApiError::UnsupportedMedia(content_type.clone()))?;

    if bytes.is_empty() {
        return Err(ApiError::BadRequest("empty upload".into()));
    }
    if bytes.len() > kind.max_bytes() {
        return Err(ApiError::PayloadTooLarge(kind.max_bytes()));
    }

    let digest = hex::encode(Sha256::digest(&bytes));
    let owner_id = claims.sub.to_string();
    let size = bytes.len() as i64;
    let ct = content_type.clone();
    let media_id = run_db(&state, move |db| db.insert_media(&owner_id, kind, &ct, size, &digest)).await?;

    let store = state.media.clone();
    let id = media_id.clone();
    let stored = tokio::task::spawn_blocking(move || store.put(&id, &bytes))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))
        .and_then(|r| r);
    if let Err(e) = stored {
        error!("Failed to store media {}: {}", media_id, e);
        let id = media_id.clone();
        run_db(&state, move |db| db.delete_media(&id)).await?;
        return Err(ApiError::Internal);
    }

    info!("Stored {} media {} ({} bytes)", kind.as_str(), media_id, size);
    Ok((
        StatusCode::CREATED,
        Json(Ack::ok(MediaUploaded {
            url: media_url(&media_id),
            media_id,
        })),
    ))
}

/// GET /media/{id}: serves the stored bytes with their recorded content type.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if media_id.parse::<Uuid>().is_err() {
        return Err(vista_db::Error::NotFound("media").into());
    }

    let id = media_id.clone();
    let media = run_db(&state, move |db| db.get_media(&id))
        .await?
        .ok_or(vista_db::Error::NotFound("media"))?;

    let store = state.media.clone();
    let bytes = tokio::task::spawn_blocking(move || store.get(&media_id))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))
        .and_then(|r| r)
        .map_err(|e| {
            error!("Failed to read media {}: {}", media.id, e);
            ApiError::Internal
        })?
        .ok_or(vista_db::Error::NotFound("media"))?;

    Ok(([(header::CONTENT_TYPE, media.content_type)], bytes))
}

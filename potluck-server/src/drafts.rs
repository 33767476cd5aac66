//! Drafts hold the images a user uploads while they are still writing a recipe.
//!
//! Each user has at most one open draft. The main image hangs off the draft itself,
//! step images hang off it by the position they were uploaded for.

use anyhow::Context;
use base64::Engine;
use potluck::basic_models::{StagedImage, TempImageForUpload};
use rusqlite::{params, Connection};
use strum::{EnumString, IntoStaticStr};

use crate::database::{collect_rows, sqlite_current_timestamp, Database, FromRow};
use crate::errors::WebError;
use crate::storage::{join_key, BlobStore};

/// Uploads larger than this are rejected before they touch storage
pub const MAX_IMAGE_BYTES: usize = 20_000_000;

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("no open draft")]
    NoOpenDraft,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StageError> for WebError {
    fn from(e: StageError) -> Self {
        match e {
            StageError::InvalidInput(msg) => WebError::InvalidInput(msg),
            StageError::NoOpenDraft => WebError::NotFound(StageError::NoOpenDraft.to_string()),
            StageError::Internal(e) => WebError::Internal(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum DraftStatus {
    Open,
    Closed,
}

/// Which slot of the draft an uploaded image goes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum StageKind {
    Main,
    Step,
}

#[derive(Debug, Clone)]
pub struct Draft {
    pub draft_id: i64,
    pub user_id: i64,
    pub status: DraftStatus,
    pub main_image: Option<String>,
    pub recipe_id: Option<i64>,
    pub created_on: String,
}

impl FromRow for Draft {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let status: String = row.get("status")?;
        Ok(Self {
            draft_id: row.get("draft_id")?,
            user_id: row.get("user_id")?,
            status: status.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            main_image: row.get("main_image")?,
            recipe_id: row.get("recipe_id")?,
            created_on: row.get("created_on")?,
        })
    }
}

impl Draft {
    /// The user's open draft, if they have one.
    /// Should there ever be several, the most recently created wins.
    pub fn find_open(conn: &Connection, user_id: i64) -> anyhow::Result<Option<Self>> {
        Ok(collect_rows(
            conn,
            "SELECT * FROM Draft
            WHERE user_id = ? AND status = 'open'
            ORDER BY draft_id DESC
            LIMIT 1",
            params![user_id],
        )?
        .pop())
    }

    /// The user's open draft, creating it if needed.
    ///
    /// The partial unique index on open drafts makes the insert a no-op when one
    /// already exists, so concurrent callers end up sharing the same draft.
    pub fn find_or_create_open(conn: &Connection, user_id: i64) -> anyhow::Result<Self> {
        conn.execute(
            "INSERT OR IGNORE INTO Draft (user_id, status, created_on) VALUES (?, 'open', ?)",
            params![user_id, sqlite_current_timestamp()],
        )?;
        Self::find_open(conn, user_id)?.context("Open draft vanished right after creation")
    }

    pub fn get_by_id(conn: &Connection, draft_id: i64) -> anyhow::Result<Option<Self>> {
        Ok(collect_rows(conn, "SELECT * FROM Draft WHERE draft_id = ?", params![draft_id])?.pop())
    }

    pub fn set_main_image(conn: &Connection, draft_id: i64, key: &str) -> anyhow::Result<()> {
        conn.execute(
            "UPDATE Draft SET main_image = ? WHERE draft_id = ?",
            params![key, draft_id],
        )?;
        Ok(())
    }

    /// Remember which recipe this draft turned into
    pub fn link_recipe(conn: &Connection, draft_id: i64, recipe_id: i64) -> anyhow::Result<()> {
        conn.execute(
            "UPDATE Draft SET recipe_id = ? WHERE draft_id = ?",
            params![recipe_id, draft_id],
        )?;
        Ok(())
    }

    /// Closed drafts are never reopened
    pub fn close(conn: &Connection, draft_id: i64) -> anyhow::Result<()> {
        let closed: &'static str = DraftStatus::Closed.into();
        conn.execute(
            "UPDATE Draft SET status = ? WHERE draft_id = ?",
            params![closed, draft_id],
        )?;
        Ok(())
    }

    /// The staged step images, ordered by position
    pub fn step_images(conn: &Connection, draft_id: i64) -> anyhow::Result<Vec<DraftStepImage>> {
        collect_rows(
            conn,
            "SELECT * FROM DraftStepImage WHERE draft_id = ? ORDER BY step_order",
            params![draft_id],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftStepImage {
    pub draft_step_image_id: i64,
    pub draft_id: i64,
    pub step_order: i64,
    pub image: String,
}

impl FromRow for DraftStepImage {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            draft_step_image_id: row.get("draft_step_image_id")?,
            draft_id: row.get("draft_id")?,
            step_order: row.get("step_order")?,
            image: row.get("image")?,
        })
    }
}

impl DraftStepImage {
    /// Put an image at a position of a draft, replacing whatever was there.
    pub fn attach(conn: &Connection, draft_id: i64, step_order: i64, key: &str) -> anyhow::Result<i64> {
        conn.execute(
            "INSERT INTO DraftStepImage (draft_id, step_order, image) VALUES (?1, ?2, ?3)
            ON CONFLICT (draft_id, step_order) DO UPDATE SET image = excluded.image",
            params![draft_id, step_order, key],
        )?;
        // last_insert_rowid is not updated by the upsert's update branch
        Ok(conn.query_row(
            "SELECT draft_step_image_id FROM DraftStepImage WHERE draft_id = ? AND step_order = ?",
            params![draft_id, step_order],
            |row| row.get(0),
        )?)
    }
}

/// An image decoded from a data URI
pub struct DecodedImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("extension", &self.extension)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Decode `data:image/<ext>;base64,<payload>` and check that it holds an image.
pub fn decode_data_uri(data_uri: &str) -> Result<DecodedImage, StageError> {
    let invalid = |msg: &str| StageError::InvalidInput(msg.into());
    let (header, payload) = data_uri
        .split_once(";base64,")
        .ok_or(invalid("Image must be a base64 data URI"))?;
    let extension = header
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if extension.is_empty()
        || extension.len() > 8
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(invalid("Image data URI has no usable media type"));
    }
    // For the purpose of data urls, you do NOT need to use the URL_SAFE variant
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| invalid("Image is not valid base64"))?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(invalid("Image is too large"));
    }
    image::guess_format(&bytes).map_err(|_| invalid("Uploaded data is not an image"))?;
    Ok(DecodedImage { extension, bytes })
}

/// Where a freshly uploaded image is parked until its recipe is published
fn staging_key(bucket_root: &str, user_id: i64, slot: &str, extension: &str) -> String {
    let file_name = format!("{slot}-{:08x}.{extension}", rand::random::<u32>());
    join_key([bucket_root, "temp", &user_id.to_string(), &file_name])
}

/// Stage an uploaded image into the user's draft.
///
/// Main images create the draft if needed. Step images need an open draft to
/// already exist, and bind to the position they were uploaded for.
pub fn stage_image(
    db: &Database,
    blobs: &dyn BlobStore,
    bucket_root: &str,
    user_id: i64,
    upload: TempImageForUpload,
) -> Result<StagedImage, StageError> {
    let data_uri = upload
        .image
        .ok_or(StageError::InvalidInput("No image data provided".into()))?;
    let kind: StageKind = upload
        .kind
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|_| StageError::InvalidInput("Invalid type".into()))?;
    let image = decode_data_uri(&data_uri)?;
    let conn = db.pool.get().context("Getting a database connection")?;

    match kind {
        StageKind::Main => {
            let key = staging_key(bucket_root, user_id, "main", &image.extension);
            blobs.put(&key, &image.bytes)?;
            let draft = Draft::find_or_create_open(&conn, user_id)?;
            Draft::set_main_image(&conn, draft.draft_id, &key)?;
            tracing::info!(user_id, draft_id = draft.draft_id, key = %key, "Staged main image");
            Ok(StagedImage {
                id: draft.draft_id,
                image_url: blobs.public_url(&key),
            })
        }
        StageKind::Step => {
            let order = upload
                .order
                .ok_or(StageError::InvalidInput("Step images need an order".into()))?;
            if order < 1 {
                return Err(StageError::InvalidInput("Step order starts at 1".into()));
            }
            let draft = Draft::find_open(&conn, user_id)?.ok_or(StageError::NoOpenDraft)?;
            let key = staging_key(bucket_root, user_id, &format!("step_{order}"), &image.extension);
            blobs.put(&key, &image.bytes)?;
            let step_image_id = DraftStepImage::attach(&conn, draft.draft_id, order, &key)?;
            tracing::info!(user_id, draft_id = draft.draft_id, order, key = %key, "Staged step image");
            Ok(StagedImage {
                id: step_image_id,
                image_url: blobs.public_url(&key),
            })
        }
    }
}

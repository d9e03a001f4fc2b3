// # Derivation Worker
//
// Pure per-file stage of the ingestion pipeline: given one selected file,
// produce a resized preview image and a best-effort capture date. No network.
// Preview generation and date resolution run concurrently; the call resolves
// only when both finish.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use exif::{In, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use std::io::Cursor;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Longest allowed preview dimension. Images already within this bound are
/// re-encoded without resizing; previews never upscale.
pub const PREVIEW_MAX_DIMENSION: u32 = 800;

/// JPEG quality factor for preview re-encoding.
pub const PREVIEW_QUALITY: u8 = 80;

/// Suffix appended to the original filename stem when naming the preview.
pub const PREVIEW_SUFFIX: &str = "-thumb";

/// Extension of the preview encoder's output format.
pub const PREVIEW_EXTENSION: &str = "jpg";

/// Content type of generated previews.
pub const PREVIEW_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum DerivationError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Failed to encode preview: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Derivation was cancelled")]
    Cancelled,
    #[error("Derivation task failed: {0}")]
    Task(String),
}

/// One operator-selected file, as handed to the pipeline.
#[derive(Debug, Clone)]
pub struct FileInput {
    /// Original filename, e.g. "photo.jpg"
    pub name: String,
    /// Raw file contents
    pub bytes: Bytes,
    /// Filesystem last-modified time, when known
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileInput {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// Read a file from disk, capturing its last-modified time.
    pub async fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let last_modified = tokio::fs::metadata(path)
            .await?
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            bytes: Bytes::from(bytes),
            last_modified,
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Output of the derivation worker for one file. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Derived {
    /// Re-encoded preview image
    pub preview: Bytes,
    /// Preview filename, derived from the original: "photo.jpg" -> "photo-thumb.jpg"
    pub preview_name: String,
    /// Original filename, unchanged
    pub original_name: String,
    /// Resolved capture date (metadata, else file mtime, else now)
    pub captured_at: DateTime<Utc>,
}

/// Derive the preview and capture date for one file.
///
/// The two halves run concurrently: preview generation on the blocking thread
/// pool (decode/resize/encode are CPU-bound), date resolution inline. Metadata
/// failures never surface; a date is always produced.
pub async fn derive(input: &FileInput, cancel: &CancellationToken) -> Result<Derived, DerivationError> {
    let (preview, captured_at) = tokio::join!(
        generate_preview(input.bytes.clone(), cancel.clone()),
        resolve_capture_date(input),
    );

    Ok(Derived {
        preview: preview?,
        preview_name: preview_filename(&input.name),
        original_name: input.name.clone(),
        captured_at,
    })
}

/// Preview filename: extension stripped, suffix + preview extension appended.
pub fn preview_filename(original: &str) -> String {
    let stem = match original.rfind('.') {
        Some(idx) if idx > 0 => &original[..idx],
        _ => original,
    };
    format!("{}{}.{}", stem, PREVIEW_SUFFIX, PREVIEW_EXTENSION)
}

/// Resolve the capture date: EXIF date fields in priority order, then the
/// file's last-modified time, then the current time.
async fn resolve_capture_date(input: &FileInput) -> DateTime<Utc> {
    if let Some(date) = metadata_capture_date(&input.bytes) {
        trace!("Derivation: {} capture date from metadata: {}", input.name, date);
        return date;
    }
    if let Some(modified) = input.last_modified {
        trace!(
            "Derivation: {} has no metadata date, using last-modified {}",
            input.name,
            modified
        );
        return modified;
    }
    debug!(
        "Derivation: {} has no metadata date or mtime, using current time",
        input.name
    );
    Utc::now()
}

/// EXIF date fields in resolution priority order.
const DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTime, Tag::DateTimeDigitized];

fn metadata_capture_date(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;

    for tag in DATE_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        let Value::Ascii(ref raw) = field.value else {
            continue;
        };
        let Some(text) = raw.first() else {
            continue;
        };
        let text = String::from_utf8_lossy(text);
        match parse_exif_datetime(text.trim()) {
            Some(parsed) => return Some(parsed.and_utc()),
            None => {
                // Unparseable value; fall through to the next field
                debug!("Derivation: unparseable {:?} value {:?}", tag, text);
            }
        }
    }
    None
}

/// Parse the colon-delimited EXIF date grammar "YYYY:MM:DD HH:MM:SS".
/// The time portion is optional and defaults to midnight.
fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text, "%Y:%m:%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Decode, scale down to the preview bound, and re-encode as JPEG.
async fn generate_preview(
    bytes: Bytes,
    cancel: CancellationToken,
) -> Result<Bytes, DerivationError> {
    tokio::task::spawn_blocking(move || {
        if cancel.is_cancelled() {
            return Err(DerivationError::Cancelled);
        }

        let decoded = image::load_from_memory(&bytes).map_err(DerivationError::Decode)?;
        let (width, height) = decoded.dimensions();

        let resized = if width <= PREVIEW_MAX_DIMENSION && height <= PREVIEW_MAX_DIMENSION {
            decoded
        } else {
            decoded.resize(PREVIEW_MAX_DIMENSION, PREVIEW_MAX_DIMENSION, FilterType::Lanczos3)
        };

        if cancel.is_cancelled() {
            return Err(DerivationError::Cancelled);
        }

        // JPEG has no alpha channel, so flatten before encoding
        let rgb = resized.to_rgb8();
        let mut out = Vec::new();
        let mut cursor = Cursor::new(&mut out);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, PREVIEW_QUALITY);
        rgb.write_with_encoder(encoder)
            .map_err(DerivationError::Encode)?;

        trace!(
            "Derivation: preview {}x{} -> {}x{}, {} bytes",
            width,
            height,
            rgb.width(),
            rgb.height(),
            out.len()
        );

        Ok(Bytes::from(out))
    })
    .await
    .map_err(|e| DerivationError::Task(e.to_string()))?
}

/// Content type for the original upload, inferred from the filename extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

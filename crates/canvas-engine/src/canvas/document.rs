//! Loading and saving documents
//!
//! Two container kinds are supported. Native `.tsdoc` files hold a reset
//! image as plain message records after a short header. Raster files
//! (PNG, JPEG, ...) load as a single layer and save as the flattened canvas.

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use tessera_protocol::{
    CanvasResizeMessage, EncodeError, LayerCreateMessage, Message, MessageBody, PutImageMessage,
};
use tracing::{debug, info, warn};

use super::{CanvasState, FlattenOptions, MAX_CANVAS_SIZE};
use crate::tiles::TILE_SIZE;
use crate::types::BlendMode;

/// Magic bytes at the start of a native document.
pub const DOCUMENT_MAGIC: &[u8; 8] = b"TESSDOC\0";

/// Current native document version.
pub const DOCUMENT_VERSION: u16 = 1;

/// Layer id given to the single layer of an imported raster image.
const IMPORTED_LAYER_ID: u16 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Native,
    Raster(ImageFormat),
}

impl DocumentFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "tsdoc" {
            return Some(Self::Native);
        }
        ImageFormat::from_extension(&ext).map(Self::Raster)
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub format: DocumentFormat,
    /// Problems that were skipped over. Empty for a clean load.
    pub warnings: Vec<String>,
}

impl LoadReport {
    /// Whether some of the document could not be restored.
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unable to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Unknown document format: {0}")]
    UnknownFormat(PathBuf),
    #[error("Not a document file (bad header)")]
    BadHeader,
    #[error("Unsupported document version {0}")]
    UnsupportedVersion(u16),
    #[error("Image size {width}x{height} is out of range")]
    InvalidSize { width: u32, height: u32 },
    #[error("Unable to decode image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Unable to write {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Unknown document format: {0}")]
    UnknownFormat(PathBuf),
    #[error("Cannot save an empty canvas as an image")]
    EmptyCanvas,
    #[error("Unable to encode document: {0}")]
    Encode(#[from] EncodeError),
    #[error("Unable to encode image: {0}")]
    Image(#[from] image::ImageError),
}

impl CanvasState {
    /// Load a document, reporting anything that had to be skipped.
    ///
    /// Fails only when the container itself is unreadable. A native document
    /// with a corrupt record loads up to that record; messages that fail to
    /// apply are skipped.
    pub fn load(path: &Path) -> Result<(CanvasState, LoadReport), LoadError> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| LoadError::UnknownFormat(path.to_path_buf()))?;
        let (canvas, warnings) = match format {
            DocumentFormat::Native => {
                let bytes = fs::read(path).map_err(|source| LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                load_native(&bytes)?
            }
            DocumentFormat::Raster(_) => (load_raster(path)?, Vec::new()),
        };

        for w in &warnings {
            warn!("{}: {}", path.display(), w);
        }
        info!(
            "Loaded {} ({}x{}, {} layers, {} warnings)",
            path.display(),
            canvas.width(),
            canvas.height(),
            canvas.layers().len(),
            warnings.len()
        );
        Ok((canvas, LoadReport { format, warnings }))
    }

    /// Save the document. The format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), SaveError> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| SaveError::UnknownFormat(path.to_path_buf()))?;
        let io_err = |source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        };
        match format {
            DocumentFormat::Native => {
                let mut out = Vec::with_capacity(DOCUMENT_MAGIC.len() + 2);
                out.extend_from_slice(DOCUMENT_MAGIC);
                out.extend_from_slice(&DOCUMENT_VERSION.to_be_bytes());
                out.extend(Message::encode_all(&self.to_reset_image(0))?);
                fs::write(path, out).map_err(io_err)?;
            }
            DocumentFormat::Raster(fmt) => {
                if self.is_empty() {
                    return Err(SaveError::EmptyCanvas);
                }
                let img = self.to_flat_image(&FlattenOptions::default());
                if fmt == ImageFormat::Jpeg {
                    DynamicImage::ImageRgba8(img).to_rgb8().save_with_format(path, fmt)?;
                } else {
                    img.save_with_format(path, fmt)?;
                }
            }
        }
        debug!("Saved {} as {:?}", path.display(), format);
        Ok(())
    }
}

fn load_native(bytes: &[u8]) -> Result<(CanvasState, Vec<String>), LoadError> {
    let header_len = DOCUMENT_MAGIC.len() + 2;
    if bytes.len() < header_len || &bytes[..DOCUMENT_MAGIC.len()] != DOCUMENT_MAGIC {
        return Err(LoadError::BadHeader);
    }
    let version = u16::from_be_bytes([bytes[8], bytes[9]]);
    if version != DOCUMENT_VERSION {
        return Err(LoadError::UnsupportedVersion(version));
    }

    let mut canvas = CanvasState::new();
    let mut warnings = Vec::new();
    let mut offset = header_len;
    while offset < bytes.len() {
        let (msg, len) = match Message::decode_record(&bytes[offset..]) {
            Ok(decoded) => decoded,
            Err(e) => {
                warnings.push(format!("corrupt record at offset {offset}: {e}"));
                break;
            }
        };
        if let Err(e) = canvas.apply(&msg) {
            warnings.push(format!("skipped {msg}: {e}"));
        }
        offset += len;
    }
    Ok((canvas, warnings))
}

fn load_raster(path: &Path) -> Result<CanvasState, LoadError> {
    let img = image::open(path)?.to_rgba8();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || width > MAX_CANVAS_SIZE || height > MAX_CANVAS_SIZE {
        return Err(LoadError::InvalidSize { width, height });
    }

    let mut msgs = vec![
        Message::new(
            0,
            MessageBody::CanvasResize(CanvasResizeMessage {
                top: 0,
                right: width as i32,
                bottom: height as i32,
                left: 0,
            }),
        ),
        Message::new(
            0,
            MessageBody::LayerCreate(LayerCreateMessage {
                id: IMPORTED_LAYER_ID,
                source: 0,
                fill: 0,
                flags: 0,
                title: "Layer 1".to_string(),
            }),
        ),
    ];

    for ty in (0..height).step_by(TILE_SIZE as usize) {
        for tx in (0..width).step_by(TILE_SIZE as usize) {
            let w = TILE_SIZE.min(width - tx);
            let h = TILE_SIZE.min(height - ty);
            let mut image = Vec::with_capacity((w * h * 4) as usize);
            for y in ty..ty + h {
                for x in tx..tx + w {
                    image.extend_from_slice(&img.get_pixel(x, y).0);
                }
            }
            if image.chunks_exact(4).all(|px| px[3] == 0) {
                continue;
            }
            msgs.push(Message::new(
                0,
                MessageBody::PutImage(PutImageMessage {
                    layer: IMPORTED_LAYER_ID,
                    mode: BlendMode::Replace.as_u8(),
                    x: tx,
                    y: ty,
                    w,
                    h,
                    image,
                }),
            ));
        }
    }

    let mut canvas = CanvasState::new();
    for msg in &msgs {
        if let Err(e) = canvas.apply(msg) {
            warn!("Raster import: {msg} failed: {e}");
        }
    }
    Ok(canvas)
}

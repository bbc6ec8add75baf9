use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageError>;

/// Unified error type for disk/floppy image load and save.
///
/// A failed load leaves the caller's prior state intact; the codecs never
/// hand back a partially-decoded image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("corrupt image: {0}")]
    Corrupt(&'static str),

    #[error("unsupported image feature: {0}")]
    Unsupported(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

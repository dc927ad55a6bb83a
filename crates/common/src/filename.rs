// Stored filenames: generation for new uploads and validation of names
// arriving from clients (delete requests).

use rand::Rng;
use thiserror::Error;

use crate::media::image_extension;

/// Maximum accepted length of a stored filename, in bytes.
const MAX_FILENAME_BYTES: usize = 255;

/// Upper bound (exclusive) of the random suffix in generated names.
const RANDOM_SUFFIX_BOUND: u64 = 1_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("filename is empty")]
    Empty,

    #[error("filename exceeds maximum length of {MAX_FILENAME_BYTES} bytes")]
    TooLong,

    #[error("filename contains a path separator")]
    Separator,

    #[error("filename contains null byte")]
    NullByte,

    #[error("filename is a traversal component: {0}")]
    Traversal(String),

    #[error("filename `{0}` is not an allowed image type")]
    NotAnImage(String),
}

/// Build a collision-resistant stored name: `<unix-millis>-<random><.ext>`.
///
/// Returns `None` when `original` has no allow-listed image extension.
pub fn generate_stored_name(original: &str, unix_millis: i64) -> Option<String> {
    let suffix = rand::thread_rng().gen_range(0..RANDOM_SUFFIX_BOUND);
    stored_name_with_suffix(original, unix_millis, suffix)
}

fn stored_name_with_suffix(original: &str, unix_millis: i64, suffix: u64) -> Option<String> {
    let ext = image_extension(original)?;
    Some(format!("{unix_millis}-{suffix}.{ext}"))
}

/// Validate a single path component naming an image inside the uploads dir.
pub fn validate_stored_name(name: &str) -> Result<&str, FilenameError> {
    if name.is_empty() {
        return Err(FilenameError::Empty);
    }
    if name.contains('\0') {
        return Err(FilenameError::NullByte);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(FilenameError::Separator);
    }
    if name == "." || name == ".." {
        return Err(FilenameError::Traversal(name.to_string()));
    }
    if name.len() > MAX_FILENAME_BYTES {
        return Err(FilenameError::TooLong);
    }
    if image_extension(name).is_none() {
        return Err(FilenameError::NotAnImage(name.to_string()));
    }
    Ok(name)
}

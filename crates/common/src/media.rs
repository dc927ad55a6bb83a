// Image allow-list and directory scanning for the uploads folder.

use std::io;
use std::path::Path;

/// File extensions (lowercase, without the dot) accepted as gallery images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Returns the lowercased extension of `name` when it is on the image allow-list.
pub fn image_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Whether `name` carries an allow-listed image extension (case-insensitive).
pub fn is_image_file(name: &str) -> bool {
    image_extension(name).is_some()
}

/// Whether a multipart content type names one of the allowed image formats.
pub fn is_image_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    let Some(subtype) = essence.strip_prefix("image/") else {
        return false;
    };
    IMAGE_EXTENSIONS.contains(&subtype)
}

/// Sorted names of the image files directly inside `dir` (not recursive).
pub fn list_images(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_image_file(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Number of image files directly inside `dir`.
pub fn count_images(dir: &Path) -> io::Result<usize> {
    list_images(dir).map(|names| names.len())
}

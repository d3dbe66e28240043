//! Destination naming for downloaded images

use std::path::{Path, PathBuf};
use url::Url;

/// Longest label kept after sanitizing
const MAX_LABEL_LEN: usize = 200;

/// Label used when sanitizing leaves nothing
const FALLBACK_LABEL: &str = "NO_SKU";

/// Extension used when the URL does not name a known image type
const DEFAULT_EXTENSION: &str = "jpg";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// An image to fetch and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub destination: PathBuf,
}

/// Makes a SKU or item id safe to use as a directory and file name
///
/// Keeps alphanumerics and `-_.+`, drops everything else and truncates to
/// 200 characters.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
        .take(MAX_LABEL_LEN)
        .collect();

    // "." and ".." would escape the images directory
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return FALLBACK_LABEL.to_string();
    }
    cleaned
}

/// Picks the file extension from the URL path, defaulting to `jpg`
pub fn image_extension(url: &str) -> &'static str {
    let Ok(parsed) = Url::parse(url) else {
        return DEFAULT_EXTENSION;
    };

    let last_segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    let Some((_, ext)) = last_segment.rsplit_once('.') else {
        return DEFAULT_EXTENSION;
    };

    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Builds the target for the `ordinal`-th image of an item
///
/// The layout is `<images_dir>/<label>/<label>_<ordinal>.<ext>`.
pub fn target_for(images_dir: &Path, label: &str, ordinal: usize, url: &str) -> DownloadTarget {
    let label = sanitize_label(label);
    let file_name = format!("{}_{}.{}", label, ordinal, image_extension(url));

    DownloadTarget {
        url: url.to_string(),
        destination: images_dir.join(&label).join(file_name),
    }
}

/// Temporary path a download is written to before the final rename
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

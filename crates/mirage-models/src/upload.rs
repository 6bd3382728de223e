//! Upload filename rules.

/// Container extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Prefix added to the stored name of a processed file.
pub const PROCESSED_PREFIX: &str = "processed_";

/// Lowercased extension of a filename, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() || (stem.is_empty() && !filename.starts_with('.')) {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Whether a filename has one of the allowed video extensions.
pub fn is_allowed_file(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Name the processed output of `filename` is stored under.
pub fn processed_filename(filename: &str) -> String {
    format!("{}{}", PROCESSED_PREFIX, filename)
}

/// Content type for serving a stored video.
pub fn content_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        assert!(is_allowed_file("cam.mp4"));
        assert!(is_allowed_file("CAM.MKV"));
        assert!(is_allowed_file("lobby.2024.mov"));
        assert!(!is_allowed_file("notes.txt"));
        assert!(!is_allowed_file("mp4"));
        assert!(!is_allowed_file("trailing."));
    }

    #[test]
    fn test_processed_filename() {
        assert_eq!(processed_filename("cam.mp4"), "processed_cam.mp4");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("a.mp4"), "video/mp4");
        assert_eq!(content_type_for("a.AVI"), "video/x-msvideo");
        assert_eq!(content_type_for("a.mov"), "video/quicktime");
        assert_eq!(content_type_for("a.mkv"), "video/x-matroska");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }
}

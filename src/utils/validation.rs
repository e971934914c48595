use anyhow::{Result, anyhow};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Checks a filename's extension against the configured media allow-list
pub fn allowed_file(filename: &str, allowed_extensions: &[String]) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|e| allowed_extensions.iter().any(|a| a == &e))
}

/// Sanitizes a filename to prevent path traversal and control-character
/// injection. Returns the sanitized name or an error if nothing usable
/// remains.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Keep only the final path component
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: format!("Filename '{}' is not usable", filename),
        }));
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim().trim_start_matches('.').to_string();

    if sanitized.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: format!("Filename '{}' is empty after sanitization", filename),
        }));
    }

    if sanitized.len() > 255 {
        return Err(anyhow!(ValidationError {
            code: "FILENAME_TOO_LONG",
            message: format!("Filename exceeds 255 characters: {}", sanitized.len()),
        }));
    }

    Ok(sanitized)
}

/// Validates a split-folder name coming from a URL path segment. Folder
/// names are derived from sanitized filename stems, so anything with path
/// separators or dot-relative components is rejected outright.
pub fn validate_folder_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FOLDER_NAME",
            message: format!("Folder name '{}' is not valid", name),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        ["mp4", "avi", "mov", "mkv", "webm"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("movie.mp4", &allowed()));
        assert!(allowed_file("MOVIE.MKV", &allowed()));
        assert!(!allowed_file("notes.txt", &allowed()));
        assert!(!allowed_file("no_extension", &allowed()));
        assert!(!allowed_file(".mp4", &allowed())); // hidden file, no stem/ext split
    }

    #[test]
    fn test_sanitize_strips_path_components() {
        assert_eq!(
            sanitize_filename("../../etc/passwd.mp4").unwrap(),
            "passwd.mp4"
        );
        assert_eq!(
            sanitize_filename("/tmp/abs/video.mkv").unwrap(),
            "video.mkv"
        );
    }

    #[test]
    fn test_sanitize_replaces_special_chars() {
        assert_eq!(
            sanitize_filename("my:movie|2024?.mp4").unwrap(),
            "my_movie_2024_.mp4"
        );
    }

    #[test]
    fn test_sanitize_rejects_empty_and_dotfiles() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("...").is_err());
    }

    #[test]
    fn test_validate_folder_name() {
        assert!(validate_folder_name("movie").is_ok());
        assert!(validate_folder_name("my movie 2024").is_ok());
        assert!(validate_folder_name("").is_err());
        assert!(validate_folder_name("..").is_err());
        assert!(validate_folder_name("a/b").is_err());
        assert!(validate_folder_name("a\\b").is_err());
    }
}

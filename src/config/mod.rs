use std::env;
use std::path::PathBuf;

/// Runtime configuration for the split/transfer pipeline
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory where uploaded originals are staged
    pub upload_root: PathBuf,

    /// Base directory for split-output folders (one subfolder per source file)
    pub split_root: PathBuf,

    /// Maximum accepted upload size in bytes (default: 100 GB)
    pub max_upload_size: usize,

    /// Per-part size cap in MB used to compute the split plan (default: 2000)
    pub part_size_mb: u64,

    /// Allowed media container extensions, lowercase, without dots
    pub allowed_extensions: Vec<String>,

    /// Interval between stale-file sweeps in seconds (default: 300)
    pub cleanup_interval_secs: u64,

    /// Age after which unclaimed files are swept in seconds (default: 3600)
    pub max_file_age_secs: u64,

    /// ffmpeg binary (default: resolved from PATH)
    pub ffmpeg_bin: PathBuf,

    /// ffprobe binary (default: resolved from PATH)
    pub ffprobe_bin: PathBuf,

    /// Transfer client type: "telegram" or "noop" (default: "noop")
    pub transfer_client_type: String,

    /// Telegram Bot API token
    pub telegram_bot_token: Option<String>,

    /// Chat the parts are sent to (numeric id or @channel)
    pub telegram_chat_id: Option<String>,

    /// Bot API base URL, overridable for tests
    pub telegram_api_base: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("uploads"),
            split_root: PathBuf::from("splits"),
            max_upload_size: 100 * 1024 * 1024 * 1024, // 100 GB
            part_size_mb: 2000,
            allowed_extensions: ["mp4", "avi", "mov", "mkv", "webm"]
                .into_iter()
                .map(String::from)
                .collect(),
            cleanup_interval_secs: 300,
            max_file_age_secs: 3600,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            transfer_client_type: "noop".to_string(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_root: env::var("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.upload_root),

            split_root: env::var("SPLIT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.split_root),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            part_size_mb: env::var("PART_SIZE_MB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.part_size_mb),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_extensions),

            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.cleanup_interval_secs),

            max_file_age_secs: env::var("MAX_FILE_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_age_secs),

            ffmpeg_bin: env::var("FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or(default.ffmpeg_bin),

            ffprobe_bin: env::var("FFPROBE_BIN")
                .map(PathBuf::from)
                .unwrap_or(default.ffprobe_bin),

            transfer_client_type: env::var("TRANSFER_CLIENT")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.transfer_client_type),

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),

            telegram_api_base: env::var("TELEGRAM_API_BASE").unwrap_or(default.telegram_api_base),
        }
    }

    /// Create config for development (noop transfer client, fast sweeps)
    pub fn development() -> Self {
        Self {
            transfer_client_type: "noop".to_string(),
            cleanup_interval_secs: 60,
            ..Self::default()
        }
    }

    /// Per-part cap in bytes
    pub fn max_part_bytes(&self) -> u64 {
        self.part_size_mb * 1024 * 1024
    }
}

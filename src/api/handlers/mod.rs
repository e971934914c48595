pub mod cleanup;
pub mod download;
pub mod health;
pub mod process;
pub mod transfer;
pub mod types;
pub mod upload;

// Re-export all types
pub use types::*;

// Re-export all handlers
pub use cleanup::{cleanup_session, index};
pub use download::{download_separate, download_zip};
pub use health::health_check;
pub use process::{process_file, split_progress};
pub use transfer::{cancel_transfer, start_transfer, transfer_status};
pub use upload::upload_file;

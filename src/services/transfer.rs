use crate::config::AppConfig;
use crate::services::progress::{ProgressRegistry, TransferStatus};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Callback invoked with (bytes_sent, bytes_total) while a part streams out.
pub type ProgressSink = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Seam to the external messaging service. `ensure_ready` must be idempotent
/// so the worker can call it before every part and reuse an established
/// session.
#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn ensure_ready(&self) -> Result<()>;

    async fn send_document(
        &self,
        path: &Path,
        caption: &str,
        progress: ProgressSink,
    ) -> Result<()>;
}

/// Select the transfer client implementation from config, mirroring the
/// scanner-type switch: "telegram" or "noop".
pub fn create_transfer_client(config: &AppConfig) -> Arc<dyn TransferClient> {
    match config.transfer_client_type.as_str() {
        "telegram" => match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Arc::new(TelegramClient::new(
                config.telegram_api_base.clone(),
                token.clone(),
                chat_id.clone(),
            )),
            _ => {
                warn!(
                    "TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set, using noop transfer client"
                );
                Arc::new(NoopClient)
            }
        },
        _ => Arc::new(NoopClient),
    }
}

#[derive(Debug, Deserialize)]
struct BotApiReply {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API client. Parts are streamed through `sendDocument` as
/// multipart uploads with a byte-counting body so progress stays accurate
/// for multi-GB files.
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
    ready: tokio::sync::OnceCell<()>,
}

impl TelegramClient {
    pub fn new(api_base: String, token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base,
            token,
            chat_id,
            ready: tokio::sync::OnceCell::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn check_authorization(&self) -> Result<()> {
        let reply: BotApiReply = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .context("transfer service is unreachable")?
            .json()
            .await
            .context("transfer service returned an unparsable reply")?;

        if !reply.ok {
            bail!(
                "transfer client is not authorized: {}",
                reply.description.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }
}

#[async_trait]
impl TransferClient for TelegramClient {
    async fn ensure_ready(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| self.check_authorization())
            .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        path: &Path,
        caption: &str,
        progress: ProgressSink,
    ) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("part")
            .to_string();

        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let total = file.metadata().await?.len();

        let mut sent: u64 = 0;
        let counted = ReaderStream::with_capacity(file, 64 * 1024).map(
            move |chunk: std::io::Result<Bytes>| {
                if let Ok(bytes) = &chunk {
                    sent += bytes.len() as u64;
                    progress(sent, total);
                }
                chunk
            },
        );

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(counted),
            total,
        )
        .file_name(file_name.clone());

        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("document", part);

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("failed to send {file_name}"))?;

        let status = response.status();
        let reply: BotApiReply = response
            .json()
            .await
            .context("transfer service returned an unparsable reply")?;

        if !status.is_success() || !reply.ok {
            bail!(
                "transfer service rejected {}: {}",
                file_name,
                reply.description.unwrap_or_else(|| status.to_string())
            );
        }

        Ok(())
    }
}

/// No-op client for development and tests: verifies the file exists and
/// reports instant completion.
pub struct NoopClient;

#[async_trait]
impl TransferClient for NoopClient {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn send_document(
        &self,
        path: &Path,
        caption: &str,
        progress: ProgressSink,
    ) -> Result<()> {
        let total = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        info!("noop transfer: would send {} ({caption})", path.display());
        progress(total, total.max(1));
        Ok(())
    }
}

/// Rate limiter for progress publication during one part's upload: emits at
/// most once per `min_interval` and derives KB/s from the byte delta.
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last_update: Instant,
    last_bytes: u64,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_update: Instant::now(),
            last_bytes: 0,
        }
    }

    /// Returns the current speed in KB/s when an update is due, else None.
    pub fn tick(&mut self, now: Instant, sent_bytes: u64) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed < self.min_interval {
            return None;
        }

        let delta = sent_bytes.saturating_sub(self.last_bytes);
        let speed_kbps = delta as f64 / elapsed.as_secs_f64() / 1024.0;
        self.last_update = now;
        self.last_bytes = sent_bytes;
        Some(speed_kbps)
    }
}

/// Aggregate percentage across parts: completed parts plus the fraction of
/// the part currently streaming.
pub fn aggregate_progress(part_no: usize, total_parts: usize, sent: u64, part_size: u64) -> f64 {
    let fraction = if part_size > 0 {
        (sent as f64 / part_size as f64).min(1.0)
    } else {
        1.0
    };
    ((part_no - 1) as f64 + fraction) / total_parts as f64 * 100.0
}

struct TaskHandle {
    cancel: CancellationToken,
    _join: JoinHandle<()>,
}

/// Spawns and supervises background transfer tasks. Every task keeps its
/// join handle and a cancellation token; concurrent tasks for different ids
/// run without coordination.
pub struct TransferManager {
    client: Arc<dyn TransferClient>,
    progress: Arc<ProgressRegistry>,
    tasks: DashMap<Uuid, TaskHandle>,
}

impl TransferManager {
    pub fn new(client: Arc<dyn TransferClient>, progress: Arc<ProgressRegistry>) -> Self {
        Self {
            client,
            progress,
            tasks: DashMap::new(),
        }
    }

    /// Starts a transfer of every file in `folder` and returns immediately
    /// with the new task id.
    pub fn begin(&self, folder: PathBuf, display_name: String) -> Uuid {
        let task_id = Uuid::new_v4();
        self.progress.init_transfer(task_id);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let client = self.client.clone();
        let progress = self.progress.clone();

        let join = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    warn!("Transfer task {task_id} cancelled");
                    progress.update_transfer(task_id, TransferStatus::cancelled());
                }
                result = run_transfer(client, progress.clone(), task_id, folder, display_name) => {
                    match result {
                        Ok(()) => {
                            info!("Transfer task {task_id} completed");
                            progress.update_transfer(task_id, TransferStatus::completed());
                        }
                        Err(e) => {
                            error!("Transfer task {task_id} failed: {e:#}");
                            progress.update_transfer(task_id, TransferStatus::failed(format!("{e:#}")));
                        }
                    }
                }
            }
        });

        self.tasks.insert(task_id, TaskHandle { cancel, _join: join });
        task_id
    }

    /// Requests cancellation. Returns false for unknown or already-terminal
    /// tasks.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        let Some(handle) = self.tasks.get(&task_id) else {
            return false;
        };
        if self
            .progress
            .transfer_status(task_id)
            .is_some_and(|s| s.is_terminal())
        {
            return false;
        }
        handle.cancel.cancel();
        true
    }

    pub fn status(&self, task_id: Uuid) -> Option<TransferStatus> {
        self.progress.transfer_status(task_id)
    }
}

async fn run_transfer(
    client: Arc<dyn TransferClient>,
    progress: Arc<ProgressRegistry>,
    task_id: Uuid,
    folder: PathBuf,
    display_name: String,
) -> Result<()> {
    progress.update_transfer(task_id, TransferStatus::preparing());

    let mut files: Vec<PathBuf> = Vec::new();
    let mut dir = tokio::fs::read_dir(&folder)
        .await
        .with_context(|| format!("failed to read folder {}", folder.display()))?;
    while let Some(entry) = dir.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    // Part names are zero-padded, so name order is part order
    files.sort();

    if files.is_empty() {
        bail!("no files found in folder");
    }
    let total = files.len();

    for (idx, file) in files.iter().enumerate() {
        let part_no = idx + 1;

        client.ensure_ready().await?;

        progress.update_transfer(
            task_id,
            TransferStatus::part_started(part_no, total, (part_no - 1) as f64 / total as f64 * 100.0),
        );

        let caption = format!("{display_name} - Part {part_no}/{total}");
        let throttle = Arc::new(Mutex::new(ProgressThrottle::new(Duration::from_millis(500))));
        let sink: ProgressSink = {
            let progress = progress.clone();
            let throttle = throttle.clone();
            Arc::new(move |sent, part_size| {
                if let Ok(mut throttle) = throttle.lock() {
                    if let Some(speed) = throttle.tick(Instant::now(), sent) {
                        let overall = aggregate_progress(part_no, total, sent, part_size);
                        progress.update_transfer(
                            task_id,
                            TransferStatus::uploading(
                                part_no,
                                total,
                                (overall * 10.0).round() / 10.0,
                                (speed * 100.0).round() / 100.0,
                            ),
                        );
                    }
                }
            })
        };

        client.send_document(file, &caption, sink).await?;

        progress.update_transfer(
            task_id,
            TransferStatus::part_completed(part_no, total, part_no as f64 / total as f64 * 100.0),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn wait_terminal(manager: &TransferManager, id: Uuid) -> TransferStatus {
        for _ in 0..500 {
            if let Some(status) = manager.status(id) {
                if status.is_terminal() {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transfer task {id} never reached a terminal state");
    }

    fn folder_with_parts(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"part-bytes").unwrap();
        }
        dir
    }

    /// Records send order and fails on a chosen call.
    struct ScriptedClient {
        sent: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(fail_on_call: Option<usize>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_on_call,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TransferClient for ScriptedClient {
        async fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }

        async fn send_document(
            &self,
            path: &Path,
            _caption: &str,
            progress: ProgressSink,
        ) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                bail!("simulated network failure");
            }
            progress(10, 10);
            self.sent
                .lock()
                .unwrap()
                .push(path.file_name().unwrap().to_string_lossy().to_string());
            Ok(())
        }
    }

    struct StalledClient;

    #[async_trait]
    impl TransferClient for StalledClient {
        async fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }

        async fn send_document(
            &self,
            _path: &Path,
            _caption: &str,
            _progress: ProgressSink,
        ) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[test]
    fn test_throttle_suppresses_rapid_updates() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle {
            min_interval: Duration::from_millis(500),
            last_update: start,
            last_bytes: 0,
        };

        assert!(throttle.tick(start + Duration::from_millis(100), 1024).is_none());
        assert!(throttle.tick(start + Duration::from_millis(499), 2048).is_none());

        let speed = throttle.tick(start + Duration::from_secs(1), 10 * 1024).unwrap();
        assert!((speed - 10.0).abs() < 1e-9); // 10 KiB over 1 s

        // Interval restarts after an emission
        assert!(throttle.tick(start + Duration::from_millis(1200), 11 * 1024).is_none());
    }

    #[test]
    fn test_aggregate_progress() {
        assert_eq!(aggregate_progress(1, 2, 0, 100), 0.0);
        assert_eq!(aggregate_progress(1, 2, 50, 100), 25.0);
        assert_eq!(aggregate_progress(2, 2, 50, 100), 75.0);
        assert_eq!(aggregate_progress(2, 2, 100, 100), 100.0);
        // Zero-sized part counts as complete
        assert_eq!(aggregate_progress(1, 1, 0, 0), 100.0);
    }

    #[tokio::test]
    async fn test_transfer_completes_in_part_order() {
        let dir = folder_with_parts(&["a_part002.mp4", "a_part001.mp4", "a_part003.mp4"]);
        let client = Arc::new(ScriptedClient::new(None));
        let manager = TransferManager::new(client.clone(), Arc::new(ProgressRegistry::new()));

        let id = manager.begin(dir.path().to_path_buf(), "a.mp4".to_string());
        let status = wait_terminal(&manager, id).await;

        assert!(status.done);
        assert_eq!(status.progress, 100.0);
        assert!(status.error.is_none());
        assert_eq!(
            *client.sent.lock().unwrap(),
            vec!["a_part001.mp4", "a_part002.mp4", "a_part003.mp4"]
        );
    }

    #[tokio::test]
    async fn test_transfer_failure_is_terminal_and_keeps_sent_parts() {
        let dir = folder_with_parts(&["b_part001.mp4", "b_part002.mp4"]);
        let client = Arc::new(ScriptedClient::new(Some(2)));
        let manager = TransferManager::new(client.clone(), Arc::new(ProgressRegistry::new()));

        let id = manager.begin(dir.path().to_path_buf(), "b.mp4".to_string());
        let status = wait_terminal(&manager, id).await;

        assert!(!status.done);
        assert!(status.error.as_deref().unwrap().contains("simulated network failure"));
        // Part 1 was delivered and is not rolled back
        assert_eq!(*client.sent.lock().unwrap(), vec!["b_part001.mp4"]);
        assert!(dir.path().join("b_part001.mp4").exists());
    }

    #[tokio::test]
    async fn test_empty_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TransferManager::new(Arc::new(NoopClient), Arc::new(ProgressRegistry::new()));

        let id = manager.begin(dir.path().to_path_buf(), "c.mp4".to_string());
        let status = wait_terminal(&manager, id).await;

        assert!(status.error.as_deref().unwrap().contains("no files found"));
    }

    #[tokio::test]
    async fn test_cancel_settles_task() {
        let dir = folder_with_parts(&["d_part001.mp4"]);
        let manager =
            TransferManager::new(Arc::new(StalledClient), Arc::new(ProgressRegistry::new()));

        let id = manager.begin(dir.path().to_path_buf(), "d.mp4".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.cancel(id));

        let status = wait_terminal(&manager, id).await;
        assert_eq!(status.stage, "Cancelled");
        assert_eq!(status.error.as_deref(), Some("transfer cancelled"));

        // Second cancel is refused: the task is already terminal
        assert!(!manager.cancel(id));
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let manager = TransferManager::new(Arc::new(NoopClient), Arc::new(ProgressRegistry::new()));
        assert!(!manager.cancel(Uuid::new_v4()));
    }
}

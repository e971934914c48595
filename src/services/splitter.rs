use crate::services::progress::ProgressRegistry;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("could not determine media duration")]
    DurationUnavailable,

    #[error("split tool failed: {detail}")]
    Tool { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How one input file will be cut: `total_parts` uniform time slices.
///
/// Time slicing is deliberate — stream-copy splitting cannot hit byte-exact
/// boundaries without re-encoding, so parts are sized by dividing the
/// timeline evenly and letting container overhead round the edges.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPlan {
    pub total_parts: u64,
    pub part_duration: f64,
}

pub fn plan_split(file_size: u64, max_part_bytes: u64, duration: f64) -> SplitPlan {
    let total_parts = file_size.div_ceil(max_part_bytes).max(1);
    SplitPlan {
        total_parts,
        part_duration: duration / total_parts as f64,
    }
}

/// Part filenames carry a zero-padded 1-based index so lexicographic order
/// equals part order at any part count.
pub fn part_file_name(stem: &str, part_no: u64, ext: &str) -> String {
    format!("{stem}_part{part_no:03}{ext}")
}

/// ffmpeg arguments for one part. The last part passes `end = None` and runs
/// to end-of-stream, absorbing the plan's rounding remainder.
fn build_part_args(
    input: &Path,
    start: f64,
    end: Option<f64>,
    part_path: &Path,
) -> Vec<std::ffi::OsString> {
    let mut args: Vec<std::ffi::OsString> = vec![
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_os_string(),
        "-ss".into(),
        start.to_string().into(),
        "-c".into(),
        "copy".into(),
    ];
    if let Some(end) = end {
        args.push("-to".into());
        args.push(end.to_string().into());
    }
    args.push(part_path.as_os_str().to_os_string());
    args
}

/// Cuts media files into size-bounded parts by shelling out to ffmpeg with
/// stream copy, publishing fractional progress after each part.
#[derive(Debug, Clone)]
pub struct Splitter {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
}

impl Splitter {
    pub fn new(ffmpeg_bin: PathBuf, ffprobe_bin: PathBuf) -> Self {
        Self {
            ffmpeg_bin,
            ffprobe_bin,
        }
    }

    /// Media duration in seconds via ffprobe.
    pub async fn probe_duration(&self, input: &Path) -> Result<f64, SplitError> {
        let output = Command::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(input)
            .output()
            .await
            .map_err(|e| SplitError::Tool {
                detail: format!("failed to execute ffprobe: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SplitError::Tool {
                detail: format!(
                    "ffprobe exited with {} for {}: {}",
                    output.status.code().unwrap_or(-1),
                    input.display(),
                    stderr.trim()
                ),
            });
        }

        let duration = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|_| SplitError::DurationUnavailable)?;

        if !duration.is_finite() || duration <= 0.0 {
            return Err(SplitError::DurationUnavailable);
        }

        Ok(duration)
    }

    /// Splits `input` into parts under `max_part_bytes`, writing them into
    /// `output_folder` and returning the part filenames in order.
    ///
    /// Each part is a stream copy (`-c copy`) starting at its slice offset;
    /// the last part has no end offset and runs to end-of-stream, absorbing
    /// rounding remainder. A failed tool invocation aborts the whole call and
    /// leaves already-written parts for the reaper — no retries.
    pub async fn split(
        &self,
        input: &Path,
        output_folder: &Path,
        max_part_bytes: u64,
        progress: &ProgressRegistry,
    ) -> Result<Vec<String>, SplitError> {
        let filename = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let ext = input
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let duration = self.probe_duration(input).await?;
        let file_size = tokio::fs::metadata(input).await?.len();
        let plan = plan_split(file_size, max_part_bytes, duration);

        info!(
            "Splitting {} ({} bytes, {:.1}s) into {} part(s) of {:.1}s",
            filename, file_size, duration, plan.total_parts, plan.part_duration
        );

        let mut part_files = Vec::with_capacity(plan.total_parts as usize);

        for i in 0..plan.total_parts {
            let part_name = part_file_name(stem, i + 1, &ext);
            let part_path = output_folder.join(&part_name);

            let start = i as f64 * plan.part_duration;
            let end = if i < plan.total_parts - 1 {
                Some((i + 1) as f64 * plan.part_duration)
            } else {
                None
            };

            let mut cmd = Command::new(&self.ffmpeg_bin);
            cmd.args(build_part_args(input, start, end, &part_path));

            let output = cmd.output().await.map_err(|e| SplitError::Tool {
                detail: format!("failed to execute ffmpeg: {e}"),
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                error!(
                    "ffmpeg failed on part {}/{} of {}: {}",
                    i + 1,
                    plan.total_parts,
                    filename,
                    stderr.trim()
                );
                return Err(SplitError::Tool {
                    detail: format!(
                        "ffmpeg exited with {} while writing {}",
                        output.status.code().unwrap_or(-1),
                        part_name
                    ),
                });
            }

            part_files.push(part_name);

            let percent = (i + 1) as f64 / plan.total_parts as f64 * 100.0;
            progress.set_split_progress(&filename, percent);
            info!(
                "Created part {}/{} of {} ({:.2}%)",
                i + 1,
                plan.total_parts,
                filename,
                percent
            );
        }

        Ok(part_files)
    }
}

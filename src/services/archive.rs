use anyhow::{Context, Result, bail};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

/// Writes a flat ZIP of every file directly inside `folder` into `dest`,
/// in name order. Entries are Stored — the parts are compressed media
/// containers already, deflating them burns CPU for nothing.
pub fn write_folder_zip<W: Write + Seek>(folder: &Path, dest: W) -> Result<usize> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);

    let mut names: Vec<PathBuf> = std::fs::read_dir(folder)
        .with_context(|| format!("failed to read folder {}", folder.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    names.sort();

    if names.is_empty() {
        bail!("folder {} contains no files", folder.display());
    }

    let mut zip = ZipWriter::new(dest);
    let mut count = 0;

    for path in names {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("unreadable filename in {}", folder.display()))?;

        zip.start_file(name, options)?;
        let mut file =
            std::fs::File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            zip.write_all(&buf[..n])?;
        }
        count += 1;
    }

    zip.finish()?;
    Ok(count)
}

/// Stages the folder's ZIP in a temp file off the async runtime. The caller
/// streams from the returned handle; the temp file disappears when the
/// handle drops.
pub async fn stage_folder_zip(folder: &Path) -> Result<NamedTempFile> {
    let folder = folder.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut staged = NamedTempFile::new().context("failed to create staging file")?;
        write_folder_zip(&folder, staged.as_file_mut())?;
        Ok(staged)
    })
    .await
    .context("zip staging task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_zip_contains_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m_part002.mp4"), b"bbbb").unwrap();
        std::fs::write(dir.path().join("m_part001.mp4"), b"aa").unwrap();

        let mut buf = Cursor::new(Vec::new());
        let count = write_folder_zip(dir.path(), &mut buf).unwrap();
        assert_eq!(count, 2);

        let mut archive = zip::ZipArchive::new(Cursor::new(buf.into_inner())).unwrap();
        assert_eq!(archive.len(), 2);

        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "m_part001.mp4");
        assert_eq!(first.size(), 2);
        drop(first);

        let second = archive.by_index(1).unwrap();
        assert_eq!(second.name(), "m_part002.mp4");
        assert_eq!(second.size(), 4);
    }

    #[test]
    fn test_zip_of_empty_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_folder_zip(dir.path(), Cursor::new(Vec::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stage_folder_zip_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip_part001.mkv"), b"media bytes").unwrap();

        let staged = stage_folder_zip(dir.path()).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::fs::File::open(staged.path()).unwrap()).unwrap();

        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "clip_part001.mkv");
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"media bytes");
    }
}

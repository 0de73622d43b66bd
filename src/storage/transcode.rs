//! Recompression of downloaded grid archives via external commands.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Empty {0} command")]
    EmptyCommand(&'static str),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{0:?} does not end with the archive suffix")]
    UnexpectedName(PathBuf),

    #[error("Expected output {0:?} was not produced")]
    MissingOutput(PathBuf),
}

/// Runs the decompress-then-recompress pair on one file.
///
/// Each command gets the input path appended as its last argument. The
/// decompressor must write the input minus the archive suffix; the
/// recompressor must write its input plus the storage suffix.
#[derive(Debug, Clone)]
pub struct Transcoder {
    pub decompress: Vec<String>,
    pub recompress: Vec<String>,
    pub archive_suffix: String,
    pub storage_suffix: String,
}

impl Transcoder {
    /// Transcode `raw` in place, returning the stored file.
    ///
    /// Intermediate files are removed whether or not the commands succeed.
    pub async fn transcode(&self, raw: &Path) -> Result<PathBuf, TranscodeError> {
        let decompressed = self.decompressed_path(raw)?;
        let output = append_suffix(&decompressed, &self.storage_suffix);

        let result = self.run_pair(raw, &decompressed, &output).await;

        remove_if_present(&decompressed).await;
        remove_if_present(raw).await;
        if result.is_err() {
            remove_if_present(&output).await;
        }

        result.map(|()| output)
    }

    async fn run_pair(
        &self,
        raw: &Path,
        decompressed: &Path,
        output: &Path,
    ) -> Result<(), TranscodeError> {
        run_command("decompress", &self.decompress, raw).await?;
        if !tokio::fs::try_exists(decompressed).await.unwrap_or(false) {
            return Err(TranscodeError::MissingOutput(decompressed.to_path_buf()));
        }

        run_command("recompress", &self.recompress, decompressed).await?;
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TranscodeError::MissingOutput(output.to_path_buf()));
        }

        Ok(())
    }

    fn decompressed_path(&self, raw: &Path) -> Result<PathBuf, TranscodeError> {
        let name = raw
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(&self.archive_suffix))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TranscodeError::UnexpectedName(raw.to_path_buf()))?;
        Ok(raw.with_file_name(name))
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

async fn run_command(
    stage: &'static str,
    command: &[String],
    input: &Path,
) -> Result<(), TranscodeError> {
    let (program, args) = command
        .split_first()
        .ok_or(TranscodeError::EmptyCommand(stage))?;

    debug!("Running {} {:?} on {:?}", program, args, input);

    let output = Command::new(program)
        .args(args)
        .arg(input)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| TranscodeError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(TranscodeError::NonZeroExit {
            program: program.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell(script: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ]
    }

    fn transcoder() -> Transcoder {
        Transcoder {
            decompress: shell(r#"mv "$1" "${1%.bz2}""#),
            recompress: shell(r#"cp "$1" "$1.zst""#),
            archive_suffix: ".bz2".to_string(),
            storage_suffix: ".zst".to_string(),
        }
    }

    #[tokio::test]
    async fn test_name_without_archive_suffix_is_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let raw = temp_dir.path().join("x.grib2");
        std::fs::write(&raw, b"GRIB").unwrap();

        let err = transcoder().transcode(&raw).await.unwrap_err();

        assert!(matches!(err, TranscodeError::UnexpectedName(_)));
        assert!(raw.exists());
    }

    #[tokio::test]
    async fn test_transcode_leaves_only_output() {
        let temp_dir = TempDir::new().unwrap();
        let raw = temp_dir.path().join("x.grib2.bz2");
        std::fs::write(&raw, b"GRIB").unwrap();

        let output = transcoder().transcode(&raw).await.unwrap();

        assert_eq!(output, temp_dir.path().join("x.grib2.zst"));
        assert_eq!(std::fs::read(&output).unwrap(), b"GRIB");
        assert!(!raw.exists());
        assert!(!temp_dir.path().join("x.grib2").exists());
    }

    #[tokio::test]
    async fn test_failed_command_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let raw = temp_dir.path().join("x.grib2.bz2");
        std::fs::write(&raw, b"GRIB").unwrap();

        let mut failing = transcoder();
        failing.recompress = vec!["false".to_string()];

        let err = failing.transcode(&raw).await.unwrap_err();

        assert!(matches!(err, TranscodeError::NonZeroExit { .. }));
        assert!(!raw.exists());
        assert!(!temp_dir.path().join("x.grib2").exists());
        assert!(!temp_dir.path().join("x.grib2.zst").exists());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp_dir = TempDir::new().unwrap();
        let raw = temp_dir.path().join("x.grib2.bz2");
        std::fs::write(&raw, b"GRIB").unwrap();

        let mut broken = transcoder();
        broken.decompress = vec!["definitely-not-an-installed-decompressor".to_string()];

        let err = broken.transcode(&raw).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }
}

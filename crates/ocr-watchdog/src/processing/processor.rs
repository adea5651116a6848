//! Per-file processing: stage, convert, relocate, apply permissions
//!
//! ```text
//! Received ──resolve perms──▶ Staged ──invoke OCR──▶ Converting ─┬─▶ Succeeded
//!                                                                └─▶ Failed
//! ```
//!
//! Every step runs once. A failing step ends the job; nothing is retried or
//! rolled back.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::ocr::{CommandOcrInvoker, OcrInvoker};
use crate::permissions::{OwnershipOps, PermissionResolver, SystemOwnership, TargetPermissions};

use super::job_queue::Job;

/// Mode for a lazily created failed directory when no mode override is set
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Processing state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Staged,
    Converting,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Received => "received",
            JobState::Staged => "staged",
            JobState::Converting => "converting",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// File names derived from the job's source path
#[derive(Debug, Clone)]
struct JobNames {
    /// Original file name, e.g. `report.pdf`
    file_name: String,
    /// File name without extension, e.g. `report`
    stem: String,
    /// Extension including the dot, e.g. `.pdf`; empty if none
    extension: String,
}

impl JobNames {
    fn derive(source: &Path) -> Option<Self> {
        let file_name = source.file_name()?.to_str()?.to_string();
        let stem = source.file_stem().and_then(OsStr::to_str)?.to_string();
        let extension = source
            .extension()
            .and_then(OsStr::to_str)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        Some(Self {
            file_name,
            stem,
            extension,
        })
    }
}

/// Runs the per-file state machine
pub struct JobProcessor {
    config: Arc<ProcessingConfig>,
    invoker: Arc<dyn OcrInvoker>,
    resolver: PermissionResolver,
}

impl JobProcessor {
    pub fn new(
        config: Arc<ProcessingConfig>,
        invoker: Arc<dyn OcrInvoker>,
        ownership: Arc<dyn OwnershipOps>,
    ) -> Self {
        let resolver = PermissionResolver::new(config.overrides, ownership);
        Self {
            config,
            invoker,
            resolver,
        }
    }

    /// Processor backed by the configured OCR command and the real filesystem
    pub fn from_config(config: Arc<ProcessingConfig>) -> Self {
        let invoker = Arc::new(CommandOcrInvoker::from_config(&config));
        Self::new(config, invoker, Arc::new(SystemOwnership))
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Process one job to a terminal state.
    ///
    /// Returns the final output path on success. Every error is terminal for
    /// this job only; the caller logs it.
    pub async fn process(&self, job: &Job) -> Result<PathBuf> {
        let source = job.path();
        tracing::info!(path = %source.display(), state = %JobState::Received, "Processing file");

        let target = {
            let resolver = self.resolver.clone();
            let source = source.to_path_buf();
            run_blocking(move || resolver.resolve(&source)).await?
        };
        tracing::info!("{}", self.describe(source).await);

        let names = JobNames::derive(source).ok_or_else(|| {
            Error::staging(
                source,
                &self.config.output_dir,
                io::Error::new(io::ErrorKind::InvalidInput, "file name is not valid UTF-8"),
            )
        })?;

        let staged = self.stage(source, &names).await?;
        tracing::info!(
            from = %source.display(),
            to = %staged.display(),
            state = %JobState::Staged,
            "Staged file"
        );

        let tmp_output = self.config.output_dir.join(format!("{}.tmp", names.stem));
        tracing::info!(
            input = %staged.display(),
            output = %tmp_output.display(),
            state = %JobState::Converting,
            "Running OCR"
        );
        let outcome = self.invoker.invoke(&staged, &tmp_output).await;

        match outcome.result {
            Ok(()) => {
                tracing::info!(path = %source.display(), "OCR output:\n{}", outcome.output);
                let final_path = self.finalize(&tmp_output, &staged, &names, &target).await?;
                tracing::info!(
                    path = %final_path.display(),
                    state = %JobState::Succeeded,
                    "Job finished successfully"
                );
                Ok(final_path)
            }
            Err(e) => {
                tracing::warn!(path = %source.display(), "OCR output:\n{}", outcome.output);
                tracing::error!(path = %source.display(), state = %JobState::Failed, "Job failed: {}", e);
                self.relocate_failed(&staged, &tmp_output, &names).await?;
                Err(e)
            }
        }
    }

    /// Owner/mode report, read off the runtime threads
    async fn describe(&self, path: &Path) -> String {
        let resolver = self.resolver.clone();
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || resolver.describe(&path)).await {
            Ok(report) => report,
            Err(e) => format!("owner/mode unavailable ({})", e),
        }
    }

    /// Move the source to a unique temp name in the output directory.
    ///
    /// The name is reserved by creating a temp file, which is deleted right
    /// before the move takes its place.
    async fn stage(&self, source: &Path, names: &JobNames) -> Result<PathBuf> {
        let output_dir = self.config.output_dir.clone();
        let prefix = format!("{}.", names.stem);
        let suffix = names.extension.clone();
        let source_path = source.to_path_buf();

        let staged = run_blocking(move || {
            let placeholder = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile_in(&output_dir)
                .map_err(|e| Error::staging(&source_path, &output_dir, e))?;
            let staged = placeholder.path().to_path_buf();
            placeholder
                .close()
                .map_err(|e| Error::staging(&source_path, &staged, e))?;
            Ok(staged)
        })
        .await?;

        move_file(source, &staged)
            .await
            .map_err(|e| Error::staging(source, &staged, e))?;

        Ok(staged)
    }

    /// Publish the OCR result under its final name and apply ownership and mode
    async fn finalize(
        &self,
        tmp_output: &Path,
        staged: &Path,
        names: &JobNames,
        target: &TargetPermissions,
    ) -> Result<PathBuf> {
        let final_path = self.config.output_dir.join(format!("{}.pdf", names.stem));

        if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            tracing::warn!(path = %final_path.display(), "Replacing existing result with the same name");
        }
        tokio::fs::rename(tmp_output, &final_path)
            .await
            .map_err(|e| Error::finalization(&final_path, "rename", e))?;
        tracing::info!(from = %tmp_output.display(), to = %final_path.display(), "Renamed result");

        match tokio::fs::remove_file(staged).await {
            Ok(()) => tracing::info!(path = %staged.display(), "Removed staged input"),
            Err(e) => tracing::warn!(path = %staged.display(), "Failed to remove staged input: {}", e),
        }

        {
            let resolver = self.resolver.clone();
            let path = final_path.clone();
            let target = *target;
            run_blocking(move || resolver.apply(&path, &target)).await?;
        }
        tracing::info!("{}", self.describe(&final_path).await);

        Ok(final_path)
    }

    /// Move the staged input into the failed directory under its original name
    async fn relocate_failed(&self, staged: &Path, tmp_output: &Path, names: &JobNames) -> Result<()> {
        match tokio::fs::remove_file(tmp_output).await {
            Ok(()) => tracing::info!(path = %tmp_output.display(), "Removed partial OCR output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %tmp_output.display(), "Failed to remove partial OCR output: {}", e),
        }

        let failed_dir = &self.config.failed_dir;
        if !tokio::fs::metadata(failed_dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            let mode = self.config.overrides.mode.unwrap_or(DEFAULT_DIR_MODE);
            create_dir(failed_dir, mode).await.map_err(|e| {
                tracing::error!(
                    path = %failed_dir.display(),
                    staged = %staged.display(),
                    "Failed to create directory: {}",
                    e
                );
                Error::failed_directory(failed_dir, e)
            })?;
            tracing::info!(path = %failed_dir.display(), mode = %format!("{:04o}", mode), "Created failed directory");
        }

        let failed_path = failed_dir.join(&names.file_name);
        move_file(staged, &failed_path).await.map_err(|e| {
            tracing::error!(
                from = %staged.display(),
                to = %failed_path.display(),
                "Failed to move file: {}",
                e
            );
            Error::failed_directory(&failed_path, e)
        })?;
        tracing::info!(from = %staged.display(), to = %failed_path.display(), "Moved file to failed directory");

        Ok(())
    }
}

impl fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobProcessor")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Rename, falling back to copy and remove when rename fails (e.g. across filesystems)
pub(crate) async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    let rename_err = match tokio::fs::rename(from, to).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    tracing::debug!(from = %from.display(), to = %to.display(), "rename failed ({}), copying", rename_err);

    copy_and_remove(from, to).await
}

/// Copy then remove the source. On any failure the source stays the only copy.
async fn copy_and_remove(from: &Path, to: &Path) -> io::Result<()> {
    // An existing destination is not ours to delete
    let created = !tokio::fs::try_exists(to).await.unwrap_or(true);

    let result = match tokio::fs::copy(from, to).await {
        Ok(_) => tokio::fs::remove_file(from).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        if created {
            let _ = tokio::fs::remove_file(to).await;
        }
        return Err(e);
    }
    Ok(())
}

/// Run synchronous filesystem work on the blocking pool
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(Error::join)?
}

async fn create_dir(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path).await
}

//! Configuration for the OCR watchdog
//!
//! [`WatchdogConfig`] is the raw, serde-friendly form (TOML file, CLI and
//! environment overrides). [`WatchdogConfig::resolve`] validates it once at
//! startup and produces the immutable [`ProcessingConfig`] that every
//! component receives by value or `Arc`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::permissions::PermissionOverrides;

/// Default OCRmyPDF arguments
pub const DEFAULT_OCR_ARGS: &str =
    "--pdf-renderer sandwich --tesseract-timeout 1800 --rotate-pages -l eng+fra+deu --deskew --clean --skip-text";

/// Main watchdog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Input, output and failed directories
    #[serde(default)]
    pub directories: DirectoryConfig,
    /// External OCR tool
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Ownership and mode applied to results
    #[serde(default)]
    pub permissions: PermissionConfig,
    /// Worker pool and classification
    #[serde(default)]
    pub processing: ProcessingSettings,
}

/// Directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Watched input directory (non-recursive)
    pub input: PathBuf,
    /// Output directory for OCR results
    pub output: PathBuf,
    /// Name of the failed directory, joined onto `input` unless absolute
    pub failed_dir_name: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("/in"),
            output: PathBuf::from("/out"),
            failed_dir_name: "failed".to_string(),
        }
    }
}

/// OCR tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Executable name or path
    pub executable: String,
    /// Whitespace separated argument list placed before input and output paths
    pub args: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            executable: "ocrmypdf".to_string(),
            args: DEFAULT_OCR_ARGS.to_string(),
        }
    }
}

/// Permission overrides in their raw form: negative ids and a zero mode mean "keep the source's value"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    pub uid: i64,
    pub gid: i64,
    /// File mode, written as `0o644` in TOML
    pub mode: u32,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            uid: -1,
            gid: -1,
            mode: 0,
        }
    }
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Number of concurrent workers (0 is treated as 1)
    pub workers: usize,
    /// File extensions accepted as PDF candidates, without the dot
    #[serde(default = "default_pdf_extensions")]
    pub pdf_extensions: Vec<String>,
}

fn default_pdf_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            pdf_extensions: default_pdf_extensions(),
        }
    }
}

impl WatchdogConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate and freeze into the [`ProcessingConfig`] used by the pipeline
    pub fn resolve(&self) -> Result<ProcessingConfig> {
        let input_dir = self.directories.input.clone();
        let output_dir = self.directories.output.clone();

        dir_must_exist(&input_dir)?;
        dir_must_exist(&output_dir)?;
        dir_must_be_readable(&input_dir)?;
        // Staging removes files from the input and creates files in the output
        dir_must_be_writable(&input_dir)?;
        dir_must_be_writable(&output_dir)?;

        if self.directories.failed_dir_name.trim().is_empty() {
            return Err(Error::config("failed directory name must not be empty"));
        }
        let failed_dir = input_dir.join(&self.directories.failed_dir_name);

        let overrides = PermissionOverrides::from_raw(
            self.permissions.uid,
            self.permissions.gid,
            self.permissions.mode,
        )?;

        let pdf_extensions: Vec<String> = self
            .processing
            .pdf_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if pdf_extensions.is_empty() {
            return Err(Error::config("at least one PDF extension is required"));
        }

        Ok(ProcessingConfig {
            input_dir,
            output_dir,
            failed_dir,
            ocr_executable: self.ocr.executable.clone(),
            ocr_args: split_args(&self.ocr.args),
            overrides,
            workers: self.processing.workers.max(1),
            pdf_extensions,
        })
    }
}

/// Resolved, immutable configuration shared by all components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Created lazily on the first failed job
    pub failed_dir: PathBuf,
    pub ocr_executable: String,
    pub ocr_args: Vec<String>,
    pub overrides: PermissionOverrides,
    /// Worker count and job queue capacity, at least 1
    pub workers: usize,
    /// Lowercase, without leading dot
    pub pdf_extensions: Vec<String>,
}

impl ProcessingConfig {
    /// Config for the given directories with defaults for everything else.
    ///
    /// Does not check that the directories exist; use [`WatchdogConfig::resolve`] for that.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        let defaults = WatchdogConfig::default();
        Self {
            failed_dir: input_dir.join(&defaults.directories.failed_dir_name),
            input_dir,
            output_dir: output_dir.into(),
            ocr_executable: defaults.ocr.executable,
            ocr_args: split_args(&defaults.ocr.args),
            overrides: PermissionOverrides::default(),
            workers: 1,
            pdf_extensions: default_pdf_extensions(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_overrides(mut self, overrides: PermissionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_ocr(mut self, executable: impl Into<String>, args: Vec<String>) -> Self {
        self.ocr_executable = executable.into();
        self.ocr_args = args;
        self
    }

    pub fn with_failed_dir(mut self, failed_dir: impl Into<PathBuf>) -> Self {
        self.failed_dir = failed_dir.into();
        self
    }

    /// The command line the OCR tool is invoked with, minus input and output paths
    pub fn ocr_command_line(&self) -> String {
        std::iter::once(self.ocr_executable.as_str())
            .chain(self.ocr_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== Configuration ==========")?;
        writeln!(f, "ocr command:    {}", self.ocr_command_line())?;
        writeln!(f, "input dir:      {}", self.input_dir.display())?;
        writeln!(f, "output dir:     {}", self.output_dir.display())?;
        writeln!(f, "failed dir:     {}", self.failed_dir.display())?;
        writeln!(f, "overrides:      {}", self.overrides)?;
        writeln!(f, "workers:        {}", self.workers)?;
        writeln!(f, "pdf extensions: {}", self.pdf_extensions.join(", "))?;
        write!(f, "===================================")
    }
}

/// Split an argument string on whitespace
pub fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Parse an octal mode such as `0644`, `644` or `0o644`
pub fn parse_octal_mode(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|e| Error::config(format!("invalid octal mode '{}': {}", value, e)))?;
    if mode > 0o7777 {
        return Err(Error::config(format!("mode '{}' is out of range", value)));
    }
    Ok(mode)
}

fn dir_must_exist(dir: &Path) -> Result<()> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::config(format!("not a directory: {}", dir.display()))),
        Err(e) => Err(Error::config(format!("directory not found: {} ({})", dir.display(), e))),
    }
}

fn dir_must_be_readable(dir: &Path) -> Result<()> {
    std::fs::read_dir(dir)
        .map(|_| ())
        .map_err(|e| Error::config(format!("directory not readable: {} ({})", dir.display(), e)))
}

fn dir_must_be_writable(dir: &Path) -> Result<()> {
    tempfile::tempfile_in(dir)
        .map(drop)
        .map_err(|e| Error::config(format!("directory not writable: {} ({})", dir.display(), e)))
}

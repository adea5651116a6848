//! External OCR tool invocation
//!
//! The tool is run as `<executable> <args...> <input> <output>` and awaited to
//! completion. There is no timeout here; ocrmypdf carries its own
//! (`--tesseract-timeout`).

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};

/// Result of one OCR run
#[derive(Debug)]
pub struct OcrOutcome {
    /// Captured stdout followed by stderr, present whatever the outcome
    pub output: String,
    /// `Err(Error::Conversion)` if the tool could not start or exited non-zero
    pub result: Result<()>,
}

impl OcrOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            result: Ok(()),
        }
    }

    pub fn failure(output: impl Into<String>, error: Error) -> Self {
        Self {
            output: output.into(),
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs OCR on `input`, writing the result to `output`
#[async_trait]
pub trait OcrInvoker: Send + Sync {
    async fn invoke(&self, input: &Path, output: &Path) -> OcrOutcome;
}

/// [`OcrInvoker`] that spawns an external command
#[derive(Debug, Clone)]
pub struct CommandOcrInvoker {
    executable: String,
    args: Vec<String>,
}

impl CommandOcrInvoker {
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.ocr_executable.clone(), config.ocr_args.clone())
    }

    /// Configured arguments with input and output appended as the last two positionals
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(OsString::from)
            .chain([input.as_os_str().to_owned(), output.as_os_str().to_owned()])
            .collect()
    }
}

#[async_trait]
impl OcrInvoker for CommandOcrInvoker {
    async fn invoke(&self, input: &Path, output: &Path) -> OcrOutcome {
        let args = self.build_args(input, output);
        tracing::debug!(executable = %self.executable, ?args, "Running OCR");

        let result = tokio::process::Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // In-flight conversions finish even when the watchdog shuts down
            .kill_on_drop(false)
            .output()
            .await;

        match result {
            Ok(out) => {
                let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&out.stderr));

                if out.status.success() {
                    OcrOutcome::success(combined)
                } else {
                    let error = Error::conversion(
                        input,
                        format!("{} exited with {}", self.executable, out.status),
                    );
                    OcrOutcome::failure(combined, error)
                }
            }
            Err(e) => {
                let error = Error::conversion(
                    input,
                    format!("failed to start {}: {}", self.executable, e),
                );
                OcrOutcome::failure(String::new(), error)
            }
        }
    }
}

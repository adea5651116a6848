//! OCR watchdog binary
//!
//! Run with: cargo run -p ocr-watchdog -- --in-directory ./in --out-directory ./out

use clap::Parser;
use ocr_watchdog::config::{parse_octal_mode, WatchdogConfig};
use ocr_watchdog::{shutdown_signal, Watchdog};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Watch a directory and OCR every PDF dropped into it
#[derive(Debug, Parser)]
#[command(name = "ocr-watchdog", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "OCR_WATCHDOG_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to watch for new PDFs
    #[arg(long, env = "IN_DIRECTORY")]
    in_directory: Option<PathBuf>,

    /// Directory receiving OCR results
    #[arg(long, env = "OUT_DIRECTORY")]
    out_directory: Option<PathBuf>,

    /// Name of the failed directory inside the input directory
    #[arg(long, env = "FAILED_DIR_NAME")]
    failed_dir_name: Option<String>,

    /// OCR executable
    #[arg(long, env = "OCRMYPDF_EXECUTABLE")]
    ocrmypdf_executable: Option<String>,

    /// OCR arguments placed before the input and output paths
    #[arg(long, env = "OCRMYPDF_ARGS", allow_hyphen_values = true)]
    ocrmypdf_args: Option<String>,

    /// Owner uid for results; negative keeps the source's uid
    #[arg(long, env = "PUID", allow_negative_numbers = true)]
    puid: Option<i64>,

    /// Owner gid for results; negative keeps the source's gid
    #[arg(long, env = "PGID", allow_negative_numbers = true)]
    pgid: Option<i64>,

    /// Octal file mode for results; 0 keeps the source's mode
    #[arg(long, env = "CHMOD", value_parser = parse_octal_mode)]
    chmod: Option<u32>,

    /// Number of concurrent OCR jobs
    #[arg(long, env = "NUM_WORKERS")]
    num_workers: Option<usize>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Layer flags and environment over the file (or default) configuration
    fn into_config(self) -> anyhow::Result<WatchdogConfig> {
        let mut config = match &self.config {
            Some(path) => WatchdogConfig::from_file(path)?,
            None => WatchdogConfig::default(),
        };

        if let Some(input) = self.in_directory {
            config.directories.input = input;
        }
        if let Some(output) = self.out_directory {
            config.directories.output = output;
        }
        if let Some(name) = self.failed_dir_name {
            config.directories.failed_dir_name = name;
        }
        if let Some(executable) = self.ocrmypdf_executable {
            config.ocr.executable = executable;
        }
        if let Some(args) = self.ocrmypdf_args {
            config.ocr.args = args;
        }
        if let Some(uid) = self.puid {
            config.permissions.uid = uid;
        }
        if let Some(gid) = self.pgid {
            config.permissions.gid = gid;
        }
        if let Some(mode) = self.chmod {
            config.permissions.mode = mode;
        }
        if let Some(workers) = self.num_workers {
            config.processing.workers = workers;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_watchdog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let print_config = cli.print_config;
    let config = cli.into_config()?;

    if print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = config.resolve()?;
    let watchdog = Watchdog::new(config);

    let cancel = watchdog.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    watchdog.run().await?;
    tracing::info!("Shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::try_parse_from([
            "ocr-watchdog",
            "--in-directory",
            "/data/in",
            "--puid",
            "-1",
            "--pgid",
            "1000",
            "--chmod",
            "0640",
            "--ocrmypdf-args",
            "--skip-text -l eng",
            "--num-workers",
            "4",
        ])
        .unwrap();

        let config = cli.into_config().unwrap();
        assert_eq!(config.directories.input, PathBuf::from("/data/in"));
        assert_eq!(config.directories.output, PathBuf::from("/out"));
        assert_eq!(config.permissions.uid, -1);
        assert_eq!(config.permissions.gid, 1000);
        assert_eq!(config.permissions.mode, 0o640);
        assert_eq!(config.ocr.args, "--skip-text -l eng");
        assert_eq!(config.processing.workers, 4);
    }

    #[test]
    fn test_cli_rejects_bad_mode() {
        assert!(Cli::try_parse_from(["ocr-watchdog", "--chmod", "0999"]).is_err());
    }
}

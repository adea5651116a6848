//! Service lifecycle: watcher, queue, worker pool and dispatcher wired together

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::classifier::FileClassifier;
use crate::config::ProcessingConfig;
use crate::dispatcher::{DispatchExit, Dispatcher};
use crate::error::Result;
use crate::permissions::describe_path;
use crate::processing::{JobProcessor, JobQueue, WorkerPool};
use crate::watcher::DirectoryWatcher;

/// The running watchdog service
#[derive(Debug)]
pub struct Watchdog {
    config: Arc<ProcessingConfig>,
    processor: Arc<JobProcessor>,
    cancel: CancellationToken,
}

impl Watchdog {
    /// Service using the configured OCR command and real file ownership
    pub fn new(config: ProcessingConfig) -> Self {
        let config = Arc::new(config);
        let processor = Arc::new(JobProcessor::from_config(config.clone()));
        Self {
            config,
            processor,
            cancel: CancellationToken::new(),
        }
    }

    /// Service with a custom job processor
    pub fn with_processor(processor: JobProcessor) -> Self {
        let config = Arc::new(processor.config().clone());
        Self {
            config,
            processor: Arc::new(processor),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the service when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Run until cancelled.
    ///
    /// Fails only when the watcher cannot be set up. Once running, per-file
    /// errors are logged by the workers and never end the service. On
    /// cancellation, jobs already inside OCR run to completion and queued
    /// jobs are abandoned with their files left in the input directory.
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        tracing::info!("\n{}", config);
        tracing::info!("{}", describe_path(&config.input_dir));
        tracing::info!("{}", describe_path(&config.output_dir));

        let (watcher, events) = DirectoryWatcher::new(&config.input_dir).map_err(|e| {
            tracing::error!("Failed to watch input directory: {}", e);
            e
        })?;

        let (queue, receiver) = JobQueue::new(config.workers);
        let pool = WorkerPool::spawn(
            config.workers,
            receiver,
            self.processor.clone(),
            self.cancel.clone(),
        );

        let dispatcher = Dispatcher::new(
            FileClassifier::new(config.pdf_extensions.clone()),
            queue,
            self.cancel.clone(),
        );
        let (exit, stats) = dispatcher.run(events).await;
        if exit != DispatchExit::Cancelled {
            tracing::error!(?exit, "Dispatcher stopped unexpectedly, shutting down");
        }

        drop(watcher);
        self.cancel.cancel();
        tracing::info!("Waiting for workers to finish their current job...");
        pool.join().await;

        tracing::info!(
            events = stats.events,
            submitted = stats.submitted,
            "Watchdog stopped"
        );
        Ok(())
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}

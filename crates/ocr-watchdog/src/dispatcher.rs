//! Main dispatch loop: watcher events in, PDF jobs out

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classifier::FileClassifier;
use crate::processing::{Job, JobQueue};
use crate::watcher::WatchEvent;

/// Counters reported when the dispatch loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events: usize,
    pub submitted: usize,
}

/// Why the dispatch loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    Cancelled,
    WatcherClosed,
    QueueClosed,
}

/// Sole producer of the job queue
#[derive(Debug)]
pub struct Dispatcher {
    classifier: FileClassifier,
    queue: JobQueue,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(classifier: FileClassifier, queue: JobQueue, cancel: CancellationToken) -> Self {
        Self {
            classifier,
            queue,
            cancel,
        }
    }

    /// Turn an event into a job if it is a create/write of an existing PDF.
    ///
    /// Classification reads the file, so it runs on the blocking pool.
    pub async fn accept(&self, event: &WatchEvent) -> Option<Job> {
        if !event.kind.is_relevant() {
            return None;
        }
        tracing::debug!("file: {}", event.path.display());

        let classifier = self.classifier.clone();
        let path = event.path.clone();
        let is_pdf = tokio::task::spawn_blocking(move || classifier.is_pdf(&path))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(path = %event.path.display(), "Classification task failed: {}", e);
                false
            });

        is_pdf.then(|| Job::new(&event.path))
    }

    /// Run until cancelled, the watcher stops, or the workers are gone.
    ///
    /// Waits on a full queue, so event handling stalls while all workers are busy.
    /// The queue sender is dropped on return.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
    ) -> (DispatchExit, DispatchStats) {
        let mut stats = DispatchStats::default();

        let exit = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break DispatchExit::Cancelled,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                tracing::warn!("Watcher event stream closed");
                break DispatchExit::WatcherClosed;
            };
            stats.events += 1;

            let Some(job) = self.accept(&event).await else {
                continue;
            };

            tracing::info!(path = %job.path().display(), "Submitting job");
            let submitted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break DispatchExit::Cancelled,
                result = self.queue.submit(job) => result,
            };
            if submitted.is_err() {
                break DispatchExit::QueueClosed;
            }
            stats.submitted += 1;
        };

        tracing::info!(
            ?exit,
            events = stats.events,
            submitted = stats.submitted,
            "Dispatcher stopped"
        );
        (exit, stats)
    }
}

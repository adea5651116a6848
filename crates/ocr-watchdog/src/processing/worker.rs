//! Fixed-size worker pool consuming the job queue

use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::job_queue::JobReceiver;
use super::processor::JobProcessor;

/// Workers pulling jobs until cancelled or the queue closes
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (minimum 1) on the current runtime
    pub fn spawn(
        size: usize,
        receiver: JobReceiver,
        processor: Arc<JobProcessor>,
        cancel: CancellationToken,
    ) -> Self {
        let size = size.max(1);
        let handles = (0..size)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    receiver.clone(),
                    processor.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!("Started {} workers", size);
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("Worker task panicked: {}", e);
            }
        }
    }
}

/// A worker finishes the job it holds, but once cancelled never takes another
async fn run_worker(
    id: usize,
    receiver: JobReceiver,
    processor: Arc<JobProcessor>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = receiver.recv() => job,
        };

        let Some(job) = job else {
            tracing::debug!(worker = id, "Job queue closed");
            break;
        };

        tracing::info!(worker = id, path = %job.path().display(), "New job");
        match processor.process(&job).await {
            Ok(output) => {
                tracing::info!(worker = id, output = %output.display(), "Job done");
            }
            Err(e) => {
                tracing::error!(worker = id, path = %job.path().display(), "Job ended with error: {}", e);
            }
        }
    }

    tracing::info!("Closing worker {}...", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use crate::error::Error;
    use crate::ocr::{OcrInvoker, OcrOutcome};
    use crate::permissions::{FileOwnership, OwnershipOps};
    use crate::processing::{Job, JobQueue};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::{Notify, Semaphore};

    struct NoopOwnership;

    impl OwnershipOps for NoopOwnership {
        fn stat_owner_mode(&self, path: &Path) -> std::io::Result<FileOwnership> {
            std::fs::metadata(path)?;
            Ok(FileOwnership {
                uid: Some(1000),
                gid: Some(1000),
                mode: 0o644,
            })
        }

        fn chown(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> std::io::Result<()> {
            Ok(())
        }

        fn chmod(&self, _path: &Path, _mode: u32) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Records how many invocations overlap and optionally waits on a gate
    #[derive(Default)]
    struct TrackingInvoker {
        active: AtomicUsize,
        high_water: AtomicUsize,
        completed: AtomicUsize,
        entered: Notify,
        done: Notify,
        gate: Option<Semaphore>,
    }

    #[async_trait]
    impl OcrInvoker for TrackingInvoker {
        async fn invoke(&self, input: &Path, output: &Path) -> OcrOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);
            self.entered.notify_one();

            match &self.gate {
                Some(gate) => gate.acquire().await.unwrap().forget(),
                None => tokio::time::sleep(Duration::from_millis(30)).await,
            }

            let result = std::fs::copy(input, output)
                .map(|_| ())
                .map_err(|e| Error::conversion(input, e.to_string()));

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            self.done.notify_one();
            OcrOutcome {
                output: String::new(),
                result,
            }
        }
    }

    fn setup(count: usize, workers: usize) -> (TempDir, TempDir, Arc<ProcessingConfig>, Vec<PathBuf>) {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let config = Arc::new(ProcessingConfig::new(input.path(), output.path()).with_workers(workers));
        let files = (0..count)
            .map(|i| {
                let path = input.path().join(format!("doc-{}.pdf", i));
                std::fs::write(&path, b"%PDF-1.4\n").unwrap();
                path
            })
            .collect();
        (input, output, config, files)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_n_jobs_in_ocr() {
        const JOBS: usize = 6;
        const WORKERS: usize = 2;

        let (_input, output, config, files) = setup(JOBS, WORKERS);
        let invoker = Arc::new(TrackingInvoker::default());
        let processor = Arc::new(JobProcessor::new(config, invoker.clone(), Arc::new(NoopOwnership)));

        let cancel = CancellationToken::new();
        let (queue, receiver) = JobQueue::new(WORKERS);
        let pool = WorkerPool::spawn(WORKERS, receiver, processor, cancel.clone());
        assert_eq!(pool.size(), WORKERS);

        for file in &files {
            queue.submit(Job::new(file)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(10), async {
            while invoker.completed.load(Ordering::SeqCst) < JOBS {
                invoker.done.notified().await;
            }
        })
        .await
        .expect("jobs did not finish");

        cancel.cancel();
        pool.join().await;

        let high_water = invoker.high_water.load(Ordering::SeqCst);
        assert!(high_water <= WORKERS, "{} concurrent OCR calls", high_water);
        assert!(high_water >= 1);
        assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), JOBS);
    }

    #[tokio::test]
    async fn test_cancel_finishes_current_job_and_abandons_queue() {
        let (input, output, config, files) = setup(2, 1);
        let invoker = Arc::new(TrackingInvoker {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        });
        let processor = Arc::new(JobProcessor::new(config, invoker.clone(), Arc::new(NoopOwnership)));

        let cancel = CancellationToken::new();
        let (queue, receiver) = JobQueue::new(1);
        let pool = WorkerPool::spawn(1, receiver, processor, cancel.clone());

        // First job is dequeued and blocks inside OCR
        let entered = invoker.entered.notified();
        queue.submit(Job::new(&files[0])).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), entered)
            .await
            .expect("first job never reached OCR");

        // Second job waits in the queue when cancellation fires
        queue.submit(Job::new(&files[1])).await.unwrap();
        cancel.cancel();
        if let Some(gate) = &invoker.gate {
            gate.add_permits(1);
        }

        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .expect("worker did not exit");

        assert_eq!(invoker.completed.load(Ordering::SeqCst), 1);
        assert!(output.path().join("doc-0.pdf").exists());
        assert!(!output.path().join("doc-1.pdf").exists());
        assert!(files[1].exists(), "queued job must stay untouched");
        assert!(input.path().join("doc-1.pdf").exists());
    }

    #[tokio::test]
    async fn test_workers_exit_when_queue_closes() {
        let (_input, _output, config, _files) = setup(0, 3);
        let processor = Arc::new(JobProcessor::new(
            config,
            Arc::new(TrackingInvoker::default()),
            Arc::new(NoopOwnership),
        ));

        let (queue, receiver) = JobQueue::new(3);
        let pool = WorkerPool::spawn(3, receiver, processor, CancellationToken::new());
        drop(queue);

        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .expect("workers did not exit");
    }
}

//! Bounded FIFO job queue shared by the dispatcher and the worker pool

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A processing job: one candidate PDF path.
///
/// Jobs carry no identity beyond the path, so submitting the same path twice
/// produces two jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    path: PathBuf,
}

impl Job {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Producer side of the job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    capacity: usize,
    /// Jobs accepted so far
    submitted: Arc<AtomicUsize>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` waiting jobs (minimum 1)
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        let queue = Self {
            sender,
            capacity,
            submitted: Arc::new(AtomicUsize::new(0)),
        };
        let receiver = JobReceiver {
            inner: Arc::new(Mutex::new(receiver)),
        };

        (queue, receiver)
    }

    /// Enqueue a job, waiting while the queue is full.
    ///
    /// Gives the job back if every receiver is gone.
    pub async fn submit(&self, job: Job) -> std::result::Result<(), Job> {
        match self.sender.send(job).await {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::SendError(job)) => {
                tracing::error!(path = %job.path().display(), "Failed to submit job: queue closed");
                Err(job)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

/// Consumer side of the job queue, shared by all workers
#[derive(Debug, Clone)]
pub struct JobReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl JobReceiver {
    /// Wait for the next job. `None` once all producers are dropped and the queue is drained.
    pub async fn recv(&self) -> Option<Job> {
        self.inner.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, receiver) = JobQueue::new(3);
        for name in ["a.pdf", "b.pdf", "a.pdf"] {
            queue.submit(Job::new(format!("/in/{}", name))).await.unwrap();
        }
        assert_eq!(queue.submitted(), 3);

        assert_eq!(receiver.recv().await.unwrap().path(), Path::new("/in/a.pdf"));
        assert_eq!(receiver.recv().await.unwrap().path(), Path::new("/in/b.pdf"));
        // Duplicates are kept
        assert_eq!(receiver.recv().await.unwrap().path(), Path::new("/in/a.pdf"));
    }

    #[tokio::test]
    async fn test_submit_waits_when_full() {
        let (queue, receiver) = JobQueue::new(1);
        queue.submit(Job::new("/in/a.pdf")).await.unwrap();

        let mut blocked = task::spawn(queue.submit(Job::new("/in/b.pdf")));
        assert_pending!(blocked.poll());

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.path(), Path::new("/in/a.pdf"));

        assert!(blocked.is_woken());
        assert_ready_ok!(blocked.poll());
        drop(blocked);
        assert_eq!(queue.submitted(), 2);
    }

    #[tokio::test]
    async fn test_submit_after_receiver_dropped() {
        let (queue, receiver) = JobQueue::new(2);
        drop(receiver);

        let job = Job::new("/in/a.pdf");
        assert_eq!(queue.submit(job.clone()).await, Err(job));
        assert_eq!(queue.submitted(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_producers_dropped() {
        let (queue, receiver) = JobQueue::new(2);
        queue.submit(Job::new("/in/a.pdf")).await.unwrap();
        drop(queue);

        assert!(receiver.recv().await.is_some());
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let (queue, _receiver) = JobQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }
}

//! Periodic job scheduling.
//!
//! Each [`Cron`] runs one job on its own tokio task: run immediately, hand a
//! non-empty result to the sink, then wait out the interval unless aborted.
//! The interval is measured from the end of the previous run, not aligned to
//! the wall clock. Abort is cooperative; it interrupts the wait, never a run
//! already in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::command::Responder;

/// A repeatedly scheduled task. A job owns its state exclusively; nothing
/// else touches it between runs.
pub trait Job: Send + 'static {
    /// One invocation. `Some` results are handed to the sink; `None` (and
    /// empty strings) produce no delivery.
    fn run(&mut self) -> impl Future<Output = Option<String>> + Send;
}

/// Where a job's results go.
pub enum JobSink {
    /// Push onto the shared delivery queue.
    Queue(mpsc::UnboundedSender<String>),
    /// Hand directly to a responder callback.
    Responder(Arc<dyn Responder>),
}

impl JobSink {
    fn deliver(&self, message: String) {
        match self {
            JobSink::Queue(tx) => {
                if tx.send(message).is_err() {
                    tracing::warn!("delivery queue is closed, dropping message");
                }
            }
            JobSink::Responder(responder) => responder.respond(&message),
        }
    }
}

/// Handle to one running periodic job.
pub struct Cron {
    stop_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Cron {
    /// Start running `job` every `interval`, forwarding results to `sink`.
    pub fn spawn<J: Job>(mut job: J, interval: Duration, sink: Option<JobSink>) -> Self {
        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move {
            tracing::debug!("job started");
            loop {
                if let Some(message) = job.run().await {
                    if !message.is_empty() {
                        if let Some(sink) = &sink {
                            sink.deliver(message);
                        }
                    }
                }
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::debug!("job stopped");
        });
        Self { stop_tx, handle }
    }

    /// Request a stop. Takes effect at the next wait; an in-flight run
    /// finishes first.
    pub fn abort(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Wait for the run loop to exit.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct Ticker {
        count: usize,
        message: Option<&'static str>,
    }

    impl Job for Ticker {
        async fn run(&mut self) -> Option<String> {
            self.count += 1;
            self.message.map(|m| format!("{} {}", m, self.count))
        }
    }

    struct Counter(Arc<AtomicUsize>);

    impl Job for Counter {
        async fn run(&mut self) -> Option<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[derive(Default)]
    struct RecordingResponder(Mutex<Vec<String>>);

    impl Responder for RecordingResponder {
        fn respond(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cron = Cron::spawn(
            Ticker {
                count: 0,
                message: Some("tick"),
            },
            Duration::from_secs(3),
            Some(JobSink::Queue(tx)),
        );

        let start = Instant::now();
        assert_eq!(rx.recv().await.unwrap(), "tick 1");
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert_eq!(rx.recv().await.unwrap(), "tick 2");
        assert_eq!(start.elapsed(), Duration::from_secs(3));

        assert_eq!(rx.recv().await.unwrap(), "tick 3");
        assert_eq!(start.elapsed(), Duration::from_secs(6));

        cron.abort();
        cron.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_wait_exits_after_one_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let cron = Cron::spawn(
            Counter(count.clone()),
            Duration::from_secs(3),
            None,
        );

        // Let the first run and the interval wait begin.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let start = Instant::now();
        cron.abort();
        cron.join().await;

        // Exited well before the 3s interval, after exactly one run.
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_results_are_not_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let cron = Cron::spawn(
            Ticker {
                count: 0,
                message: None,
            },
            Duration::from_secs(1),
            Some(JobSink::Queue(tx)),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        cron.abort();
        cron.join().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_sink() {
        let responder = Arc::new(RecordingResponder::default());
        let cron = Cron::spawn(
            Ticker {
                count: 0,
                message: Some("temperature is 10.0"),
            },
            Duration::from_secs(3),
            Some(JobSink::Responder(responder.clone())),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        cron.abort();
        cron.join().await;

        let seen = responder.0.lock().unwrap();
        assert_eq!(
            *seen,
            vec!["temperature is 10.0 1", "temperature is 10.0 2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_jobs_do_not_share_a_clock() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fast = Cron::spawn(
            Ticker {
                count: 0,
                message: Some("fast"),
            },
            Duration::from_secs(2),
            Some(JobSink::Queue(tx.clone())),
        );
        let slow = Cron::spawn(
            Ticker {
                count: 0,
                message: Some("slow"),
            },
            Duration::from_secs(5),
            Some(JobSink::Queue(tx)),
        );

        tokio::time::sleep(Duration::from_secs(7)).await;
        fast.abort();
        slow.abort();
        fast.join().await;
        slow.join().await;

        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        // fast at 0s/2s/4s/6s, slow at 0s/5s.
        assert_eq!(messages.iter().filter(|m| m.starts_with("fast")).count(), 4);
        assert_eq!(messages.iter().filter(|m| m.starts_with("slow")).count(), 2);
    }
}

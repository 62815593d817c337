//! Dedicated metrics thread
//!
//! The engine runs on its own OS thread and exchanges only serialized JSON
//! messages with callers, so a slow computation never stalls the async runtime.
//! Dropping the worker detaches the thread and discards queued messages;
//! `shutdown` drains the queue and joins instead.

use crate::protocol::{DashboardWorkerInput, DashboardWorkerResult, WorkerRequest, WorkerResponse, dispatch, encode};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tallyflow_core::{Error, Result};
use tallyflow_observability::Metrics;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

const DEFAULT_QUEUE_SIZE: usize = 64;

struct Job {
    message: String,
    reply: oneshot::Sender<String>,
}

pub struct MetricsWorker {
    tx: Option<mpsc::Sender<Job>>,
    worker_handle: Option<JoinHandle<()>>,
    /// Set when the worker is dropped; queued jobs are then discarded
    abandoned: Arc<AtomicBool>,
}

impl MetricsWorker {
    pub fn spawn(metrics: Option<Metrics>) -> Result<Self> {
        Self::with_queue_size(DEFAULT_QUEUE_SIZE, metrics)
    }

    pub fn with_queue_size(queue_size: usize, metrics: Option<Metrics>) -> Result<Self> {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let abandoned = Arc::new(AtomicBool::new(false));
        let loop_abandoned = Arc::clone(&abandoned);

        let worker_handle = thread::Builder::new()
            .name("tallyflow-metrics".to_string())
            .spawn(move || Self::worker_loop(rx, metrics, loop_abandoned))
            .map_err(|e| {
                error!(error = %e, "Failed to start metrics worker thread");
                Error::WorkerUnavailable
            })?;

        Ok(Self {
            tx: Some(tx),
            worker_handle: Some(worker_handle),
            abandoned,
        })
    }

    fn worker_loop(
        mut rx: mpsc::Receiver<Job>,
        metrics: Option<Metrics>,
        abandoned: Arc<AtomicBool>,
    ) {
        while let Some(job) = rx.blocking_recv() {
            if abandoned.load(Ordering::Acquire) {
                // Dropping the job closes its reply channel
                continue;
            }

            let Some(response) = dispatch(&job.message) else {
                // Dropping the reply sender tells the caller nothing is coming
                continue;
            };

            if let Some(metrics) = &metrics {
                metrics.record_computation(response.is_success());
            }
            if let WorkerResponse::Error { error } = &response {
                error!(error = %error, "Metrics computation failed");
            }

            if job.reply.send(encode(&response)).is_err() {
                debug!("Metrics caller went away before the response was ready");
            }
        }

        debug!("Metrics worker loop exited");
    }

    /// Queue a raw message without waiting for the reply
    pub fn post(&self, message: String) -> Result<oneshot::Receiver<String>> {
        let tx = self.tx.as_ref().ok_or(Error::WorkerUnavailable)?;
        let (reply, receiver) = oneshot::channel();

        match tx.try_send(Job { message, reply }) {
            Ok(()) => Ok(receiver),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Metrics worker queue full, rejecting message");
                Err(Error::WorkerUnavailable)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Metrics worker channel closed");
                Err(Error::WorkerUnavailable)
            }
        }
    }

    /// Send a raw message and wait for the raw reply.
    ///
    /// Returns `Ok(None)` when the worker ignored the message.
    pub async fn send(&self, message: String) -> Result<Option<String>> {
        let receiver = self.post(message)?;
        Ok(receiver.await.ok())
    }

    /// Run one computation through the message protocol
    pub async fn compute(&self, input: DashboardWorkerInput) -> Result<DashboardWorkerResult> {
        let message = serde_json::to_string(&WorkerRequest::Compute { payload: input })?;
        let reply = self.send(message).await?.ok_or(Error::WorkerUnavailable)?;
        let response: WorkerResponse = serde_json::from_str(&reply)?;
        response.into_result()
    }

    /// Close the queue and wait for queued messages to drain
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.worker_handle.take()
            && handle.join().is_err()
        {
            error!("Metrics worker thread panicked");
        }
    }
}

impl Drop for MetricsWorker {
    fn drop(&mut self) {
        // Never block the dropping thread; an in-progress computation finishes detached
        self.abandoned.store(true, Ordering::Release);
        self.tx.take();
        if self.worker_handle.take().is_some() {
            debug!("Metrics worker dropped, detaching thread");
        }
    }
}

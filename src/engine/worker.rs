// Background batch execution with progress over a channel

use anyhow::{Result, anyhow};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::batch::{BatchObserver, BatchPipeline};
use super::core::{BatchReport, Job, JobRecord};
use super::error::EngineError;
use super::process::CommandRunner;

/// Message from the batch thread to the caller
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Job is about to run; `index` is 1-based
    JobStarted {
        index: usize,
        total: usize,
        label: String,
    },

    /// Job finished, successfully or not
    JobFinished { record: JobRecord },
}

struct ChannelObserver {
    tx: Sender<WorkerMessage>,
}

impl BatchObserver for ChannelObserver {
    fn job_started(&mut self, current: usize, total: usize, label: &str) {
        let _ = self.tx.send(WorkerMessage::JobStarted {
            index: current,
            total,
            label: label.to_string(),
        });
    }

    fn job_finished(&mut self, record: &JobRecord) {
        let _ = self.tx.send(WorkerMessage::JobFinished {
            record: record.clone(),
        });
    }
}

/// A batch running on its own thread
pub struct BatchHandle {
    rx: Receiver<WorkerMessage>,
    handle: JoinHandle<Result<BatchReport, EngineError>>,
}

impl BatchHandle {
    /// Get the receiver for worker messages. It disconnects when the batch ends.
    pub fn receiver(&self) -> &Receiver<WorkerMessage> {
        &self.rx
    }

    /// Block until the batch finishes
    pub fn wait(self) -> Result<BatchReport> {
        let report = self
            .handle
            .join()
            .map_err(|_| anyhow!("batch thread panicked"))??;
        Ok(report)
    }
}

/// Run `jobs` on a background thread. Jobs still execute one at a time.
pub fn spawn_batch<R>(pipeline: BatchPipeline<R>, jobs: Vec<Job>) -> BatchHandle
where
    R: CommandRunner + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut observer = ChannelObserver { tx };
        pipeline.run_observed(&jobs, &mut observer)
    });
    BatchHandle { rx, handle }
}

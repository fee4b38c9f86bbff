//! Batch execution.
//!
//! A [`BatchPipeline`] validates a whole batch up front, then runs jobs one at
//! a time in input order. A failing job is recorded and the batch moves on;
//! only missing tools and unsupported requests stop it.

use chrono::Local;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tracing::{debug, info, warn};

use super::compat::{self, Compatibility};
use super::core::{
    DEFAULT_DECODE_TIMEOUT, DEFAULT_ENCODE_TIMEOUT, DEFAULT_IMAGE_TIMEOUT,
    DEFAULT_THUMBNAIL_TIMEOUT, FrameSize, Job, JobPlan, JobRecord, JobResult, Operation,
    BatchReport, Timestamp, concat_list_contents, derive_output_path, file_label,
    is_jpeg_xr, join_output_path, plan_image_job, resolve, resolve_concat, resolve_thumbnail,
    resolve_trim_copy, validate_intent,
};
use super::error::EngineError;
use super::hardware::CapabilitySnapshot;
use super::probe::{DescriptorCache, MetadataExtractor};
use super::process::{CommandRunner, ProcessRunner};

/// Per-kind process timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub encode: Duration,
    pub image: Duration,
    pub decode: Duration,
    pub probe: Duration,
    pub thumbnail: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            encode: DEFAULT_ENCODE_TIMEOUT,
            image: DEFAULT_IMAGE_TIMEOUT,
            decode: DEFAULT_DECODE_TIMEOUT,
            probe: Duration::from_secs(30),
            thumbnail: DEFAULT_THUMBNAIL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Outputs go next to each input when unset
    pub output_dir: Option<PathBuf>,
    /// File name template; see [`derive_output_path`]
    pub filename_pattern: String,
    /// Forced output extension; otherwise each operation picks its own
    pub extension: Option<String>,
    /// Remove each input after its job succeeds
    pub delete_originals: bool,
    pub timeouts: Timeouts,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            filename_pattern: "{basename}".to_string(),
            extension: None,
            delete_originals: false,
            timeouts: Timeouts::default(),
        }
    }
}

/// Receives batch progress. Closures `FnMut(current, total, label)` can be
/// passed to [`BatchPipeline::run`] directly.
pub trait BatchObserver {
    /// Called once per job before it starts; `current` is 1-based.
    fn job_started(&mut self, current: usize, total: usize, label: &str);

    fn job_finished(&mut self, _record: &JobRecord) {}
}

struct ProgressFn<F>(F);

impl<F: FnMut(usize, usize, &str)> BatchObserver for ProgressFn<F> {
    fn job_started(&mut self, current: usize, total: usize, label: &str) {
        (self.0)(current, total, label)
    }
}

pub struct BatchPipeline<R = ProcessRunner> {
    snapshot: Arc<CapabilitySnapshot>,
    runner: R,
    options: BatchOptions,
}

impl<R: CommandRunner> BatchPipeline<R> {
    pub fn new(snapshot: Arc<CapabilitySnapshot>, runner: R, options: BatchOptions) -> Self {
        Self {
            snapshot,
            runner,
            options,
        }
    }

    pub fn snapshot(&self) -> &CapabilitySnapshot {
        &self.snapshot
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    fn extractor(&self) -> MetadataExtractor<&R> {
        MetadataExtractor::from_snapshot(&self.runner, &self.snapshot, self.options.timeouts.probe)
    }

    /// Where a job's output goes
    pub fn output_path_for(&self, job: &Job) -> PathBuf {
        let extension = self
            .options
            .extension
            .clone()
            .unwrap_or_else(|| job.operation.default_extension(&job.input));
        derive_output_path(
            &job.input,
            self.options.output_dir.as_deref(),
            &self.options.filename_pattern,
            &extension,
        )
    }

    /// Check one job against the snapshot without spawning anything
    pub fn validate_job(&self, job: &Job) -> Result<(), EngineError> {
        match &job.operation {
            Operation::Transcode(intent) => validate_intent(intent, &self.snapshot),
            Operation::LosslessTrim(_) => self.snapshot.require_ffmpeg().map(|_| ()),
            Operation::Image(_) => {
                self.snapshot.require_magick()?;
                if is_jpeg_xr(&job.input) {
                    self.snapshot.require_jxr_decoder()?;
                }
                Ok(())
            }
        }
    }

    /// Build the command plan for a job, with the configured timeouts applied
    pub fn plan(&self, job: &Job) -> Result<JobPlan, EngineError> {
        let output = self.output_path_for(job);
        let timeouts = &self.options.timeouts;
        match &job.operation {
            Operation::Transcode(intent) => {
                let cmd = resolve(intent, &self.snapshot, &job.input, &output)?
                    .with_timeout(timeouts.encode);
                Ok(JobPlan::single(cmd, output))
            }
            Operation::LosslessTrim(window) => {
                let cmd = resolve_trim_copy(window, &self.snapshot, &job.input, &output)?
                    .with_timeout(timeouts.encode);
                Ok(JobPlan::single(cmd, output))
            }
            Operation::Image(intent) => {
                let mut plan = plan_image_job(intent, &self.snapshot, &job.input, &output)?;
                let last = plan.steps.len().saturating_sub(1);
                for (i, step) in plan.steps.iter_mut().enumerate() {
                    step.timeout = if i == last {
                        timeouts.image
                    } else {
                        timeouts.decode
                    };
                }
                Ok(plan)
            }
        }
    }

    fn prepare(&self, jobs: &[Job]) -> Result<(), EngineError> {
        let mut outputs: HashMap<PathBuf, &Path> = HashMap::with_capacity(jobs.len());
        for job in jobs {
            self.validate_job(job)?;
            if let Some(first) = outputs.insert(self.output_path_for(job), &job.input) {
                return Err(EngineError::UnsupportedIntent(format!(
                    "{} and {} would both be written to {}; use a pattern with {{ext}}",
                    first.display(),
                    job.input.display(),
                    self.output_path_for(job).display()
                )));
            }
        }
        if let Some(dir) = &self.options.output_dir {
            std::fs::create_dir_all(dir).map_err(|e| {
                EngineError::filesystem(
                    format!("Failed to create output directory {}", dir.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    fn execute(&self, job: &Job) -> Result<PathBuf, EngineError> {
        if !job.input.is_file() {
            return Err(EngineError::filesystem(
                format!("Input not found: {}", job.input.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        self.check_trim_range(job)?;
        let plan = self.plan(job)?;
        for step in &plan.steps {
            debug!(job = %job.id, command = %step.display(), "running step");
            self.runner.run_command(step).into_output(&step.program)?;
        }
        // scratch files go with the plan
        Ok(plan.output)
    }

    /// Reject a trim that starts at or past the end of its input. Skipped when
    /// ffprobe is missing or the duration is unknown.
    fn check_trim_range(&self, job: &Job) -> Result<(), EngineError> {
        let window = match &job.operation {
            Operation::LosslessTrim(window) => Some(window),
            Operation::Transcode(intent) => intent.trim.as_ref(),
            Operation::Image(_) => None,
        };
        let Some(start) = window.and_then(|w| w.start()) else {
            return Ok(());
        };
        if self.snapshot.ffprobe.is_none() {
            debug!(input = %job.input.display(), "ffprobe unavailable, trim range not checked");
            return Ok(());
        }

        let info = self.extractor().describe(&job.input)?;
        if info.duration_s > 0.0 && start.as_secs_f64() >= info.duration_s {
            return Err(EngineError::metadata(
                &job.input,
                format!(
                    "trim start {} is past the end of the input ({})",
                    start,
                    info.duration_display()
                ),
            ));
        }
        Ok(())
    }

    /// Run a batch, reporting each job to `progress(current, total, label)`
    /// before it starts.
    pub fn run<F>(&self, jobs: &[Job], progress: F) -> Result<BatchReport, EngineError>
    where
        F: FnMut(usize, usize, &str),
    {
        self.run_observed(jobs, &mut ProgressFn(progress))
    }

    pub fn run_observed(
        &self,
        jobs: &[Job],
        observer: &mut dyn BatchObserver,
    ) -> Result<BatchReport, EngineError> {
        let started_at = Local::now();
        self.prepare(jobs)?;

        let total = jobs.len();
        let mut records = Vec::with_capacity(total);
        let mut messages = Vec::new();

        for (index, job) in jobs.iter().enumerate() {
            let label = job.label();
            observer.job_started(index + 1, total, &label);

            let timer = Instant::now();
            let result = match self.execute(job) {
                Ok(output_path) => {
                    messages.push(format!("✓ {} → {}", label, file_label(&output_path)));
                    info!(input = %job.input.display(), output = %output_path.display(), "job succeeded");
                    let warnings = self.finish_success(job, &label, &mut messages);
                    JobResult::Success {
                        output_path,
                        warnings,
                    }
                }
                Err(e) if e.is_fatal() => {
                    warn!(input = %job.input.display(), error = %e, "batch aborted");
                    return Err(e);
                }
                Err(e) => {
                    messages.push(format!("✗ {}: {}", label, e));
                    warn!(input = %job.input.display(), error = %e, "job failed");
                    JobResult::Failure {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };

            let record = JobRecord {
                index,
                input: job.input.clone(),
                result,
                elapsed_ms: timer.elapsed().as_millis() as u64,
            };
            observer.job_finished(&record);
            records.push(record);
        }

        let succeeded = records.iter().filter(|r| r.result.is_success()).count();
        let failed = records.len() - succeeded;
        info!(succeeded, failed, "batch finished");

        Ok(BatchReport {
            records,
            succeeded,
            failed,
            messages,
            started_at,
            finished_at: Local::now(),
        })
    }

    /// Delete the original when configured. A failed delete is a warning.
    fn finish_success(&self, job: &Job, label: &str, messages: &mut Vec<String>) -> Vec<String> {
        if !self.options.delete_originals {
            return Vec::new();
        }
        match std::fs::remove_file(&job.input) {
            Ok(()) => {
                messages.push(format!("  Deleted: {}", label));
                Vec::new()
            }
            Err(e) => {
                let warning = format!("Could not delete {}: {}", label, e);
                messages.push(format!("  Warning: {}", warning));
                vec![warning]
            }
        }
    }

    /// Check that inputs can be joined without any process output.
    pub fn check_join(&self, inputs: &[PathBuf]) -> Result<Compatibility, EngineError> {
        self.snapshot.require_ffprobe()?;
        let mut cache = DescriptorCache::new();
        compat::check_paths(&self.extractor(), inputs, &mut cache)
    }

    /// Losslessly concatenate `inputs` in order. Incompatible inputs are
    /// rejected before ffmpeg is started.
    pub fn join(&self, inputs: &[PathBuf], output: Option<&Path>) -> Result<PathBuf, EngineError> {
        self.snapshot.require_ffmpeg()?;
        let summary = self.check_join(inputs)?.into_result()?;
        info!(%summary, "join inputs compatible");

        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| join_output_path(&inputs[0], self.options.output_dir.as_deref()));
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::filesystem(
                    format!("Failed to create output directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let absolute = inputs
            .iter()
            .map(|p| {
                std::path::absolute(p).map_err(|e| {
                    EngineError::filesystem(format!("Failed to resolve {}", p.display()), e)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let list = write_concat_list(&absolute)?;
        let cmd = resolve_concat(&self.snapshot, &list, &output)?
            .with_timeout(self.options.timeouts.encode);
        let outcome = self.runner.run_command(&cmd);
        if let Err(e) = list.close() {
            debug!(error = %e, "could not remove concat list");
        }
        outcome.into_output(&cmd.program)?;

        info!(output = %output.display(), count = inputs.len(), "joined");
        Ok(output)
    }

    /// Extract one frame to `output`
    pub fn extract_thumbnail(
        &self,
        input: &Path,
        output: &Path,
        at: Timestamp,
        size: FrameSize,
    ) -> Result<PathBuf, EngineError> {
        if !input.is_file() {
            return Err(EngineError::filesystem(
                format!("Input not found: {}", input.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        let cmd = resolve_thumbnail(&self.snapshot, input, output, at, size)?
            .with_timeout(self.options.timeouts.thumbnail);
        self.runner.run_command(&cmd).into_output(&cmd.program)?;
        Ok(output.to_path_buf())
    }

    /// Extract one frame to a uniquely named temporary JPEG, removed when the
    /// returned guard is dropped.
    pub fn preview_frame(
        &self,
        input: &Path,
        at: Timestamp,
        size: FrameSize,
    ) -> Result<TempPath, EngineError> {
        let preview = tempfile::Builder::new()
            .prefix("mediabatch-preview-")
            .suffix(".jpg")
            .tempfile()
            .map_err(|e| EngineError::filesystem("Failed to create preview file", e))?
            .into_temp_path();
        self.extract_thumbnail(input, &preview, at, size)?;
        Ok(preview)
    }
}

fn write_concat_list(paths: &[PathBuf]) -> Result<TempPath, EngineError> {
    let mut file = tempfile::Builder::new()
        .prefix("mediabatch-concat-")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| EngineError::filesystem("Failed to create concat list", e))?;
    file.write_all(concat_list_contents(paths).as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| EngineError::filesystem("Failed to write concat list", e))?;
    Ok(file.into_temp_path())
}

use crate::cli::{BatchArgs, Cli, Commands, EncodeArgs};
use crate::logging;
use anyhow::{Context, Result, anyhow, bail};
use mediabatch::config::Config;
use mediabatch::engine::{
    self, AudioPolicy, BatchOptions, BatchPipeline, CapabilityDetector, CapabilitySnapshot,
    CodecFamily, Compatibility, EncodeIntent, FrameSize, ImageFormat, ImageIntent, Job,
    MetadataExtractor, Operation, ProcessRunner, QualityTier, ResolutionTier, Timestamp,
    TrimWindow, WorkerMessage,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

pub fn run(cli: Cli) {
    let config = match &cli.config {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        },
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: {:#}", e);
            eprintln!("Using built-in defaults.");
            Config::default()
        }),
    };
    logging::init(cli.verbose, &config.defaults.log_level);

    let result = match cli.command {
        Commands::CheckTools { json } => handle_check_tools(&config, json),
        Commands::Probe { file, json } => handle_probe(&config, &file, json),
        Commands::CheckJoin { files } => handle_check_join(&config, &files),
        Commands::Convert {
            batch,
            encode,
            resolution,
            start,
            end,
        } => {
            let resolution = resolution.unwrap_or_else(|| config.defaults.resolution.clone());
            handle_encode(&config, batch, encode, &resolution, start, end)
        }
        Commands::Compress { batch, encode } => {
            handle_encode(&config, batch, encode, "source", None, None)
        }
        Commands::Trim { batch, start, end } => handle_trim(&config, batch, start, end),
        Commands::Join {
            files,
            output,
            dry_run,
        } => handle_join(&config, &files, output, dry_run),
        Commands::Images {
            batch,
            format,
            quality,
            resize,
        } => handle_images(&config, batch, format, quality, resize),
        Commands::Thumbnail {
            file,
            at,
            width,
            height,
            output,
        } => handle_thumbnail(&config, &file, &at, width, height, output),
        Commands::InitConfig => {
            handle_init_config();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn detect(config: &Config) -> Arc<CapabilitySnapshot> {
    let snapshot = CapabilityDetector::system()
        .with_timeout(config.detect_timeout())
        .with_overrides(config.tool_overrides())
        .detect();
    Arc::new(snapshot)
}

fn build_pipeline(
    config: &Config,
    snapshot: Arc<CapabilitySnapshot>,
    batch: &BatchArgs,
    default_pattern: String,
) -> BatchPipeline {
    let options = BatchOptions {
        output_dir: batch
            .output_dir
            .clone()
            .or_else(|| config.defaults.output_dir.clone()),
        filename_pattern: batch
            .pattern
            .clone()
            .or_else(|| config.defaults.filename_pattern.clone())
            .unwrap_or(default_pattern),
        extension: batch.ext.clone().or_else(|| config.defaults.extension.clone()),
        delete_originals: batch.delete_originals || config.defaults.delete_originals,
        timeouts: config.timeouts(),
    };
    BatchPipeline::new(snapshot, ProcessRunner::new(), options)
}

fn handle_check_tools(config: &Config, json: bool) -> Result<()> {
    let snapshot = detect(config);

    if json {
        println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    } else {
        let tools = [
            ("ffmpeg", &snapshot.ffmpeg),
            ("ffprobe", &snapshot.ffprobe),
            ("ImageMagick", &snapshot.magick),
            ("JPEG XR decoder", &snapshot.jxr_decoder),
        ];
        for (name, tool) in tools {
            match tool {
                Some(tool) => println!(
                    "{} found: {} ({})",
                    name,
                    tool.path.display(),
                    tool.version.as_deref().unwrap_or("version unknown")
                ),
                None => println!("{} not found", name),
            }
        }
        println!("Encoder backend: {}", snapshot.backend.display_name());
        println!(
            "HEVC encoding: {}",
            if snapshot.hevc_available { "available" } else { "unavailable" }
        );
        if let Some(gpu) = &snapshot.gpu_name {
            println!("GPU: {}", gpu);
        }
    }

    snapshot.require_ffmpeg()?;
    snapshot.require_ffprobe()?;
    Ok(())
}

fn handle_probe(config: &Config, file: &Path, json: bool) -> Result<()> {
    let snapshot = detect(config);
    let extractor =
        MetadataExtractor::from_snapshot(ProcessRunner::new(), &snapshot, config.timeouts().probe);

    if engine::is_image_file(file) {
        let info = extractor.describe_image(file)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            println!("File:       {}", info.path.display());
            println!("Format:     {}", info.format);
            println!("Resolution: {}x{}", info.width, info.height);
            println!("Size:       {}", engine::probe::format_size(info.byte_size));
        }
        return Ok(());
    }

    let info = extractor.describe(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File:       {}", info.path.display());
        println!("Duration:   {}", info.duration_display());
        println!("Resolution: {}", info.resolution());
        println!("Codec:      {}", info.codec);
        println!("Frame rate: {}", info.frame_rate_display());
        println!("Bitrate:    {}", info.bitrate_display());
        println!("Size:       {}", info.size_display());
    }
    Ok(())
}

fn handle_check_join(config: &Config, files: &[PathBuf]) -> Result<()> {
    let pipeline = BatchPipeline::new(detect(config), ProcessRunner::new(), BatchOptions::default());
    match pipeline.check_join(files)? {
        Compatibility::Compatible { summary } => {
            println!("{}", summary);
            Ok(())
        }
        Compatibility::Incompatible { mismatch } => bail!("{}", mismatch),
    }
}

fn encode_intent(
    config: &Config,
    encode: &EncodeArgs,
    resolution: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<EncodeIntent> {
    let defaults = &config.defaults;
    let quality: QualityTier = encode.quality.as_deref().unwrap_or(&defaults.quality).parse()?;
    let codec: CodecFamily = encode.codec.as_deref().unwrap_or(&defaults.codec).parse()?;
    let audio: AudioPolicy = encode.audio.as_deref().unwrap_or(&defaults.audio).parse()?;

    let mut intent = EncodeIntent::new(quality, codec).with_audio(audio);
    if let Some(tier) = ResolutionTier::parse_optional(resolution)? {
        intent = intent.with_resolution(tier);
    }
    if let Some(window) = TrimWindow::parse_bounds(start, end)? {
        intent = intent.with_trim(window);
    }
    intent.extra_args = match &encode.extra_args {
        Some(args) => engine::split_extra_args(args),
        None => config.extra_args(),
    };
    Ok(intent)
}

fn handle_encode(
    config: &Config,
    batch: BatchArgs,
    encode: EncodeArgs,
    resolution: &str,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let intent = encode_intent(config, &encode, resolution, start.as_deref(), end.as_deref())?;
    let default_pattern = match intent.resolution {
        Some(tier) => format!("scaled-{{basename}}_{}", tier.label()),
        None => "compressed-{basename}".to_string(),
    };

    let files = engine::collect_inputs(&batch.inputs, engine::is_video_file)?;
    if files.is_empty() {
        bail!("No video files found");
    }
    let jobs = files
        .into_iter()
        .map(|input| Job::new(input, Operation::Transcode(intent.clone())))
        .collect();

    let pipeline = build_pipeline(config, detect(config), &batch, default_pattern);
    run_batch(pipeline, jobs, &batch)
}

fn handle_trim(
    config: &Config,
    batch: BatchArgs,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let window = TrimWindow::parse_bounds(start.as_deref(), end.as_deref())?
        .ok_or_else(|| anyhow!("trim needs --start, --end, or both"))?;

    let files = engine::collect_inputs(&batch.inputs, engine::is_video_file)?;
    if files.is_empty() {
        bail!("No video files found");
    }
    let jobs = files
        .into_iter()
        .map(|input| Job::new(input, Operation::LosslessTrim(window)))
        .collect();

    let pipeline = build_pipeline(config, detect(config), &batch, "trimmed-{basename}".to_string());
    run_batch(pipeline, jobs, &batch)
}

fn handle_images(
    config: &Config,
    batch: BatchArgs,
    format: Option<String>,
    quality: Option<u8>,
    resize: Option<u32>,
) -> Result<()> {
    let format: ImageFormat = format
        .as_deref()
        .unwrap_or(&config.defaults.image_format)
        .parse()?;
    let intent = ImageIntent::new(
        format,
        quality.unwrap_or(config.defaults.image_quality),
        resize,
    )?;

    let files = engine::collect_inputs(&batch.inputs, engine::is_image_file)?;
    if files.is_empty() {
        bail!("No image files found");
    }
    let jobs = files
        .into_iter()
        .map(|input| Job::new(input, Operation::Image(intent.clone())))
        .collect();

    let pipeline = build_pipeline(config, detect(config), &batch, "{basename}".to_string());
    run_batch(pipeline, jobs, &batch)
}

fn run_batch(pipeline: BatchPipeline, jobs: Vec<Job>, batch: &BatchArgs) -> Result<()> {
    if batch.dry_run {
        for job in &jobs {
            pipeline.validate_job(job)?;
            let plan = pipeline.plan(job)?;
            println!("{}\n", engine::format_commands(&plan.steps));
        }
        println!("Total jobs: {}", jobs.len());
        return Ok(());
    }

    let total = jobs.len();
    let handle = engine::spawn_batch(pipeline, jobs);
    for message in handle.receiver().iter() {
        if let WorkerMessage::JobStarted { index, total, label } = message {
            eprintln!("[{}/{}] {}", index, total, label);
        }
    }
    let report = handle.wait()?;

    if batch.json {
        println!("{}", report.to_json()?);
    } else {
        for line in &report.messages {
            println!("{}", line);
        }
        println!(
            "Done: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
    }

    if !report.all_succeeded() {
        bail!("{} of {} jobs failed", report.failed, total);
    }
    Ok(())
}

fn handle_join(
    config: &Config,
    files: &[PathBuf],
    output: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let snapshot = detect(config);
    let output_dir = config.defaults.output_dir.clone();
    let options = BatchOptions {
        output_dir: output_dir.clone(),
        timeouts: config.timeouts(),
        ..BatchOptions::default()
    };
    let pipeline = BatchPipeline::new(snapshot.clone(), ProcessRunner::new(), options);

    if dry_run {
        let summary = pipeline.check_join(files)?.into_result()?;
        println!("{}", summary);
        let output = output
            .unwrap_or_else(|| engine::join_output_path(&files[0], output_dir.as_deref()));
        let cmd = engine::resolve_concat(&snapshot, Path::new("concat.txt"), &output)?;
        println!("{}", cmd.display());
        return Ok(());
    }

    let joined = pipeline.join(files, output.as_deref())?;
    println!("Joined {} files → {}", files.len(), joined.display());
    Ok(())
}

fn handle_thumbnail(
    config: &Config,
    file: &Path,
    at: &str,
    width: Option<u32>,
    height: Option<u32>,
    output: Option<PathBuf>,
) -> Result<()> {
    let at: Timestamp = at.parse()?;
    let output = output.unwrap_or_else(|| file.with_extension("jpg"));
    let options = BatchOptions {
        timeouts: config.timeouts(),
        ..BatchOptions::default()
    };
    let pipeline = BatchPipeline::new(detect(config), ProcessRunner::new(), options);
    let written = pipeline
        .extract_thumbnail(file, &output, at, FrameSize::from_bounds(width, height))
        .with_context(|| format!("Failed to extract a frame from {}", file.display()))?;
    println!("Thumbnail: {}", written.display());
    Ok(())
}

fn handle_init_config() {
    match Config::config_path() {
        Ok(path) if path.exists() => match Config::load_from(&path) {
            Ok(cfg) => {
                println!("Config loaded successfully from {}", path.display());
                println!("{:#?}", cfg);
            }
            Err(e) => {
                eprintln!("Config invalid: {:#}", e);
                process::exit(1);
            }
        },
        Ok(_) => {
            println!("Config missing, creating default config...");
            if let Err(err) = Config::ensure_default() {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            }
            match Config::config_path() {
                Ok(path) => println!("Default config saved to {}", path.display()),
                Err(e) => println!("Default config saved (path unknown): {:#}", e),
            }
        }
        Err(e) => {
            eprintln!("Could not determine config location: {:#}", e);
            process::exit(1);
        }
    }
}

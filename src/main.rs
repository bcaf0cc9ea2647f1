/* src/main.rs */
#![warn(missing_docs)]
//! # dect-cli - Dual-Energy Material Decomposition Tool
//!
//! Reads co-registered channel A / channel B frame stacks, decomposes every voxel
//! into three material fractions and writes one plane per material (plus an optional
//! merged image). Also reconstitutes measurements from fraction planes and lists the
//! available compute devices.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::fs as async_fs;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dect::config::{ConfigFormat, DectConfig};
use dect::devices::{list_devices, DeviceEntry};
use dect::frames::{
    decode_plane, encode_measurements, read_frame_bytes, write_all, FrameReader, SampleFormat,
};
use dect::quantize::OutputSample;
use dect::reconstitute::reconstitute;
use dect::{
    Dispatcher, Enhancement, MaterialModel, MeasurementBatch, OutputRepr, Planes, Precision,
};

// =====================================================================================
// CLI CONFIGURATION & ARGUMENTS
// =====================================================================================

/// dect-cli - Dual-Energy Three-Material Decomposition
#[derive(Parser, Debug)]
#[command(
    name = "dect-cli",
    version = env!("CARGO_PKG_VERSION"),
    author = "Lord Xyn <lord.xyn@proton.me>",
    about = "Per-voxel three-material decomposition of dual-energy images on CPU or CUDA"
)]
struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Log level (overrides the config file)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Suppress per-frame progress and summaries
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path (.yaml/.yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Decompose A/B frame stacks into material fraction planes
    Process(ProcessArgs),

    /// Rebuild A/B measurements from fraction planes
    Reconstitute(ReconstituteArgs),

    /// List selectable compute devices
    Devices {
        /// Listing format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print library revision and version
    Version,
}

/// Options of the `process` subcommand
#[derive(ClapArgs, Debug)]
struct ProcessArgs {
    /// Channel A input frames
    #[arg(short = 'A', long = "input-a")]
    input_a: PathBuf,

    /// Channel B input frames
    #[arg(short = 'B', long = "input-b")]
    input_b: PathBuf,

    /// Material 1 fraction output
    #[arg(short = 'x', long = "out-a")]
    out_a: Option<PathBuf>,

    /// Material 2 fraction output
    #[arg(short = 'y', long = "out-b")]
    out_b: Option<PathBuf>,

    /// Material 3 fraction output
    #[arg(short = 'z', long = "out-c")]
    out_c: Option<PathBuf>,

    /// Merged (blended A/B) output
    #[arg(short = 'M', long = "merge")]
    merge: Option<PathBuf>,

    /// Samples per frame (default: whole file is one frame)
    #[arg(long)]
    frame_len: Option<usize>,

    /// Storage of the input samples
    #[arg(long, default_value = "signed")]
    sample_format: SampleFormat,

    /// Device id: 0 CPU search, 1 CPU closed form, 2+ accelerator
    #[arg(short, long)]
    device: Option<u32>,

    /// Average three permuted solves per voxel
    #[arg(short, long)]
    enhanced: bool,

    /// Single solve per voxel, even if the config file enables enhancement
    #[arg(long, conflicts_with = "enhanced")]
    no_enhanced: bool,

    /// Compute precision
    #[arg(long)]
    precision: Option<Precision>,

    /// Output sample type
    #[arg(long)]
    repr: Option<OutputRepr>,

    /// Descent stopping threshold
    #[arg(long)]
    min_step: Option<f64>,

    /// Weight of channel A in the merged output
    #[arg(long)]
    merge_ratio: Option<f64>,

    /// Rotate outputs by 180 degrees
    #[arg(short, long)]
    rotate: bool,

    /// Solve out-of-range voxels without clamping them to the model range
    #[arg(long)]
    no_pre_clamp: bool,

    /// Worker threads for the CPU backends
    #[arg(short, long)]
    workers: Option<usize>,

    #[command(flatten)]
    model: ModelArgs,
}

/// Options of the `reconstitute` subcommand
#[derive(ClapArgs, Debug)]
struct ReconstituteArgs {
    /// Material 1 fraction input
    #[arg(short = 'x', long = "in-a")]
    in_a: PathBuf,

    /// Material 2 fraction input
    #[arg(short = 'y', long = "in-b")]
    in_b: PathBuf,

    /// Material 3 fraction input
    #[arg(short = 'z', long = "in-c")]
    in_c: PathBuf,

    /// Channel A output frames
    #[arg(short = 'A', long = "out-a")]
    out_a: PathBuf,

    /// Channel B output frames
    #[arg(short = 'B', long = "out-b")]
    out_b: PathBuf,

    /// Sample type of the fraction inputs
    #[arg(long)]
    repr: Option<OutputRepr>,

    /// Inputs were written rotated by 180 degrees
    #[arg(short, long)]
    rotate: bool,

    /// Samples per frame (default: whole file is one frame)
    #[arg(long)]
    frame_len: Option<usize>,

    /// Storage of the output samples
    #[arg(long, default_value = "signed")]
    sample_format: SampleFormat,

    #[command(flatten)]
    model: ModelArgs,
}

/// Material coefficient overrides
#[derive(ClapArgs, Debug, Default)]
struct ModelArgs {
    /// Material 1 at channel A
    #[arg(long, allow_negative_numbers = true)]
    alpha_a: Option<f64>,
    /// Material 2 at channel A
    #[arg(long, allow_negative_numbers = true)]
    beta_a: Option<f64>,
    /// Material 3 at channel A
    #[arg(long, allow_negative_numbers = true)]
    gamma_a: Option<f64>,
    /// Material 1 at channel B
    #[arg(long, allow_negative_numbers = true)]
    alpha_b: Option<f64>,
    /// Material 2 at channel B
    #[arg(long, allow_negative_numbers = true)]
    beta_b: Option<f64>,
    /// Material 3 at channel B
    #[arg(long, allow_negative_numbers = true)]
    gamma_b: Option<f64>,
}

impl ModelArgs {
    fn apply(&self, model: &mut MaterialModel) {
        let overrides = [
            (self.alpha_a, &mut model.alpha_a),
            (self.beta_a, &mut model.beta_a),
            (self.gamma_a, &mut model.gamma_a),
            (self.alpha_b, &mut model.alpha_b),
            (self.beta_b, &mut model.beta_b),
            (self.gamma_b, &mut model.gamma_b),
        ];
        for (value, slot) in overrides {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }
}

impl ProcessArgs {
    /// Layer the command-line flags over the config file.
    fn apply(&self, config: &mut DectConfig) {
        self.model.apply(&mut config.model);
        if let Some(device) = self.device {
            config.device = device;
        }
        if self.enhanced {
            config.solver.enhancement = Enhancement::BiasCancelling;
        } else if self.no_enhanced {
            config.solver.enhancement = Enhancement::Standard;
        }
        if let Some(precision) = self.precision {
            config.output.precision = precision;
        }
        if let Some(repr) = self.repr {
            config.output.repr = repr;
        }
        if let Some(min_step) = self.min_step {
            config.solver.min_step = min_step;
        }
        if let Some(ratio) = self.merge_ratio {
            config.output.merge_ratio = ratio;
        }
        if self.rotate {
            config.output.mirror = true;
        }
        if self.no_pre_clamp {
            config.solver.pre_clamp = false;
        }
    }
}

/// Log level configuration
#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Json,
    Yaml,
    Text,
}

// =====================================================================================
// PROCESS
// =====================================================================================

/// Open an optional output file.
fn create_output(path: Option<&Path>) -> Result<Option<BufWriter<File>>> {
    path.map(|p| {
        File::create(p)
            .map(BufWriter::new)
            .with_context(|| format!("Failed to create output file: {}", p.display()))
    })
    .transpose()
}

/// Samples per frame: explicit, or the whole input.
async fn resolve_frame_len(
    explicit: Option<usize>,
    input: &Path,
    sample_bytes: usize,
) -> Result<usize> {
    if let Some(len) = explicit {
        return Ok(len);
    }
    let bytes = async_fs::metadata(input)
        .await
        .with_context(|| format!("Failed to stat input: {}", input.display()))?
        .len();
    let samples = usize::try_from(bytes)? / sample_bytes;
    if samples == 0 {
        bail!("Input {} is empty", input.display());
    }
    Ok(samples)
}

async fn cmd_process(mut config: DectConfig, args: ProcessArgs, quiet: bool) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let workers = args.workers.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .context("Failed to size the worker pool")?;

    if args.out_a.is_none() && args.out_b.is_none() && args.out_c.is_none() && args.merge.is_none() {
        warn!("No outputs requested; frames will be decomposed and discarded");
    }

    let frame_len = resolve_frame_len(args.frame_len, &args.input_a, 2).await?;
    let run = config.run_config(args.merge.is_some());

    // Backend initialisation may compile kernels; keep it off the runtime threads
    let dispatcher = tokio::task::spawn_blocking(move || Dispatcher::new(run))
        .await
        .context("Backend initialisation panicked")?
        .context("Failed to initialise backend")?;
    let dispatcher = Arc::new(dispatcher);

    info!(
        backend = dispatcher.active_backend(),
        precision = %dispatcher.precision(),
        repr = %config.output.repr,
        frame_len,
        workers,
        "Starting decomposition"
    );

    let start = Instant::now();
    let format = args.sample_format;
    let job = Arc::clone(&dispatcher);
    let frames = tokio::task::spawn_blocking(move || -> Result<usize> {
        let open = |p: &Path| {
            File::open(p)
                .map(BufReader::new)
                .with_context(|| format!("Failed to open input: {}", p.display()))
        };
        let mut reader_a = FrameReader::new(open(&args.input_a)?, frame_len, format)?;
        let mut reader_b = FrameReader::new(open(&args.input_b)?, frame_len, format)?;
        let mut planes = [
            create_output(args.out_a.as_deref())?,
            create_output(args.out_b.as_deref())?,
            create_output(args.out_c.as_deref())?,
        ];
        let mut merge_out = create_output(args.merge.as_deref())?;

        loop {
            let (a, b) = match (reader_a.next_frame()?, reader_b.next_frame()?) {
                (Some(a), Some(b)) => (a, b),
                (None, None) => break,
                _ => bail!("Inputs A and B contain different numbers of frames"),
            };
            let frame = reader_a.frames_read();
            let output = job
                .dispatch(&MeasurementBatch::new(a, b)?)
                .with_context(|| format!("Frame {frame} could not be processed"))?;

            for (writer, bytes) in planes.iter_mut().zip(output.encode_planes()) {
                if let Some(w) = writer {
                    write_all(w, &bytes)?;
                }
            }
            if let (Some(w), Some(merge)) = (merge_out.as_mut(), output.merge()) {
                write_all(w, &encode_measurements(merge, format))?;
            }
            if !quiet {
                info!("processed frame {frame}");
            }
        }

        for writer in planes.iter_mut().chain(std::iter::once(&mut merge_out)).flatten() {
            writer.flush()?;
        }
        Ok(reader_a.frames_read())
    })
    .await
    .context("Frame loop panicked")??;

    if !quiet {
        info!(
            frames,
            fallbacks = dispatcher.fallback_count(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "Decomposition complete"
        );
    }
    Ok(())
}

// =====================================================================================
// RECONSTITUTE
// =====================================================================================

/// Frame loop for one fraction representation.
fn reconstitute_frames<O: OutputSample>(
    args: &ReconstituteArgs,
    model: &MaterialModel,
    frame_len: usize,
    quiet: bool,
) -> Result<usize> {
    let open = |p: &Path| {
        File::open(p)
            .map(BufReader::new)
            .with_context(|| format!("Failed to open input: {}", p.display()))
    };
    let mut inputs = [open(&args.in_a)?, open(&args.in_b)?, open(&args.in_c)?];
    let mut out_a =
        create_output(Some(args.out_a.as_path()))?.context("missing channel A output")?;
    let mut out_b =
        create_output(Some(args.out_b.as_path()))?.context("missing channel B output")?;
    let frame_bytes = frame_len * O::REPR.descriptor().bytes;

    let mut frames = 0;
    loop {
        let mut raw = Vec::with_capacity(3);
        for input in inputs.iter_mut() {
            raw.push(read_frame_bytes(input, frame_bytes)?);
        }
        let planes = match (raw.pop().flatten(), raw.pop().flatten(), raw.pop().flatten()) {
            (Some(c), Some(b), Some(a)) => Planes::<O> {
                a: decode_plane(&a)?,
                b: decode_plane(&b)?,
                c: decode_plane(&c)?,
                merge: None,
            },
            (None, None, None) => break,
            _ => bail!("Fraction inputs contain different numbers of frames"),
        };

        let batch = reconstitute(&planes, model, args.rotate)?;
        write_all(&mut out_a, &encode_measurements(batch.channel_a(), args.sample_format))?;
        write_all(&mut out_b, &encode_measurements(batch.channel_b(), args.sample_format))?;
        frames += 1;
        if !quiet {
            info!("reconstituted frame {frames}");
        }
    }

    out_a.flush()?;
    out_b.flush()?;
    Ok(frames)
}

async fn cmd_reconstitute(
    mut config: DectConfig,
    args: ReconstituteArgs,
    quiet: bool,
) -> Result<()> {
    args.model.apply(&mut config.model);
    if let Some(repr) = args.repr {
        config.output.repr = repr;
    }
    config.validate().context("Invalid configuration")?;

    let repr = config.output.repr;
    let frame_len = resolve_frame_len(args.frame_len, &args.in_a, repr.descriptor().bytes).await?;
    let model = config.model;

    let frames = tokio::task::spawn_blocking(move || match repr {
        OutputRepr::U8 => reconstitute_frames::<u8>(&args, &model, frame_len, quiet),
        OutputRepr::U16 => reconstitute_frames::<u16>(&args, &model, frame_len, quiet),
        OutputRepr::F32 => reconstitute_frames::<f32>(&args, &model, frame_len, quiet),
        OutputRepr::F64 => reconstitute_frames::<f64>(&args, &model, frame_len, quiet),
    })
    .await
    .context("Reconstitution panicked")??;

    if !quiet {
        info!(frames, repr = %repr, "Reconstitution complete");
    }
    Ok(())
}

// =====================================================================================
// DEVICES
// =====================================================================================

/// Device listing as emitted by `devices --format json|yaml`.
#[derive(Debug, Serialize)]
struct DeviceReport {
    version: String,
    timestamp: String,
    devices: Vec<DeviceEntry>,
}

fn cmd_devices(format: OutputFormat) -> Result<()> {
    let report = DeviceReport {
        version: dect::version(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        devices: list_devices(),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Text => {
            for device in &report.devices {
                println!("{:>3}  {}", device.id, device.name);
            }
        }
    }
    Ok(())
}

// =====================================================================================
// MAIN APPLICATION ENTRY POINT
// =====================================================================================

/// Setup logging configuration
///
/// The returned guard flushes the file writer and must live until exit.
fn setup_logging(args: &Args, config: &DectConfig) -> Result<Option<WorkerGuard>> {
    let level = match args.log_level {
        Some(level) => Level::from(level).to_string(),
        None => config.logging.level.clone(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .with_context(|| format!("Invalid log level: {level}"))?;
    let json = args.log_json || config.logging.json;

    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let (file_layer, guard) = if config.logging.file_logging {
        std::fs::create_dir_all(&config.logging.directory).with_context(|| {
            format!("Failed to create log directory: {}", config.logging.directory.display())
        })?;
        let appender = tracing_appender::rolling::daily(&config.logging.directory, "dect.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Load application configuration
async fn load_config(config_path: Option<&Path>) -> Result<DectConfig> {
    match config_path {
        Some(path) => {
            let content = async_fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            DectConfig::parse(&content, ConfigFormat::from_path(path))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        }
        None => Ok(DectConfig::default()),
    }
}

// =====================================================================================
// MAIN FUNCTION
// =====================================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration, then logging (the config may name a log directory)
    let config = load_config(args.config.as_deref()).await?;
    let _guard = setup_logging(&args, &config)?;

    // Dispatch subcommands
    match args.command {
        Commands::Process(process) => cmd_process(config, process, args.quiet).await?,
        Commands::Reconstitute(recon) => cmd_reconstitute(config, recon, args.quiet).await?,
        Commands::Devices { format } => cmd_devices(format)?,
        Commands::Version => println!("{}", dect::version()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_process_flags() {
        let args = Args::try_parse_from([
            "dect-cli", "process", "-A", "a.raw", "-B", "b.raw", "-x", "fa.raw", "--enhanced",
            "--repr", "u16", "--precision", "single", "--beta-a", "-990", "--device", "1",
        ])
        .unwrap();
        let Commands::Process(p) = args.command else {
            panic!("expected process");
        };
        assert!(p.enhanced);
        assert_eq!(p.repr, Some(OutputRepr::U16));
        assert_eq!(p.precision, Some(Precision::Single));
        assert_eq!(p.model.beta_a, Some(-990.0));

        let mut model = MaterialModel::default();
        p.model.apply(&mut model);
        assert_eq!(model.beta_a, -990.0);
        assert_eq!(model.alpha_a, 62.0);
    }

    #[test]
    fn test_cli_can_turn_enhancement_off() {
        let yaml = "solver:\n  enhancement: 3\n";
        let mut config = DectConfig::parse(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.solver.enhancement, Enhancement::BiasCancelling);

        let args = Args::try_parse_from([
            "dect-cli", "process", "-A", "a.raw", "-B", "b.raw", "--no-enhanced", "--rotate",
        ])
        .unwrap();
        let Commands::Process(p) = args.command else {
            panic!("expected process");
        };
        p.apply(&mut config);
        assert_eq!(config.solver.enhancement, Enhancement::Standard);
        assert!(config.output.mirror);

        let clash = Args::try_parse_from([
            "dect-cli", "process", "-A", "a", "-B", "b", "--enhanced", "--no-enhanced",
        ]);
        assert!(clash.is_err());
    }

    #[test]
    fn test_cli_devices_and_globals() {
        let args =
            Args::try_parse_from(["dect-cli", "devices", "--format", "json", "--quiet"]).unwrap();
        assert!(args.quiet);
        assert!(matches!(args.command, Commands::Devices { format: OutputFormat::Json }));
    }
}

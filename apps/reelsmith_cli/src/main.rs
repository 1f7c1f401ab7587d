//! reelsmith command line
//!
//! Turns a narration track, its word timings and a source clip into a
//! vertical branded video, one checkpointed stage at a time.
//!
//! ```bash
//! reelsmith run --topic "Why Snails Are Slow" --voice voice.mp3 --words words.json --source clip.mp4
//! reelsmith stage crop --topic "Why Snails Are Slow" --source clip.mp4
//! reelsmith status --topic "Why Snails Are Slow"
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reelsmith_core::captions::{build_events, load_words, render_document, CaptionStyle};
use reelsmith_core::config::EngineConfig;
use reelsmith_core::template::Template;
use reelsmith_core::types::{Canvas, Stage};
use reelsmith_render::collab::Collaborators;
use reelsmith_render::encoder::FfmpegEncoder;
use reelsmith_render::pipeline::{inspect, Pipeline};
use reelsmith_render::probe::{probe_media, FfprobeProber};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "reelsmith.toml";

#[derive(Parser, Debug)]
#[command(name = "reelsmith")]
#[command(about = "Compose vertical branded videos from narration and stock footage", long_about = None)]
struct Cli {
    /// Engine settings (TOML). Defaults to ./reelsmith.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every stage that is not already complete
    Run(JobArgs),
    /// Run a single stage
    Stage {
        /// voice, transcript, source, crop, mix, captions or composite
        stage: Stage,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Show which stages of a job are complete
    Status {
        #[arg(short, long)]
        topic: String,
    },
    /// Print container facts for a media file
    Probe { path: PathBuf },
    /// Render a subtitle file from a word list
    Captions {
        #[arg(short, long)]
        words: PathBuf,
        #[arg(short, long)]
        template: Option<PathBuf>,
        #[arg(short, long, alias = "out")]
        output: PathBuf,
        /// Seconds added to every word; defaults to the voice delay
        #[arg(long)]
        offset: Option<f64>,
    },
}

#[derive(Args, Debug, Clone)]
struct JobArgs {
    #[arg(short, long)]
    topic: String,
    /// Branding template (YAML)
    #[arg(long)]
    template: Option<PathBuf>,
    /// Narration audio
    #[arg(long)]
    voice: Option<PathBuf>,
    /// Word timings as a JSON list of {word, start, end}
    #[arg(long)]
    words: Option<PathBuf>,
    /// Source footage
    #[arg(long)]
    source: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(job) => {
            let output = run_job(config, job, None).await?;
            info!(output = %output.display(), "video ready");
        }
        Commands::Stage { stage, job } => {
            let output = run_job(config, job, Some(stage)).await?;
            info!(%stage, artifact = %output.display(), "stage complete");
        }
        Commands::Status { topic } => print_status(&config, &topic)?,
        Commands::Probe { path } => {
            let info = probe_media(&config.ffprobe, &path)
                .with_context(|| format!("probing {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Captions {
            words,
            template,
            output,
            offset,
        } => {
            let template = load_template(template.as_deref())?;
            let words = load_words(&words)?;
            let style = CaptionStyle::from_template(&template.text, config.brand.color()?)?;
            let offset = offset.unwrap_or_else(|| config.voice_delay());
            let events = build_events(&words, offset, config.captions.chunk_size, &style);
            std::fs::write(&output, render_document(&events, &style, Canvas::VERTICAL))
                .with_context(|| format!("writing {}", output.display()))?;
            info!(events = events.len(), output = %output.display(), "captions written");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            Ok(EngineConfig::load_from_file(DEFAULT_CONFIG)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn load_template(path: Option<&Path>) -> Result<Template> {
    match path {
        Some(path) => Template::load_from_file(path)
            .with_context(|| format!("loading template {}", path.display())),
        None => {
            warn!("no template given, using defaults");
            Ok(Template::default())
        }
    }
}

/// Drive the blocking pipeline on a worker thread and log progress from
/// the async side.
async fn run_job(config: EngineConfig, job: JobArgs, only: Option<Stage>) -> Result<PathBuf> {
    let template = load_template(job.template.as_deref())?;
    let (tx, mut rx) = watch::channel(0.0_f64);

    let reporter = tokio::spawn(async move {
        let mut last_logged = -1.0;
        while rx.changed().await.is_ok() {
            let value = *rx.borrow_and_update();
            if value - last_logged >= 5.0 || value >= 100.0 {
                info!(percent = value.round() as u64, "progress");
                last_logged = value;
            }
        }
    });

    let worker = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let encoder = FfmpegEncoder::new(config.ffmpeg.clone());
        let prober = FfprobeProber::new(config.ffprobe.clone());
        let collaborators = Collaborators::from_files(job.voice, job.words, job.source);
        let mut pipeline = Pipeline::new(&job.topic, config, template, encoder, prober, collaborators)?
            .with_progress(move |value| {
                let _ = tx.send(value);
            });
        let output = match only {
            Some(stage) => pipeline.run_stage(stage)?,
            None => pipeline.run_all()?,
        };
        Ok(output)
    });

    let result = worker.await.context("pipeline worker panicked")?;
    let _ = reporter.await;
    result
}

fn print_status(config: &EngineConfig, topic: &str) -> Result<()> {
    let run = inspect(topic, config);
    if run.dir.is_dir() {
        println!("{} ({})", run.topic, run.id);
    } else {
        println!("{} (not started)", run.topic);
    }
    println!("  dir: {}", run.dir.display());
    for stage in Stage::ALL {
        println!("  {:<11} {}", stage.name(), run.state(stage));
    }
    match run.current_stage() {
        Some(stage) => println!("  next: {stage}"),
        None => println!("  complete"),
    }
    Ok(())
}

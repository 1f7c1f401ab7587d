use chrono::{DateTime, Utc};
use reelsmith_core::captions::{build_events, load_words, render_document, CaptionStyle};
use reelsmith_core::config::EngineConfig;
use reelsmith_core::template::{asset_path, Template};
use reelsmith_core::timing::{target_duration, FootageFit, OverlayWindows};
use reelsmith_core::types::{Canvas, Stage, StageState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::{is_valid_artifact, staging_file, write_atomic};
use crate::audio::{build_audio_mix, mix_output_args, MusicBed};
use crate::collab::Collaborators;
use crate::composite::{build_composite, composite_output_args, LayerAssets, LayerKind};
use crate::encoder::{EncodeJob, Encoder, ProgressScale};
use crate::error::{RenderError, Result};
use crate::footage::build_crop;
use crate::graph::{FilterGraph, InputSet};
use crate::ledger::Ledger;
use crate::probe::DurationProber;
use crate::run::PipelineRun;

/// Receives overall progress on a 0-100 scale.
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Summary written next to the final video.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub id: Uuid,
    pub topic: String,
    pub slug: String,
    pub completed_at: DateTime<Utc>,
    pub target_duration: f64,
    pub canvas: Canvas,
    pub brand_color: String,
    pub artifacts: BTreeMap<Stage, String>,
    pub layers: Vec<String>,
    pub template: Template,
}

/// Checkpointed stage runner for one job.
///
/// Every stage has a deterministic artifact path. A stage whose artifact is
/// already valid is reported done without doing any work, so stages may be
/// invoked repeatedly and in any order.
pub struct Pipeline<E, P> {
    config: EngineConfig,
    template: Template,
    encoder: E,
    prober: P,
    collaborators: Collaborators,
    run: PipelineRun,
    ledger: Ledger,
    progress: ProgressCallback,
}

/// Checkpoint state of a job's stages, read from disk. Nothing is created
/// or written, so an unknown topic reports every stage pending.
pub fn inspect(topic: &str, config: &EngineConfig) -> PipelineRun {
    let mut run = PipelineRun::new(topic, &config.output_dir);
    let ledger = Ledger::open(run.ledger_path(), topic);
    if ledger.path().is_file() {
        run.id = ledger.run_id;
    }
    checkpoint_states(&mut run, &ledger);
    run
}

/// A stage is done when its artifact is valid and matches the ledger's
/// recorded size, or when no entry exists to contradict it.
fn checkpoint_states(run: &mut PipelineRun, ledger: &Ledger) {
    for stage in Stage::ALL {
        let dest = run.artifact(stage);
        let done = is_valid_artifact(stage, &dest)
            && match ledger.entry(stage) {
                Some(entry) => std::fs::metadata(&dest).map(|m| m.len()).ok() == Some(entry.bytes),
                None => true,
            };
        let state = if done {
            StageState::Done
        } else {
            StageState::Pending
        };
        run.set_state(stage, state);
    }
}

impl<E: Encoder, P: DurationProber> Pipeline<E, P> {
    pub fn new(
        topic: &str,
        config: EngineConfig,
        template: Template,
        encoder: E,
        prober: P,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let mut run = PipelineRun::new(topic, &config.output_dir);
        std::fs::create_dir_all(&run.dir)?;
        let ledger = Ledger::open(run.ledger_path(), topic);
        run.id = ledger.run_id;
        info!(run = %run.id, slug = %run.slug, dir = %run.dir.display(), "pipeline ready");

        let mut pipeline = Self {
            config,
            template,
            encoder,
            prober,
            collaborators,
            run,
            ledger,
            progress: Box::new(|_| {}),
        };
        pipeline.refresh_states();
        Ok(pipeline)
    }

    pub fn with_progress(mut self, progress: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn run(&self) -> &PipelineRun {
        &self.run
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every stage in order and return the final video path.
    pub fn run_all(&mut self) -> Result<PathBuf> {
        for stage in Stage::ALL {
            self.run_stage(stage)?;
        }
        Ok(self.run.artifact(Stage::Composite))
    }

    pub fn run_stage(&mut self, stage: Stage) -> Result<PathBuf> {
        match stage {
            Stage::Voice => self.voice(),
            Stage::Transcript => self.transcribe(),
            Stage::Source => self.acquire_source(),
            Stage::Crop => self.crop(),
            Stage::Mix => self.mix(),
            Stage::Captions => self.captions(),
            Stage::Composite => self.composite(),
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub fn voice(&mut self) -> Result<PathBuf> {
        self.execute(Stage::Voice, |p, dest| {
            let staged = staging_file(dest)?;
            p.collaborators.voice.synthesize(&p.run, staged.path())?;
            staged.persist(dest)?;
            Ok(())
        })
    }

    pub fn transcribe(&mut self) -> Result<PathBuf> {
        self.execute(Stage::Transcript, |p, dest| {
            let voice = p.require(Stage::Voice, "voice track")?;
            let words = p.collaborators.transcriber.transcribe(&p.run, &voice)?;
            info!(words = words.len(), "transcript ready");
            write_atomic(dest, &serde_json::to_vec_pretty(&words)?)
        })
    }

    pub fn acquire_source(&mut self) -> Result<PathBuf> {
        self.execute(Stage::Source, |p, dest| {
            let staged = staging_file(dest)?;
            p.collaborators.footage.fetch(&p.run, staged.path())?;
            staged.persist(dest)?;
            Ok(())
        })
    }

    /// Fill the canvas with the source clip for voice + padding seconds.
    pub fn crop(&mut self) -> Result<PathBuf> {
        self.execute(Stage::Crop, |p, dest| {
            let source = p.require(Stage::Source, "source footage")?;
            let target = p.target_duration()?;
            let source_duration = p.prober.duration(&source);
            let fit = FootageFit::decide(source_duration, target);
            info!(source_duration, target, ?fit, "normalizing footage");

            let plan = build_crop(&source, fit, target, Canvas::VERTICAL, &p.config.encoder)?;
            p.encode(Stage::Crop, plan.inputs, &plan.graph, plan.output_args, dest, target)
        })
    }

    /// Lay the delayed voice and optional music under the cropped footage.
    pub fn mix(&mut self) -> Result<PathBuf> {
        self.execute(Stage::Mix, |p, dest| {
            let video = p.require(Stage::Crop, "cropped footage")?;
            let voice = p.require(Stage::Voice, "voice track")?;
            let total = p.target_duration()?;
            let music = p.music_bed();

            let plan = build_audio_mix(&video, &voice, music.as_ref(), p.config.voice_delay(), total)?;
            let args = mix_output_args(&p.config.encoder);
            p.encode(Stage::Mix, plan.inputs, &plan.graph, args, dest, total)
        })
    }

    /// Write the subtitle document from the word timings.
    pub fn captions(&mut self) -> Result<PathBuf> {
        self.execute(Stage::Captions, |p, dest| {
            let words_path = p.require(Stage::Transcript, "word timestamps")?;
            let words = load_words(&words_path)?;
            let style = CaptionStyle::from_template(&p.template.text, p.config.brand.color()?)?;
            let events = build_events(&words, p.config.voice_delay(), p.config.captions.chunk_size, &style);
            debug!(events = events.len(), "caption events built");
            write_atomic(dest, render_document(&events, &style, Canvas::VERTICAL).as_bytes())
        })
    }

    /// Stack the branded overlays onto the mixed video.
    pub fn composite(&mut self) -> Result<PathBuf> {
        self.execute(Stage::Composite, |p, dest| {
            let base = p.require(Stage::Mix, "mixed video")?;
            let total = match p.target_duration() {
                Ok(total) => total,
                Err(_) => match p.prober.duration(&base) {
                    d if d > 0.0 => d,
                    _ => return Err(RenderError::UnknownDuration(base)),
                },
            };

            let captions = p.run.artifact(Stage::Captions);
            let captions = is_valid_artifact(Stage::Captions, &captions).then_some(captions);
            if captions.is_none() && p.template.text.enabled {
                warn!("no subtitle artifact, captions will be skipped");
            }
            let layers = LayerAssets::resolve(&p.template, &p.config, captions.as_deref())?;

            let intro = p.clip_duration(layers.intro.as_deref(), p.template.intro.duration);
            let outro = p.clip_duration(layers.outro.as_deref(), p.template.outro.duration);
            let windows = OverlayWindows::compute(total, intro, outro, &p.config.logo, p.config.end_fade);
            debug!(?windows, "overlay windows");

            let plan = build_composite(&base, &layers, &windows, Canvas::VERTICAL)?;
            let args = composite_output_args(&p.config.encoder);
            p.encode(Stage::Composite, plan.inputs, &plan.graph, args, dest, total)?;
            p.write_manifest(total, &plan.layers)
        })
    }

    // -----------------------------------------------------------------------
    // Checkpointing
    // -----------------------------------------------------------------------

    fn execute(
        &mut self,
        stage: Stage,
        work: impl FnOnce(&mut Self, &Path) -> Result<()>,
    ) -> Result<PathBuf> {
        let dest = self.run.artifact(stage);
        let scale = ProgressScale::for_stage(stage);

        if self.checkpoint(stage, &dest)? {
            info!(%stage, "already done, skipping");
            self.run.set_state(stage, StageState::Done);
            (self.progress)(scale.at(1.0));
            return Ok(dest);
        }

        info!(%stage, "running");
        self.run.set_state(stage, StageState::Running);
        (self.progress)(scale.at(0.0));

        let result = work(self, &dest).and_then(|()| {
            if !is_valid_artifact(stage, &dest) {
                return Err(RenderError::Collaborator {
                    stage,
                    message: format!("{} was not produced", dest.display()),
                });
            }
            self.ledger.record(stage, &dest)?;
            self.ledger.save()
        });

        match result {
            Ok(()) => {
                self.run.set_state(stage, StageState::Done);
                (self.progress)(scale.at(1.0));
                info!(%stage, artifact = %dest.display(), "done");
                Ok(dest)
            }
            Err(e) => {
                self.run.set_state(stage, StageState::Failed);
                warn!(%stage, error = %e, "stage failed");
                Err(e.in_stage(stage))
            }
        }
    }

    /// Decide whether `stage` is already complete, reconciling the ledger
    /// with what is on disk.
    fn checkpoint(&mut self, stage: Stage, dest: &Path) -> Result<bool> {
        let valid = is_valid_artifact(stage, dest);
        let size = std::fs::metadata(dest).map(|m| m.len()).ok();
        let recorded = self.ledger.entry(stage).map(|e| e.bytes);

        match (valid, recorded) {
            (true, Some(bytes)) if Some(bytes) == size => Ok(true),
            (true, None) => {
                warn!(%stage, artifact = %dest.display(), "adopting existing artifact");
                self.ledger.record(stage, dest)?;
                self.ledger.save()?;
                Ok(true)
            }
            (_, Some(_)) => {
                warn!(%stage, "ledger entry is stale, re-running");
                self.ledger.remove(stage);
                self.ledger.save()?;
                Ok(false)
            }
            (false, None) => Ok(false),
        }
    }

    fn refresh_states(&mut self) {
        checkpoint_states(&mut self.run, &self.ledger);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// The artifact of an upstream stage, which must already exist.
    fn require(&self, stage: Stage, what: &'static str) -> Result<PathBuf> {
        let path = self.run.artifact(stage);
        if is_valid_artifact(stage, &path) {
            Ok(path)
        } else {
            Err(RenderError::MissingInput { what, path })
        }
    }

    fn target_duration(&self) -> Result<f64> {
        let voice = self.require(Stage::Voice, "voice track")?;
        let duration = self.prober.duration(&voice);
        if duration <= 0.0 {
            return Err(RenderError::UnknownDuration(voice));
        }
        Ok(target_duration(duration, &self.config.padding))
    }

    fn clip_duration(&self, clip: Option<&Path>, fallback: f64) -> f64 {
        match clip.map(|c| self.prober.duration(c)) {
            Some(d) if d > 0.0 => d,
            _ => fallback.max(0.0),
        }
    }

    fn music_bed(&self) -> Option<MusicBed> {
        let music = &self.template.music;
        if !music.enabled {
            return None;
        }
        let file = music.file.as_deref()?;
        let path = asset_path(&self.config.assets_dir, file);
        if !path.is_file() {
            warn!(layer = "music", path = %path.display(), "asset missing, mixing voice only");
            return None;
        }
        Some(MusicBed {
            path,
            volume: self.config.music.volume,
            fade_out: music.fade_out,
        })
    }

    fn encode(
        &self,
        stage: Stage,
        inputs: InputSet,
        graph: &FilterGraph,
        output_args: Vec<String>,
        dest: &Path,
        duration: f64,
    ) -> Result<()> {
        let staged = staging_file(dest)?;
        let job = EncodeJob::new(
            inputs,
            graph,
            output_args,
            staged.path(),
            duration,
            ProgressScale::for_stage(stage),
        );
        self.encoder.encode(stage, &job, &|value| (self.progress)(value))?;
        staged.persist(dest)?;
        Ok(())
    }

    fn write_manifest(&self, total: f64, layers: &[LayerKind]) -> Result<()> {
        let manifest = RunManifest {
            id: self.run.id,
            topic: self.run.topic.clone(),
            slug: self.run.slug.clone(),
            completed_at: Utc::now(),
            target_duration: total,
            canvas: Canvas::VERTICAL,
            brand_color: self.config.brand.color()?.to_string(),
            artifacts: Stage::ALL
                .iter()
                .map(|s| (*s, s.artifact_name(&self.run.slug)))
                .collect(),
            layers: layers.iter().map(|l| l.label().to_string()).collect(),
            template: self.template.clone(),
        };
        write_atomic(&self.run.manifest_path(), &serde_json::to_vec_pretty(&manifest)?)
    }
}

//! collision_overlay - run the collision-risk overlay over a frame source
//!
//! 1. Loads layered configuration (file, `COLLISION_*` env, flags)
//! 2. Opens the frame source and the detector backend
//! 3. Runs the frame cycle until the stream ends or Ctrl-C
//! 4. Writes blended frames to `--out` when given

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use collision_overlay::display::{Canvas, DirectoryCanvas, NullCanvas, StopSignal};
use collision_overlay::ui::Ui;
use collision_overlay::{open_source, FrameCycle, OverlayConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (TOML when *.toml, JSON otherwise).
    #[arg(long, env = "COLLISION_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source: `stub://<name>` or a directory of images.
    #[arg(long)]
    source: Option<String>,
    /// Detector backend: stub, scripted or tract.
    #[arg(long)]
    detector: Option<String>,
    /// JSON-lines detector script for the scripted backend.
    #[arg(long)]
    script: Option<PathBuf>,
    /// ONNX model for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Newline-separated class labels (defaults to COCO).
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Directory for blended PNG frames. Frames are discarded when unset.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Detect on a producer thread while the previous frame is rendered.
    #[arg(long)]
    pipelined: bool,
    /// Terminal output: auto, plain or pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_flag(Some(&args.ui), std::io::stderr().is_terminal());

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = OverlayConfig::load_layers(args.config.as_deref())?;
        apply_args(&mut cfg, &args);
        cfg.validate()?;
        cfg
    };

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.request())
        .context("error setting Ctrl-C handler")?;

    let canvas: Box<dyn Canvas> = match &cfg.output_dir {
        Some(dir) => Box::new(DirectoryCanvas::new(dir)?),
        None => Box::new(NullCanvas),
    };

    let (source, registry) = {
        let _stage = ui.stage("Open source and detector");
        let source = open_source(
            &cfg.source.uri,
            cfg.source.width,
            cfg.source.height,
            cfg.source.max_frames,
        )?;
        let registry = cfg.backend_registry()?;
        (source, registry)
    };
    let backend = registry
        .default_backend()
        .context("no detector backend registered")?;
    registry.warm_up()?;
    log::info!(
        "collision_overlay: source={} detector={} policy={:?} tracker={:?}/{:?} pipelined={}",
        cfg.source.uri,
        cfg.detector.backend,
        cfg.risk.density_policy,
        cfg.tracker.identity,
        cfg.tracker.capacity,
        cfg.pipelined
    );

    let mut cycle = FrameCycle::new(source, backend, canvas)?
        .with_vocabulary(cfg.vocabulary()?)
        .with_evaluator(cfg.risk_evaluator())
        .with_tracker(cfg.position_tracker())
        .with_renderer(cfg.heatmap_renderer())
        .with_settings(cfg.cycle_settings())
        .with_stop_signal(stop);

    let progress = ui.frames(cfg.source.max_frames);
    let stats = if cfg.pipelined {
        cycle.run_pipelined_with(|report| progress.frame(report))?
    } else {
        cycle.run_with(|report| progress.frame(report))?
    };
    progress.finish();

    eprintln!(
        "processed {} frames ({} dropped, {} detector errors, {} warnings)",
        stats.processed, stats.dropped, stats.detector_errors, stats.warnings
    );
    if let Some(dir) = &cfg.output_dir {
        eprintln!("frames written to {}", dir.display());
    }
    Ok(())
}

fn apply_args(cfg: &mut OverlayConfig, args: &Args) {
    if let Some(source) = &args.source {
        cfg.source.uri = source.clone();
    }
    if let Some(detector) = &args.detector {
        cfg.detector.backend = detector.clone();
    }
    if let Some(script) = &args.script {
        cfg.detector.script_path = Some(script.clone());
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = Some(model.clone());
    }
    if let Some(labels) = &args.labels {
        cfg.labels_path = Some(labels.clone());
    }
    if let Some(out) = &args.out {
        cfg.output_dir = Some(out.clone());
    }
    if args.max_frames.is_some() {
        cfg.source.max_frames = args.max_frames;
    }
    if args.pipelined {
        cfg.pipelined = true;
    }
}

//! Frame cycle orchestration.
//!
//! One iteration: acquire a frame, run the detector, evaluate risk, outline
//! detections, blend the heatmap, show the result. The cycle owns every piece
//! of mutable state (tracker, vocabulary, canvas) and lends it to the
//! evaluator per frame.
//!
//! The detector always runs on a dedicated worker thread so a hung inference
//! can be abandoned after `detect_timeout`. A late result belongs to a frame
//! that was already dropped and is discarded by frame id.
//!
//! Two drive modes:
//! - `run`: strictly sequential, one frame fully finished before the next is
//!   pulled.
//! - `run_pipelined`: acquisition and detection on a producer thread, the
//!   rest on the calling thread, joined by a depth-1 `FrameSlot`. Tracker
//!   state never leaves the consumer, so updates stay in frame order.

use anyhow::{anyhow, Context, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::detect::{DetectorOutput, SharedBackend};
use crate::display::{Canvas, StopSignal};
use crate::frame::{Frame, FrameSlot};
use crate::heatmap::{self, HeatmapRenderer};
use crate::ingest::FrameSource;
use crate::risk::{RiskAssessment, RiskEvaluator};
use crate::tracker::PositionTracker;
use crate::vocab::ClassVocabulary;

pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_millis(2_000);
pub const DEFAULT_HEALTH_INTERVAL: u64 = 100;

#[derive(Clone, Copy, Debug)]
pub struct CycleSettings {
    /// Longest wait for one inference before the frame is dropped.
    pub detect_timeout: Duration,
    /// Emit a health line every this many processed frames (0 disables).
    pub health_interval: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            detect_timeout: DEFAULT_DETECT_TIMEOUT,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

/// Running totals for one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub processed: u64,
    /// Frames abandoned: detector timeouts plus frames replaced in the slot.
    pub dropped: u64,
    pub detector_errors: u64,
    pub warnings: u64,
}

/// Everything produced for one displayed frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame_id: u64,
    pub assessment: RiskAssessment,
    /// Rendered text of the last warning, if any.
    pub last_warning: Option<String>,
    /// The detector failed and the frame was evaluated with no detections.
    pub detector_failed: bool,
}

#[derive(Debug)]
pub enum StepOutcome {
    Processed(FrameReport),
    Dropped { frame_id: u64 },
    EndOfStream,
    SourceFailed(anyhow::Error),
    Stopped,
}

// ----------------------------------------------------------------------------
// Detector worker
// ----------------------------------------------------------------------------

enum Inference {
    Output(DetectorOutput),
    Failed(anyhow::Error),
    TimedOut,
}

/// Runs the backend on its own thread. The thread exits once the worker is
/// dropped and any in-flight inference returns.
struct DetectorWorker {
    requests: mpsc::Sender<Frame>,
    results: mpsc::Receiver<(u64, Result<DetectorOutput>)>,
}

impl DetectorWorker {
    fn spawn(backend: SharedBackend) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<Frame>();
        let (result_tx, result_rx) = mpsc::channel();
        thread::Builder::new()
            .name("detector".to_string())
            .spawn(move || {
                for frame in request_rx {
                    let output = match backend.lock() {
                        Ok(mut guard) => guard.detect(&frame),
                        Err(_) => Err(anyhow!("detector backend lock poisoned")),
                    };
                    if result_tx.send((frame.id, output)).is_err() {
                        break;
                    }
                }
            })
            .context("failed to spawn detector thread")?;
        Ok(Self {
            requests: request_tx,
            results: result_rx,
        })
    }

    fn infer(&self, frame: &Frame, timeout: Duration) -> Inference {
        if self.requests.send(frame.clone()).is_err() {
            return Inference::Failed(anyhow!("detector thread has exited"));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok((id, result)) if id == frame.id => {
                    return match result {
                        Ok(output) => Inference::Output(output),
                        Err(err) => Inference::Failed(err),
                    };
                }
                Ok((id, _)) => {
                    log::debug!("detector: discarding stale result for frame {}", id);
                }
                Err(RecvTimeoutError::Timeout) => return Inference::TimedOut,
                Err(RecvTimeoutError::Disconnected) => {
                    return Inference::Failed(anyhow!("detector thread has exited"));
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Stages
// ----------------------------------------------------------------------------

enum Acquired {
    Ready(Frame, DetectorOutput, bool),
    Dropped(u64),
    End,
    SourceFailed(anyhow::Error),
}

/// Frame source plus detector. Runs on the producer thread when pipelined.
struct Acquisition {
    source: Box<dyn FrameSource>,
    detector: DetectorWorker,
    timeout: Duration,
    connected: bool,
    dropped: u64,
    detector_errors: u64,
}

impl Acquisition {
    fn next(&mut self) -> Acquired {
        if !self.connected {
            if let Err(err) = self.source.connect() {
                return Acquired::SourceFailed(err.context("failed to connect frame source"));
            }
            self.connected = true;
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Acquired::End,
            Err(err) => return Acquired::SourceFailed(err),
        };

        match self.detector.infer(&frame, self.timeout) {
            Inference::Output(output) => Acquired::Ready(frame, output, false),
            Inference::Failed(err) => {
                self.detector_errors += 1;
                log::warn!(
                    "detector failed on frame {}: {:#}; treating as no detections",
                    frame.id,
                    err
                );
                Acquired::Ready(frame, DetectorOutput::default(), true)
            }
            Inference::TimedOut => {
                self.dropped += 1;
                log::warn!(
                    "detector exceeded {}ms on frame {}; dropping frame",
                    self.timeout.as_millis(),
                    frame.id
                );
                Acquired::Dropped(frame.id)
            }
        }
    }
}

/// Evaluation, rendering and display. Always on the calling thread.
struct Overlay<C: Canvas> {
    vocab: ClassVocabulary,
    evaluator: RiskEvaluator,
    tracker: PositionTracker,
    renderer: HeatmapRenderer,
    canvas: C,
}

impl<C: Canvas> Overlay<C> {
    fn process(
        &mut self,
        frame: &Frame,
        output: &DetectorOutput,
        detector_failed: bool,
    ) -> Result<FrameReport> {
        let assessment = self.evaluator.evaluate(
            frame.width(),
            frame.height(),
            output,
            &self.vocab,
            &mut self.tracker,
        );

        for warning in &assessment.warnings {
            log::warn!("frame {}: {}", frame.id, warning);
        }
        let last_warning = assessment.warnings.last().map(|w| w.to_string());

        log::debug!(
            "frame {}: {} detections, {} rejected, {}ms since capture",
            frame.id,
            assessment.detections.len(),
            assessment.rejected,
            frame.age_ms()
        );

        let mut annotated = frame.image().clone();
        heatmap::draw_detections(&mut annotated, &assessment.detections);
        let blended = self
            .renderer
            .render(&annotated, &assessment.zones, &assessment.risk);
        self.canvas
            .show(frame.id, &blended)
            .with_context(|| format!("failed to display frame {}", frame.id))?;

        Ok(FrameReport {
            frame_id: frame.id,
            assessment,
            last_warning,
            detector_failed,
        })
    }
}

// ----------------------------------------------------------------------------
// FrameCycle
// ----------------------------------------------------------------------------

pub struct FrameCycle<C: Canvas> {
    acquisition: Acquisition,
    overlay: Overlay<C>,
    stop: StopSignal,
    health_interval: u64,
    stats: CycleStats,
}

impl<C: Canvas> FrameCycle<C> {
    /// Cycle with the COCO vocabulary, default evaluator, an unbounded
    /// quantized-position tracker and default opacity.
    pub fn new(source: Box<dyn FrameSource>, backend: SharedBackend, canvas: C) -> Result<Self> {
        let settings = CycleSettings::default();
        Ok(Self {
            acquisition: Acquisition {
                source,
                detector: DetectorWorker::spawn(backend)?,
                timeout: settings.detect_timeout,
                connected: false,
                dropped: 0,
                detector_errors: 0,
            },
            overlay: Overlay {
                vocab: ClassVocabulary::coco(),
                evaluator: RiskEvaluator::default(),
                tracker: PositionTracker::default(),
                renderer: HeatmapRenderer::default(),
                canvas,
            },
            stop: StopSignal::new(),
            health_interval: settings.health_interval,
            stats: CycleStats::default(),
        })
    }

    pub fn with_vocabulary(mut self, vocab: ClassVocabulary) -> Self {
        self.overlay.vocab = vocab;
        self
    }

    pub fn with_evaluator(mut self, evaluator: RiskEvaluator) -> Self {
        self.overlay.evaluator = evaluator;
        self
    }

    pub fn with_tracker(mut self, tracker: PositionTracker) -> Self {
        self.overlay.tracker = tracker;
        self
    }

    pub fn with_renderer(mut self, renderer: HeatmapRenderer) -> Self {
        self.overlay.renderer = renderer;
        self
    }

    pub fn with_settings(mut self, settings: CycleSettings) -> Self {
        self.acquisition.timeout = settings.detect_timeout;
        self.health_interval = settings.health_interval;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stats(&self) -> CycleStats {
        CycleStats {
            dropped: self.stats.dropped + self.acquisition.dropped,
            detector_errors: self.acquisition.detector_errors,
            ..self.stats
        }
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.overlay.tracker
    }

    pub fn canvas(&self) -> &C {
        &self.overlay.canvas
    }

    pub fn into_canvas(self) -> C {
        self.overlay.canvas
    }

    fn stop_requested(&self) -> bool {
        self.stop.is_requested() || self.overlay.canvas.stop_requested()
    }

    /// Run exactly one iteration. Only display failures are returned as `Err`.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.stop_requested() {
            return Ok(StepOutcome::Stopped);
        }
        match self.acquisition.next() {
            Acquired::Ready(frame, output, failed) => {
                let report = self.overlay.process(&frame, &output, failed)?;
                self.record(&report);
                Ok(StepOutcome::Processed(report))
            }
            Acquired::Dropped(frame_id) => Ok(StepOutcome::Dropped { frame_id }),
            Acquired::End => Ok(StepOutcome::EndOfStream),
            Acquired::SourceFailed(err) => Ok(StepOutcome::SourceFailed(err)),
        }
    }

    /// Drive the sequential loop until the stream ends, the source fails or a
    /// stop is requested.
    pub fn run(&mut self) -> Result<CycleStats> {
        self.run_with(|_| {})
    }

    /// Like `run`, calling `observe` after every displayed frame.
    pub fn run_with<F: FnMut(&FrameReport)>(&mut self, mut observe: F) -> Result<CycleStats> {
        loop {
            match self.step()? {
                StepOutcome::Processed(report) => observe(&report),
                StepOutcome::Dropped { .. } => {}
                StepOutcome::EndOfStream => {
                    log::info!("frame source exhausted");
                    break;
                }
                StepOutcome::SourceFailed(err) => {
                    log::warn!("frame source unreadable, stopping: {:#}", err);
                    break;
                }
                StepOutcome::Stopped => {
                    log::info!("stop requested");
                    break;
                }
            }
        }
        let stats = self.stats();
        log::info!(
            "cycle finished: processed={} dropped={} detector_errors={} warnings={}",
            stats.processed,
            stats.dropped,
            stats.detector_errors,
            stats.warnings
        );
        Ok(stats)
    }

    /// Pipelined loop: the producer thread acquires and detects while this
    /// thread evaluates and displays. A frame the consumer has not picked up
    /// yet is replaced by the next one and counted as dropped.
    pub fn run_pipelined(&mut self) -> Result<CycleStats> {
        self.run_pipelined_with(|_| {})
    }

    pub fn run_pipelined_with<F: FnMut(&FrameReport)>(
        &mut self,
        mut observe: F,
    ) -> Result<CycleStats> {
        let slot: FrameSlot<(Frame, DetectorOutput, bool)> = FrameSlot::new();
        let halt = StopSignal::new();

        let Self {
            acquisition,
            overlay,
            stop,
            health_interval,
            stats,
        } = self;
        let health_interval = *health_interval;

        let consumed = thread::scope(|scope| -> Result<()> {
            let producer_slot = slot.clone();
            let producer_halt = halt.clone();
            let producer_stop = stop.clone();
            let producer = thread::Builder::new()
                .name("acquire".to_string())
                .spawn_scoped(scope, move || {
                    produce(acquisition, &producer_slot, &producer_stop, &producer_halt)
                })
                .context("failed to spawn acquisition thread")?;

            let consumed = (|| -> Result<()> {
                loop {
                    if stop.is_requested() || overlay.canvas.stop_requested() {
                        log::info!("stop requested");
                        return Ok(());
                    }
                    let Some((frame, output, failed)) = slot.take()? else {
                        return Ok(());
                    };
                    let report = overlay.process(&frame, &output, failed)?;
                    tally(stats, &report, health_interval);
                    observe(&report);
                }
            })();

            halt.request();
            slot.close();
            producer
                .join()
                .map_err(|_| anyhow!("acquisition thread panicked"))?;
            consumed
        });
        consumed?;

        self.stats.dropped += slot.replaced();
        let stats = self.stats();
        log::info!(
            "pipelined cycle finished: processed={} dropped={} detector_errors={} warnings={}",
            stats.processed,
            stats.dropped,
            stats.detector_errors,
            stats.warnings
        );
        Ok(stats)
    }

    fn record(&mut self, report: &FrameReport) {
        tally(&mut self.stats, report, self.health_interval);
    }
}

fn tally(stats: &mut CycleStats, report: &FrameReport, health_interval: u64) {
    stats.processed += 1;
    stats.warnings += report.assessment.warnings.len() as u64;
    if health_interval > 0 && stats.processed % health_interval == 0 {
        log::info!(
            "health: processed={} warnings={} last_frame={}",
            stats.processed,
            stats.warnings,
            report.frame_id
        );
    }
}

/// Producer loop. Ends on stop, halt, end of stream, source failure, or a
/// closed slot.
fn produce(
    acquisition: &mut Acquisition,
    slot: &FrameSlot<(Frame, DetectorOutput, bool)>,
    stop: &StopSignal,
    halt: &StopSignal,
) {
    loop {
        if stop.is_requested() || halt.is_requested() {
            break;
        }
        match acquisition.next() {
            Acquired::Ready(frame, output, failed) => {
                if slot.push((frame, output, failed)).is_err() {
                    break;
                }
            }
            Acquired::Dropped(_) => {}
            Acquired::End => {
                log::info!("frame source exhausted");
                break;
            }
            Acquired::SourceFailed(err) => {
                log::warn!("frame source unreadable, stopping: {:#}", err);
                break;
            }
        }
    }
    slot.close();
}

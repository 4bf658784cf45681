use std::sync::{Arc, Mutex};

use anyhow::Result;
use image::Rgb;

use collision_overlay::detect::{DetectorOutput, RawDetection, ScriptedBackend, SharedBackend};
use collision_overlay::display::MemoryCanvas;
use collision_overlay::heatmap::LOW_COLOR;
use collision_overlay::ingest::{FrameSource, SyntheticConfig, SyntheticSource};
use collision_overlay::{
    DensityPolicy, FrameCycle, FrameReport, MotionDirection, RiskConfig, RiskEvaluator, RiskLevel,
    Severity, StepOutcome, ZoneId,
};

const WIDTH: u32 = 200;
const HEIGHT: u32 = 100;

fn source(frames: u64) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(SyntheticSource::new(SyntheticConfig {
        uri: "stub://scenario".into(),
        width: WIDTH,
        height: HEIGHT,
        max_frames: Some(frames),
    })?))
}

fn scripted(frames: Vec<Vec<RawDetection>>) -> SharedBackend {
    let outputs = frames.into_iter().map(DetectorOutput::single_layer).collect();
    Arc::new(Mutex::new(ScriptedBackend::new(outputs)))
}

/// Raw row for COCO class `class_id` with confidence `score`.
fn row(class_id: usize, score: f32, cx: f32, cy: f32, w: f32, h: f32) -> RawDetection {
    let mut scores = vec![0.0; 80];
    scores[class_id] = score;
    RawDetection {
        cx,
        cy,
        w,
        h,
        objectness: score,
        scores,
    }
}

fn processed(outcome: StepOutcome) -> FrameReport {
    match outcome {
        StepOutcome::Processed(report) => report,
        other => panic!("expected a processed frame, got {:?}", other),
    }
}

#[test]
fn critical_car_in_center_zone() -> Result<()> {
    // 100x50 px box (area 5000) against a critical threshold just under 4000
    let backend = scripted(vec![vec![row(2, 0.9, 0.5, 0.5, 0.5, 0.5)]]);
    let mut cycle = FrameCycle::new(source(1)?, backend, MemoryCanvas::new())?;

    let report = processed(cycle.step()?);
    let risk = &report.assessment.risk;
    assert_eq!(risk.get(ZoneId::Center), Some(RiskLevel::High));
    assert_eq!(risk.get(ZoneId::Left), Some(RiskLevel::Low));
    assert_eq!(risk.get(ZoneId::Right), Some(RiskLevel::Low));

    assert_eq!(report.assessment.warnings.len(), 1);
    let warning = &report.assessment.warnings[0];
    assert_eq!(warning.severity, Severity::Critical);
    let text = warning.to_string();
    assert!(text.contains("CAR"));
    assert!(text.contains("CENTER"));
    Ok(())
}

#[test]
fn medium_warning_for_large_non_priority_object() -> Result<()> {
    // dog (16) on the left: 50x50 px = 2500, between warning (~2000) and critical (~4000);
    // small person on the right stays below both thresholds
    let backend = scripted(vec![vec![
        row(16, 0.8, 0.1, 0.5, 0.25, 0.5),
        row(0, 0.9, 0.9, 0.5, 0.05, 0.1),
    ]]);
    let mut cycle = FrameCycle::new(source(1)?, backend, MemoryCanvas::new())?;

    let report = processed(cycle.step()?);
    let risk = &report.assessment.risk;
    assert_eq!(risk.get(ZoneId::Left), Some(RiskLevel::Medium));
    assert_eq!(risk.get(ZoneId::Right), Some(RiskLevel::Low));
    assert_eq!(risk.get(ZoneId::Center), Some(RiskLevel::Low));

    assert_eq!(report.assessment.warnings.len(), 1);
    assert_eq!(report.assessment.warnings[0].severity, Severity::Warning);
    assert_eq!(
        report.last_warning.as_deref(),
        Some("WARNING: dog detected in left zone")
    );
    assert_eq!(report.assessment.detections.len(), 2);

    let (_, shown) = cycle.canvas().last.as_ref().expect("frame shown");
    let blended = shown.get_pixel(20, 50);
    // yellow at 0.6 over the synthetic gradient: red and green at least 153
    assert!(blended[0] >= 153 && blended[1] >= 153);
    Ok(())
}

#[test]
fn empty_frame_renders_all_zones_low() -> Result<()> {
    let backend = scripted(vec![vec![]]);
    let mut cycle = FrameCycle::new(source(1)?, backend, MemoryCanvas::new())?
        .with_renderer(collision_overlay::HeatmapRenderer::new(1.0));

    let report = processed(cycle.step()?);
    assert_eq!(report.assessment.risk.highest(), RiskLevel::Low);
    assert!(report.assessment.warnings.is_empty());
    assert!(report.last_warning.is_none());

    let (_, shown) = cycle.canvas().last.as_ref().expect("frame shown");
    assert_eq!(*shown.get_pixel(100, 50), LOW_COLOR);
    assert_eq!(*shown.get_pixel(10, 50), LOW_COLOR);
    assert_eq!(*shown.get_pixel(190, 50), LOW_COLOR);
    Ok(())
}

#[test]
fn stationary_object_moves_towards_on_second_frame() -> Result<()> {
    let car = row(2, 0.9, 0.2, 0.5, 0.1, 0.2);
    let backend = scripted(vec![vec![car.clone()], vec![car]]);
    let mut cycle = FrameCycle::new(source(2)?, backend, MemoryCanvas::new())?;

    let first = processed(cycle.step()?);
    let second = processed(cycle.step()?);
    assert_eq!(first.assessment.detections[0].motion, MotionDirection::Static);
    assert_eq!(second.assessment.detections[0].motion, MotionDirection::Towards);
    assert_eq!(
        first.assessment.detections[0].object_id,
        second.assessment.detections[0].object_id
    );
    assert_eq!(second.assessment.detections[0].object_id, "40-50");
    Ok(())
}

#[test]
fn low_confidence_detections_leave_no_trace() -> Result<()> {
    let backend = scripted(vec![vec![row(2, 0.5, 0.5, 0.5, 0.9, 0.9)]]);
    let mut cycle = FrameCycle::new(source(1)?, backend, MemoryCanvas::new())?;

    let report = processed(cycle.step()?);
    assert_eq!(report.assessment.risk.highest(), RiskLevel::Low);
    assert!(report.assessment.warnings.is_empty());
    assert!(report.assessment.detections.is_empty());
    assert!(cycle.tracker().store().is_empty());
    Ok(())
}

#[test]
fn density_policy_changes_thresholds() -> Result<()> {
    // one confident row plus many low-confidence anchors
    let mut rows = vec![row(2, 0.9, 0.5, 0.5, 0.1, 0.1)];
    rows.extend((0..500).map(|_| row(2, 0.1, 0.5, 0.5, 0.1, 0.1)));

    let raw = {
        let mut cycle =
            FrameCycle::new(source(1)?, scripted(vec![rows.clone()]), MemoryCanvas::new())?;
        processed(cycle.step()?).assessment
    };
    let confident = {
        let evaluator = RiskEvaluator::new(RiskConfig {
            density_policy: DensityPolicy::ConfidentOnly,
            ..RiskConfig::default()
        });
        let mut cycle = FrameCycle::new(source(1)?, scripted(vec![rows]), MemoryCanvas::new())?
            .with_evaluator(evaluator);
        processed(cycle.step()?).assessment
    };

    assert_eq!(raw.density, 501.0 / (WIDTH * HEIGHT) as f64);
    assert_eq!(confident.density, 1.0 / (WIDTH * HEIGHT) as f64);
    assert!(raw.thresholds.critical < confident.thresholds.critical);
    Ok(())
}

#[test]
fn sequential_run_ends_cleanly_at_end_of_stream() -> Result<()> {
    let backend = scripted(vec![
        vec![row(2, 0.9, 0.5, 0.5, 0.5, 0.5)],
        vec![],
        vec![row(16, 0.8, 0.1, 0.5, 0.25, 0.5)],
    ]);
    let mut cycle = FrameCycle::new(source(3)?, backend, MemoryCanvas::new())?;
    let stats = cycle.run()?;

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.warnings, 2);
    assert_eq!(cycle.canvas().shown, 3);
    assert!(matches!(cycle.step()?, StepOutcome::EndOfStream));
    Ok(())
}

#[test]
fn pipelined_run_reports_every_frame_in_order() -> Result<()> {
    let frames = (0..6)
        .map(|_| vec![row(2, 0.9, 0.5, 0.5, 0.5, 0.5)])
        .collect();
    let mut cycle = FrameCycle::new(source(6)?, scripted(frames), MemoryCanvas::new())?;

    let mut ids = Vec::new();
    let stats = cycle.run_pipelined_with(|report| {
        assert_eq!(report.assessment.risk.get(ZoneId::Center), Some(RiskLevel::High));
        ids.push(report.frame_id);
    })?;

    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(stats.processed as usize, ids.len());
    assert_eq!(stats.processed + stats.dropped, 6);
    Ok(())
}

#[test]
fn outlines_are_drawn_before_blending() -> Result<()> {
    let backend = scripted(vec![vec![row(2, 0.9, 0.5, 0.5, 0.5, 0.5)]]);
    let mut cycle = FrameCycle::new(source(1)?, backend, MemoryCanvas::new())?
        .with_renderer(collision_overlay::HeatmapRenderer::new(0.0));
    processed(cycle.step()?);

    let (_, shown) = cycle.canvas().last.as_ref().expect("frame shown");
    // box spans x 50..=150, y 25..=75
    assert_eq!(*shown.get_pixel(50, 25), Rgb([0, 255, 0]));
    assert_eq!(*shown.get_pixel(150, 75), Rgb([0, 255, 0]));
    Ok(())
}

#[test]
fn off_frame_row_is_dropped_and_frame_still_shown() -> Result<()> {
    let backend = scripted(vec![vec![
        row(2, 0.9, 1.0e7, 0.5, 0.5, 0.5),
        row(2, 0.9, 0.5, 0.5, 0.5, 0.5),
    ]]);
    let mut cycle = FrameCycle::new(source(1)?, backend, MemoryCanvas::new())?;

    let report = processed(cycle.step()?);
    assert_eq!(report.assessment.rejected, 1);
    assert_eq!(report.assessment.detections.len(), 1);
    assert_eq!(report.assessment.risk.get(ZoneId::Center), Some(RiskLevel::High));
    assert_eq!(report.assessment.risk.get(ZoneId::Right), Some(RiskLevel::Low));
    assert_eq!(cycle.canvas().shown, 1);
    Ok(())
}

//! Layered overlay configuration: defaults, then an optional TOML/JSON file
//! named by `COLLISION_CONFIG`, then `COLLISION_*` environment overrides,
//! then validation.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cycle::{CycleSettings, DEFAULT_HEALTH_INTERVAL};
use crate::detect::{BackendRegistry, ScriptedBackend, StubBackend};
use crate::heatmap::{HeatmapRenderer, DEFAULT_OPACITY};
use crate::risk::{
    DensityPolicy, RiskConfig, RiskEvaluator, DEFAULT_CONFIDENCE_THRESHOLD, HIGH_PRIORITY_CLASSES,
};
use crate::tracker::{IdentityKind, PositionTracker};
use crate::vocab::ClassVocabulary;

const DEFAULT_SOURCE_URI: &str = "stub://front_camera";
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 416;
const DEFAULT_DETECT_TIMEOUT_MS: u64 = 2_000;

pub const KNOWN_BACKENDS: [&str; 3] = ["stub", "scripted", "tract"];

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    labels_path: Option<PathBuf>,
    risk: Option<RiskConfigFile>,
    tracker: Option<TrackerConfigFile>,
    heatmap: Option<HeatmapConfigFile>,
    output_dir: Option<PathBuf>,
    pipelined: Option<bool>,
    health_interval_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RiskConfigFile {
    confidence_threshold: Option<f32>,
    density_policy: Option<String>,
    high_priority_classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    capacity: Option<usize>,
    identity: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct HeatmapConfigFile {
    opacity: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub labels_path: Option<PathBuf>,
    pub risk: RiskSettings,
    pub tracker: TrackerSettings,
    pub heatmap_opacity: f32,
    pub output_dir: Option<PathBuf>,
    pub pipelined: bool,
    pub health_interval_frames: u64,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub confidence_threshold: f32,
    pub density_policy: DensityPolicy,
    pub high_priority_classes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// `None` keeps every identifier forever.
    pub capacity: Option<usize>,
    pub identity: IdentityKind,
}

impl OverlayConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COLLISION_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load with an explicit file path instead of `COLLISION_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::load_layers(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, file and environment, without validation. Callers that
    /// layer command-line flags on top must call `validate` themselves.
    pub fn load_layers(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: OverlayConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let risk = file.risk.unwrap_or_default();
        let tracker = file.tracker.unwrap_or_default();

        let density_policy = match risk.density_policy.as_deref() {
            Some(name) => name.parse()?,
            None => DensityPolicy::default(),
        };
        let identity = match tracker.identity.as_deref() {
            Some(name) => name.parse()?,
            None => IdentityKind::default(),
        };

        Ok(Self {
            source: SourceSettings {
                uri: source
                    .uri
                    .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                max_frames: source.max_frames,
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                model_path: detector.model_path,
                script_path: detector.script_path,
                input_width: detector.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
                input_height: detector.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
                timeout: Duration::from_millis(
                    detector.timeout_ms.unwrap_or(DEFAULT_DETECT_TIMEOUT_MS),
                ),
            },
            labels_path: file.labels_path,
            risk: RiskSettings {
                confidence_threshold: risk
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                density_policy,
                high_priority_classes: risk.high_priority_classes.unwrap_or_else(|| {
                    HIGH_PRIORITY_CLASSES.iter().map(|c| c.to_string()).collect()
                }),
            },
            tracker: TrackerSettings {
                capacity: tracker.capacity,
                identity,
            },
            heatmap_opacity: file
                .heatmap
                .and_then(|heatmap| heatmap.opacity)
                .unwrap_or(DEFAULT_OPACITY),
            output_dir: file.output_dir,
            pipelined: file.pipelined.unwrap_or(false),
            health_interval_frames: file
                .health_interval_frames
                .unwrap_or(DEFAULT_HEALTH_INTERVAL),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("COLLISION_SOURCE") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(backend) = std::env::var("COLLISION_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("COLLISION_LABELS") {
            if !path.trim().is_empty() {
                self.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(opacity) = std::env::var("COLLISION_OPACITY") {
            self.heatmap_opacity = opacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("COLLISION_OPACITY must be a number between 0 and 1"))?;
        }
        if let Ok(policy) = std::env::var("COLLISION_DENSITY_POLICY") {
            self.risk.density_policy = policy.parse()?;
        }
        if let Ok(capacity) = std::env::var("COLLISION_TRACKER_CAPACITY") {
            let capacity = capacity.trim();
            self.tracker.capacity = if capacity.is_empty() || capacity == "unbounded" {
                None
            } else {
                Some(capacity.parse().map_err(|_| {
                    anyhow!("COLLISION_TRACKER_CAPACITY must be a positive integer or 'unbounded'")
                })?)
            };
        }
        if let Ok(timeout) = std::env::var("COLLISION_DETECT_TIMEOUT_MS") {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("COLLISION_DETECT_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.detector.timeout = Duration::from_millis(millis);
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.heatmap_opacity) {
            return Err(anyhow!(
                "heatmap opacity must be within [0, 1], got {}",
                self.heatmap_opacity
            ));
        }
        if !(0.0..1.0).contains(&self.risk.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1), got {}",
                self.risk.confidence_threshold
            ));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input dimensions must be non-zero"));
        }
        if self.detector.timeout.is_zero() {
            return Err(anyhow!("detector timeout must be greater than zero"));
        }
        if self.tracker.capacity == Some(0) {
            return Err(anyhow!("tracker capacity must be greater than zero"));
        }

        self.detector.backend = self.detector.backend.to_lowercase();
        match self.detector.backend.as_str() {
            "stub" => {}
            "scripted" if self.detector.script_path.is_none() => {
                return Err(anyhow!("scripted detector requires detector.script_path"));
            }
            "tract" if self.detector.model_path.is_none() => {
                return Err(anyhow!("tract detector requires detector.model_path"));
            }
            "scripted" | "tract" => {}
            other => {
                return Err(anyhow!(
                    "unknown detector backend '{}' (expected one of {})",
                    other,
                    KNOWN_BACKENDS.join(", ")
                ));
            }
        }

        self.risk.high_priority_classes = self
            .risk
            .high_priority_classes
            .iter()
            .map(|class| class.trim().to_lowercase())
            .filter(|class| !class.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Component builders
    // ------------------------------------------------------------------------

    pub fn vocabulary(&self) -> Result<ClassVocabulary> {
        match &self.labels_path {
            Some(path) => ClassVocabulary::from_path(path),
            None => Ok(ClassVocabulary::coco()),
        }
    }

    pub fn risk_evaluator(&self) -> RiskEvaluator {
        RiskEvaluator::new(RiskConfig {
            confidence_threshold: self.risk.confidence_threshold,
            density_policy: self.risk.density_policy,
            high_priority_classes: self.risk.high_priority_classes.iter().cloned().collect(),
        })
    }

    pub fn position_tracker(&self) -> PositionTracker {
        PositionTracker::with_settings(self.tracker.capacity, self.tracker.identity)
    }

    pub fn heatmap_renderer(&self) -> HeatmapRenderer {
        HeatmapRenderer::new(self.heatmap_opacity)
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            detect_timeout: self.detector.timeout,
            health_interval: self.health_interval_frames,
        }
    }

    /// Registry holding the stub backend plus the configured one as default.
    pub fn backend_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        match self.detector.backend.as_str() {
            "stub" => {}
            "scripted" => {
                let path = self
                    .detector
                    .script_path
                    .as_deref()
                    .ok_or_else(|| anyhow!("scripted detector requires detector.script_path"))?;
                registry.register(ScriptedBackend::from_path(path)?);
            }
            "tract" => self.register_tract(&mut registry)?,
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        registry.set_default(&self.detector.backend)?;
        Ok(registry)
    }

    #[cfg(feature = "backend-tract")]
    fn register_tract(&self, registry: &mut BackendRegistry) -> Result<()> {
        let path = self
            .detector
            .model_path
            .as_deref()
            .ok_or_else(|| anyhow!("tract detector requires detector.model_path"))?;
        registry.register(crate::detect::TractBackend::new(
            path,
            self.detector.input_width,
            self.detector.input_height,
        )?);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    fn register_tract(&self, _registry: &mut BackendRegistry) -> Result<()> {
        Err(anyhow!(
            "tract detector requested but this build lacks the backend-tract feature"
        ))
    }
}

fn read_config_file(path: &Path) -> Result<OverlayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Result<OverlayConfig> {
        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default())?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[test]
    fn defaults_cover_every_setting() -> Result<()> {
        let cfg = defaults()?;
        assert_eq!(cfg.source.uri, DEFAULT_SOURCE_URI);
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.risk.confidence_threshold, 0.5);
        assert_eq!(cfg.risk.density_policy, DensityPolicy::RawOutputs);
        assert_eq!(cfg.tracker.capacity, None);
        assert_eq!(cfg.tracker.identity, IdentityKind::QuantizedPosition);
        assert_eq!(cfg.heatmap_opacity, 0.6);
        assert_eq!(cfg.risk.high_priority_classes.len(), 6);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_opacity() -> Result<()> {
        let mut cfg = defaults()?;
        cfg.heatmap_opacity = 1.5;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn scripted_backend_needs_script() -> Result<()> {
        let mut cfg = defaults()?;
        cfg.detector.backend = "scripted".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("script_path"));
        Ok(())
    }

    #[test]
    fn unknown_backend_rejected() -> Result<()> {
        let mut cfg = defaults()?;
        cfg.detector.backend = "yolo9000".into();
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn zero_tracker_capacity_rejected() -> Result<()> {
        let mut cfg = defaults()?;
        cfg.tracker.capacity = Some(0);
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn unknown_policy_in_file_rejected() {
        let file = OverlayConfigFile {
            risk: Some(RiskConfigFile {
                density_policy: Some("everything".into()),
                ..RiskConfigFile::default()
            }),
            ..OverlayConfigFile::default()
        };
        assert!(OverlayConfig::from_file(file).is_err());
    }

    #[test]
    fn high_priority_classes_are_normalised() -> Result<()> {
        let mut cfg = defaults()?;
        cfg.risk.high_priority_classes = vec![" Car".into(), "car".into(), "".into(), "DOG".into()];
        cfg.validate()?;
        assert_eq!(cfg.risk.high_priority_classes, vec!["car", "dog"]);
        assert!(cfg.risk_evaluator().is_high_priority("dog"));
        Ok(())
    }

    #[test]
    fn stub_registry_defaults_to_stub() -> Result<()> {
        let registry = defaults()?.backend_registry()?;
        assert_eq!(registry.default_name(), Some("stub"));
        Ok(())
    }
}

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime};

use crate::detect::{Quantization, BOX_FIELDS};
use crate::error::PipelineFault;
use crate::events::compliance;

const DEFAULT_MODEL_PATH: &str = "config/model.json";
const DEFAULT_SETTINGS_PATH: &str = "config/settings.json";
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_MAX_INFERENCE_FAILURES: u32 = 5;
const DEFAULT_POLICY_RELOAD_SECS: u64 = 1;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.30;
const DEFAULT_CHIP: &str = "cpu-tflite";

const DEFAULT_AOI: Rect = Rect {
    x1: 100,
    y1: 100,
    x2: 900,
    y2: 900,
};
const DEFAULT_MIN_EVENT_DURATION_MS: u64 = 3000;

// -------------------- Agent config (detectd.toml) --------------------

#[derive(Debug, Deserialize, Default)]
struct AgentConfigFile {
    model_path: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    status_path: Option<PathBuf>,
    events_path: Option<PathBuf>,
    backend: Option<String>,
    max_inference_failures: Option<u32>,
    policy_reload_secs: Option<u64>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Tract,
}

impl BackendKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(BackendKind::Stub),
            "tract" => Ok(BackendKind::Tract),
            other => Err(anyhow!("unknown inference backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model_path: PathBuf,
    pub settings_path: PathBuf,
    pub status_path: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
    pub backend: BackendKind,
    pub max_inference_failures: u32,
    pub policy_reload: Duration,
    pub source: SourceSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    /// Capture size; falls back to the model's video size when unset.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub target_fps: u32,
}

impl AgentConfig {
    /// Load from the file named by `DETECTD_CONFIG` (if any), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECTD_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_agent_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AgentConfigFile) -> Result<Self> {
        let backend = match file.backend.as_deref() {
            Some(name) => BackendKind::parse(name)?,
            None => BackendKind::Stub,
        };
        let source = file.source.unwrap_or_default();
        Ok(Self {
            model_path: file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            settings_path: file
                .settings_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)),
            status_path: file.status_path,
            events_path: file.events_path,
            backend,
            max_inference_failures: file
                .max_inference_failures
                .unwrap_or(DEFAULT_MAX_INFERENCE_FAILURES),
            policy_reload: Duration::from_secs(
                file.policy_reload_secs
                    .unwrap_or(DEFAULT_POLICY_RELOAD_SECS),
            ),
            source: SourceSettings {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                width: source.width,
                height: source.height,
                target_fps: source.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("DETECTD_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("DETECTD_SETTINGS_PATH") {
            self.settings_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("DETECTD_STATUS_PATH") {
            self.status_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_nonempty("DETECTD_EVENTS_PATH") {
            self.events_path = Some(PathBuf::from(path));
        }
        if let Some(url) = env_nonempty("DETECTD_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(name) = env_nonempty("DETECTD_BACKEND") {
            self.backend = BackendKind::parse(&name)?;
        }
        if let Some(value) = env_nonempty("DETECTD_MAX_INFERENCE_FAILURES") {
            self.max_inference_failures = value
                .parse()
                .map_err(|_| anyhow!("DETECTD_MAX_INFERENCE_FAILURES must be an integer"))?;
        }
        if let Some(value) = env_nonempty("DETECTD_TARGET_FPS") {
            self.source.target_fps = value
                .parse()
                .map_err(|_| anyhow!("DETECTD_TARGET_FPS must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be >= 1"));
        }
        if self.max_inference_failures == 0 {
            return Err(anyhow!("max_inference_failures must be >= 1"));
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        Ok(())
    }
}

fn read_agent_config_file(path: &Path) -> Result<AgentConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

// -------------------- Model config (model.json) --------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ModelConfigFile {
    model_width: Option<u32>,
    model_height: Option<u32>,
    video_width: Option<u32>,
    video_height: Option<u32>,
    boxes: Option<usize>,
    classes: Option<usize>,
    quant: Option<f32>,
    zero_point: Option<f32>,
    objectness: Option<f32>,
    confidence: Option<f32>,
    nms: Option<f32>,
    path: Option<PathBuf>,
    chip: Option<String>,
    labels: Option<Vec<String>>,
    description: Option<String>,
}

/// Static model description. Immutable after setup.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_width: u32,
    pub model_height: u32,
    pub video_width: u32,
    pub video_height: u32,
    pub boxes: usize,
    pub classes: usize,
    pub quantization: Quantization,
    pub objectness_threshold: f32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub model_path: Option<PathBuf>,
    pub chip: String,
    pub labels: Vec<String>,
    pub description: Option<String>,
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read model config {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid model config {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: ModelConfigFile = serde_json::from_str(raw)
            .map_err(|e| PipelineFault::config(format!("malformed model json: {}", e)))?;
        Ok(Self::from_file(file)?)
    }

    fn from_file(file: ModelConfigFile) -> std::result::Result<Self, PipelineFault> {
        let model_width = required(file.model_width, "modelWidth")?;
        let model_height = required(file.model_height, "modelHeight")?;
        let cfg = Self {
            model_width,
            model_height,
            video_width: required(file.video_width, "videoWidth")?,
            video_height: required(file.video_height, "videoHeight")?,
            boxes: required(file.boxes, "boxes")?,
            classes: required(file.classes, "classes")?,
            quantization: Quantization::new(
                required(file.quant, "quant")?,
                required(file.zero_point, "zeroPoint")?,
            ),
            objectness_threshold: required(file.objectness, "objectness")?,
            confidence_threshold: file.confidence.unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            nms_threshold: required(file.nms, "nms")?,
            model_path: file.path,
            chip: file.chip.unwrap_or_else(|| DEFAULT_CHIP.to_string()),
            labels: normalize_labels(required(file.labels, "labels")?)?,
            description: file.description,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> std::result::Result<(), PipelineFault> {
        for (name, value) in [
            ("modelWidth", self.model_width),
            ("modelHeight", self.model_height),
            ("videoWidth", self.video_width),
            ("videoHeight", self.video_height),
        ] {
            if value == 0 {
                return Err(PipelineFault::config(format!("{} must be > 0", name)));
            }
        }
        if self.boxes == 0 || self.classes == 0 {
            return Err(PipelineFault::config("boxes and classes must be > 0"));
        }
        let q = self.quantization;
        if !(q.scale.is_finite() && q.scale > 0.0) {
            return Err(PipelineFault::config("quant must be a positive number"));
        }
        if !q.zero_point.is_finite() {
            return Err(PipelineFault::config("zeroPoint must be finite"));
        }
        for (name, value) in [
            ("objectness", self.objectness_threshold),
            ("confidence", self.confidence_threshold),
            ("nms", self.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineFault::config(format!(
                    "{} must be within [0, 1]",
                    name
                )));
            }
        }
        if self.labels.len() < self.classes {
            log::warn!(
                "model has {} classes but only {} labels; missing labels decode as Undefined",
                self.classes,
                self.labels.len()
            );
        }
        Ok(())
    }

    /// Size in bytes of the model's output tensor.
    pub fn output_len(&self) -> usize {
        self.boxes * (BOX_FIELDS + self.classes)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(boxes: usize, labels: &[&str]) -> Self {
        Self {
            model_width: 640,
            model_height: 640,
            video_width: 1280,
            video_height: 720,
            boxes,
            classes: labels.len(),
            quantization: Quantization::new(1.0 / 255.0, 0.0),
            objectness_threshold: 0.25,
            confidence_threshold: 0.30,
            nms_threshold: 0.05,
            model_path: None,
            chip: DEFAULT_CHIP.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            description: None,
        }
    }
}

fn required<T>(value: Option<T>, field: &str) -> std::result::Result<T, PipelineFault> {
    value.ok_or_else(|| PipelineFault::config(format!("missing required field {}", field)))
}

/// Labels double as event names: whitespace becomes `_`.
pub fn event_name(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

fn normalize_labels(labels: Vec<String>) -> std::result::Result<Vec<String>, PipelineFault> {
    static LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = LABEL_RE.get_or_init(|| regex::Regex::new(r"^\S{1,64}$").unwrap());

    labels
        .iter()
        .map(|label| {
            let name = event_name(label);
            if re.is_match(&name) {
                Ok(name)
            } else {
                Err(PipelineFault::config(format!(
                    "label {:?} must be 1..64 characters",
                    label
                )))
            }
        })
        .collect()
}

// -------------------- Policy config (settings.json) --------------------

/// Rectangle in policy space (`0..=1000`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

#[derive(Debug, Deserialize, Default)]
struct RectFile {
    #[serde(default, deserialize_with = "lenient_u32")]
    x1: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    y1: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    x2: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    y2: Option<u32>,
}

impl RectFile {
    fn with_defaults(&self, defaults: Rect) -> Rect {
        Rect {
            x1: self.x1.unwrap_or(defaults.x1),
            y1: self.y1.unwrap_or(defaults.y1),
            x2: self.x2.unwrap_or(defaults.x2),
            y2: self.y2.unwrap_or(defaults.y2),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRequirement {
    /// Accessory label counted per frame.
    pub label: String,
    /// Event fired while the accessory count trails the subject count.
    pub event: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceSettings {
    pub enabled: bool,
    pub subject: String,
    pub requirements: Vec<ComplianceRequirement>,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            subject: "Person".to_string(),
            requirements: vec![
                ComplianceRequirement {
                    label: "Helmet".to_string(),
                    event: "NoHelmet".to_string(),
                },
                ComplianceRequirement {
                    label: "Vest".to_string(),
                    event: "NoVest".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PolicyConfigFile {
    aoi: Option<RectFile>,
    size: Option<RectFile>,
    #[serde(default, deserialize_with = "lenient_u32")]
    confidence: Option<u32>,
    ignore: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_u64")]
    min_event_duration: Option<u64>,
    #[serde(
        rename = "stabelizeTransition",
        alias = "stabilizeTransition",
        default,
        deserialize_with = "lenient_u64"
    )]
    stabilize_transition: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    transition_speed: Option<u32>,
    compliance: Option<ComplianceSettings>,
}

// The settings UI may write integer settings as JSON floats. They are truncated;
// negative values read as 0 and oversized values saturate.
fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(|v| v as u32))
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(|v| v as u64))
}

/// Runtime filter and event policy. Hot-reloadable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyConfig {
    pub aoi: Option<Rect>,
    /// Minimum-size rectangle; width and height give the minimum box size.
    pub size: Option<Rect>,
    /// Confidence threshold in percent.
    pub confidence: u32,
    pub ignore: Vec<String>,
    pub min_event_duration_ms: u64,
    pub stabilize_transition_ms: u64,
    pub transition_speed: u32,
    pub compliance: ComplianceSettings,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            aoi: Some(DEFAULT_AOI),
            size: Some(Rect {
                x1: 0,
                y1: 0,
                x2: 0,
                y2: 0,
            }),
            confidence: 0,
            ignore: Vec::new(),
            min_event_duration_ms: DEFAULT_MIN_EVENT_DURATION_MS,
            stabilize_transition_ms: 0,
            transition_speed: compliance::MIN_WINDOW as u32,
            compliance: ComplianceSettings::default(),
        }
    }
}

impl PolicyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read settings {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("invalid settings {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: PolicyConfigFile = serde_json::from_str(raw)
            .map_err(|e| PipelineFault::config(format!("malformed settings json: {}", e)))?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: PolicyConfigFile) -> Self {
        let zero = Rect {
            x1: 0,
            y1: 0,
            x2: 0,
            y2: 0,
        };
        let mut compliance = file.compliance.unwrap_or_default();
        compliance.subject = event_name(&compliance.subject);
        for req in &mut compliance.requirements {
            req.label = event_name(&req.label);
        }
        Self {
            aoi: file.aoi.map(|aoi| aoi.with_defaults(DEFAULT_AOI)),
            size: file.size.map(|size| size.with_defaults(zero)),
            confidence: file.confidence.unwrap_or(0),
            ignore: file
                .ignore
                .unwrap_or_default()
                .iter()
                .map(|label| event_name(label))
                .collect(),
            min_event_duration_ms: file
                .min_event_duration
                .unwrap_or(DEFAULT_MIN_EVENT_DURATION_MS),
            stabilize_transition_ms: file.stabilize_transition.unwrap_or(0),
            transition_speed: file
                .transition_speed
                .unwrap_or(compliance::MIN_WINDOW as u32),
            compliance,
        }
    }

    /// Minimum (width, height) in policy space.
    pub fn min_size(&self) -> Option<(u32, u32)> {
        self.size
            .map(|s| (s.x2.saturating_sub(s.x1), s.y2.saturating_sub(s.y1)))
    }

    pub fn compliance_window(&self) -> usize {
        compliance::clamp_window(self.transition_speed)
    }

    /// Names of the settings that differ between `self` and `other`.
    pub fn changed_keys(&self, other: &PolicyConfig) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.aoi != other.aoi {
            keys.push("aoi");
        }
        if self.size != other.size {
            keys.push("size");
        }
        if self.confidence != other.confidence {
            keys.push("confidence");
        }
        if self.ignore != other.ignore {
            keys.push("ignore");
        }
        if self.min_event_duration_ms != other.min_event_duration_ms {
            keys.push("minEventDuration");
        }
        if self.stabilize_transition_ms != other.stabilize_transition_ms {
            keys.push("stabelizeTransition");
        }
        if self.transition_speed != other.transition_speed {
            keys.push("transitionSpeed");
        }
        if self.compliance != other.compliance {
            keys.push("compliance");
        }
        keys
    }
}

/// Re-reads the settings file when its modification time changes.
pub struct PolicyWatcher {
    path: PathBuf,
    interval: Duration,
    last_check: Option<Instant>,
    last_modified: Option<SystemTime>,
}

impl PolicyWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        let path = path.into();
        let last_modified = modified_time(&path);
        Self {
            path,
            interval,
            last_check: None,
            last_modified,
        }
    }

    /// Returns a freshly loaded policy when the file changed since the last poll.
    ///
    /// An unreadable or malformed file is logged and ignored; the caller keeps its
    /// current policy.
    pub fn poll(&mut self) -> Option<PolicyConfig> {
        if let Some(last) = self.last_check {
            if last.elapsed() < self.interval {
                return None;
            }
        }
        self.last_check = Some(Instant::now());

        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.last_modified {
            return None;
        }
        self.last_modified = modified;

        match PolicyConfig::load(&self.path) {
            Ok(policy) => Some(policy),
            Err(e) => {
                log::warn!("settings reload ignored: {:#}", e);
                None
            }
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;

    const MODEL_JSON: &str = r#"{
        "modelWidth": 480,
        "modelHeight": 480,
        "videoWidth": 640,
        "videoHeight": 480,
        "boxes": 2268,
        "classes": 3,
        "quant": 0.0039,
        "zeroPoint": 0,
        "objectness": 0.25,
        "nms": 0.05,
        "path": "model/model.tflite",
        "chip": "axis-a8-dlpu-tflite",
        "labels": ["Person", "Hard Hat", "Vest"]
    }"#;

    #[test]
    fn parses_model_json_and_normalizes_labels() {
        let model = ModelConfig::from_json_str(MODEL_JSON).expect("model config");
        assert_eq!(model.boxes, 2268);
        assert_eq!(model.classes, 3);
        assert_eq!(model.labels, vec!["Person", "Hard_Hat", "Vest"]);
        assert_eq!(model.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(model.chip, "axis-a8-dlpu-tflite");
        assert_eq!(model.output_len(), 2268 * 8);
    }

    #[test]
    fn missing_model_field_is_config_fault() {
        let raw = MODEL_JSON.replace("\"boxes\": 2268,", "");
        let err = ModelConfig::from_json_str(&raw).unwrap_err();
        let fault = err.downcast_ref::<PipelineFault>().expect("typed fault");
        assert_eq!(fault.kind, FaultKind::Config);
        assert!(fault.message.contains("boxes"));
    }

    #[test]
    fn rejects_zero_quant_scale() {
        let raw = MODEL_JSON.replace("0.0039", "0");
        assert!(ModelConfig::from_json_str(&raw).is_err());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let raw = MODEL_JSON.replace("\"nms\": 0.05", "\"nms\": 1.5");
        assert!(ModelConfig::from_json_str(&raw).is_err());
    }

    #[test]
    fn policy_defaults_fill_partial_aoi() {
        let policy = PolicyConfig::from_json_str(
            r#"{"aoi": {"x1": 200}, "size": {"x1": 10, "y1": 10, "x2": 60, "y2": 110},
                "confidence": 40, "ignore": ["Hard Hat"]}"#,
        )
        .unwrap();
        assert_eq!(
            policy.aoi,
            Some(Rect {
                x1: 200,
                y1: 100,
                x2: 900,
                y2: 900
            })
        );
        assert_eq!(policy.min_size(), Some((50, 100)));
        assert_eq!(policy.confidence, 40);
        assert_eq!(policy.ignore, vec!["Hard_Hat"]);
        assert_eq!(policy.min_event_duration_ms, 3000);
        assert_eq!(policy.stabilize_transition_ms, 0);
    }

    #[test]
    fn policy_without_aoi_or_size_keeps_them_absent() {
        let policy = PolicyConfig::from_json_str(r#"{"confidence": 50}"#).unwrap();
        assert!(policy.aoi.is_none());
        assert!(policy.min_size().is_none());
    }

    #[test]
    fn policy_accepts_both_transition_spellings() {
        let a = PolicyConfig::from_json_str(r#"{"stabelizeTransition": 1500}"#).unwrap();
        let b = PolicyConfig::from_json_str(r#"{"stabilizeTransition": 1500}"#).unwrap();
        assert_eq!(a.stabilize_transition_ms, 1500);
        assert_eq!(b.stabilize_transition_ms, 1500);
    }

    #[test]
    fn policy_truncates_float_settings() {
        let policy = PolicyConfig::from_json_str(
            r#"{
                "aoi": {"x1": 100.0, "y1": 120.7, "x2": 900.0, "y2": 899.9},
                "size": {"x1": -5.0, "y1": 0, "x2": 50.5, "y2": 40},
                "confidence": 50.0,
                "minEventDuration": 2500.0,
                "stabelizeTransition": 750.9,
                "transitionSpeed": 10.0
            }"#,
        )
        .unwrap();
        assert_eq!(
            policy.aoi,
            Some(Rect {
                x1: 100,
                y1: 120,
                x2: 900,
                y2: 899
            })
        );
        assert_eq!(policy.min_size(), Some((50, 40)));
        assert_eq!(policy.confidence, 50);
        assert_eq!(policy.min_event_duration_ms, 2500);
        assert_eq!(policy.stabilize_transition_ms, 750);
        assert_eq!(policy.compliance_window(), 10);
    }

    #[test]
    fn policy_rejects_non_numeric_settings() {
        assert!(PolicyConfig::from_json_str(r#"{"confidence": "high"}"#).is_err());
        let policy = PolicyConfig::from_json_str(r#"{"confidence": null}"#).unwrap();
        assert_eq!(policy.confidence, 0);
    }

    #[test]
    fn compliance_window_is_clamped() {
        let mut policy = PolicyConfig::default();
        policy.transition_speed = 2;
        assert_eq!(policy.compliance_window(), 5);
        policy.transition_speed = 80;
        assert_eq!(policy.compliance_window(), 50);
        policy.transition_speed = 12;
        assert_eq!(policy.compliance_window(), 12);
    }

    #[test]
    fn changed_keys_lists_differences() {
        let a = PolicyConfig::default();
        let mut b = a.clone();
        b.confidence = 70;
        b.ignore = vec!["Vest".to_string()];
        assert_eq!(a.changed_keys(&b), vec!["confidence", "ignore"]);
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!(BackendKind::parse("Stub").unwrap(), BackendKind::Stub);
        assert_eq!(BackendKind::parse("tract").unwrap(), BackendKind::Tract);
        assert!(BackendKind::parse("gpu").is_err());
    }
}

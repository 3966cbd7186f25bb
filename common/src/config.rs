use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Tuning for the change-detection pipeline. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Histogram similarity below this value is a transition.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Consecutive stable ticks needed before a settling frame becomes a slide.
    #[serde(default = "default_required_stability")]
    pub required_stability: u32,
    #[serde(default = "default_min_slide_interval_ms")]
    pub min_slide_interval_ms: i64,
    /// Side of the square canvas both frames are downsampled to before histogramming.
    #[serde(default = "default_comparison_size")]
    pub comparison_size: u32,
    #[serde(default = "default_sample_stride")]
    pub sample_stride: u32,
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: u8,
    #[serde(default = "default_layout_change_fraction")]
    pub layout_change_fraction: f64,
    #[serde(default = "default_text_change_fraction")]
    pub text_change_fraction: f64,
    /// A text-region change only counts when similarity also dropped below this.
    #[serde(default = "default_text_corroboration_similarity")]
    pub text_corroboration_similarity: f64,
    #[serde(default = "default_layout_noise_floor")]
    pub layout_noise_floor: u32,
    #[serde(default = "default_capture_first_slide")]
    pub capture_first_slide: bool,
    #[serde(default = "default_first_slide_delay_ms")]
    pub first_slide_delay_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_classifier_threshold")]
    pub threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            source: default_source(),
            url: default_url(),
            directory: default_directory(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            required_stability: default_required_stability(),
            min_slide_interval_ms: default_min_slide_interval_ms(),
            comparison_size: default_comparison_size(),
            sample_stride: default_sample_stride(),
            edge_threshold: default_edge_threshold(),
            layout_change_fraction: default_layout_change_fraction(),
            text_change_fraction: default_text_change_fraction(),
            text_corroboration_similarity: default_text_corroboration_similarity(),
            layout_noise_floor: default_layout_noise_floor(),
            capture_first_slide: default_capture_first_slide(),
            first_slide_delay_ms: default_first_slide_delay_ms(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            weights_path: default_weights_path(),
            input_size: default_input_size(),
            threshold: default_classifier_threshold(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            title: default_title(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        check_unit("detection.similarity_threshold", d.similarity_threshold)?;
        check_unit("detection.layout_change_fraction", d.layout_change_fraction)?;
        check_unit("detection.text_change_fraction", d.text_change_fraction)?;
        check_unit(
            "detection.text_corroboration_similarity",
            d.text_corroboration_similarity,
        )?;
        check_unit("classifier.threshold", self.classifier.threshold as f64)?;
        check_positive("sampler.interval_ms", self.sampler.interval_ms)?;
        check_positive("detection.required_stability", d.required_stability as u64)?;
        check_positive("detection.comparison_size", d.comparison_size as u64)?;
        check_positive("detection.sample_stride", d.sample_stride as u64)?;
        check_positive("classifier.input_size", self.classifier.input_size as u64)?;
        if d.min_slide_interval_ms < 0 || d.first_slide_delay_ms < 0 {
            return Err(ConfigError::Invalid(
                "detection intervals must not be negative".into(),
            ));
        }
        match self.sampler.source.as_str() {
            "http" | "directory" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "sampler.source must be 'http' or 'directory', got '{other}'"
            ))),
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within 0..1, got {value}"
        )))
    }
}

fn check_positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be greater than zero")))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_interval_ms() -> u64 {
    2000
}
fn default_source() -> String {
    "http".into()
}
fn default_url() -> String {
    "http://127.0.0.1:8080/frame".into()
}
fn default_directory() -> PathBuf {
    PathBuf::from("frames")
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_similarity_threshold() -> f64 {
    0.92
}
fn default_required_stability() -> u32 {
    3
}
fn default_min_slide_interval_ms() -> i64 {
    3000
}
fn default_comparison_size() -> u32 {
    64
}
fn default_sample_stride() -> u32 {
    4
}
fn default_edge_threshold() -> u8 {
    30
}
fn default_layout_change_fraction() -> f64 {
    0.4
}
fn default_text_change_fraction() -> f64 {
    0.25
}
fn default_text_corroboration_similarity() -> f64 {
    0.98
}
fn default_layout_noise_floor() -> u32 {
    20
}
fn default_capture_first_slide() -> bool {
    true
}
fn default_first_slide_delay_ms() -> i64 {
    2000
}
fn default_weights_path() -> PathBuf {
    PathBuf::from("transition-model.json")
}
fn default_input_size() -> u32 {
    32
}
fn default_classifier_threshold() -> f32 {
    0.5
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_file_prefix() -> String {
    "lecture-slides".into()
}
fn default_title() -> String {
    "Lecture Slides".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.sampler.interval_ms, 2000);
        assert_eq!(config.detection.required_stability, 3);
        assert!((config.detection.similarity_threshold - 0.92).abs() < f64::EPSILON);
        assert!(!config.classifier.enabled);
        assert_eq!(config.export.file_prefix, "lecture-slides");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [detection]
            required_stability = 2
            min_slide_interval_ms = 0

            [sampler]
            source = "directory"
            directory = "/tmp/frames"
            "#,
        )
        .unwrap();
        assert_eq!(config.detection.required_stability, 2);
        assert_eq!(config.detection.min_slide_interval_ms, 0);
        assert_eq!(config.detection.comparison_size, 64);
        assert_eq!(config.sampler.directory, PathBuf::from("/tmp/frames"));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let err = Config::parse("[detection]\nsimilarity_threshold = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_source_rejected() {
        let err = Config::parse("[sampler]\nsource = \"webcam\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_stride_rejected() {
        let err = Config::parse("[detection]\nsample_stride = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Config::parse("[detection\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

use crate::detection::decision::ThresholdPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration read from `config/detector.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: ModelConfig,
    pub preprocessing: PreprocessConfig,
    pub detection: ThresholdPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub format: ModelFormat,
    pub device: DeviceKind,
    pub output: ModelOutput,
    /// Feed NHWC tensors as-is instead of permuting to NCHW.
    pub channels_last: bool,
    pub num_classes: i64,
    pub labels_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/resnet50.ot"),
            format: ModelFormat::ResNet50,
            device: DeviceKind::Auto,
            output: ModelOutput::Logits,
            channels_last: false,
            num_classes: 1000,
            labels_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// A serialized TorchScript module (`.pt`).
    TorchScript,
    /// ImageNet ResNet50 weights stored as a tch VarStore (`.ot`).
    ResNet50,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    /// CUDA when available, CPU otherwise.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelOutput {
    Logits,
    /// Already a distribution; outputs that do not sum to 1 are rejected.
    Probabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
    pub filter: ResizeFilter,
    pub normalization: Normalization,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            filter: ResizeFilter::Nearest,
            normalization: Normalization::Torch,
        }
    }
}

impl PreprocessConfig {
    /// NHWC shape of the tensor fed to the network.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        use image::imageops::FilterType;
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Input normalization of the network's training pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// BGR order, per-channel ImageNet mean subtracted, 0..255 range.
    Caffe,
    /// RGB scaled to [0, 1], then ImageNet mean/std.
    Torch,
    /// RGB scaled to [-1, 1].
    Tf,
}

impl DetectorConfig {
    /// Reads the YAML file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preprocessing.width == 0 || self.preprocessing.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "preprocessing size must be non-zero, got {}x{}",
                self.preprocessing.width, self.preprocessing.height
            )));
        }
        if self.model.num_classes < 1 {
            return Err(ConfigError::Invalid(format!(
                "model.num_classes must be positive, got {}",
                self.model.num_classes
            )));
        }
        self.detection.validate()?;

        if self.model.format == ModelFormat::ResNet50
            && self.preprocessing.normalization != Normalization::Torch
        {
            log::warn!(
                "ResNet50 VarStore weights expect torch normalization, configured {:?}",
                self.preprocessing.normalization
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = DetectorConfig::from_yaml("{}").unwrap();
        assert_eq!(config, DetectorConfig::default());
        assert_eq!(config.preprocessing.input_shape(), [1, 224, 224, 3]);
        assert_eq!(config.detection.default_threshold, 0.5665);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
model:
  path: models/deepfake.pt
  format: torchscript
  output: probabilities
preprocessing:
  normalization: caffe
  filter: lanczos3
"#;
        let config = DetectorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.model.format, ModelFormat::TorchScript);
        assert_eq!(config.model.output, ModelOutput::Probabilities);
        assert_eq!(config.model.device, DeviceKind::Auto);
        assert_eq!(config.preprocessing.normalization, Normalization::Caffe);
        assert_eq!(config.preprocessing.filter, ResizeFilter::Lanczos3);
        assert_eq!(config.preprocessing.width, 224);
    }

    #[test]
    fn rejects_zero_size() {
        let err = DetectorConfig::from_yaml("preprocessing:\n  width: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_threshold_bounds() {
        let yaml = "detection:\n  min_threshold: 0.9\n  max_threshold: 0.1\n";
        assert!(matches!(
            DetectorConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config =
            DetectorConfig::from_yaml(include_str!("../../../config/detector.yaml")).unwrap();
        assert_eq!(config, DetectorConfig::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = DetectorConfig::load(Path::new("does/not/exist.yaml")).unwrap();
        assert_eq!(config, DetectorConfig::default());
    }
}

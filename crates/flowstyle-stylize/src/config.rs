use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StylizeError;
use flowstyle_flow::{FarnebackParams, OcclusionParams};

/// Hyper parameters of the Adam update applied to the optimized frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    /// Step size.
    pub learning_rate: f64,
    /// Decay of the first moment estimate.
    pub beta1: f64,
    /// Decay of the second moment estimate.
    pub beta2: f64,
    /// Term added to the denominator of the update.
    pub eps: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.02,
            beta1: 0.99,
            beta2: 0.999,
            eps: 0.1,
        }
    }
}

impl From<&AdamConfig> for candle_nn::ParamsAdamW {
    fn from(config: &AdamConfig) -> Self {
        Self {
            lr: config.learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            eps: config.eps,
            weight_decay: 0.0,
        }
    }
}

/// Configuration of a stylization run.
///
/// Fixed for the lifetime of a [`crate::FrameOptimizer`].
///
/// # Example
///
/// ```
/// use flowstyle_stylize::StylizeConfig;
///
/// let config: StylizeConfig = serde_json::from_str(r#"{ "epochs": 4 }"#).unwrap();
/// assert_eq!(config.epochs, 4);
/// assert_eq!(config.style_weight, 10.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylizeConfig {
    /// Weight of the style loss.
    pub style_weight: f32,
    /// Weight of the content loss.
    pub content_weight: f32,
    /// Weight of the temporal loss.
    pub temporal_weight: f32,
    /// Epochs spent on every frame after the first.
    pub epochs: usize,
    /// Optimizer steps per epoch.
    pub steps_per_epoch: usize,
    /// Epochs spent on the first frame, which has no warm start.
    pub first_frame_epochs: usize,
    /// Layers whose activations form the content target.
    pub content_layers: Vec<String>,
    /// Layers whose gram matrices form the style target.
    pub style_layers: Vec<String>,
    /// Longest side of the working resolution, `None` keeps the native size.
    pub max_image_size: Option<usize>,
    /// Optimizer hyper parameters.
    pub optimizer: AdamConfig,
    /// Occlusion detection thresholds.
    pub occlusion: OcclusionParams,
    /// Optical flow estimation parameters.
    pub flow: FarnebackParams,
}

impl Default for StylizeConfig {
    fn default() -> Self {
        Self {
            style_weight: 10.0,
            content_weight: 100.0,
            temporal_weight: 400.0,
            epochs: 2,
            steps_per_epoch: 5,
            first_frame_epochs: 15,
            content_layers: vec!["block5_conv2".to_string()],
            style_layers: (1..=5).map(|b| format!("block{b}_conv1")).collect(),
            max_image_size: Some(512),
            optimizer: AdamConfig::default(),
            occlusion: OcclusionParams::default(),
            flow: FarnebackParams::default(),
        }
    }
}

impl StylizeConfig {
    /// Load a configuration from a JSON file. Missing fields take their default.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StylizeError> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is in range.
    pub fn validate(&self) -> Result<(), StylizeError> {
        let weights = [
            ("style_weight", self.style_weight),
            ("content_weight", self.content_weight),
            ("temporal_weight", self.temporal_weight),
        ];
        for (name, weight) in weights {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(StylizeError::InvalidConfig(format!(
                    "{name} must be finite and non negative, got {weight}"
                )));
            }
        }

        if self.steps_per_epoch == 0 {
            return Err(StylizeError::InvalidConfig(
                "steps_per_epoch must be positive".to_string(),
            ));
        }

        if self.content_layers.is_empty() && self.style_layers.is_empty() {
            return Err(StylizeError::InvalidConfig(
                "at least one content or style layer is required".to_string(),
            ));
        }

        if self.max_image_size == Some(0) {
            return Err(StylizeError::InvalidConfig(
                "max_image_size must be positive".to_string(),
            ));
        }

        let adam = &self.optimizer;
        if !(adam.learning_rate > 0.0
            && (0.0..1.0).contains(&adam.beta1)
            && (0.0..1.0).contains(&adam.beta2)
            && adam.eps > 0.0)
        {
            return Err(StylizeError::InvalidConfig(format!(
                "invalid optimizer parameters {adam:?}"
            )));
        }

        self.occlusion.validate()?;
        self.flow.validate()?;

        Ok(())
    }

    /// Epochs spent on a frame, the first frame of a sequence gets its own budget.
    pub fn epochs_for(&self, first: bool) -> usize {
        if first {
            self.first_frame_epochs
        } else {
            self.epochs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_is_valid() -> Result<(), StylizeError> {
        let config = StylizeConfig::default();
        config.validate()?;
        assert_eq!(config.epochs_for(true) * config.steps_per_epoch, 75);
        assert_eq!(config.epochs_for(false) * config.steps_per_epoch, 10);
        assert_eq!(
            config.style_layers,
            vec![
                "block1_conv1",
                "block2_conv1",
                "block3_conv1",
                "block4_conv1",
                "block5_conv1"
            ]
        );
        Ok(())
    }

    #[test]
    fn invalid_values() {
        let config = StylizeConfig {
            temporal_weight: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StylizeError::InvalidConfig(_))
        ));

        let config = StylizeConfig {
            steps_per_epoch: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = StylizeConfig::default();
        config.optimizer.beta1 = 1.0;
        assert!(config.validate().is_err());

        let mut config = StylizeConfig::default();
        config.flow.pyr_scale = 2.0;
        assert!(matches!(config.validate(), Err(StylizeError::Flow(_))));
    }

    #[test]
    fn from_json_file() -> Result<(), StylizeError> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{ "style_weight": 5.0, "max_image_size": null, "occlusion": {{ "consistency_beta": 1.0 }} }}"#
        )?;

        let config = StylizeConfig::from_json_file(file.path())?;

        assert_eq!(config.style_weight, 5.0);
        assert_eq!(config.max_image_size, None);
        assert_eq!(config.occlusion.consistency_beta, 1.0);
        assert_eq!(config.occlusion.motion_beta, 0.002);
        assert_eq!(config.content_weight, 100.0);
        Ok(())
    }

    #[test]
    fn from_json_file_rejects_garbage() -> Result<(), StylizeError> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "not json")?;
        assert!(matches!(
            StylizeConfig::from_json_file(file.path()),
            Err(StylizeError::Json(_))
        ));
        Ok(())
    }
}

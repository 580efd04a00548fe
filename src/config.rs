use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{NetErr, Result};

/// Per-channel means of the pretrained ImageNet weights, in blue, green, red order.
pub const IMAGENET_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

fn default_mean() -> [f32; 3] {
    IMAGENET_BGR_MEAN
}

/// The configuration of a single network build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Amount of classes of the base head, the fine-tune head has one more.
    pub object_class_num: usize,
    /// Mean subtracted from each input channel: `[blue, green, red]`.
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    /// Whether dropout, losses and optimizer steps are built.
    #[serde(default)]
    pub trainable: bool,
    /// Seed for initialization and dropout, taken from the OS when missing.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl NetConfig {
    /// Creates a new `NetConfig` with the ImageNet channel means and no seed.
    ///
    /// # Arguments
    /// * `object_class_num` - The amount of classes of the base head.
    /// * `trainable` - Whether to build the training objective.
    ///
    /// # Returns
    /// A new `NetConfig` instance.
    pub fn new(object_class_num: usize, trainable: bool) -> Self {
        Self {
            object_class_num,
            mean: IMAGENET_BGR_MEAN,
            trainable,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_mean(mut self, mean: [f32; 3]) -> Self {
        self.mean = mean;
        self
    }

    /// Parses and validates a configuration from a json string.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a json configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Checks the configuration before anything gets built.
    ///
    /// # Returns
    /// An `InvalidConfig` error if there are no classes or a mean is not finite.
    pub fn validate(&self) -> Result<()> {
        if self.object_class_num == 0 {
            return Err(NetErr::InvalidConfig(
                "object_class_num must be greater than 0".into(),
            ));
        }

        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(NetErr::InvalidConfig(format!(
                "mean[{i}] must be a finite number"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults() {
        let config = NetConfig::from_json(r#"{ "object_class_num": 20 }"#).unwrap();

        assert_eq!(config.object_class_num, 20);
        assert_eq!(config.mean, IMAGENET_BGR_MEAN);
        assert!(!config.trainable);
        assert!(config.seed.is_none());
    }

    #[test]
    fn json_full() {
        let raw = r#"{
            "object_class_num": 3,
            "mean": [1.0, 2.0, 3.0],
            "trainable": true,
            "seed": 7
        }"#;
        let config = NetConfig::from_json(raw).unwrap();

        assert_eq!(
            config,
            NetConfig::new(3, true).with_mean([1., 2., 3.]).with_seed(7)
        );
    }

    #[test]
    fn zero_classes_is_rejected() {
        let err = NetConfig::from_json(r#"{ "object_class_num": 0 }"#).unwrap_err();
        assert!(matches!(err, NetErr::InvalidConfig(_)));
    }

    #[test]
    fn nan_mean_is_rejected() {
        let config = NetConfig::new(2, false).with_mean([0., f32::NAN, 0.]);
        assert!(matches!(config.validate(), Err(NetErr::InvalidConfig(_))));
    }

    #[test]
    fn malformed_json() {
        let err = NetConfig::from_json("{ object_class_num: }").unwrap_err();
        assert!(matches!(err, NetErr::Json(_)));
    }
}

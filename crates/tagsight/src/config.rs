use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tagsight_3d::{CameraError, PoseSettings};
use tagsight_anchor::AnchorSettings;
use tagsight_imgproc::preprocess::PreprocessingSettings;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for this layout.
    #[error("malformed configuration")]
    Json(#[from] serde_json::Error),

    /// The camera parameters are unusable.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// A value is outside its supported range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending option.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Supported tag families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFamily {
    /// tag16h5
    Tag16h5,
    /// tag25h9
    Tag25h9,
    /// tag36h10
    Tag36h10,
    /// tag36h11
    #[default]
    Tag36h11,
    /// tagCircle21h7
    Circle21h7,
    /// tagCircle49h12
    Circle49h12,
    /// tagCustom48h12
    Custom48h12,
    /// tagStandard41h12
    Standard41h12,
    /// tagStandard52h13
    Standard52h13,
}

impl TagFamily {
    /// Returns every supported family.
    pub fn all() -> [Self; 9] {
        [
            Self::Tag16h5,
            Self::Tag25h9,
            Self::Tag36h10,
            Self::Tag36h11,
            Self::Circle21h7,
            Self::Circle49h12,
            Self::Custom48h12,
            Self::Standard41h12,
            Self::Standard52h13,
        ]
    }

    /// Canonical family name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tag16h5 => "tag16h5",
            Self::Tag25h9 => "tag25h9",
            Self::Tag36h10 => "tag36h10",
            Self::Tag36h11 => "tag36h11",
            Self::Circle21h7 => "tagCircle21h7",
            Self::Circle49h12 => "tagCircle49h12",
            Self::Custom48h12 => "tagCustom48h12",
            Self::Standard41h12 => "tagStandard41h12",
            Self::Standard52h13 => "tagStandard52h13",
        }
    }
}

/// Detector options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Family of the printed tags.
    pub family: TagFamily,
    /// Physical edge length of the tags, meters.
    pub tag_size: f32,
    /// Downscaling factor applied by the detector, 1..=8.
    pub decimation: u32,
    /// Upper bound on detector invocations per second.
    pub max_detections_per_second: f32,
    /// Horizontal field of view used when the frame carries no intrinsics, degrees.
    pub horizontal_fov_deg: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            family: TagFamily::default(),
            tag_size: 0.1,
            decimation: 2,
            max_detections_per_second: 15.0,
            horizontal_fov_deg: 60.0,
        }
    }
}

/// Full session configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsightConfig {
    /// Detector options.
    pub detector: DetectorConfig,
    /// Pose estimation options.
    pub pose: PoseSettings,
    /// Anchor placement options.
    pub anchor: AnchorSettings,
    /// Frame conditioning options.
    pub preprocessing: PreprocessingSettings,
    /// Run the conditioning pipeline before detection.
    pub preprocessing_enabled: bool,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is not a positive number")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is negative")))
    }
}

impl TagsightConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check every option against its supported range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let detector = &self.detector;
        positive("detector.tag_size", detector.tag_size)?;
        if !(1..=8).contains(&detector.decimation) {
            return Err(invalid(
                "detector.decimation",
                format!("{} is outside 1..=8", detector.decimation),
            ));
        }
        positive(
            "detector.max_detections_per_second",
            detector.max_detections_per_second,
        )?;
        if !(detector.horizontal_fov_deg > 0.0 && detector.horizontal_fov_deg < 180.0) {
            return Err(CameraError::InvalidFieldOfView(detector.horizontal_fov_deg).into());
        }

        let pose = &self.pose;
        pose.depth_range.validate()?;
        positive("pose.position_scale", pose.position_scale)?;
        if !(0.0..=1.0).contains(&pose.smoothing) {
            return Err(invalid(
                "pose.smoothing",
                format!("{} is outside 0..=1", pose.smoothing),
            ));
        }

        let anchor = &self.anchor;
        if !(0.0..=1.0).contains(&anchor.confidence_threshold) {
            return Err(invalid(
                "anchor.confidence_threshold",
                format!("{} is outside 0..=1", anchor.confidence_threshold),
            ));
        }
        if anchor.required_stable_frames == 0 {
            return Err(invalid("anchor.required_stable_frames", "must be at least 1"));
        }
        positive(
            "anchor.max_detection_timeout_secs",
            anchor.max_detection_timeout_secs,
        )?;
        non_negative("anchor.stale_grace_secs", anchor.stale_grace_secs)?;
        positive("anchor.keep_out_multiplier", anchor.keep_out_multiplier)?;
        non_negative("anchor.keep_out_min_radius", anchor.keep_out_min_radius)?;
        if anchor.keep_out_max_radius.is_nan()
            || anchor.keep_out_max_radius < anchor.keep_out_min_radius
        {
            return Err(invalid(
                "anchor.keep_out_max_radius",
                format!(
                    "{} is below the minimum radius {}",
                    anchor.keep_out_max_radius, anchor.keep_out_min_radius
                ),
            ));
        }
        positive("anchor.keep_out_max_age_secs", anchor.keep_out_max_age_secs)?;
        non_negative("anchor.clear_cooldown_secs", anchor.clear_cooldown_secs)?;

        Ok(())
    }

    /// Anchor settings with the tag size taken from the detector options.
    pub fn anchor_settings(&self) -> AnchorSettings {
        AnchorSettings {
            tag_size: self.detector.tag_size,
            ..self.anchor.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() -> Result<(), ConfigError> {
        let config = TagsightConfig::default();
        config.validate()?;
        assert_eq!(config.detector.family, TagFamily::Tag36h11);
        assert_eq!(config.detector.decimation, 2);
        assert!(!config.preprocessing_enabled);
        Ok(())
    }

    #[test]
    fn test_partial_json() -> Result<(), ConfigError> {
        let config = TagsightConfig::from_json_str(
            r#"{
                "detector": { "family": "tag16h5", "tag_size": 0.16 },
                "anchor": { "confidence_threshold": 0.3, "required_stable_frames": 2 },
                "preprocessing_enabled": true
            }"#,
        )?;
        assert_eq!(config.detector.family, TagFamily::Tag16h5);
        assert_eq!(config.detector.max_detections_per_second, 15.0);
        assert_eq!(config.anchor.required_stable_frames, 2);
        assert!(config.preprocessing_enabled);

        let anchor = config.anchor_settings();
        assert_eq!(anchor.tag_size, 0.16);
        assert_eq!(anchor.confidence_threshold, 0.3);
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = TagsightConfig::from_json_str(r#"{ "detector": { "decimation": 9 } }"#);
        assert!(matches!(
            err,
            Err(ConfigError::Invalid {
                field: "detector.decimation",
                ..
            })
        ));

        let err = TagsightConfig::from_json_str(r#"{ "detector": { "horizontal_fov_deg": 0 } }"#);
        assert!(matches!(err, Err(ConfigError::Camera(_))));

        let err = TagsightConfig::from_json_str(
            r#"{ "pose": { "depth_range": { "min": 5.0, "max": 1.0 } } }"#,
        );
        assert!(matches!(err, Err(ConfigError::Camera(_))));

        let err = TagsightConfig::from_json_str(r#"{ "detector": { "family": "tag99h1" } }"#);
        assert!(matches!(err, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tagsight.json");
        fs::write(&path, serde_json::to_string_pretty(&TagsightConfig::default())?)?;

        let config = TagsightConfig::from_json_file(&path)?;
        assert_eq!(config, TagsightConfig::default());

        assert!(matches!(
            TagsightConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
        Ok(())
    }
}

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Largest resolution accepted from a config file.
pub const MAX_RESOLUTION: u32 = 16384;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where the blur pass takes its Gaussian kernel radius from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelRadiusSetting {
    /// Same radius as the tile padding.
    #[default]
    Padding,
    /// The raw blur strength value.
    #[serde(alias = "strength")]
    BlurStrength,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlurConfig {
    pub version: u32,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub images: ImageSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderSection {
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default = "default_blur_strength")]
    pub blur_strength: f32,
    #[serde(default = "default_max_tile_size")]
    pub max_tile_size: u32,
    #[serde(default)]
    pub kernel_radius_source: KernelRadiusSetting,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageSection {
    pub source: Option<PathBuf>,
    pub mask: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputSection {
    pub path: Option<PathBuf>,
    pub stitched_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub with_mask: bool,
    #[serde(default)]
    pub mark_seams: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub inter_tile_delay: Duration,
    pub progress_dir: Option<PathBuf>,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            blur_strength: default_blur_strength(),
            max_tile_size: default_max_tile_size(),
            kernel_radius_source: KernelRadiusSetting::default(),
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            path: None,
            stitched_path: None,
            with_mask: true,
            mark_seams: false,
            inter_tile_delay: Duration::ZERO,
            progress_dir: None,
        }
    }
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            version: 1,
            render: RenderSection::default(),
            images: ImageSection::default(),
            output: OutputSection::default(),
        }
    }
}

fn default_resolution() -> u32 {
    1024
}

fn default_blur_strength() -> f32 {
    0.2
}

fn default_max_tile_size() -> u32 {
    2048
}

fn default_true() -> bool {
    true
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

impl BlurConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BlurConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let render = &self.render;
        if render.resolution == 0 {
            return Err(ConfigError::Invalid(
                "render.resolution must be greater than zero".into(),
            ));
        }
        if render.resolution > MAX_RESOLUTION {
            return Err(ConfigError::Invalid(format!(
                "render.resolution {} exceeds the supported maximum of {MAX_RESOLUTION}",
                render.resolution
            )));
        }
        if !(0.0..=1.0).contains(&render.blur_strength) {
            return Err(ConfigError::Invalid(format!(
                "render.blur_strength must be within [0, 1], got {}",
                render.blur_strength
            )));
        }
        if render.max_tile_size < 2 {
            return Err(ConfigError::Invalid(
                "render.max_tile_size must be at least 2".into(),
            ));
        }

        for (key, value) in [
            ("images.source", &self.images.source),
            ("images.mask", &self.images.mask),
            ("output.path", &self.output.path),
            ("output.stitched_path", &self.output.stitched_path),
            ("output.progress_dir", &self.output.progress_dir),
        ] {
            if value.as_ref().is_some_and(|path| path.as_os_str().is_empty()) {
                return Err(ConfigError::Invalid(format!("{key} may not be empty")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[render]
resolution = 4096
blur_strength = 0.35
max_tile_size = 1024
kernel_radius_source = "blur_strength"

[images]
source = "puzzle.jpg"
mask = "penguin.jpg"

[output]
path = "out/blurred.png"
mark_seams = true
inter_tile_delay = "50ms"
"#;

    #[test]
    fn parses_sample_config() {
        let config = BlurConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.render.resolution, 4096);
        assert_eq!(config.render.max_tile_size, 1024);
        assert_eq!(
            config.render.kernel_radius_source,
            KernelRadiusSetting::BlurStrength
        );
        assert_eq!(config.images.mask.as_deref(), Some(Path::new("penguin.jpg")));
        assert!(config.output.with_mask);
        assert!(config.output.mark_seams);
        assert_eq!(config.output.inter_tile_delay, Duration::from_millis(50));
    }

    #[test]
    fn fills_defaults_for_missing_sections() {
        let config = BlurConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.render.resolution, 1024);
        assert_eq!(config.render.max_tile_size, 2048);
        assert_eq!(config.render.kernel_radius_source, KernelRadiusSetting::Padding);
        assert!(config.output.with_mask);
        assert!(!config.output.mark_seams);
        assert_eq!(config.output.inter_tile_delay, Duration::ZERO);
    }

    #[test]
    fn numeric_delay_is_seconds() {
        let config = BlurConfig::from_toml_str(
            r#"
version = 1
[output]
inter_tile_delay = 0.1
"#,
        )
        .unwrap();
        assert_eq!(config.output.inter_tile_delay, Duration::from_millis(100));
    }

    #[test]
    fn accepts_strength_alias() {
        let config = BlurConfig::from_toml_str(
            r#"
version = 1
[render]
kernel_radius_source = "strength"
"#,
        )
        .unwrap();
        assert_eq!(
            config.render.kernel_radius_source,
            KernelRadiusSetting::BlurStrength
        );
    }

    #[test]
    fn rejects_out_of_range_strength() {
        let err = BlurConfig::from_toml_str(
            r#"
version = 1
[render]
blur_strength = 1.5
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_resolution_and_tiny_tiles() {
        for body in [
            "version = 1\n[render]\nresolution = 0\n",
            "version = 1\n[render]\nmax_tile_size = 1\n",
            "version = 1\n[render]\nresolution = 20000\n",
        ] {
            let err = BlurConfig::from_toml_str(body).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{body}");
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let err = BlurConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_delay() {
        let err = BlurConfig::from_toml_str(
            r#"
version = 1
[output]
inter_tile_delay = -1
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = BlurConfig::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let present = dir.path().join("config.toml");
        fs::write(&present, SAMPLE).unwrap();
        let config = BlurConfig::load(&present).unwrap();
        assert_eq!(config.render.blur_strength, 0.35);
    }
}

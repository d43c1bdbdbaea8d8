//! Optional TOML defaults file so common flags do not have to be repeated:
//!
//! ```toml
//! size = "1280x720"
//! image = "assets/photo.jpg"
//!
//! [demos.textured-cube]
//! size = "900x900"
//! image = "assets/crate.png"
//! ```
//!
//! Per-demo tables override the top-level defaults; CLI flags override both.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use demos::DemoKind;
use serde::Deserialize;

use crate::cli::parse_size;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read defaults file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse defaults file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid defaults file: {0}")]
    Invalid(String),
}

/// Parsed, validated contents of a defaults file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsFile {
    size: Option<String>,
    image: Option<PathBuf>,
    animation: Option<PathBuf>,
    #[serde(default)]
    demos: BTreeMap<String, DemoDefaults>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DemoDefaults {
    size: Option<String>,
    image: Option<PathBuf>,
    animation: Option<PathBuf>,
}

/// Defaults that apply to one demo after per-demo overrides are folded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDefaults {
    pub size: Option<(u32, u32)>,
    pub image: Option<PathBuf>,
    pub animation: Option<PathBuf>,
}

impl DefaultsFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let parsed: DefaultsFile = toml::from_str(raw)?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(size) = &self.size {
            parse_size(size).map_err(ConfigError::Invalid)?;
        }
        for (name, defaults) in &self.demos {
            if DemoKind::from_name(name).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "unknown demo '{name}' in [demos] table"
                )));
            }
            if let Some(size) = &defaults.size {
                parse_size(size)
                    .map_err(|err| ConfigError::Invalid(format!("[demos.{name}] {err}")))?;
            }
        }
        Ok(())
    }

    /// Folds the per-demo table over the top-level defaults for `kind`.
    pub fn resolve(&self, kind: DemoKind) -> ResolvedDefaults {
        let specific = self.demos.get(kind.name());
        let pick_size = specific
            .and_then(|demo| demo.size.as_ref())
            .or(self.size.as_ref());
        ResolvedDefaults {
            // Sizes were validated at load time, so the re-parse cannot fail.
            size: pick_size.and_then(|size| parse_size(size).ok()),
            image: specific
                .and_then(|demo| demo.image.clone())
                .or_else(|| self.image.clone()),
            animation: specific
                .and_then(|demo| demo.animation.clone())
                .or_else(|| self.animation.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_resolves_to_nothing() {
        let defaults = DefaultsFile::from_toml_str("").unwrap();
        assert_eq!(defaults.resolve(DemoKind::Triangle), ResolvedDefaults::default());
    }

    #[test]
    fn per_demo_tables_override_top_level_defaults() {
        let defaults = DefaultsFile::from_toml_str(
            r#"
            size = "1280x720"
            image = "shared.png"

            [demos.textured-cube]
            size = "900x900"
            image = "crate.png"

            [demos.animated-quad]
            animation = "clip.gif"
            "#,
        )
        .unwrap();

        let cube = defaults.resolve(DemoKind::TexturedCube);
        assert_eq!(cube.size, Some((900, 900)));
        assert_eq!(cube.image, Some(PathBuf::from("crate.png")));

        let quad = defaults.resolve(DemoKind::AnimatedQuad);
        assert_eq!(quad.size, Some((1280, 720)));
        assert_eq!(quad.image, Some(PathBuf::from("shared.png")));
        assert_eq!(quad.animation, Some(PathBuf::from("clip.gif")));

        let triangle = defaults.resolve(DemoKind::Triangle);
        assert_eq!(triangle.size, Some((1280, 720)));
        assert_eq!(triangle.image, Some(PathBuf::from("shared.png")));
        assert_eq!(triangle.animation, None);
    }

    #[test]
    fn unknown_demo_names_are_rejected() {
        let err = DefaultsFile::from_toml_str("[demos.teapot]\nsize = \"1x1\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_sizes_are_rejected_at_load_time() {
        assert!(matches!(
            DefaultsFile::from_toml_str("size = \"wide\"").unwrap_err(),
            ConfigError::Invalid(_)
        ));
        assert!(matches!(
            DefaultsFile::from_toml_str("[demos.cube]\nsize = \"0x100\"").unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            DefaultsFile::from_toml_str("size = ").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}

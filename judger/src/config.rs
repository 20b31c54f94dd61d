//! Judger configuration, read once at startup.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! - `CONQUER_WORK_DIR`: root directory for local scratch files
//! - `CONQUER_TIMEOUT_MS`: timeout applied to every language
//! - `CONQUER_IMAGE_<LANG>`: prebuilt image for a language, e.g. `CONQUER_IMAGE_PYTHON`

use std::{collections::HashMap, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    lang::{ImageSource, Language},
    JudgeError,
};

pub const ENV_WORK_DIR: &str = "CONQUER_WORK_DIR";
pub const ENV_TIMEOUT_MS: &str = "CONQUER_TIMEOUT_MS";
pub const ENV_IMAGE_PREFIX: &str = "CONQUER_IMAGE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgerConfig {
    /// Root folder for local scratch files, defaults to `~/.conquer/`
    pub work_dir: PathBuf,

    /// Timeout applied to every language instead of its builtin one
    pub default_timeout_ms: Option<u64>,

    /// Per-language sandbox image overrides, keyed by language id or alias
    pub images: HashMap<String, ImageSource>,

    pub docker: DockerConfig,

    pub analysis: AnalysisConfig,
}

impl Default for JudgerConfig {
    fn default() -> Self {
        JudgerConfig {
            work_dir: dirs::home_dir()
                .map(|home| home.join(".conquer"))
                .unwrap_or_else(|| std::env::temp_dir().join("conquer")),
            default_timeout_ms: None,
            images: HashMap::new(),
            docker: DockerConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// CPU share available to one sandbox. This field will result in allowing
    /// the sandbox to run `run_cpu_share * 100ms` in every 100ms CPU time.
    pub run_cpu_share: f64,

    /// Maximum number of processes and threads inside one sandbox
    pub pids_limit: i64,

    /// Cap of captured bytes for each of stdout and stderr
    pub output_limit_bytes: usize,

    /// The user sandboxes run as. Leaving this `None` uses the image default.
    pub user: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            run_cpu_share: 0.5,
            pids_limit: 64,
            output_limit_bytes: 1024 * 1024,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// How many leading test cases are timed for complexity analysis
    pub max_samples: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig { max_samples: 10 }
    }
}

impl JudgerConfig {
    /// Load the configuration file at `path` (if any), then apply the process
    /// environment on top of it.
    pub fn load(path: Option<&Path>) -> Result<JudgerConfig, JudgeError> {
        let mut cfg = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Self::from_toml_str(&content)?
            }
            None => JudgerConfig::default(),
        };
        cfg.apply_env(std::env::vars())?;
        tracing::debug!(?cfg, "Configuration loaded");
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<JudgerConfig, JudgeError> {
        let cfg: JudgerConfig = toml::from_str(s).map_err(|e| JudgeError::Config(e.to_string()))?;
        if let Some(unknown) = cfg.images.keys().find(|k| Language::from_id(k).is_none()) {
            return Err(JudgeError::Config(format!(
                "image configured for unknown language `{}`",
                unknown
            )));
        }
        Ok(cfg)
    }

    /// The image override for `language`, if any.
    pub fn image_for(&self, language: Language) -> Option<&ImageSource> {
        self.images
            .iter()
            .find(|(k, _)| Language::from_id(k) == Some(language))
            .map(|(_, v)| v)
    }

    pub fn apply_env(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), JudgeError> {
        for (key, value) in vars {
            if key == ENV_WORK_DIR {
                self.work_dir = PathBuf::from(value);
            } else if key == ENV_TIMEOUT_MS {
                let timeout = value.trim().parse::<u64>().map_err(|e| {
                    JudgeError::Config(format!("invalid {} `{}`: {}", ENV_TIMEOUT_MS, value, e))
                })?;
                self.default_timeout_ms = Some(timeout);
            } else if let Some(lang) = key.strip_prefix(ENV_IMAGE_PREFIX) {
                let lang = Language::from_id(lang).ok_or_else(|| {
                    JudgeError::Config(format!("{} names an unknown language", key))
                })?;
                self.images.retain(|k, _| Language::from_id(k) != Some(lang));
                self.images
                    .insert(lang.id().to_owned(), ImageSource::Prebuilt(value));
            }
        }
        Ok(())
    }

    /// Scratch folder where image build contexts are written.
    pub fn image_folder(&self, language: Language) -> PathBuf {
        let mut folder = self.work_dir.clone();
        folder.push("images");
        folder.push(language.id());
        folder
    }
}

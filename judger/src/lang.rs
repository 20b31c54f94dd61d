//! The table of supported languages and how each one is compiled and run.

use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr, time::Duration};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{config::JudgerConfig, JudgeError};

/// Directory inside the sandbox where sources are placed and commands run.
pub const SANDBOX_WORKDIR: &str = "/sandbox";

/// Exit code the sandbox shell uses when the compile step fails.
pub const COMPILE_FAILURE_EXIT_CODE: i64 = 201;

const MIB: i64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
    Go,
}

static ALIASES: Lazy<HashMap<&'static str, Language>> = Lazy::new(|| {
    [
        ("python", Language::Python),
        ("python3", Language::Python),
        ("py", Language::Python),
        ("javascript", Language::JavaScript),
        ("js", Language::JavaScript),
        ("node", Language::JavaScript),
        ("java", Language::Java),
        ("cpp", Language::Cpp),
        ("c++", Language::Cpp),
        ("cxx", Language::Cpp),
        ("go", Language::Go),
        ("golang", Language::Go),
    ]
    .iter()
    .cloned()
    .collect()
});

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::Cpp,
        Language::Go,
    ];

    /// The canonical id of this language.
    pub fn id(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::Go => "go",
        }
    }

    /// Resolve a language id or one of its aliases, ignoring case.
    pub fn from_id(id: &str) -> Option<Language> {
        ALIASES.get(id.trim().to_lowercase().as_str()).copied()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_id(s).ok_or_else(|| JudgeError::UnsupportedLanguage(s.to_owned()))
    }
}

/// Where the sandbox image of a language comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    /// An existing image, pulled from a registry.
    Prebuilt(String),
    /// An image to be built from a custom Dockerfile.
    Dockerfile {
        /// Name to be assigned to the image.
        tag: String,
        /// Path of the Dockerfile. Its parent directory is the build context.
        dockerfile: PathBuf,
    },
}

impl ImageSource {
    pub fn tag(&self) -> &str {
        match self {
            ImageSource::Prebuilt(tag) => tag,
            ImageSource::Dockerfile { tag, .. } => tag,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfig {
    pub language: Language,
    pub extension: String,
    /// File the harnessed submission is written to.
    pub source_file: String,
    pub sandbox_image: String,
    /// `None` means the image is built from the bundled Dockerfile.
    #[serde(skip)]
    pub image_source: Option<ImageSource>,
    pub compile_command: Option<String>,
    pub run_command: String,
    pub memory_limit_bytes: i64,
    pub timeout_millis: u64,
}

impl LanguageConfig {
    pub fn builtin(language: Language) -> LanguageConfig {
        let (extension, source_file, compile, run, memory, timeout): (
            &str,
            &str,
            Option<&str>,
            &str,
            i64,
            u64,
        ) = match language {
            Language::Python => (
                "py",
                "solution.py",
                None,
                "python3 solution.py",
                256 * MIB,
                10_000,
            ),
            Language::JavaScript => (
                "js",
                "solution.js",
                None,
                "node solution.js",
                256 * MIB,
                10_000,
            ),
            Language::Java => (
                "java",
                "Main.java",
                Some("javac -cp /usr/share/java/gson.jar:. Main.java"),
                "java -Xss64m -cp /usr/share/java/gson.jar:. Main",
                512 * MIB,
                15_000,
            ),
            Language::Cpp => (
                "cpp",
                "solution.cpp",
                Some("g++ -O2 -std=c++17 -o solution solution.cpp"),
                "./solution",
                256 * MIB,
                10_000,
            ),
            Language::Go => (
                "go",
                "solution.go",
                Some("GOCACHE=/tmp/.gocache go build -o solution solution.go main.go"),
                "./solution",
                256 * MIB,
                15_000,
            ),
        };
        LanguageConfig {
            language,
            extension: extension.into(),
            source_file: source_file.into(),
            sandbox_image: default_image_tag(language),
            image_source: None,
            compile_command: compile.map(Into::into),
            run_command: run.into(),
            memory_limit_bytes: memory,
            timeout_millis: timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    /// The entry command of the sandbox.
    ///
    /// When a compile step exists it is chained before the run step, and a
    /// failing compile exits with [`COMPILE_FAILURE_EXIT_CODE`].
    pub fn command(&self) -> Vec<String> {
        let script = match &self.compile_command {
            Some(compile) => format!(
                "{} || exit {}; {}",
                compile, COMPILE_FAILURE_EXIT_CODE, self.run_command
            ),
            None => self.run_command.clone(),
        };
        vec!["sh".into(), "-c".into(), script]
    }
}

pub fn default_image_tag(language: Language) -> String {
    format!("conquer-judge/{}:latest", language.id())
}

/// Read-only lookup table from language id to [`LanguageConfig`].
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageRegistry {
    pub fn builtin() -> LanguageRegistry {
        LanguageRegistry {
            configs: Language::ALL
                .iter()
                .map(|&l| (l, LanguageConfig::builtin(l)))
                .collect(),
        }
    }

    /// Builtin table with the image and timeout overrides of `cfg` applied.
    pub fn from_config(cfg: &JudgerConfig) -> LanguageRegistry {
        let mut registry = Self::builtin();
        for config in registry.configs.values_mut() {
            if let Some(source) = cfg.image_for(config.language) {
                config.sandbox_image = source.tag().to_owned();
                config.image_source = Some(source.clone());
            }
            if let Some(timeout) = cfg.default_timeout_ms {
                config.timeout_millis = timeout;
            }
        }
        registry
    }

    pub fn lookup(&self, id: &str) -> Result<&LanguageConfig, JudgeError> {
        Language::from_id(id)
            .and_then(|l| self.configs.get(&l))
            .ok_or_else(|| JudgeError::UnsupportedLanguage(id.to_owned()))
    }

    pub fn get(&self, language: Language) -> Option<&LanguageConfig> {
        self.configs.get(&language)
    }

    /// All configured languages, in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &LanguageConfig> {
        Language::ALL.iter().filter_map(move |l| self.configs.get(l))
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_aliases_case_insensitively() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.lookup("PY").unwrap().language, Language::Python);
        assert_eq!(registry.lookup("c++").unwrap().language, Language::Cpp);
        assert_eq!(registry.lookup(" Golang ").unwrap().language, Language::Go);
        assert_eq!(
            registry.lookup("node").unwrap().source_file,
            "solution.js".to_string()
        );
    }

    #[test]
    fn lookup_rejects_unknown_language() {
        let registry = LanguageRegistry::builtin();
        match registry.lookup("brainfuck") {
            Err(JudgeError::UnsupportedLanguage(id)) => assert_eq!(id, "brainfuck"),
            other => panic!("expected UnsupportedLanguage, got {:?}", other),
        }
    }

    #[test]
    fn compiled_languages_chain_compile_and_run() {
        let cpp = LanguageConfig::builtin(Language::Cpp);
        let cmd = cpp.command();
        assert_eq!(&cmd[..2], &["sh".to_string(), "-c".to_string()]);
        assert_eq!(
            cmd[2],
            "g++ -O2 -std=c++17 -o solution solution.cpp || exit 201; ./solution"
        );

        let py = LanguageConfig::builtin(Language::Python);
        assert_eq!(py.command()[2], "python3 solution.py");
    }

    #[test]
    fn config_overrides_image_and_timeout() {
        let mut cfg = JudgerConfig::default();
        cfg.default_timeout_ms = Some(2500);
        cfg.images.insert(
            "py".into(),
            ImageSource::Prebuilt("python:3.12-alpine".into()),
        );
        let registry = LanguageRegistry::from_config(&cfg);

        let py = registry.lookup("python").unwrap();
        assert_eq!(py.sandbox_image, "python:3.12-alpine");
        assert_eq!(py.timeout(), Duration::from_millis(2500));

        let java = registry.lookup("java").unwrap();
        assert_eq!(java.sandbox_image, "conquer-judge/java:latest");
        assert!(java.image_source.is_none());
        assert_eq!(java.timeout_millis, 2500);
    }
}

use segex_extract::extraction::{DEFAULT_MAX_ROUNDS, ExtractionConfig};
use segex_extract::openai::ModelSettings;
use segex_extract::segment::SegmentationConfig;
use segex_extract::tools::ToolLimits;
use segex_python::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::CliError;

/// Whole `segex` configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat-completions endpoint and sampling.
    pub model: ModelSection,
    /// Target JSON Schema.
    pub schema: SchemaSection,
    /// Segmentation, prompting and tool quotas.
    pub method: MethodSection,
    /// Python interpreter for `run_python`.
    pub sandbox: SandboxSection,
    /// Where results go.
    pub output: OutputSection,
}

/// `[model]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Endpoint, model name, headers and sampling parameters.
    #[serde(flatten)]
    pub settings: ModelSettings,
    /// Name of the environment variable holding the bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// `[schema]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSection {
    /// JSON Schema file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Retry in-conversation when a complete object fails the schema.
    pub enforce: bool,
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            path: None,
            enforce: true,
        }
    }
}

/// `[method]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSection {
    /// Split documents into segments.
    pub use_segmentation: bool,
    /// Characters per text segment.
    pub max_text_length: usize,
    /// Characters shared by adjacent text segments.
    pub text_overlap: usize,
    /// Pages per page-list segment.
    pub max_pages_count: usize,
    /// Pages shared by adjacent page-list segments.
    pub page_overlap: usize,
    /// Expect several records per file.
    pub multiple_per_file: bool,
    /// Tool usage instructions appended to the system prompt.
    pub tool_prompt: String,
    /// Round-trips allowed per segment conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<usize>,
    /// Append "N calls left" to tool descriptions.
    pub quota_hints: bool,
    /// Per-file call limits by tool name.
    pub tools: ToolLimits,
}

impl Default for MethodSection {
    fn default() -> Self {
        let segmentation = SegmentationConfig::default();
        Self {
            use_segmentation: segmentation.enabled,
            max_text_length: segmentation.max_text_length,
            text_overlap: segmentation.text_overlap,
            max_pages_count: segmentation.max_pages,
            page_overlap: segmentation.page_overlap,
            multiple_per_file: true,
            tool_prompt: String::new(),
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            quota_hints: true,
            tools: ToolLimits::default(),
        }
    }
}

/// `[sandbox]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Interpreter path; discovered when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python: Option<PathBuf>,
    /// Wall-clock limit per script.
    pub timeout_ms: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            python: None,
            timeout_ms: 1000,
        }
    }
}

/// `[output]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Result directory.
    pub folder: PathBuf,
    /// Also write each segment's conversation.
    pub log_raw: bool,
    /// Pretty-print records that are JSON.
    pub pretty: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("output"),
            log_raw: false,
            pretty: true,
        }
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--output`
    pub output: Option<PathBuf>,
    /// `--model`
    pub model: Option<String>,
    /// `--schema`
    pub schema: Option<PathBuf>,
    /// `--no-segmentation`
    pub no_segmentation: bool,
}

impl AppConfig {
    /// Default location: `<config dir>/segex/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("segex").join("config.toml"))
    }

    /// Parses a TOML file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parses TOML text.
    pub fn parse(contents: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads `explicit` if given, else the default file when it exists,
    /// else the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, CliError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path().filter(|p| p.exists()) {
            Some(path) => {
                tracing::debug!(event = "config_default_path", path = %path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(output) = &overrides.output {
            self.output.folder.clone_from(output);
        }
        if let Some(model) = &overrides.model {
            self.model.settings.model.clone_from(model);
        }
        if let Some(schema) = &overrides.schema {
            self.schema.path = Some(schema.clone());
        }
        if overrides.no_segmentation {
            self.method.use_segmentation = false;
        }
    }

    /// Checks every section and reports the first problem.
    pub fn validate(&self) -> Result<(), CliError> {
        self.model.settings.validate().map_err(CliError::Config)?;
        self.segmentation()
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        self.extraction().validate().map_err(CliError::Config)?;
        if self.sandbox.timeout_ms == 0 {
            return Err(CliError::Config(
                "sandbox.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.schema.path.is_none() {
            return Err(CliError::Config(
                "schema.path is required (or pass --schema)".to_string(),
            ));
        }
        Ok(())
    }

    /// Window sizes.
    #[must_use]
    pub const fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig {
            enabled: self.method.use_segmentation,
            max_text_length: self.method.max_text_length,
            text_overlap: self.method.text_overlap,
            max_pages: self.method.max_pages_count,
            page_overlap: self.method.page_overlap,
        }
    }

    /// Orchestrator settings.
    #[must_use]
    pub fn extraction(&self) -> ExtractionConfig {
        ExtractionConfig {
            enforce_schema: self.schema.enforce,
            multiple_per_file: self.method.multiple_per_file,
            tool_prompt: self.method.tool_prompt.clone(),
            max_rounds: self.method.max_rounds,
            quota_hints: self.method.quota_hints,
            log_raw: self.output.log_raw,
            segmentation: self.segmentation(),
        }
    }

    /// Endpoint settings with the bearer token read from `api_key_env`.
    pub fn model_settings(&self) -> Result<ModelSettings, CliError> {
        let mut settings = self.model.settings.clone();
        if let Some(var) = &self.model.api_key_env {
            let key = std::env::var(var).map_err(|_| {
                CliError::Config(format!("environment variable {var} is not set"))
            })?;
            settings.api_key = Some(key);
        }
        Ok(settings)
    }

    /// Sandbox policy with the configured time limit.
    #[must_use]
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig::default().with_timeout(Duration::from_millis(self.sandbox.timeout_ms))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[model]
endpoint = "http://localhost:8000/v1/chat/completions"
model = "llama3"
api_key_env = "SEGEX_TEST_KEY_THAT_IS_NOT_SET"
temperature = 0.2
headers = { "X-Org" = "acme" }

[schema]
path = "invoice.schema.json"
enforce = false

[method]
max_text_length = 1000
text_overlap = 100
multiple_per_file = false
tool_prompt = "Use run_python for sums."
max_rounds = 8
quota_hints = false

[method.tools]
run_python = 2
think = 0

[sandbox]
timeout_ms = 500

[output]
folder = "results"
log_raw = true
"#;

    #[test]
    fn test_full_file_parses() {
        let config = AppConfig::parse(FULL).unwrap();
        assert_eq!(config.model.settings.model, "llama3");
        assert_eq!(config.model.settings.temperature, Some(0.2));
        assert_eq!(config.model.settings.timeout_secs, 120);
        assert_eq!(config.model.settings.headers["X-Org"], "acme");
        assert!(!config.schema.enforce);
        assert_eq!(config.method.tools.get("run_python"), 2);
        assert_eq!(config.method.tools.get("think"), 0);
        assert_eq!(config.method.tools.get("web_fetch"), 5);
        assert_eq!(config.output.folder, PathBuf::from("results"));
        assert!(config.validate().is_ok());

        let extraction = config.extraction();
        assert!(!extraction.enforce_schema);
        assert!(extraction.log_raw);
        assert_eq!(extraction.max_rounds, Some(8));
        assert!(!extraction.quota_hints);
        assert_eq!(extraction.segmentation.max_text_length, 1000);
        assert_eq!(config.sandbox_config().timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_partial_tool_table_keeps_other_defaults() {
        let config = AppConfig::parse("[method.tools]\nrun_python = 2\n").unwrap();
        let tools = &config.method.tools;
        assert_eq!(tools.get("run_python"), 2);
        assert_eq!(tools.get("web_fetch"), 5);
        assert_eq!(tools.get("think"), 5);
        assert_eq!(tools.get("schema_validation"), 3);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.method.use_segmentation);
        assert_eq!(config.method.max_text_length, 8000);
        assert_eq!(config.method.text_overlap, 200);
        assert_eq!(config.method.max_pages_count, 4);
        assert_eq!(config.method.tools.get("schema_validation"), 3);
        assert!(config.extraction().quota_hints);
        assert_eq!(config.model.settings.temperature, None);
        assert_eq!(config.sandbox.timeout_ms, 1000);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_validate_reports_bad_window_and_missing_schema() {
        let mut config = AppConfig::default();
        assert!(matches!(config.validate(), Err(CliError::Config(m)) if m.contains("schema.path")));

        config.schema.path = Some(PathBuf::from("s.json"));
        config.method.max_text_length = 100;
        config.method.text_overlap = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = AppConfig::parse(FULL).unwrap();
        config.apply(&Overrides {
            output: Some(PathBuf::from("elsewhere")),
            model: Some("gpt-4o".to_string()),
            schema: None,
            no_segmentation: true,
        });
        assert_eq!(config.output.folder, PathBuf::from("elsewhere"));
        assert_eq!(config.model.settings.model, "gpt-4o");
        assert!(!config.segmentation().enabled);
        assert_eq!(config.schema.path, Some(PathBuf::from("invoice.schema.json")));
    }

    #[test]
    fn test_missing_api_key_variable() {
        let config = AppConfig::parse(FULL).unwrap();
        assert!(matches!(config.model_settings(), Err(CliError::Config(m)) if m.contains("SEGEX_TEST_KEY")));
    }

    #[test]
    fn test_unknown_section_shape_is_rejected() {
        assert!(matches!(AppConfig::parse("[method]\nmax_text_length = \"big\""), Err(CliError::Toml(_))));
    }
}

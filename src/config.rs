use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::{builtin_profiles, SourceProfile};

pub const DEFAULT_CONFIG_FILE: &str = "job-tracker.toml";

/// Sweep configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Job titles searched on every source, in this order.
    pub terms: Vec<String>,
    pub locality: String,
    /// A posting mentioning any of these is flagged high-value.
    pub keywords: Vec<String>,
    /// Enabled sources, in sweep order.
    pub sources: Vec<String>,
    /// Extra source profiles; a name matching a built-in replaces it.
    pub custom_sources: Vec<SourceProfile>,
    pub per_task_cap: usize,
    pub pacing: PacingConfig,
    pub store_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub timeouts: Timeouts,
    pub sweep_deadline_secs: Option<u64>,
    pub notifications: bool,
    /// File this config was read from; `None` when running on defaults.
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            terms: [
                "Analista de Logística",
                "Analista de Estoque",
                "Analista de Inventário",
                "Coordenador de Logística",
                "Líder de Logística",
                "Supervisor de Almoxarifado",
                "Analista de PCP",
                "Supply Chain Analyst",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            locality: "São Bernardo do Campo".to_string(),
            keywords: [
                "JIT", "Lean", "Kaizen", "WMS", "SAP", "Automotiva", "Scania", "Ford",
                "Volkswagen", "Mercedes",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sources: builtin_profiles().into_iter().map(|p| p.name).collect(),
            custom_sources: Vec::new(),
            per_task_cap: 6,
            pacing: PacingConfig::default(),
            store_path: PathBuf::from("vagas.db"),
            log_file: Some(PathBuf::from("execucao.log")),
            snapshot_dir: Some(PathBuf::from("snapshots")),
            timeouts: Timeouts::default(),
            sweep_deadline_secs: None,
            notifications: true,
            loaded_from: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub enabled: bool,
    /// Inclusive `[min, max]` seconds between tasks of one source.
    pub task_delay_secs: [u64; 2],
    /// Inclusive `[min, max]` seconds between sources.
    pub source_delay_secs: [u64; 2],
}

impl Default for PacingConfig {
    fn default() -> Self {
        PacingConfig {
            enabled: true,
            task_delay_secs: [4, 7],
            source_delay_secs: [15, 30],
        }
    }
}

/// Bounds on every browser call an adapter makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_ms: u64,
    pub container_ms: u64,
    pub selector_ms: u64,
    pub consent_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            navigation_ms: 30_000,
            container_ms: 8_000,
            selector_ms: 1_500,
            consent_ms: 1_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn container(&self) -> Duration {
        Duration::from_millis(self.container_ms)
    }

    pub fn selector(&self) -> Duration {
        Duration::from_millis(self.selector_ms)
    }

    pub fn consent(&self) -> Duration {
        Duration::from_millis(self.consent_ms)
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    /// Runs before logging is set up, so it reports through `loaded_from`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        config.loaded_from = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.terms.iter().all(|t| t.trim().is_empty()) {
            bail!("`terms` must contain at least one search term");
        }
        if self.sources.is_empty() {
            bail!("`sources` must name at least one source");
        }
        if self.per_task_cap == 0 {
            bail!("`per_task_cap` must be at least 1");
        }
        for (name, [min, max]) in [
            ("pacing.task_delay_secs", self.pacing.task_delay_secs),
            ("pacing.source_delay_secs", self.pacing.source_delay_secs),
        ] {
            if min > max {
                bail!("`{}` has min {} greater than max {}", name, min, max);
            }
        }
        self.profiles().map(|_| ())
    }

    /// Profiles of the enabled sources, in configured order.
    pub fn profiles(&self) -> Result<Vec<SourceProfile>> {
        let builtins = builtin_profiles();
        self.sources
            .iter()
            .map(|name| {
                self.custom_sources
                    .iter()
                    .chain(builtins.iter())
                    .find(|p| &p.name == name)
                    .cloned()
                    .with_context(|| format!("Unknown source `{}`", name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.per_task_cap, 6);
        assert_eq!(config.terms.len(), 8);
        assert_eq!(config.locality, "São Bernardo do Campo");
        assert_eq!(config.pacing.task_delay_secs, [4, 7]);
        assert_eq!(config.profiles().unwrap().len(), config.sources.len());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_toml_str(
            r#"
            terms = ["Analista de PCP"]
            locality = "Diadema"
            sources = ["indeed", "google"]
            per_task_cap = 3

            [pacing]
            enabled = false

            [timeouts]
            container_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.terms, vec!["Analista de PCP"]);
        assert!(!config.pacing.enabled);
        assert_eq!(config.timeouts.container_ms, 500);
        assert_eq!(config.timeouts.navigation_ms, 30_000);
        let names: Vec<_> = config.profiles().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["indeed", "google"]);
    }

    #[test]
    fn custom_source_is_resolvable() {
        let config = Config::from_toml_str(
            r#"
            sources = ["acme"]

            [[custom_sources]]
            name = "acme"
            url_template = "https://jobs.acme.test/search?q={term}&where={locality}"
            base_url = "https://jobs.acme.test/"
            containers = ["article.job"]

            [custom_sources.title]
            selectors = [{ kind = "text", css = "h2" }, { kind = "line", index = 0 }]

            [custom_sources.link]
            selectors = [{ kind = "attribute", css = "a", name = "href" }]
            "#,
        )
        .unwrap();
        let profiles = config.profiles().unwrap();
        assert_eq!(profiles[0].name, "acme");
        assert_eq!(profiles[0].title.selectors.len(), 2);
        assert!(profiles[0].company.selectors.is_empty());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(Config::from_toml_str("per_task_cap = 0").is_err());
        assert!(Config::from_toml_str("terms = []").is_err());
        assert!(Config::from_toml_str("sources = [\"nowhere\"]").is_err());
        assert!(Config::from_toml_str("[pacing]\ntask_delay_secs = [9, 2]").is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.store_path, PathBuf::from("vagas.db"));
        assert!(config.loaded_from.is_none());
    }

    #[test]
    fn load_records_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job-tracker.toml");
        fs::write(&path, "per_task_cap = 3\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.per_task_cap, 3);
        assert_eq!(config.loaded_from.as_deref(), Some(path.as_path()));
    }
}

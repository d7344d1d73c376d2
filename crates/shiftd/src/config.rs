//! Daemon configuration file (`shiftd.toml`).

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use shift_action::{DryRunAction, HttpAction, HttpActionConfig};
use shift_analysis::{ProbeAnalyzer, ProbeConfig, PrometheusAnalyzer, PrometheusConfig};
use shift_rollout::{Analyzer, RolloutAction, RolloutConfig, RolloutSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub analyzer: AnalyzerConfig,
    pub action: ActionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address for `/metrics`, `/status` and `/stop`.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9500))
}

/// Which analyzer gates the rollout.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AnalyzerConfig {
    Probe(ProbeConfig),
    Prometheus(PrometheusConfig),
}

/// Where scores are pushed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActionConfig {
    Http(HttpActionConfig),
    DryRun,
}

/// Everything needed to construct a rollout controller.
pub struct RolloutParts {
    pub settings: RolloutSettings,
    pub analyzer: Arc<dyn Analyzer>,
    pub action: Arc<dyn RolloutAction>,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate every section and build the collaborators.
    pub fn build(&self) -> anyhow::Result<RolloutParts> {
        let settings = self.rollout.validate().context("invalid [rollout] section")?;

        let analyzer: Arc<dyn Analyzer> = match &self.analyzer {
            AnalyzerConfig::Probe(cfg) => {
                if !cfg.targets.contains_key(settings.new_cluster()) {
                    anyhow::bail!(
                        "invalid [analyzer] section: no probe target for new cluster {:?}",
                        settings.new_cluster()
                    );
                }
                Arc::new(ProbeAnalyzer::from_config(cfg).context("invalid [analyzer] section")?)
            }
            AnalyzerConfig::Prometheus(cfg) => Arc::new(
                PrometheusAnalyzer::from_config(cfg).context("invalid [analyzer] section")?,
            ),
        };

        let action: Arc<dyn RolloutAction> = match &self.action {
            ActionConfig::Http(cfg) => {
                Arc::new(HttpAction::from_config(cfg).context("invalid [action] section")?)
            }
            ActionConfig::DryRun => Arc::new(DryRunAction::new()),
        };

        Ok(RolloutParts {
            settings,
            analyzer,
            action,
        })
    }

    pub fn analyzer_kind(&self) -> &'static str {
        match self.analyzer {
            AnalyzerConfig::Probe(_) => "probe",
            AnalyzerConfig::Prometheus(_) => "prometheus",
        }
    }

    pub fn action_kind(&self) -> &'static str {
        match self.action {
            ActionConfig::Http(_) => "http",
            ActionConfig::DryRun => "dry-run",
        }
    }
}

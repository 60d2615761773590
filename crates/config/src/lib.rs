//! Layered configuration for feedman.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. `config.toml`, `config.yaml` and `config.json` in the user's
//!    configuration directory (`~/.config/feedman` on Linux).
//! 3. An explicit file passed on the command line.
//! 4. `FEEDMAN_*` environment variables, nested with `__`
//!    (`FEEDMAN_GITHUB__TOKEN` sets `github.token`).
//!
//! `GITHUB_TOKEN` is consulted only when no other source sets a token.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use feedman_storage::backend::GithubBackend;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const APP_NAME: &str = "feedman";
const ENV_PREFIX: &str = "FEEDMAN_";
const TOKEN_FALLBACK: &str = "GITHUB_TOKEN";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    /// Branch to read from and commit to; the repository default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            owner: "AlL4music".to_string(),
            repo: "Imusic".to_string(),
            branch: None,
            api_base: feedman_storage::backend::DEFAULT_API_BASE.to_string(),
            token: None,
        }
    }
}

impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub github: GithubConfig,
    /// Collection holding one JSON record per feed.
    pub feeds_path: String,
    /// Directory listed for candidate CSV sources; empty is the repository root.
    pub sources_path: String,
    pub timeout_secs: u64,
    pub sample_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GithubConfig::default(),
            feeds_path: "feeds".to_string(),
            sources_path: String::new(),
            timeout_secs: 30,
            sample_rows: 20,
        }
    }
}

impl Config {
    /// Load from every source, including the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let figment = Self::layered(user_config_dir().as_deref(), explicit)?
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .join(Env::raw().only(&[TOKEN_FALLBACK]).map(|_| "github.token".into()));
        Self::from_figment(&figment)
    }

    /// Defaults plus file sources, without the environment.
    pub fn layered(user_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dir) = user_dir {
            debug!(dir = %dir.display(), "user configuration directory");
            figment = figment
                .merge(Toml::file(dir.join("config.toml")))
                .merge(Yaml::file(dir.join("config.yaml")))
                .merge(Json::file(dir.join("config.json")));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::Invalid(format!("config file `{}` does not exist", path.display())));
            }
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::Invalid(format!("unsupported config format `{}`", path.display()))),
            };
        }
        Ok(figment)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.github.owner.trim().is_empty() || self.github.repo.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("github.owner and github.repo must be set".to_string()));
        }
        if self.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("timeout_secs must be positive".to_string()));
        }
        if self.sample_rows == 0 {
            exn::bail!(ErrorKind::Invalid("sample_rows must be positive".to_string()));
        }
        for (key, path) in [("feeds_path", &self.feeds_path), ("sources_path", &self.sources_path)] {
            feedman_storage::validate_collection(path).or_raise(|| ErrorKind::Invalid(format!("{key} `{path}`")))?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn token(&self) -> Result<&str> {
        self.github.token.as_deref().filter(|token| !token.trim().is_empty()).ok_or_raise(|| ErrorKind::MissingToken)
    }

    /// Client for the configured repository. Built without a token when none
    /// is configured, so anonymous reads of public repositories still work.
    pub fn backend(&self) -> Result<GithubBackend> {
        let github = &self.github;
        let name = format!("github:{}/{}", github.owner, github.repo);
        let backend = GithubBackend::new(name, &github.owner, &github.repo)
            .or_raise(|| ErrorKind::Invalid("github".to_string()))?
            .with_api_base(&github.api_base)
            .or_raise(|| ErrorKind::Invalid(format!("github.api_base `{}`", github.api_base)))?
            .with_branch(github.branch.clone())
            .with_timeout(self.timeout());
        Ok(match self.token() {
            Ok(token) => backend.with_token(token),
            Err(_) => backend,
        })
    }
}

/// Where the user-level configuration files are looked up, if a home
/// directory can be determined.
pub fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

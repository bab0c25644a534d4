use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::departments::Department;

pub const DEFAULT_ENDPOINT: &str = "https://api.langbase.com/beta/chat";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

pub const ENV_MAIN_API_KEY: &str = "LANGBASE_ONLINE_STORE_CUSTOMER_SERVICE_API_KEY";
pub const ENV_SPORTS_API_KEY: &str = "LANGBASE_SPORTS_PIPE_API_KEY";
pub const ENV_ELECTRONICS_API_KEY: &str = "LANGBASE_ELECTRONICS_PIPE_API_KEY";
pub const ENV_TRAVEL_API_KEY: &str = "LANGBASE_TRAVEL_PIPE_API_KEY";
pub const ENV_ENDPOINT: &str = "CS_RELAY_ENDPOINT";
pub const ENV_LOG: &str = "CS_RELAY_LOG";
pub const ENV_CONFIG_PATH: &str = "CS_RELAY_CONFIG";

/// Fully resolved settings. Credentials are opaque bearer tokens.
#[derive(Clone)]
pub struct AppConfig {
    pub endpoint: String,
    pub main_api_key: String,
    pub departments: DepartmentsConfig,
    pub http: HttpConfig,
    pub log_level: String,
}

// Keys stay out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("endpoint", &self.endpoint)
            .field("departments", &self.departments)
            .field("http", &self.http)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct DepartmentConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl std::fmt::Debug for DepartmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepartmentConfig")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DepartmentsConfig {
    pub sports: DepartmentConfig,
    pub electronics: DepartmentConfig,
    pub travel: DepartmentConfig,
}

impl DepartmentsConfig {
    pub fn get(&self, department: Department) -> &DepartmentConfig {
        match department {
            Department::Sports => &self.sports,
            Department::Electronics => &self.electronics,
            Department::Travel => &self.travel,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    // None: a hung upstream stalls the turn
    pub request_timeout_ms: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub endpoint: Option<String>,
    pub main_api_key: Option<String>,
    pub log_level: Option<String>,
    pub http: Option<PartialHttpConfig>,
    pub departments: Option<PartialDepartmentsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialHttpConfig {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialDepartmentsConfig {
    pub sports: Option<PartialDepartmentConfig>,
    pub electronics: Option<PartialDepartmentConfig>,
    pub travel: Option<PartialDepartmentConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialDepartmentConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl AppConfig {
    pub fn from_cli(cli: crate::Cli) -> Result<Self> {
        let file_cfg = match &cli.config {
            Some(path) => load_config_at(path)?,
            None => load_file_config().unwrap_or_default(),
        };
        Ok(Self::resolve(cli.log_level, file_cfg, |key: &str| {
            std::env::var(key).ok()
        }))
    }

    /// Merges sources with precedence CLI > environment > file > default.
    pub fn resolve(
        cli_log_level: Option<String>,
        file_cfg: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let endpoint = env(ENV_ENDPOINT)
            .or(file_cfg.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let main_api_key = env(ENV_MAIN_API_KEY)
            .or(file_cfg.main_api_key)
            .unwrap_or_default();
        let log_level = cli_log_level
            .or_else(|| env(ENV_LOG))
            .or(file_cfg.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let http_defaults = HttpConfig::default();
        let http = match file_cfg.http {
            Some(p) => HttpConfig {
                connect_timeout_ms: p
                    .connect_timeout_ms
                    .unwrap_or(http_defaults.connect_timeout_ms),
                request_timeout_ms: p.request_timeout_ms.or(http_defaults.request_timeout_ms),
            },
            None => http_defaults,
        };

        let file_departments = file_cfg.departments.unwrap_or_default();
        let department = |partial: Option<PartialDepartmentConfig>, key_var: &str| {
            let partial = partial.unwrap_or_default();
            DepartmentConfig {
                endpoint: partial.endpoint.unwrap_or_else(|| endpoint.clone()),
                api_key: env(key_var).or(partial.api_key).unwrap_or_default(),
            }
        };
        let departments = DepartmentsConfig {
            sports: department(file_departments.sports, ENV_SPORTS_API_KEY),
            electronics: department(file_departments.electronics, ENV_ELECTRONICS_API_KEY),
            travel: department(file_departments.travel, ENV_TRAVEL_API_KEY),
        };

        Self {
            endpoint,
            main_api_key,
            departments,
            http,
            log_level,
        }
    }

    /// Which credentials are set, by environment variable name.
    pub fn credential_report(&self) -> Vec<(&'static str, bool)> {
        vec![
            (ENV_MAIN_API_KEY, !self.main_api_key.is_empty()),
            (ENV_SPORTS_API_KEY, !self.departments.sports.api_key.is_empty()),
            (
                ENV_ELECTRONICS_API_KEY,
                !self.departments.electronics.api_key.is_empty(),
            ),
            (ENV_TRAVEL_API_KEY, !self.departments.travel.api_key.is_empty()),
        ]
    }

    pub fn log_credentials(&self) {
        for (name, set) in self.credential_report() {
            if set {
                info!(credential = name, "credential set");
            } else {
                warn!(credential = name, "credential not set");
            }
        }
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        v.push(PathBuf::from(p));
    }
    if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
        v.push(Path::new(&xdg_home).join("cs-relay/config.toml"));
    } else if let Ok(home) = std::env::var("HOME") {
        v.push(Path::new(&home).join(".config/cs-relay/config.toml"));
    }
    v
}

pub fn load_file_config() -> Result<FileConfig> {
    for p in candidate_paths() {
        if p.exists() {
            let s = fs::read_to_string(&p)
                .with_context(|| format!("read config file: {}", p.display()))?;
            match toml::from_str::<FileConfig>(&s) {
                Ok(cfg) => {
                    info!(path=%p.display(), "loaded config file");
                    return Ok(cfg);
                }
                Err(e) => {
                    warn!(path=%p.display(), error=%e.to_string(), "parse config failed");
                    continue;
                }
            }
        }
    }
    Ok(FileConfig::default())
}

/// Load a config file named explicitly; unlike discovery, failures are errors.
pub fn load_config_at(path: &Path) -> Result<FileConfig> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg = toml::from_str::<FileConfig>(&s)
        .with_context(|| format!("parse config file: {}", path.display()))?;
    info!(path=%path.display(), "loaded config file");
    Ok(cfg)
}

// Gallery server configuration.
//
// Centralizes environment variable parsing with defaults for running the
// gallery locally. There is no configuration file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gallery_common::types::Environment;

use crate::git::autosave::DEFAULT_MIN_COMMIT_INTERVAL;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_AUTOSAVE_INTERVAL_MINUTES: u64 = 2;

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Directory uploaded images are written to.
    pub uploads_dir: PathBuf,
    /// Directory holding the gallery front end (`index.html` and assets).
    pub static_dir: PathBuf,
    /// Comma-separated CORS origins (`None` allows any origin).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `gallery_server=debug`).
    pub log_filter: String,
    pub environment: Environment,
    pub autosave: AutoSaveConfig,
}

/// Settings for committing the uploads directory to git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSaveConfig {
    /// False in production or when explicitly switched off.
    pub enabled: bool,
    /// Working tree root of the repository holding the uploads.
    pub repo_dir: PathBuf,
    pub remote: String,
    pub branch: String,
    /// Period of the recurring trigger.
    pub interval_minutes: u64,
    /// Minimum time between completed attempts.
    pub min_commit_interval: Duration,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `GALLERY_HOST` | `0.0.0.0` |
    /// | `PORT` | `3000` |
    /// | `GALLERY_UPLOADS_DIR` | `uploads` |
    /// | `GALLERY_STATIC_DIR` | `public` |
    /// | `GALLERY_REPO_DIR` | `.` |
    /// | `GALLERY_GIT_REMOTE` | `origin` |
    /// | `GALLERY_GIT_BRANCH` | `main` |
    /// | `GALLERY_AUTOSAVE` | enabled outside production |
    /// | `GALLERY_AUTOSAVE_INTERVAL_MINUTES` | `2` |
    /// | `GALLERY_MIN_COMMIT_INTERVAL_SECS` | `120` |
    /// | `GALLERY_CORS_ORIGINS` | unset (any origin) |
    /// | `GALLERY_LOG_FILTER` | `info` |
    ///
    /// Production is detected from `RENDER`, `RAILWAY_ENVIRONMENT` or
    /// `NODE_ENV=production`, matching common hosting platforms.
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("GALLERY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_PORT);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let uploads_dir =
            PathBuf::from(env("GALLERY_UPLOADS_DIR").unwrap_or_else(|_| "uploads".into()));
        let static_dir =
            PathBuf::from(env("GALLERY_STATIC_DIR").unwrap_or_else(|_| "public".into()));
        let cors_origins = env("GALLERY_CORS_ORIGINS").ok().filter(|v| !v.trim().is_empty());
        let log_filter = env("GALLERY_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let production = env("RENDER").is_ok()
            || env("RAILWAY_ENVIRONMENT").is_ok()
            || env("NODE_ENV").is_ok_and(|v| v == "production");
        let environment =
            if production { Environment::Production } else { Environment::Development };

        let switched_off = env("GALLERY_AUTOSAVE")
            .is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off"));

        let interval_minutes = env("GALLERY_AUTOSAVE_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_AUTOSAVE_INTERVAL_MINUTES);
        let min_commit_interval = env("GALLERY_MIN_COMMIT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MIN_COMMIT_INTERVAL);

        let autosave = AutoSaveConfig {
            enabled: !production && !switched_off,
            repo_dir: PathBuf::from(env("GALLERY_REPO_DIR").unwrap_or_else(|_| ".".into())),
            remote: env("GALLERY_GIT_REMOTE").unwrap_or_else(|_| "origin".into()),
            branch: env("GALLERY_GIT_BRANCH").unwrap_or_else(|_| "main".into()),
            interval_minutes,
            min_commit_interval,
        };

        Self { listen_addr, uploads_dir, static_dir, cors_origins, log_filter, environment, autosave }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = ServerConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(cfg.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.static_dir, PathBuf::from("public"));
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(
            cfg.autosave,
            AutoSaveConfig {
                enabled: true,
                repo_dir: PathBuf::from("."),
                remote: "origin".into(),
                branch: "main".into(),
                interval_minutes: 2,
                min_commit_interval: Duration::from_secs(120),
            }
        );
    }

    #[test]
    fn port_and_host_overrides() {
        let mut m = HashMap::new();
        m.insert("GALLERY_HOST", "127.0.0.1");
        m.insert("PORT", "8081");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8081");
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let mut m = HashMap::new();
        m.insert("PORT", "not-a-port");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 3000);
    }

    #[test]
    fn hosting_platforms_disable_autosave() {
        for (key, value) in [("RENDER", "true"), ("RAILWAY_ENVIRONMENT", "prod"), ("NODE_ENV", "production")] {
            let mut m = HashMap::new();
            m.insert(key, value);
            let cfg = ServerConfig::from_env_fn(env_from_map(m));
            assert!(cfg.is_production(), "{key} should mark production");
            assert!(!cfg.autosave.enabled, "{key} should disable auto-save");
        }
    }

    #[test]
    fn node_env_development_is_not_production() {
        let mut m = HashMap::new();
        m.insert("NODE_ENV", "development");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert!(!cfg.is_production());
        assert!(cfg.autosave.enabled);
    }

    #[test]
    fn autosave_can_be_switched_off_explicitly() {
        let mut m = HashMap::new();
        m.insert("GALLERY_AUTOSAVE", "Off");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert!(!cfg.is_production());
        assert!(!cfg.autosave.enabled);
    }

    #[test]
    fn autosave_tuning_overrides() {
        let mut m = HashMap::new();
        m.insert("GALLERY_REPO_DIR", "/srv/gallery");
        m.insert("GALLERY_GIT_REMOTE", "backup");
        m.insert("GALLERY_GIT_BRANCH", "photos");
        m.insert("GALLERY_AUTOSAVE_INTERVAL_MINUTES", "5");
        m.insert("GALLERY_MIN_COMMIT_INTERVAL_SECS", "30");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.autosave.repo_dir, PathBuf::from("/srv/gallery"));
        assert_eq!(cfg.autosave.remote, "backup");
        assert_eq!(cfg.autosave.branch, "photos");
        assert_eq!(cfg.autosave.interval_minutes, 5);
        assert_eq!(cfg.autosave.min_commit_interval, Duration::from_secs(30));
    }

    #[test]
    fn zero_interval_minutes_uses_default() {
        let mut m = HashMap::new();
        m.insert("GALLERY_AUTOSAVE_INTERVAL_MINUTES", "0");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.autosave.interval_minutes, 2);
    }

    #[test]
    fn blank_cors_origins_are_ignored() {
        let mut m = HashMap::new();
        m.insert("GALLERY_CORS_ORIGINS", "  ");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert!(cfg.cors_origins.is_none());
    }
}

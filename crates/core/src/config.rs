use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Process-level configuration read from the environment.
///
/// Engine behaviour lives in [`Settings`](crate::Settings), loaded from the
/// TOML file named by `CONFORM_SETTINGS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub publish: PublishConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CONFORM_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CONFORM_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p),
            publish: PublishConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{} cors={}", self.server.host, self.server.port, self.server.cors_origin);
        tracing::info!("  engine:   settings={}", self.engine.settings_path.display());
        tracing::info!(
            "  publish:  mode={} path={}",
            self.publish.mode,
            self.publish.path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none)".to_string())
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the TOML engine settings file.
    pub settings_path: PathBuf,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            settings_path: PathBuf::from(profiled_env_or(p, "CONFORM_SETTINGS", "config/conform.toml")),
        }
    }
}

// ── Publishing ────────────────────────────────────────────────

/// Where validation results are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// "log" or "file"
    pub mode: String,
    /// JSON-lines output file (`mode = "file"`).
    pub path: Option<PathBuf>,
}

impl PublishConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            mode: profiled_env_or(p, "PUBLISH_MODE", "log").to_lowercase(),
            path: profiled_env_opt(p, "PUBLISH_PATH").map(PathBuf::from),
        }
    }

    pub fn is_file(&self) -> bool {
        self.mode == "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_prefixed_keys_win() {
        // Keys unique to this test so parallel tests don't interfere.
        env::set_var("CFGTEST_PUBLISH_MODE", "FILE");
        env::set_var("CFGTEST_PUBLISH_PATH", "/tmp/out.jsonl");
        let config = Config::for_profile("cfgtest");
        assert_eq!(config.profile_label(), "CFGTEST");
        assert!(config.publish.is_file());
        assert_eq!(config.publish.path, Some(PathBuf::from("/tmp/out.jsonl")));
        env::remove_var("CFGTEST_PUBLISH_MODE");
        env::remove_var("CFGTEST_PUBLISH_PATH");
    }

    #[test]
    fn default_profile_label() {
        let config = Config::for_profile("");
        assert_eq!(config.profile_label(), "default");
    }
}

//! Runtime configuration, loaded from environment variables.
//!
//! Every knob the pipeline exposes is an environment key (a `.env` file is
//! honored via `dotenvy`). There is no config file; the vault itself carries
//! all durable state.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::zone::WorkZone;

/// Runtime configuration for steward.
#[derive(Debug, Clone)]
pub struct Config {
    pub vault_path: PathBuf,
    /// Seconds between scheduler cycles in daemon mode.
    pub check_interval: u64,
    /// Search expression handed to the mail provider.
    pub mail_filter: String,
    /// Assistant CLI binary (default `claude`).
    pub assistant_cmd: String,
    /// Model identifier passed to the assistant CLI.
    pub assistant_model: String,
    pub log_level: String,
    pub daily_send_limit: u32,
    pub file_watch_enabled: bool,
    pub file_watch_dry_run: bool,
    /// Auto-approve confidence threshold in [0,1]; 1.0 disables.
    pub auto_approve_threshold: f64,
    pub vip_senders: Vec<String>,
    pub web_enabled: bool,
    pub web_port: u16,
    pub work_zone: WorkZone,
    /// Run the git transport at the end of each cycle.
    pub sync_enabled: bool,
    /// Identity used for In_Progress/<agent> claims.
    pub agent_name: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from the environment (and `.env` if present).
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Build a Config from the current process environment without touching
    /// `.env`. Used by tests to stay hermetic.
    pub fn from_env() -> Result<Self> {
        let vault_path = PathBuf::from(env_or("VAULT_PATH", "./vault"));

        let check_interval = env_or("GMAIL_CHECK_INTERVAL", "60")
            .parse::<u64>()
            .context("GMAIL_CHECK_INTERVAL must be an integer number of seconds")?;

        let daily_send_limit = env_or("DAILY_SEND_LIMIT", "20")
            .parse::<u32>()
            .context("DAILY_SEND_LIMIT must be a non-negative integer")?;

        let auto_approve_threshold = env_or("AUTO_APPROVE_THRESHOLD", "1.0")
            .parse::<f64>()
            .context("AUTO_APPROVE_THRESHOLD must be a float in [0.0, 1.0]")?;
        if !(0.0..=1.0).contains(&auto_approve_threshold) {
            anyhow::bail!(
                "AUTO_APPROVE_THRESHOLD must be within [0.0, 1.0], got {auto_approve_threshold}"
            );
        }

        let web_port = env_or("WEB_PORT", "8000")
            .parse::<u16>()
            .context("WEB_PORT must be a port number")?;

        let work_zone: WorkZone = env_or("WORK_ZONE", "local")
            .parse()
            .context("WORK_ZONE must be 'cloud' or 'local'")?;

        let vip_senders: Vec<String> = env_or("VIP_SENDERS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            vault_path,
            check_interval,
            mail_filter: env_or("GMAIL_FILTER", "is:unread"),
            assistant_cmd: env_or("ASSISTANT_CMD", "claude"),
            assistant_model: env_or("ASSISTANT_MODEL", "claude-sonnet-4-5-20250929"),
            log_level: env_or("LOG_LEVEL", "info"),
            daily_send_limit,
            file_watch_enabled: env_bool("FILE_WATCH_ENABLED", false),
            file_watch_dry_run: env_bool("FILE_WATCH_DRY_RUN", false),
            auto_approve_threshold,
            vip_senders,
            web_enabled: env_bool("WEB_ENABLED", true),
            web_port,
            work_zone,
            sync_enabled: env_bool("VAULT_SYNC_ENABLED", false),
            agent_name: env_or("AGENT_NAME", "steward"),
        })
    }

    /// Whether the auto-approve policy is active at all.
    pub fn auto_approve_enabled(&self) -> bool {
        self.auto_approve_threshold < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-mutating tests must not interleave.
    use crate::util::TEST_ENV_MUTEX as ENV_MUTEX;

    fn clear_keys() {
        for key in [
            "VAULT_PATH",
            "GMAIL_CHECK_INTERVAL",
            "GMAIL_FILTER",
            "ASSISTANT_CMD",
            "ASSISTANT_MODEL",
            "LOG_LEVEL",
            "DAILY_SEND_LIMIT",
            "FILE_WATCH_ENABLED",
            "FILE_WATCH_DRY_RUN",
            "AUTO_APPROVE_THRESHOLD",
            "VIP_SENDERS",
            "WEB_ENABLED",
            "WEB_PORT",
            "WORK_ZONE",
            "VAULT_SYNC_ENABLED",
            "AGENT_NAME",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_keys();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.vault_path, PathBuf::from("./vault"));
        assert_eq!(cfg.check_interval, 60);
        assert_eq!(cfg.mail_filter, "is:unread");
        assert_eq!(cfg.daily_send_limit, 20);
        assert_eq!(cfg.auto_approve_threshold, 1.0);
        assert!(!cfg.auto_approve_enabled());
        assert!(cfg.vip_senders.is_empty());
        assert!(cfg.web_enabled);
        assert_eq!(cfg.web_port, 8000);
        assert_eq!(cfg.work_zone, WorkZone::Local);
        assert!(!cfg.file_watch_enabled);
        assert!(!cfg.sync_enabled);
    }

    #[test]
    fn test_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_keys();
        unsafe {
            std::env::set_var("AUTO_APPROVE_THRESHOLD", "0.8");
            std::env::set_var("WORK_ZONE", "cloud");
            std::env::set_var("VIP_SENDERS", "boss@corp.com, ceo@corp.com");
            std::env::set_var("FILE_WATCH_ENABLED", "true");
            std::env::set_var("DAILY_SEND_LIMIT", "5");
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.auto_approve_threshold, 0.8);
        assert!(cfg.auto_approve_enabled());
        assert_eq!(cfg.work_zone, WorkZone::Cloud);
        assert_eq!(cfg.vip_senders, vec!["boss@corp.com", "ceo@corp.com"]);
        assert!(cfg.file_watch_enabled);
        assert_eq!(cfg.daily_send_limit, 5);
        clear_keys();
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_keys();
        unsafe { std::env::set_var("AUTO_APPROVE_THRESHOLD", "1.5") };
        let result = Config::from_env();
        assert!(result.is_err());
        clear_keys();
    }

    #[test]
    fn test_bad_zone_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_keys();
        unsafe { std::env::set_var("WORK_ZONE", "hybrid") };
        let result = Config::from_env();
        assert!(result.is_err());
        clear_keys();
    }
}

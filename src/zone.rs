//! Zone policy: which capabilities the current process may exercise.
//!
//! A process runs in exactly one zone, seeded from configuration at startup.
//! Cloud ingests events and drafts plans; Local additionally executes side
//! effects, approves/rejects, and owns the dashboard index. Every gate in
//! the pipeline reads this table and nothing else.

use serde::Serialize;

/// The operational role of a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkZone {
    Cloud,
    Local,
}

impl WorkZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkZone::Cloud => "cloud",
            WorkZone::Local => "local",
        }
    }
}

impl std::fmt::Display for WorkZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkZone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloud" => Ok(WorkZone::Cloud),
            "local" => Ok(WorkZone::Local),
            _ => anyhow::bail!("Invalid work zone '{}'. Valid values: cloud, local", s),
        }
    }
}

/// The capability table.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Capabilities {
    pub read_external_events: bool,
    pub draft_plan: bool,
    pub execute_side_effect: bool,
    pub auto_approve: bool,
    pub approve_reject: bool,
    pub write_dashboard: bool,
}

impl Capabilities {
    pub fn for_zone(zone: WorkZone) -> Self {
        match zone {
            WorkZone::Cloud => Self {
                read_external_events: true,
                draft_plan: true,
                execute_side_effect: false,
                auto_approve: false,
                approve_reject: false,
                write_dashboard: false,
            },
            WorkZone::Local => Self {
                read_external_events: true,
                draft_plan: true,
                execute_side_effect: true,
                auto_approve: true,
                approve_reject: true,
                write_dashboard: true,
            },
        }
    }
}

/// Environment keys that only the Local zone should hold.
pub const LOCAL_ONLY_KEYS: [&str; 11] = [
    "DAILY_SEND_LIMIT",
    "LINKEDIN_ACCESS_TOKEN",
    "FACEBOOK_PAGE_TOKEN",
    "TWITTER_API_KEY",
    "TWITTER_API_SECRET",
    "TWITTER_ACCESS_TOKEN",
    "TWITTER_ACCESS_SECRET",
    "ODOO_URL",
    "ODOO_DB",
    "ODOO_USERNAME",
    "ODOO_PASSWORD",
];

/// Result of the startup credential placement check.
#[derive(Debug, Clone)]
pub struct CredentialReport {
    pub zone: WorkZone,
    pub warnings: Vec<String>,
}

/// Check that the process's credentials match its zone.
///
/// Cloud holding execution-only secrets is an isolation leak (warning, not
/// an error); Local missing mail credentials means sends will fail
/// (warning).
pub fn validate_credentials(zone: WorkZone) -> CredentialReport {
    let mut warnings = Vec::new();

    match zone {
        WorkZone::Cloud => {
            for key in LOCAL_ONLY_KEYS {
                let value = std::env::var(key).unwrap_or_default();
                if !value.trim().is_empty() {
                    warnings.push(format!(
                        "cloud zone has execution credential '{key}' set; \
                         remove it for isolation"
                    ));
                }
            }
        }
        WorkZone::Local => {
            let creds = std::path::Path::new("credentials/client_secret.json");
            if !creds.exists() {
                warnings.push(
                    "mail credentials not found at credentials/client_secret.json; \
                     outbound replies will not work"
                        .to_string(),
                );
            }
        }
    }

    CredentialReport { zone, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::util::TEST_ENV_MUTEX as ENV_MUTEX;

    #[test]
    fn test_zone_from_str() {
        assert_eq!("cloud".parse::<WorkZone>().unwrap(), WorkZone::Cloud);
        assert_eq!("LOCAL".parse::<WorkZone>().unwrap(), WorkZone::Local);
        assert!("hybrid".parse::<WorkZone>().is_err());
    }

    #[test]
    fn test_cloud_capabilities() {
        let caps = Capabilities::for_zone(WorkZone::Cloud);
        assert!(caps.read_external_events);
        assert!(caps.draft_plan);
        assert!(!caps.execute_side_effect);
        assert!(!caps.auto_approve);
        assert!(!caps.approve_reject);
        assert!(!caps.write_dashboard);
    }

    #[test]
    fn test_local_capabilities() {
        let caps = Capabilities::for_zone(WorkZone::Local);
        assert!(caps.execute_side_effect);
        assert!(caps.auto_approve);
        assert!(caps.approve_reject);
        assert!(caps.write_dashboard);
    }

    #[test]
    fn test_cloud_warns_on_execution_credentials() {
        let _guard = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("TWITTER_API_KEY", "secret") };
        let report = validate_credentials(WorkZone::Cloud);
        assert!(report.warnings.iter().any(|w| w.contains("TWITTER_API_KEY")));
        unsafe { std::env::remove_var("TWITTER_API_KEY") };
    }

    #[test]
    fn test_cloud_clean_environment_no_warnings() {
        let _guard = ENV_MUTEX.lock().unwrap();
        for key in LOCAL_ONLY_KEYS {
            unsafe { std::env::remove_var(key) };
        }
        let report = validate_credentials(WorkZone::Cloud);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_local_warns_when_mail_creds_missing() {
        let report = validate_credentials(WorkZone::Local);
        // Test processes never carry real credentials on disk.
        assert!(report.warnings.iter().any(|w| w.contains("client_secret.json")));
    }

    #[test]
    fn test_capabilities_serialize_for_health_endpoint() {
        let caps = Capabilities::for_zone(WorkZone::Cloud);
        let json = serde_json::to_value(caps).unwrap();
        assert_eq!(json["execute_side_effect"], false);
        assert_eq!(json["draft_plan"], true);
    }
}

//! Minimal runtime configuration helpers.

use std::fmt;
use std::time::Duration;
use std::{fs, path::Path};

pub const DEFAULT_REFRESH_SECS: u64 = 60;
pub const DEFAULT_REDISCOVER_AFTER_FAILURES: u32 = 3;

/// Webapp account credentials, kept for re-login on session expiry.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// Root of the vendor webapp API, e.g. `https://host/api`.
    pub base_url: String,
    /// Refresh cadence.
    pub refresh_interval: Duration,
    /// Consecutive failed refreshes after which the session logs in and rediscovers.
    pub rediscover_after_failures: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let username = required("FEBOS_USERNAME")?;
        let password = read_password()?;
        let base_url = required("FEBOS_BASE_URL")?;

        let refresh_secs = match std::env::var("FEBOS_REFRESH_INTERVAL_SECS") {
            Ok(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| "FEBOS_REFRESH_INTERVAL_SECS must be a positive integer".to_string())?,
            _ => DEFAULT_REFRESH_SECS,
        };

        let rediscover_after_failures = match std::env::var("FEBOS_REDISCOVER_AFTER_FAILURES") {
            Ok(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<u32>()
                .map_err(|_| "FEBOS_REDISCOVER_AFTER_FAILURES must be a non-negative integer".to_string())?,
            _ => DEFAULT_REDISCOVER_AFTER_FAILURES,
        };

        Ok(Config {
            credentials: Credentials { username, password },
            base_url,
            refresh_interval: Duration::from_secs(refresh_secs),
            rediscover_after_failures,
        })
    }
}

fn required(name: &str) -> Result<String, String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(format!("Missing {}", name)),
    }
}

// Prefer env var, then an explicit password file, then password.txt in working directory
fn read_password() -> Result<String, String> {
    if let Ok(v) = std::env::var("FEBOS_PASSWORD") {
        if !v.is_empty() {
            return Ok(v);
        }
    }
    let (path, explicit) = match std::env::var("FEBOS_PASSWORD_FILE") {
        Ok(p) if !p.trim().is_empty() => (p.trim().to_string(), true),
        _ => ("password.txt".to_string(), false),
    };
    match fs::read_to_string(Path::new(&path)) {
        Ok(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Ok(_) => Err(format!("Password file {} is empty", path)),
        Err(e) if explicit => Err(format!("Cannot read FEBOS_PASSWORD_FILE {}: {}", path, e)),
        Err(_) => Err(
            "Missing password: set FEBOS_PASSWORD, FEBOS_PASSWORD_FILE or provide password.txt in working directory"
                .to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let c = Credentials {
            username: "user@example.com".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{:?}", c);
        assert!(printed.contains("user@example.com"));
        assert!(!printed.contains("hunter2"));
    }
}

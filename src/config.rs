//! Harness configuration
//!
//! Loaded from environment variables; invalid values log a warning and keep
//! the default rather than aborting. The trust case table is fixed at
//! startup: well-known hosts with valid chains expected to pass, the badssl
//! negative targets expected to be rejected.

use std::env;

use tracing::warn;

use crate::digest::Credentials;
use crate::trust::TrustCase;

/// Default per-call timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Digest handshake target, present only when fully configured
#[derive(Debug, Clone)]
pub struct DigestTarget {
    /// Protected endpoint URL
    pub url: String,
    /// Credentials supplied after the challenge
    pub credentials: Credentials,
}

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Per-call transport timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Digest probe target; the handshake runs only when configured
    pub digest: Option<DigestTarget>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            digest: None,
        }
    }
}

/// Load configuration from environment variables
pub fn load_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();

    if let Ok(timeout_str) = env::var("TRUSTPROBE_TIMEOUT_SECS") {
        match timeout_str.parse::<u64>() {
            Ok(timeout) if (1..=300).contains(&timeout) => {
                config.timeout_secs = timeout;
            }
            Ok(timeout) => {
                warn!(
                    "Invalid timeout '{}', using default {}s",
                    timeout, config.timeout_secs
                );
            }
            Err(e) => {
                warn!(
                    "Failed to parse TRUSTPROBE_TIMEOUT_SECS '{}': {}",
                    timeout_str, e
                );
            }
        }
    }

    let url = env::var("TRUSTPROBE_DIGEST_URL").ok();
    let username = env::var("TRUSTPROBE_DIGEST_USERNAME").ok();
    let password = env::var("TRUSTPROBE_DIGEST_PASSWORD").ok();
    match (url, username, password) {
        (Some(url), Some(username), Some(password)) => {
            config.digest = Some(DigestTarget {
                url,
                credentials: Credentials::new(username, password),
            });
        }
        (None, None, None) => {}
        _ => {
            warn!(
                "Digest probe needs TRUSTPROBE_DIGEST_URL, TRUSTPROBE_DIGEST_USERNAME \
                 and TRUSTPROBE_DIGEST_PASSWORD; skipping the handshake"
            );
        }
    }

    config
}

/// The fixed trust case table.
///
/// badssl.com publishes stable negative targets for each trust failure
/// mode; the positive targets are hosts with ordinary valid chains.
pub fn default_cases() -> Vec<TrustCase> {
    vec![
        TrustCase::trusted("https://badssl.com/"),
        TrustCase::trusted("https://www.google.com/"),
        TrustCase::untrusted("https://self-signed.badssl.com/"),
        TrustCase::untrusted("https://expired.badssl.com/"),
        TrustCase::untrusted("https://untrusted-root.badssl.com/"),
        TrustCase::untrusted("https://wrong.host.badssl.com/"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_case_table_is_ordered_and_mixed() {
        let cases = default_cases();
        assert!(cases.len() >= 4);
        assert!(cases.iter().any(|c| c.expected_trusted));
        assert!(cases.iter().any(|c| !c.expected_trusted));
        // Expected-trusted cases come first, untrusted cases after
        let first_untrusted = cases.iter().position(|c| !c.expected_trusted).unwrap();
        assert!(cases[first_untrusted..].iter().all(|c| !c.expected_trusted));
    }

    #[test]
    fn config_round_trip_through_env() {
        // Defaults with a clean environment
        env::remove_var("TRUSTPROBE_TIMEOUT_SECS");
        env::remove_var("TRUSTPROBE_DIGEST_URL");
        env::remove_var("TRUSTPROBE_DIGEST_USERNAME");
        env::remove_var("TRUSTPROBE_DIGEST_PASSWORD");

        let config = load_config();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.digest.is_none());

        // Fully configured
        env::set_var("TRUSTPROBE_TIMEOUT_SECS", "5");
        env::set_var("TRUSTPROBE_DIGEST_URL", "https://protected.example/");
        env::set_var("TRUSTPROBE_DIGEST_USERNAME", "probe");
        env::set_var("TRUSTPROBE_DIGEST_PASSWORD", "secret");

        let config = load_config();
        assert_eq!(config.timeout_secs, 5);
        let digest = config.digest.expect("digest target should be configured");
        assert_eq!(digest.url, "https://protected.example/");
        assert_eq!(digest.credentials.username, "probe");

        // Out-of-range timeout falls back to the default
        env::set_var("TRUSTPROBE_TIMEOUT_SECS", "0");
        let config = load_config();
        assert_eq!(config.timeout_secs, 30);

        env::remove_var("TRUSTPROBE_TIMEOUT_SECS");
        env::remove_var("TRUSTPROBE_DIGEST_URL");
        env::remove_var("TRUSTPROBE_DIGEST_USERNAME");
        env::remove_var("TRUSTPROBE_DIGEST_PASSWORD");
    }
}

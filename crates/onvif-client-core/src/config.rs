use std::time::Duration;

use onvif_soap::SoapVersion;

use crate::endpoint::DEFAULT_DEVICE_SERVICE_PATH;
use crate::http::TransportErrorKind;

/// Retries for idempotent calls that failed before the device could answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct RetryPolicy {
    #[builder(default = 1)]
    pub max_retries: u32,
    #[builder(default = Duration::from_millis(250))]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// `attempt` counts from 0 for the first send. Operations that change device state are
    /// never resent.
    pub fn should_retry(&self, idempotent: bool, kind: &TransportErrorKind, attempt: u32) -> bool {
        idempotent
            && attempt < self.max_retries
            && matches!(
                kind,
                TransportErrorKind::Timeout
                    | TransportErrorKind::ConnectionFailed
                    | TransportErrorKind::ConnectionReset
            )
    }

    /// Delay before retry number `attempt + 1`, doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct SessionConfig {
    /// Default per-call timeout; `CallOptions` may override it.
    #[builder(default = Duration::from_secs(10))]
    pub timeout: Duration,
    #[builder(default)]
    pub retry: RetryPolicy,
    #[builder(default)]
    pub soap_version: SoapVersion,
    /// Replace the host of every advertised XAddr with the host the session was created
    /// with, for devices behind NAT that report internal addresses.
    #[builder(default = false)]
    pub rewrite_xaddr_host: bool,
    /// Path of the device service when the base URL has none.
    #[builder(default = DEFAULT_DEVICE_SERVICE_PATH.to_owned(), setter(into))]
    pub device_service_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_only_idempotent_transient_failures() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(true, &TransportErrorKind::Timeout, 0));
        assert!(policy.should_retry(true, &TransportErrorKind::ConnectionReset, 0));
        assert!(!policy.should_retry(true, &TransportErrorKind::Timeout, 1));
        assert!(!policy.should_retry(false, &TransportErrorKind::Timeout, 0));
        assert!(!policy.should_retry(true, &TransportErrorKind::Tls, 0));
        assert!(!policy.should_retry(true, &TransportErrorKind::HttpStatus(503), 0));
        assert!(!RetryPolicy::none().should_retry(true, &TransportErrorKind::Timeout, 0));
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::builder().max_retries(3).backoff(Duration::from_millis(100)).build();
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.backoff, Duration::from_millis(250));
        assert_eq!(config.soap_version, SoapVersion::Soap12);
        assert_eq!(config.device_service_path, "/onvif/device_service");
        assert!(!config.rewrite_xaddr_host);
    }
}

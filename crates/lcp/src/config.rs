//! Service configuration.

use std::env;
use std::time::Duration;

use lcp_protocol::{
    DeviceInfo, LsdClient, ReqwestTransport, RetryPolicy, TransportConfig, TransportError,
    STATUS_TIMEOUT,
};

/// Environment variable overriding the device identifier.
pub const ENV_DEVICE_ID: &str = "LCP_DEVICE_ID";
/// Environment variable overriding the device name.
pub const ENV_DEVICE_NAME: &str = "LCP_DEVICE_NAME";
/// Environment variable overriding the status fetch timeout, in seconds.
pub const ENV_STATUS_TIMEOUT_SECS: &str = "LCP_STATUS_TIMEOUT_SECS";

/// Configuration for the LCP service.
#[derive(Debug, Clone)]
pub struct LcpConfig {
    /// Identity sent to the status server.
    pub device: DeviceInfo,
    /// Budget for fetching a status document, retries included. Past it the
    /// service falls back to the cached license state.
    pub status_timeout: Duration,
    pub retry: RetryPolicy,
    pub transport: TransportConfig,
    /// How many times the user is asked for a passphrase before giving up.
    pub max_passphrase_prompts: u32,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            device: DeviceInfo::default(),
            status_timeout: STATUS_TIMEOUT,
            retry: RetryPolicy::default(),
            transport: TransportConfig::default(),
            max_passphrase_prompts: 3,
        }
    }
}

impl LcpConfig {
    /// Defaults overridden by `LCP_DEVICE_ID`, `LCP_DEVICE_NAME` and
    /// `LCP_STATUS_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`LcpConfig::from_env`], reading variables through `lookup`.
    ///
    /// Invalid values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(id) = lookup(ENV_DEVICE_ID).filter(|v| !v.trim().is_empty()) {
            config.device.id = id;
        }
        if let Some(name) = lookup(ENV_DEVICE_NAME).filter(|v| !v.trim().is_empty()) {
            config.device.name = name;
        }
        if let Some(secs) = lookup(ENV_STATUS_TIMEOUT_SECS) {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.status_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    variable = ENV_STATUS_TIMEOUT_SECS,
                    value = %secs,
                    "ignoring invalid status timeout"
                ),
            }
        }

        config
    }

    /// A reqwest-backed protocol client using this configuration.
    pub fn http_client(&self) -> Result<LsdClient<ReqwestTransport>, TransportError> {
        Ok(LsdClient::with_reqwest(&self.transport)?
            .with_retry_policy(self.retry)
            .with_status_timeout(self.status_timeout))
    }
}

//! Identity of the device talking to the status server.

use std::env;

/// Device identifier and display name sent with register, renew and return
/// requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// A device with a fresh random identifier.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), name)
    }

    /// Template parameters for protocol links.
    pub fn as_query_params(&self) -> [(&'static str, &str); 2] {
        [("id", self.id.as_str()), ("name", self.name.as_str())]
    }
}

impl Default for DeviceInfo {
    /// A generated device named after the host.
    fn default() -> Self {
        let name = env::var("HOSTNAME")
            .or_else(|_| env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "lcp-device".to_string());
        Self::generate(name)
    }
}

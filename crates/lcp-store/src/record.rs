//! Persisted license state.

use chrono::{DateTime, Utc};

use lcp_core::{LicenseDocument, RightsCounters, Status};
use lcp_crypto::PassphraseHash;

/// Local state kept for one license.
///
/// Documents themselves are not stored here: the record holds what must
/// survive between sessions, such as consumed rights and the last known
/// status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub license_id: String,
    pub provider: String,
    pub issued: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Remaining copy allowance. `None` means unlimited.
    pub copies_left: Option<u32>,
    /// Remaining print allowance. `None` means unlimited.
    pub prints_left: Option<u32>,
    pub rights_end: Option<DateTime<Utc>>,
    /// Last status fetched from the status server.
    pub status: Option<Status>,
    pub status_updated: Option<DateTime<Utc>>,
    /// Whether this device registered the license.
    pub registered: bool,
}

impl LicenseRecord {
    /// Initial record for a license seen for the first time.
    pub fn from_license(license: &LicenseDocument) -> Self {
        let counters = RightsCounters::from_rights(license.rights());
        Self {
            license_id: license.id().to_string(),
            provider: license.provider().to_string(),
            issued: license.issued(),
            updated: license.updated(),
            copies_left: counters.copies_left,
            prints_left: counters.prints_left,
            rights_end: license.rights().end,
            status: None,
            status_updated: None,
            registered: false,
        }
    }

    /// Take the document fields of a newer license, keeping local counters
    /// and status.
    pub fn with_license(mut self, license: &LicenseDocument) -> Self {
        self.provider = license.provider().to_string();
        self.issued = license.issued();
        self.updated = license.updated();
        self.rights_end = license.rights().end;
        self
    }

    pub fn counters(&self) -> RightsCounters {
        RightsCounters {
            copies_left: self.copies_left,
            prints_left: self.prints_left,
        }
    }
}

/// A stored passphrase hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub license_id: String,
    pub user_id: Option<String>,
    pub hash: PassphraseHash,
}

//! License state evaluation.
//!
//! Status changes are never driven locally: the server's Status Document is
//! authoritative, and the only local input is the clock. This module turns
//! the last known status, the rights dates and the current time into an
//! [`EffectiveState`], and decides which [`Action`]s that state permits.
//!
//! Precedence, highest first:
//!
//! 1. A terminal remote status (revoked, returned, cancelled).
//! 2. A rights start date in the future.
//! 3. A rights end date in the past, whatever the remote status says.
//! 4. A remote `expired` status.
//! 5. Otherwise the license is usable.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::StateError;
use crate::license::Rights;
use crate::link::{Relation, StatusRel};
use crate::status::{EventKind, Status, StatusDocument};

/// Something a caller wants to do with a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Copy,
    Print,
    Renew,
    Return,
}

/// The usability of a license at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveState {
    /// The license can be used. Carries the remote status, `Ready` when no
    /// status was ever fetched.
    Usable(Status),
    NotStarted {
        start: DateTime<Utc>,
    },
    Expired {
        end: Option<DateTime<Utc>>,
    },
    Revoked {
        date: Option<DateTime<Utc>>,
        /// Number of devices that registered the license.
        devices: usize,
    },
    Returned {
        date: Option<DateTime<Utc>>,
    },
    Cancelled {
        date: Option<DateTime<Utc>>,
    },
}

impl EffectiveState {
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Usable(_))
    }

    /// The status this state reports, for persistence.
    pub fn status(&self) -> Status {
        match self {
            Self::Usable(status) => *status,
            // A license that has not started is still ready from the
            // server's point of view.
            Self::NotStarted { .. } => Status::Ready,
            Self::Expired { .. } => Status::Expired,
            Self::Revoked { .. } => Status::Revoked,
            Self::Returned { .. } => Status::Returned,
            Self::Cancelled { .. } => Status::Cancelled,
        }
    }
}

impl fmt::Display for EffectiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usable(status) => write!(f, "{status}"),
            Self::NotStarted { start } => write!(f, "not started (starts {start})"),
            Self::Expired { end: Some(end) } => write!(f, "expired (ended {end})"),
            Self::Expired { end: None } => write!(f, "expired"),
            Self::Revoked { devices, .. } => write!(f, "revoked ({devices} devices)"),
            Self::Returned { .. } => write!(f, "returned"),
            Self::Cancelled { .. } => write!(f, "cancelled"),
        }
    }
}

/// Inputs to [`evaluate`].
#[derive(Debug, Clone, Default)]
pub struct StateInput {
    /// Last known remote status, fetched or cached.
    pub status: Option<Status>,
    /// When that status last changed.
    pub status_updated: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Number of `register` events, reported for revoked licenses.
    pub registered_devices: usize,
}

impl StateInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the rights dates from a license.
    pub fn with_rights(mut self, rights: &Rights) -> Self {
        self.start = rights.start;
        self.end = rights.end;
        self
    }

    /// Override the end date, e.g. with a renewed end kept in the repository.
    pub fn with_end(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.end = end;
        self
    }

    /// Take the status from a freshly fetched Status Document.
    pub fn with_status_document(mut self, document: &StatusDocument) -> Self {
        self.status = Some(document.status());
        self.status_updated = Some(document.status_updated());
        self.registered_devices = document.events_of(EventKind::Register).count();
        self
    }

    /// Take the status from the local cache when the server is unreachable.
    pub fn with_cached_status(
        mut self,
        status: Option<Status>,
        updated: Option<DateTime<Utc>>,
    ) -> Self {
        self.status = status;
        self.status_updated = updated;
        self
    }
}

/// Compute the effective state of a license at `now`.
pub fn evaluate(input: &StateInput, now: DateTime<Utc>) -> EffectiveState {
    let date = input.status_updated;

    match input.status {
        Some(Status::Revoked) => {
            return EffectiveState::Revoked {
                date,
                devices: input.registered_devices,
            }
        }
        Some(Status::Returned) => return EffectiveState::Returned { date },
        Some(Status::Cancelled) => return EffectiveState::Cancelled { date },
        _ => {}
    }

    if let Some(start) = input.start {
        if now < start {
            return EffectiveState::NotStarted { start };
        }
    }

    if let Some(end) = input.end {
        if now > end {
            return EffectiveState::Expired { end: Some(end) };
        }
    }

    match input.status {
        Some(Status::Expired) => EffectiveState::Expired { end: input.end },
        Some(status) => EffectiveState::Usable(status),
        None => EffectiveState::Usable(Status::Ready),
    }
}

/// Check whether `action` is allowed.
///
/// Reading, copying and printing need a usable state. Renewing and returning
/// need an open remote status and the matching link in `status`, since they
/// are protocol round-trips.
pub fn check_action(
    action: Action,
    state: &EffectiveState,
    status: Option<&StatusDocument>,
) -> Result<(), StateError> {
    let not_allowed = || StateError::ActionNotAllowedInCurrentStatus {
        action,
        state: *state,
    };

    match action {
        Action::Read | Action::Copy | Action::Print => {
            if state.is_usable() {
                Ok(())
            } else {
                Err(not_allowed())
            }
        }
        Action::Renew | Action::Return => {
            let rel = if action == Action::Renew {
                StatusRel::Renew
            } else {
                StatusRel::Return
            };
            if matches!(
                state,
                EffectiveState::Revoked { .. }
                    | EffectiveState::Returned { .. }
                    | EffectiveState::Cancelled { .. }
            ) {
                return Err(not_allowed());
            }
            let document = status.ok_or(StateError::InteractionNotAvailable(rel.as_str()))?;
            if !document.status().is_open() {
                return Err(not_allowed());
            }
            if !document.has_link(rel) {
                return Err(StateError::InteractionNotAvailable(rel.as_str()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn status_document(status: &str, links: serde_json::Value) -> StatusDocument {
        let doc = json!({
            "id": "s",
            "status": status,
            "message": "m",
            "updated": {"license": "2025-01-01T00:00:00Z", "status": "2025-05-01T00:00:00Z"},
            "links": links,
            "events": [
                {"type": "register", "id": "a", "name": "A"},
                {"type": "register", "id": "b", "name": "B"}
            ]
        });
        StatusDocument::parse(serde_json::to_vec(&doc).unwrap()).unwrap()
    }

    fn renew_links() -> serde_json::Value {
        json!([
            {"rel": "renew", "href": "https://lsd.example.com/renew{?end,id,name}", "templated": true},
            {"rel": "return", "href": "https://lsd.example.com/return{?id,name}", "templated": true}
        ])
    }

    #[test]
    fn test_no_status_within_dates_is_usable() {
        let input = StateInput {
            start: Some(now() - Duration::days(1)),
            end: Some(now() + Duration::days(1)),
            ..Default::default()
        };
        assert_eq!(evaluate(&input, now()), EffectiveState::Usable(Status::Ready));
    }

    #[test]
    fn test_past_end_overrides_cached_active() {
        let end = now() - Duration::seconds(1);
        let input = StateInput::new()
            .with_cached_status(Some(Status::Active), None)
            .with_end(Some(end));
        assert_eq!(
            evaluate(&input, now()),
            EffectiveState::Expired { end: Some(end) }
        );
    }

    #[test]
    fn test_terminal_status_beats_clock() {
        let input = StateInput {
            status: Some(Status::Returned),
            end: Some(now() - Duration::days(3)),
            ..Default::default()
        };
        assert!(matches!(
            evaluate(&input, now()),
            EffectiveState::Returned { .. }
        ));
    }

    #[test]
    fn test_revoked_reports_registered_devices() {
        let document = status_document("revoked", json!([]));
        let input = StateInput::new().with_status_document(&document);
        assert_eq!(
            evaluate(&input, now()),
            EffectiveState::Revoked {
                date: Some(document.status_updated()),
                devices: 2
            }
        );
    }

    #[test]
    fn test_not_started() {
        let start = now() + Duration::hours(2);
        let input = StateInput {
            status: Some(Status::Ready),
            start: Some(start),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&input, now()),
            EffectiveState::NotStarted { start }
        );
    }

    #[test]
    fn test_remote_expired_without_end_date() {
        let input = StateInput {
            status: Some(Status::Expired),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&input, now()),
            EffectiveState::Expired { end: None }
        );
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let input = StateInput {
            status: Some(Status::Active),
            end: Some(now()),
            ..Default::default()
        };
        assert!(evaluate(&input, now()).is_usable());
    }

    #[test]
    fn test_read_requires_usable_state() {
        let expired = EffectiveState::Expired { end: None };
        assert!(matches!(
            check_action(Action::Read, &expired, None),
            Err(StateError::ActionNotAllowedInCurrentStatus { .. })
        ));
        assert!(check_action(Action::Copy, &EffectiveState::Usable(Status::Active), None).is_ok());
    }

    #[test]
    fn test_renew_requires_link_and_open_status() {
        let usable = EffectiveState::Usable(Status::Active);

        let document = status_document("active", renew_links());
        assert!(check_action(Action::Renew, &usable, Some(&document)).is_ok());
        assert!(check_action(Action::Return, &usable, Some(&document)).is_ok());

        let without_links = status_document("active", json!([]));
        assert_eq!(
            check_action(Action::Renew, &usable, Some(&without_links)),
            Err(StateError::InteractionNotAvailable("renew"))
        );

        assert_eq!(
            check_action(Action::Return, &usable, None),
            Err(StateError::InteractionNotAvailable("return"))
        );

        let returned = status_document("returned", renew_links());
        let state = evaluate(&StateInput::new().with_status_document(&returned), now());
        assert!(matches!(
            check_action(Action::Renew, &state, Some(&returned)),
            Err(StateError::ActionNotAllowedInCurrentStatus {
                action: Action::Renew,
                ..
            })
        ));
    }

    #[test]
    fn test_renew_allowed_after_local_expiry_while_remote_is_active() {
        let document = status_document("active", renew_links());
        let state = EffectiveState::Expired {
            end: Some(now() - Duration::days(1)),
        };
        assert!(check_action(Action::Renew, &state, Some(&document)).is_ok());
    }
}

//! Error types for the LCP core.

use thiserror::Error;

use crate::rights::Right;
use crate::state::{Action, EffectiveState};

/// Errors raised while building a License or Status document from bytes.
///
/// A document value only exists once every check below has passed, so each
/// failure mode is its own variant rather than a generic message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("missing link with relation `{0}`")]
    MissingLink(&'static str),

    #[error("invalid URL `{href}` for relation `{rel}`")]
    InvalidUrl { rel: String, href: String },
}

/// Errors raised when an action is not permitted by the license state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("{action:?} is not allowed while the license is {state}")]
    ActionNotAllowedInCurrentStatus {
        action: Action,
        state: EffectiveState,
    },

    #[error("the status document does not offer a `{0}` interaction")]
    InteractionNotAvailable(&'static str),
}

/// Errors raised when consuming a quantitative right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RightsError {
    #[error("{right:?} right exhausted: {left} left, {requested} requested")]
    Exhausted {
        right: Right,
        left: u32,
        requested: u32,
    },
}

/// Result type for document parsing.
pub type Result<T> = std::result::Result<T, ParseError>;

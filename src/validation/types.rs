//! Validation result types (§4.I): an enum-plus-string-conversion shape
//! so a rule's outcome serializes directly onto the RPC surface without
//! a separate wire-format struct per rule.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Outcome of a single rule check. `Warning` only appears in lenient
/// mode, where a rule that would otherwise reject the input instead
/// annotates it — spec §4.I: "may be downgraded from error to warning
/// under a lenient mode".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Ok,
    Warning { message: String, suggested_quantity: Option<i64> },
    Error(ValidationErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorPayload {
    pub message: String,
}

impl From<ValidationError> for ValidationOutcome {
    fn from(e: ValidationError) -> Self {
        ValidationOutcome::Error(ValidationErrorPayload { message: e.to_string() })
    }
}

impl ValidationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationOutcome::Ok)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationOutcome::Error(_))
    }

    /// Collapses a `Vec<ValidationOutcome>` from several rule checks into
    /// one: the first `Error` wins, otherwise all `Warning`s are kept.
    pub fn combine(outcomes: Vec<ValidationOutcome>) -> (Vec<ValidationOutcome>, bool) {
        let has_error = outcomes.iter().any(ValidationOutcome::is_error);
        (outcomes, has_error)
    }
}

/// Method used to determine a transaction's lot-size requirement —
/// bank/insurance have distinct lot sizes per spec §4.I; everything else
/// uses the default of 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotSizeCategory {
    Bank,
    Insurance,
    Default,
}

impl LotSizeCategory {
    pub fn lot_size(&self) -> i64 {
        match self {
            Self::Bank => 10,
            Self::Insurance => 100,
            Self::Default => 10,
        }
    }
}

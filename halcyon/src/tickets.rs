use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::{validate_length, ValidationError};

pub const SUBJECT_MIN_LEN: usize = 3;
pub const SUBJECT_MAX_LEN: usize = 200;
pub const BODY_MAX_LEN: usize = 10_000;

macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| ValidationError::InvalidField {
                        field: $field,
                        message: format!(
                            "must be one of: {}",
                            $name::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    })
            }
        }
    };
}

string_enum!(TicketStatus, "status", {
    Open => "open",
    Answered => "answered",
    CustomerReply => "customer_reply",
    Closed => "closed",
});

string_enum!(TicketPriority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

string_enum!(TicketCategory, "category", {
    Billing => "billing",
    Technical => "technical",
    Sales => "sales",
    Abuse => "abuse",
    Other => "other",
});

impl TicketStatus {
    /// Status a ticket moves to after a reply.
    pub fn after_reply(self, from_staff: bool) -> TicketStatus {
        if from_staff {
            TicketStatus::Answered
        } else {
            TicketStatus::CustomerReply
        }
    }
}

pub fn validate_subject(subject: &str) -> Result<(), ValidationError> {
    validate_length("subject", subject, SUBJECT_MIN_LEN, SUBJECT_MAX_LEN)
}

pub fn validate_body(body: &str) -> Result<(), ValidationError> {
    validate_length("body", body, 1, BODY_MAX_LEN)
}

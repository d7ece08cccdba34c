use crate::actions::ServerAction;

// ─── Limits ──────────────────────────────────────────────

pub const HOSTNAME_MAX_LEN: usize = 63;

/// Top-up bounds: $5 – $500.
pub const TOPUP_MIN_CENTS: i64 = 500;
pub const TOPUP_MAX_CENTS: i64 = 50_000;
pub const TOPUP_PRESETS_CENTS: &[i64] = &[1_000, 2_500, 5_000, 10_000, 25_000];

pub const AUTO_TOPUP_THRESHOLDS_CENTS: &[i64] = &[500, 1_000, 2_500, 5_000];
pub const AUTO_TOPUP_AMOUNTS_CENTS: &[i64] = &[1_000, 2_500, 5_000, 10_000];

pub const REASON_MAX_LEN: usize = 500;

/// Largest single admin wallet adjustment: $10,000.
pub const ADJUSTMENT_MAX_CENTS: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Hostname must not be empty")]
    EmptyHostname,

    #[error("Hostname must be at most {HOSTNAME_MAX_LEN} characters")]
    HostnameTooLong,

    #[error("Hostname '{0}' may only contain lowercase letters, digits and inner hyphens")]
    InvalidHostname(String),

    #[error("Amount must be between {} and {}", crate::money::format_cents(*min), crate::money::format_cents(*max))]
    AmountOutOfRange { min: i64, max: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{field} must be one of: {allowed}")]
    NotAPreset { field: &'static str, allowed: String },

    #[error("A payment method is required to enable auto top-up")]
    MissingPaymentMethod,

    #[error("A reason is required to {0} a server")]
    ReasonRequired(ServerAction),

    #[error("Reason must be at most {REASON_MAX_LEN} characters")]
    ReasonTooLong,

    #[error("A target owner id is required for transfers")]
    MissingOwner,

    #[error("Target owner id must be a positive number")]
    InvalidOwner,

    #[error("Unknown server action: {0}")]
    UnknownAction(String),

    #[error("{field}: {message}")]
    InvalidField { field: &'static str, message: String },
}

/// Hostnames follow `^[a-z0-9]([a-z0-9-]*[a-z0-9])?$`, at most 63 characters.
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    if hostname.is_empty() {
        return Err(ValidationError::EmptyHostname);
    }
    if hostname.len() > HOSTNAME_MAX_LEN {
        return Err(ValidationError::HostnameTooLong);
    }

    let bytes = hostname.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let inner_ok = |b: u8| edge_ok(b) || b == b'-';

    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if !edge_ok(first) || !edge_ok(last) || !bytes.iter().all(|&b| inner_ok(b)) {
        return Err(ValidationError::InvalidHostname(hostname.to_string()));
    }
    Ok(())
}

pub fn validate_topup_amount(amount_cents: i64) -> Result<(), ValidationError> {
    if !(TOPUP_MIN_CENTS..=TOPUP_MAX_CENTS).contains(&amount_cents) {
        return Err(ValidationError::AmountOutOfRange {
            min: TOPUP_MIN_CENTS,
            max: TOPUP_MAX_CENTS,
        });
    }
    Ok(())
}

fn preset_list(values: &[i64]) -> String {
    values
        .iter()
        .map(|v| crate::money::format_cents(*v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Presence checks for the auto top-up form. Threshold and refill amount are
/// fixed preset lists; the payment method is only required when enabling.
pub fn validate_auto_topup(
    enabled: bool,
    threshold_cents: i64,
    amount_cents: i64,
    payment_method_id: Option<&str>,
) -> Result<(), ValidationError> {
    if !AUTO_TOPUP_THRESHOLDS_CENTS.contains(&threshold_cents) {
        return Err(ValidationError::NotAPreset {
            field: "threshold_cents",
            allowed: preset_list(AUTO_TOPUP_THRESHOLDS_CENTS),
        });
    }
    if !AUTO_TOPUP_AMOUNTS_CENTS.contains(&amount_cents) {
        return Err(ValidationError::NotAPreset {
            field: "amount_cents",
            allowed: preset_list(AUTO_TOPUP_AMOUNTS_CENTS),
        });
    }
    let has_method = payment_method_id.is_some_and(|id| !id.trim().is_empty());
    if enabled && !has_method {
        return Err(ValidationError::MissingPaymentMethod);
    }
    Ok(())
}

/// Returns the trimmed reason, or `None` when the action doesn't need one and
/// none was given.
pub fn validate_reason(
    action: ServerAction,
    reason: Option<&str>,
) -> Result<Option<String>, ValidationError> {
    let trimmed = reason.map(str::trim).filter(|r| !r.is_empty());
    match trimmed {
        None if action.requires_reason() => Err(ValidationError::ReasonRequired(action)),
        None => Ok(None),
        Some(r) if r.chars().count() > REASON_MAX_LEN => Err(ValidationError::ReasonTooLong),
        Some(r) => Ok(Some(r.to_string())),
    }
}

pub fn validate_owner_id(new_owner_id: Option<i64>) -> Result<u64, ValidationError> {
    match new_owner_id {
        None => Err(ValidationError::MissingOwner),
        Some(id) if id <= 0 => Err(ValidationError::InvalidOwner),
        Some(id) => Ok(id as u64),
    }
}

/// Admin credit adjustments: non-zero, bounded, and always explained.
pub fn validate_adjustment(amount_cents: i64, reason: &str) -> Result<String, ValidationError> {
    if amount_cents == 0 {
        return Err(ValidationError::InvalidAmount("adjustment must not be zero".into()));
    }
    if amount_cents.unsigned_abs() > ADJUSTMENT_MAX_CENTS.unsigned_abs() {
        return Err(ValidationError::AmountOutOfRange {
            min: -ADJUSTMENT_MAX_CENTS,
            max: ADJUSTMENT_MAX_CENTS,
        });
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "reason",
            message: "a reason is required for wallet adjustments".into(),
        });
    }
    if reason.chars().count() > REASON_MAX_LEN {
        return Err(ValidationError::ReasonTooLong);
    }
    Ok(reason.to_string())
}

pub fn validate_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(ValidationError::InvalidField {
            field,
            message: format!("must be between {min} and {max} characters"),
        });
    }
    Ok(())
}

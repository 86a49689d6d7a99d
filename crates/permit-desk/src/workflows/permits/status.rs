//! Date-derived permit status and the date helpers display code relies on.
//!
//! Every function here is total: missing or unparsable input degrades to
//! `Pending`, `None` or a placeholder string instead of failing.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::domain::{Permit, ProcessingStatus};

pub const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 30;
pub const DATE_PLACEHOLDER: &str = "--/--/----";

const INPUT_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Temporal classification of a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    Pending,
    Valid,
    Expiring,
    Expired,
}

impl PermitStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendente",
            Self::Valid => "Válido",
            Self::Expiring => "Vencendo",
            Self::Expired => "Vencido",
        }
    }
}

/// Warning window applied before an expiration date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    pub expiring_window_days: i64,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            expiring_window_days: DEFAULT_EXPIRING_WINDOW_DAYS,
        }
    }
}

impl From<&crate::config::PermitPolicyConfig> for StatusPolicy {
    fn from(config: &crate::config::PermitPolicyConfig) -> Self {
        Self {
            expiring_window_days: config.expiring_window_days.max(0),
        }
    }
}

impl StatusPolicy {
    pub fn classify(&self, expiration_date: Option<NaiveDate>, today: NaiveDate) -> PermitStatus {
        match days_until_expiration(expiration_date, today) {
            None => PermitStatus::Pending,
            Some(days) if days < 0 => PermitStatus::Expired,
            Some(days) if days <= self.expiring_window_days => PermitStatus::Expiring,
            Some(_) => PermitStatus::Valid,
        }
    }

    pub fn compute_status(&self, permit: &Permit, today: NaiveDate) -> PermitStatus {
        self.classify(permit.expiration_date, today)
    }
}

/// Status under the default 30-day window.
pub fn compute_status(permit: &Permit, today: NaiveDate) -> PermitStatus {
    StatusPolicy::default().compute_status(permit, today)
}

/// Whole calendar days from `today` to `date`; negative once the date has passed.
pub fn days_until_expiration(date: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    date.map(|date| date.signed_duration_since(today).num_days())
}

/// Parses the value of a date form field.
///
/// Accepts `yyyy-mm-dd` and ISO-8601 timestamps. For timestamps the calendar date is
/// taken as written, so `2024-12-31T00:00:00Z` stays on the 31st whatever the local
/// offset of the machine is.
pub fn parse_date_from_input(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, INPUT_FORMAT) {
        return Some(date);
    }

    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(stamp.date_naive());
    }

    trimmed
        .split_once('T')
        .and_then(|(date, _)| NaiveDate::parse_from_str(date, INPUT_FORMAT).ok())
}

/// Value suitable for a date form field (`yyyy-mm-dd`).
pub fn format_date_for_input(date: NaiveDate) -> String {
    date.format(INPUT_FORMAT).to_string()
}

/// `dd/mm/yyyy`, or the placeholder when there is no date.
pub fn format_date_safe(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format(DISPLAY_FORMAT).to_string(),
        None => DATE_PLACEHOLDER.to_string(),
    }
}

/// Same as [`format_date_safe`] for raw, possibly corrupted text.
pub fn format_raw_date_safe(value: Option<&str>) -> String {
    format_date_safe(value.and_then(parse_date_from_input))
}

/// Human readable remaining time shown next to a permit.
pub fn remaining_time_label(days: Option<i64>) -> String {
    match days {
        None => "Sem vencimento".to_string(),
        Some(0) => "Vence hoje".to_string(),
        Some(1) => "Vence amanhã".to_string(),
        Some(days) if days > 1 => format!("Vence em {days} dias"),
        Some(-1) => "Vencido há 1 dia".to_string(),
        Some(days) => format!("Vencido há {} dias", days.unsigned_abs()),
    }
}

/// Badge rendered in permit listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StatusBadge {
    InRenewal,
    Processing(ProcessingStatus),
    Exempt,
    NoFixedLocation,
    Dated(PermitStatus),
}

impl StatusBadge {
    pub const fn label(self) -> &'static str {
        match self {
            Self::InRenewal => "Em renovação",
            Self::Processing(status) => status.label(),
            Self::Exempt => "Isento",
            Self::NoFixedLocation => "Sem ponto fixo",
            Self::Dated(status) => status.label(),
        }
    }
}

impl StatusPolicy {
    /// Badges in display order.
    ///
    /// Renewal overrides everything, a permit without issue date shows its processing
    /// status, and the waiver flags replace the date-derived badge.
    pub fn display_badges(&self, permit: &Permit, today: NaiveDate) -> Vec<StatusBadge> {
        if permit.processing_status == ProcessingStatus::Renewal {
            return vec![StatusBadge::InRenewal];
        }

        if permit.issue_date.is_none() {
            return vec![StatusBadge::Processing(permit.processing_status)];
        }

        if permit.is_waived() {
            let mut badges = Vec::with_capacity(2);
            if permit.exempt {
                badges.push(StatusBadge::Exempt);
            }
            if permit.no_fixed_location {
                badges.push(StatusBadge::NoFixedLocation);
            }
            return badges;
        }

        vec![StatusBadge::Dated(self.compute_status(permit, today))]
    }
}

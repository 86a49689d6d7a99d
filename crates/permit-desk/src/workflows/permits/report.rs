use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{ClientId, Permit, PermitId, PermitType};
use super::status::{remaining_time_label, PermitStatus, StatusBadge, StatusPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCounts {
    pub opening: usize,
    pub renewing: usize,
    pub waived: usize,
    pub pending: usize,
    pub valid: usize,
    pub expiring: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub permit_id: PermitId,
    pub client_id: ClientId,
    pub permit_type: PermitType,
    pub expiration_date: NaiveDate,
    pub days_until_expiration: i64,
    pub remaining_time: String,
}

/// Expiration dashboard built from the display buckets of every permit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitReport {
    pub generated_on: NaiveDate,
    pub total: usize,
    pub counts: ReportCounts,
    /// Inside the warning window, soonest first.
    pub expiring: Vec<ReportEntry>,
    /// Most overdue first.
    pub expired: Vec<ReportEntry>,
}

impl PermitReport {
    pub fn build(permits: &[Permit], today: NaiveDate, policy: &StatusPolicy) -> Self {
        let mut counts = ReportCounts::default();
        let mut expiring = Vec::new();
        let mut expired = Vec::new();

        for permit in permits {
            let badges = policy.display_badges(permit, today);
            let Some(primary) = badges.first() else {
                continue;
            };

            match primary {
                StatusBadge::InRenewal => counts.renewing += 1,
                StatusBadge::Processing(_) => counts.opening += 1,
                StatusBadge::Exempt | StatusBadge::NoFixedLocation => counts.waived += 1,
                StatusBadge::Dated(status) => match status {
                    PermitStatus::Pending => counts.pending += 1,
                    PermitStatus::Valid => counts.valid += 1,
                    PermitStatus::Expiring => {
                        counts.expiring += 1;
                        expiring.extend(entry(permit, today));
                    }
                    PermitStatus::Expired => {
                        counts.expired += 1;
                        expired.extend(entry(permit, today));
                    }
                },
            }
        }

        expiring.sort_by_key(|entry: &ReportEntry| (entry.days_until_expiration, entry.permit_id.clone()));
        expired.sort_by_key(|entry: &ReportEntry| (entry.days_until_expiration, entry.permit_id.clone()));

        Self {
            generated_on: today,
            total: permits.len(),
            counts,
            expiring,
            expired,
        }
    }
}

fn entry(permit: &Permit, today: NaiveDate) -> Option<ReportEntry> {
    let expiration_date = permit.expiration_date?;
    let days = expiration_date.signed_duration_since(today).num_days();
    Some(ReportEntry {
        permit_id: permit.id.clone(),
        client_id: permit.client_id.clone(),
        permit_type: permit.permit_type,
        expiration_date,
        days_until_expiration: days,
        remaining_time: remaining_time_label(Some(days)),
    })
}

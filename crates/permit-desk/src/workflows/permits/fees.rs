use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fee tracking for one calendar year of a permit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualFee {
    pub year: i32,
    #[serde(default)]
    pub fee_sent: bool,
    #[serde(default, deserialize_with = "super::domain::lenient_optional_date")]
    pub fee_sent_date: Option<NaiveDate>,
    #[serde(default)]
    pub fee_paid: bool,
    #[serde(default, deserialize_with = "super::domain::lenient_optional_date")]
    pub fee_paid_date: Option<NaiveDate>,
}

impl AnnualFee {
    pub fn empty(year: i32) -> Self {
        Self {
            year,
            fee_sent: false,
            fee_sent_date: None,
            fee_paid: false,
            fee_paid_date: None,
        }
    }

    fn apply(&mut self, patch: &FeePatch) {
        if let Some(sent) = patch.fee_sent {
            self.fee_sent = sent;
            if !sent {
                self.fee_sent_date = None;
            }
        }
        if let Some(date) = patch.fee_sent_date {
            self.fee_sent_date = Some(date);
        }
        if let Some(paid) = patch.fee_paid {
            self.fee_paid = paid;
            if !paid {
                self.fee_paid_date = None;
            }
        }
        if let Some(date) = patch.fee_paid_date {
            self.fee_paid_date = Some(date);
        }
    }
}

/// Partial update merged by [`FeeLedger::upsert`]. Unset fields keep their value;
/// switching a flag off also clears its date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePatch {
    #[serde(default)]
    pub fee_sent: Option<bool>,
    #[serde(default)]
    pub fee_sent_date: Option<NaiveDate>,
    #[serde(default)]
    pub fee_paid: Option<bool>,
    #[serde(default)]
    pub fee_paid_date: Option<NaiveDate>,
}

/// Per-year fee records of a permit; never more than one record per year.
///
/// Serialized as a list to match the `taxasPorAno` transport shape. Duplicate years in
/// stored data collapse to the last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AnnualFee>", into = "Vec<AnnualFee>")]
pub struct FeeLedger {
    records: BTreeMap<i32, AnnualFee>,
}

impl FeeLedger {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, year: i32) -> Option<&AnnualFee> {
        self.records.get(&year)
    }

    /// Stored record or a zero-value one; never inserts.
    pub fn get_or_default(&self, year: i32) -> AnnualFee {
        self.records
            .get(&year)
            .cloned()
            .unwrap_or_else(|| AnnualFee::empty(year))
    }

    pub fn upsert(&mut self, year: i32, patch: &FeePatch) -> &AnnualFee {
        let record = self
            .records
            .entry(year)
            .or_insert_with(|| AnnualFee::empty(year));
        record.apply(patch);
        record
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnualFee> {
        self.records.values()
    }
}

impl From<Vec<AnnualFee>> for FeeLedger {
    fn from(records: Vec<AnnualFee>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.year, record))
                .collect(),
        }
    }
}

impl From<FeeLedger> for Vec<AnnualFee> {
    fn from(ledger: FeeLedger) -> Self {
        ledger.records.into_values().collect()
    }
}

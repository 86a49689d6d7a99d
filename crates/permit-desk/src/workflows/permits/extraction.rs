//! PDF extraction contract and the review step in front of it.
//!
//! Extracted fields are only ever a suggestion. A permit is created from them only
//! after the user submits an [`ExtractionConfirmation`] with `confirmed = true`.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use super::domain::{ClientId, PermitType, StagedDocument};
use super::transitions::{FinalizeInput, NewPermit};
use crate::workflows::clients::domain::{normalize_tax_id, Client};

/// Fields reported by the extraction backend. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPermitData {
    #[serde(default, rename = "type")]
    pub permit_type: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub legal_name: Option<String>,
    #[serde(default, deserialize_with = "super::domain::lenient_optional_date")]
    pub issue_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "super::domain::lenient_optional_date")]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub permit_number: Option<String>,
    /// Advisory score in `0..=100`.
    #[serde(default, deserialize_with = "clamped_confidence")]
    pub confidence: u8,
}

fn clamped_confidence<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

/// Extraction backend collaborator.
pub trait PermitExtractor: Send + Sync {
    fn extract(&self, document: &StagedDocument) -> Result<ExtractedPermitData, ExtractionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("only PDF files can be read, got {0}")]
    NotPdf(String),
    #[error("extraction requires explicit confirmation")]
    Unconfirmed,
    #[error("extraction failed: {0}")]
    Failed(String),
    #[error("extraction service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMatch {
    pub client_id: ClientId,
    pub legal_name: String,
}

/// Extracted fields prepared for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDraft {
    pub file_name: String,
    pub extracted: ExtractedPermitData,
    pub permit_type: Option<PermitType>,
    pub client: Option<ClientMatch>,
    pub confidence: u8,
    pub warnings: Vec<String>,
}

impl ExtractionDraft {
    pub fn build(file_name: &str, extracted: ExtractedPermitData, clients: &[Client]) -> Self {
        let mut warnings = Vec::new();

        let permit_type = extracted
            .permit_type
            .as_deref()
            .and_then(PermitType::from_label);
        if permit_type.is_none() {
            warnings.push("permit type not recognised".to_string());
        }

        let client = extracted.tax_id.as_deref().and_then(|tax_id| {
            let wanted = normalize_tax_id(tax_id);
            clients
                .iter()
                .find(|client| client.tax_id.digits() == wanted)
                .map(|client| ClientMatch {
                    client_id: client.id.clone(),
                    legal_name: client.legal_name.clone(),
                })
        });
        if client.is_none() {
            warnings.push("no client matches the extracted tax id".to_string());
        }

        if extracted.expiration_date.is_none() {
            warnings.push("expiration date not found".to_string());
        }

        Self {
            file_name: file_name.to_string(),
            confidence: extracted.confidence,
            extracted,
            permit_type,
            client,
            warnings,
        }
    }
}

/// Values the user reviewed and accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionConfirmation {
    pub client_id: ClientId,
    #[serde(rename = "type")]
    pub permit_type: PermitType,
    #[serde(default)]
    pub request_date: Option<NaiveDate>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default, rename = "isento")]
    pub exempt: bool,
    #[serde(default, rename = "semPontoFixo")]
    pub no_fixed_location: bool,
    #[serde(default)]
    pub permit_number: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

/// Confirmed import split into the create payload and, for permits that are already
/// issued, the finalize payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedImport {
    pub new_permit: NewPermit,
    pub finalize: Option<FinalizeInput>,
    pub document: StagedDocument,
}

impl ExtractionConfirmation {
    pub fn into_import(
        self,
        document: StagedDocument,
        today: NaiveDate,
    ) -> Result<ConfirmedImport, ExtractionError> {
        if !self.confirmed {
            return Err(ExtractionError::Unconfirmed);
        }

        let request_date = self.request_date.or(self.issue_date).unwrap_or(today);
        let mut new_permit = NewPermit::new(self.client_id, self.permit_type, request_date);
        new_permit.exempt = self.exempt;
        new_permit.no_fixed_location = self.no_fixed_location;
        new_permit.expiration_date = self.expiration_date;
        new_permit.note = self
            .permit_number
            .as_deref()
            .map(str::trim)
            .filter(|number| !number.is_empty())
            .map(|number| format!("Importado de {}: alvará nº {number}", document.file_name))
            .or_else(|| Some(format!("Importado de {}", document.file_name)));

        let finalize = self.issue_date.map(|issue_date| FinalizeInput {
            expiration_date: self.expiration_date,
            issue_date: Some(issue_date),
            documents: vec![document.clone()],
            note: None,
        });

        Ok(ConfirmedImport {
            new_permit,
            finalize,
            document,
        })
    }
}

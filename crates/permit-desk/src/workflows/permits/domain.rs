use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::fees::FeeLedger;
use super::history::NoteHistory;
use super::status::parse_date_from_input;

/// Identifier wrapper for permits. Assigned by the service on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermitId(pub String);

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for clients (the firm's customers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permit categories the firm tracks. Wire names are the official Portuguese titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermitType {
    #[serde(rename = "Alvará de Funcionamento")]
    Functioning,
    #[serde(rename = "Alvará Sanitário")]
    Sanitary,
    #[serde(rename = "Alvará de Bombeiros")]
    FireDepartment,
    #[serde(rename = "Laudo Acústico")]
    AcousticReport,
    #[serde(rename = "Licenciamento Ambiental")]
    EnvironmentalLicensing,
    #[serde(rename = "Alvará de Polícia Civil")]
    CivilPolice,
    #[serde(rename = "Dispensa de Alvará Sanitário")]
    SanitaryWaiver,
}

impl PermitType {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Functioning,
            Self::Sanitary,
            Self::FireDepartment,
            Self::AcousticReport,
            Self::EnvironmentalLicensing,
            Self::CivilPolice,
            Self::SanitaryWaiver,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Functioning => "Alvará de Funcionamento",
            Self::Sanitary => "Alvará Sanitário",
            Self::FireDepartment => "Alvará de Bombeiros",
            Self::AcousticReport => "Laudo Acústico",
            Self::EnvironmentalLicensing => "Licenciamento Ambiental",
            Self::CivilPolice => "Alvará de Polícia Civil",
            Self::SanitaryWaiver => "Dispensa de Alvará Sanitário",
        }
    }

    /// Lenient lookup used by document extraction, which reports free text.
    pub fn from_label(value: &str) -> Option<Self> {
        let wanted = value.trim().to_lowercase();
        Self::ordered()
            .into_iter()
            .find(|kind| kind.label().to_lowercase() == wanted)
    }
}

impl fmt::Display for PermitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Process tracking flag. Only meaningful while the permit has no issue date or is renewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessingStatus {
    #[default]
    #[serde(rename = "lançado", alias = "lancado")]
    Started,
    #[serde(rename = "aguardando_cliente")]
    AwaitingClient,
    #[serde(rename = "aguardando_orgao")]
    AwaitingAuthority,
    #[serde(rename = "renovacao")]
    Renewal,
}

impl ProcessingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Started => "Lançado",
            Self::AwaitingClient => "Aguardando cliente",
            Self::AwaitingAuthority => "Aguardando órgão",
            Self::Renewal => "Em renovação",
        }
    }
}

/// Canonical permit record exchanged with the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit {
    pub id: PermitId,
    pub client_id: ClientId,
    #[serde(rename = "type")]
    pub permit_type: PermitType,
    pub request_date: NaiveDate,
    #[serde(default, deserialize_with = "lenient_optional_date")]
    pub issue_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_optional_date")]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    #[serde(default, rename = "isento")]
    pub exempt: bool,
    #[serde(default, rename = "semPontoFixo")]
    pub no_fixed_location: bool,
    #[serde(default)]
    pub notes: NoteHistory,
    #[serde(default, rename = "taxasPorAno")]
    pub fees: FeeLedger,
}

impl Permit {
    /// Either waiver flag lifts the expiration date and document requirements.
    pub fn is_waived(&self) -> bool {
        self.exempt || self.no_fixed_location
    }
}

/// A file the user staged for upload together with a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedDocument {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content: Vec<u8>,
}

impl StagedDocument {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            content,
        }
    }

    /// Declared content type, falling back to a guess from the file extension.
    pub fn mime_type(&self) -> mime::Mime {
        self.content_type
            .as_deref()
            .and_then(|declared| declared.parse::<mime::Mime>().ok())
            .unwrap_or_else(|| mime_guess::from_path(&self.file_name).first_or_octet_stream())
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type().essence_str() == mime::APPLICATION_PDF.essence_str()
    }
}

/// Wall-clock source so transitions never read the system time implicitly.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local wall clock of the office running the service.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Frozen clock for demos and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Stored records may carry hand-typed or corrupted dates; those read as absent.
pub(crate) fn lenient_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        let parsed = parse_date_from_input(&value);
        if parsed.is_none() && !value.trim().is_empty() {
            tracing::debug!(%value, "discarding unparsable permit date");
        }
        parsed
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn permit_type_wire_names_are_portuguese_titles() {
        let encoded = serde_json::to_value(PermitType::FireDepartment).expect("serialize");
        assert_eq!(encoded, json!("Alvará de Bombeiros"));
        assert_eq!(
            PermitType::from_label("  alvará sanitário "),
            Some(PermitType::Sanitary)
        );
        assert_eq!(PermitType::from_label("Habite-se"), None);
    }

    #[test]
    fn processing_status_accepts_unaccented_alias() {
        let status: ProcessingStatus = serde_json::from_value(json!("lancado")).expect("alias");
        assert_eq!(status, ProcessingStatus::Started);
        let encoded = serde_json::to_value(ProcessingStatus::Started).expect("serialize");
        assert_eq!(encoded, json!("lançado"));
    }

    #[test]
    fn permit_deserializes_corrupted_dates_as_absent() {
        let permit: Permit = serde_json::from_value(json!({
            "id": "alv-000001",
            "clientId": "cli-1",
            "type": "Alvará de Funcionamento",
            "requestDate": "2025-01-10",
            "issueDate": "31/31/2025",
            "expirationDate": "2026-03-01T00:00:00.000Z",
            "processingStatus": "aguardando_orgao",
            "isento": false,
            "semPontoFixo": true
        }))
        .expect("permit parses");

        assert_eq!(permit.issue_date, None);
        assert_eq!(
            permit.expiration_date,
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(permit.processing_status, ProcessingStatus::AwaitingAuthority);
        assert!(permit.is_waived());
        assert!(permit.notes.is_empty());
        assert!(permit.fees.is_empty());
    }

    #[test]
    fn staged_document_guesses_content_type_from_extension() {
        let pdf = StagedDocument::new("alvara.PDF", vec![1, 2, 3]);
        assert!(pdf.is_pdf());

        let mut image = StagedDocument::new("foto.jpg", Vec::new());
        assert!(!image.is_pdf());
        image.content_type = Some("application/pdf".to_string());
        assert!(image.is_pdf());
    }
}

//! Client roster import from the CSV export the firm keeps in its spreadsheet.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use super::domain::{ClientId, ClientProfile, TaxId, TaxRegime};

#[derive(Debug)]
pub enum ClientImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for ClientImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientImportError::Io(err) => write!(f, "failed to read client roster: {}", err),
            ClientImportError::Csv(err) => write!(f, "invalid client roster CSV: {}", err),
        }
    }
}

impl std::error::Error for ClientImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientImportError::Io(err) => Some(err),
            ClientImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ClientImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ClientImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Row that did not become a client, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    pub line: usize,
    pub tax_id: Option<String>,
    pub reason: String,
}

/// Profiles accepted by the parser plus the rows it refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterParse {
    pub profiles: Vec<(usize, ClientProfile)>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: Vec<ClientId>,
    pub skipped: Vec<SkippedRow>,
}

pub struct ClientRosterImporter;

impl ClientRosterImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<RosterParse, ClientImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<RosterParse, ClientImportError> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        let cleaned = strip_bom(&raw);

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(cleaned.as_bytes());

        let mut parse = RosterParse::default();
        let mut seen = HashSet::new();

        for (index, record) in csv_reader.deserialize::<RosterRow>().enumerate() {
            let line = index + 2;
            let row = record?;
            let raw_tax_id = row.tax_id.clone();

            match row.into_profile() {
                Ok(profile) => {
                    if seen.insert(profile.tax_id.clone()) {
                        parse.profiles.push((line, profile));
                    } else {
                        parse.skipped.push(SkippedRow {
                            line,
                            tax_id: raw_tax_id,
                            reason: "duplicate tax id in file".to_string(),
                        });
                    }
                }
                Err(reason) => parse.skipped.push(SkippedRow {
                    line,
                    tax_id: raw_tax_id,
                    reason,
                }),
            }
        }

        Ok(parse)
    }
}

fn strip_bom(value: &str) -> String {
    value.replace(['\u{feff}', '\u{200b}'], "")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(rename = "CNPJ", default, deserialize_with = "empty_string_as_none")]
    tax_id: Option<String>,
    #[serde(rename = "Razão Social", default, deserialize_with = "empty_string_as_none")]
    legal_name: Option<String>,
    #[serde(rename = "Nome Fantasia", default, deserialize_with = "empty_string_as_none")]
    trade_name: Option<String>,
    #[serde(rename = "E-mail", default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
    #[serde(rename = "Telefone", default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    #[serde(rename = "Município", default, deserialize_with = "empty_string_as_none")]
    jurisdiction: Option<String>,
    #[serde(
        rename = "Regime Tributário",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    tax_regime: Option<String>,
    #[serde(rename = "CNAE", default, deserialize_with = "empty_string_as_none")]
    activity_code: Option<String>,
    #[serde(rename = "Descrição CNAE", default, deserialize_with = "empty_string_as_none")]
    activity_description: Option<String>,
}

impl RosterRow {
    fn into_profile(self) -> Result<ClientProfile, String> {
        let raw_tax_id = self.tax_id.ok_or_else(|| "missing tax id".to_string())?;
        let tax_id = TaxId::parse(&raw_tax_id).map_err(|err| err.to_string())?;
        let legal_name = self
            .legal_name
            .map(|name| collapse_whitespace(&name))
            .ok_or_else(|| "missing legal name".to_string())?;

        let tax_regime = match self.tax_regime.as_deref() {
            Some(label) => Some(
                TaxRegime::from_label(label)
                    .ok_or_else(|| format!("unknown tax regime: {label}"))?,
            ),
            None => None,
        };

        let mut profile = ClientProfile::new(tax_id, legal_name);
        profile.trade_name = self.trade_name.map(|name| collapse_whitespace(&name));
        profile.email = self.email.map(|email| email.to_lowercase());
        profile.phone = self.phone;
        profile.jurisdiction = self.jurisdiction.map(|city| collapse_whitespace(&city));
        profile.tax_regime = tax_regime;
        profile.primary_activity_code = self.activity_code;
        profile.primary_activity_description = self.activity_description;

        profile.validate().map_err(|err| err.to_string())?;
        Ok(profile)
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

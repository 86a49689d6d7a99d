use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::workflows::permits::domain::ClientId;
use crate::workflows::permits::domain::PermitType;

const CNPJ_FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Brazilian tax identifier: CNPJ for companies, CPF for individuals.
///
/// Stored as bare digits; punctuation is accepted on input and re-added for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxIdKind {
    Cnpj,
    Cpf,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaxIdError {
    #[error("tax id must have 11 (CPF) or 14 (CNPJ) digits, got {0}")]
    Length(usize),
    #[error("tax id check digits do not match")]
    CheckDigits,
}

impl TaxId {
    pub fn parse(value: &str) -> Result<Self, TaxIdError> {
        let digits = normalize_tax_id(value);
        let valid = match digits.len() {
            14 => cnpj_is_valid(&digits),
            11 => cpf_is_valid(&digits),
            other => return Err(TaxIdError::Length(other)),
        };

        if valid {
            Ok(Self(digits))
        } else {
            Err(TaxIdError::CheckDigits)
        }
    }

    pub fn digits(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> TaxIdKind {
        if self.0.len() == 14 {
            TaxIdKind::Cnpj
        } else {
            TaxIdKind::Cpf
        }
    }

    /// `00.000.000/0000-00` or `000.000.000-00`.
    pub fn formatted(&self) -> String {
        let d = &self.0;
        match self.kind() {
            TaxIdKind::Cnpj => format!(
                "{}.{}.{}/{}-{}",
                &d[0..2],
                &d[2..5],
                &d[5..8],
                &d[8..12],
                &d[12..14]
            ),
            TaxIdKind::Cpf => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
        }
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl TryFrom<String> for TaxId {
    type Error = TaxIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaxId> for String {
    fn from(value: TaxId) -> Self {
        value.formatted()
    }
}

/// Digits only; used to compare tax ids written with different punctuation.
pub fn normalize_tax_id(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn digit_values(digits: &str) -> Vec<u32> {
    digits.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_same(values: &[u32]) -> bool {
    values.windows(2).all(|pair| pair[0] == pair[1])
}

fn cnpj_check_digit(values: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    match sum % 11 {
        0 | 1 => 0,
        rest => 11 - rest,
    }
}

fn cnpj_is_valid(digits: &str) -> bool {
    let values = digit_values(digits);
    if values.len() != 14 || all_same(&values) {
        return false;
    }

    cnpj_check_digit(&values[..12], &CNPJ_FIRST_WEIGHTS) == values[12]
        && cnpj_check_digit(&values[..13], &CNPJ_SECOND_WEIGHTS) == values[13]
}

fn cpf_check_digit(values: &[u32]) -> u32 {
    let first_weight = values.len() as u32 + 1;
    let sum: u32 = values
        .iter()
        .enumerate()
        .map(|(index, value)| value * (first_weight - index as u32))
        .sum();
    match (sum * 10) % 11 {
        10 => 0,
        digit => digit,
    }
}

fn cpf_is_valid(digits: &str) -> bool {
    let values = digit_values(digits);
    if values.len() != 11 || all_same(&values) {
        return false;
    }

    cpf_check_digit(&values[..9]) == values[9] && cpf_check_digit(&values[..10]) == values[10]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxRegime {
    #[serde(rename = "Simples Nacional")]
    SimplesNacional,
    #[serde(rename = "Lucro Presumido")]
    LucroPresumido,
    #[serde(rename = "Lucro Real")]
    LucroReal,
    #[serde(rename = "MEI")]
    Mei,
}

impl TaxRegime {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SimplesNacional => "Simples Nacional",
            Self::LucroPresumido => "Lucro Presumido",
            Self::LucroReal => "Lucro Real",
            Self::Mei => "MEI",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        let wanted = value.trim().to_lowercase();
        [
            Self::SimplesNacional,
            Self::LucroPresumido,
            Self::LucroReal,
            Self::Mei,
        ]
        .into_iter()
        .find(|regime| regime.label().to_lowercase() == wanted)
    }
}

/// Client (Cliente) of the firm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub tax_id: TaxId,
    pub legal_name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub tax_regime: Option<TaxRegime>,
    #[serde(default)]
    pub primary_activity_code: Option<String>,
    #[serde(default)]
    pub primary_activity_description: Option<String>,
    #[serde(default)]
    pub municipal_registration: Option<String>,
    #[serde(default)]
    pub state_registration: Option<String>,
    /// Empty means every permit type may be requested.
    #[serde(default)]
    pub allowed_permit_types: Vec<PermitType>,
}

impl Client {
    pub fn from_profile(id: ClientId, profile: ClientProfile) -> Result<Self, ClientValidationError> {
        profile.validate()?;
        Ok(Self {
            id,
            tax_id: profile.tax_id,
            legal_name: profile.legal_name.trim().to_string(),
            trade_name: non_blank(profile.trade_name),
            email: non_blank(profile.email),
            phone: non_blank(profile.phone),
            jurisdiction: non_blank(profile.jurisdiction),
            tax_regime: profile.tax_regime,
            primary_activity_code: non_blank(profile.primary_activity_code),
            primary_activity_description: non_blank(profile.primary_activity_description),
            municipal_registration: non_blank(profile.municipal_registration),
            state_registration: non_blank(profile.state_registration),
            allowed_permit_types: profile.allowed_permit_types,
        })
    }

    pub fn allows(&self, permit_type: PermitType) -> bool {
        self.allowed_permit_types.is_empty() || self.allowed_permit_types.contains(&permit_type)
    }

    pub fn display_name(&self) -> &str {
        self.trade_name.as_deref().unwrap_or(&self.legal_name)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Editable client attributes, used for create and update payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub tax_id: TaxId,
    pub legal_name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub tax_regime: Option<TaxRegime>,
    #[serde(default)]
    pub primary_activity_code: Option<String>,
    #[serde(default)]
    pub primary_activity_description: Option<String>,
    #[serde(default)]
    pub municipal_registration: Option<String>,
    #[serde(default)]
    pub state_registration: Option<String>,
    #[serde(default)]
    pub allowed_permit_types: Vec<PermitType>,
}

impl ClientProfile {
    pub fn new(tax_id: TaxId, legal_name: impl Into<String>) -> Self {
        Self {
            tax_id,
            legal_name: legal_name.into(),
            trade_name: None,
            email: None,
            phone: None,
            jurisdiction: None,
            tax_regime: None,
            primary_activity_code: None,
            primary_activity_description: None,
            municipal_registration: None,
            state_registration: None,
            allowed_permit_types: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.legal_name.trim().is_empty() {
            return Err(ClientValidationError::MissingLegalName);
        }

        if let Some(email) = self.email.as_deref().map(str::trim) {
            if !email.is_empty() && !looks_like_email(email) {
                return Err(ClientValidationError::InvalidEmail(email.to_string()));
            }
        }

        Ok(())
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientValidationError {
    #[error("legal name is required")]
    MissingLegalName,
    #[error("invalid e-mail address: {0}")]
    InvalidEmail(String),
    #[error(transparent)]
    TaxId(#[from] TaxIdError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_valid_cnpj_and_cpf() {
        let cnpj = TaxId::parse("11.222.333/0001-81").expect("valid cnpj");
        assert_eq!(cnpj.kind(), TaxIdKind::Cnpj);
        assert_eq!(cnpj.digits(), "11222333000181");
        assert_eq!(cnpj.to_string(), "11.222.333/0001-81");

        let cpf = TaxId::parse("52998224725").expect("valid cpf");
        assert_eq!(cpf.kind(), TaxIdKind::Cpf);
        assert_eq!(cpf.to_string(), "529.982.247-25");
    }

    #[test]
    fn rejects_bad_check_digits_and_lengths() {
        assert_eq!(
            TaxId::parse("11.222.333/0001-82"),
            Err(TaxIdError::CheckDigits)
        );
        assert_eq!(TaxId::parse("529.982.247-24"), Err(TaxIdError::CheckDigits));
        assert_eq!(TaxId::parse("111.111.111-11"), Err(TaxIdError::CheckDigits));
        assert_eq!(TaxId::parse("1234"), Err(TaxIdError::Length(4)));
    }

    #[test]
    fn profile_validation_and_normalization() {
        let profile: ClientProfile = serde_json::from_value(json!({
            "taxId": "11222333000181",
            "legalName": " Padaria Central LTDA ",
            "tradeName": "  ",
            "email": "contato@padaria.com.br",
            "taxRegime": "Simples Nacional",
            "allowedPermitTypes": ["Alvará Sanitário"]
        }))
        .expect("profile parses");

        let client = Client::from_profile(ClientId("cli-1".into()), profile).expect("valid");
        assert_eq!(client.legal_name, "Padaria Central LTDA");
        assert_eq!(client.trade_name, None);
        assert_eq!(client.display_name(), "Padaria Central LTDA");
        assert!(client.allows(PermitType::Sanitary));
        assert!(!client.allows(PermitType::FireDepartment));

        let mut invalid = ClientProfile::new(client.tax_id.clone(), "X");
        invalid.email = Some("sem-arroba".into());
        assert!(matches!(
            invalid.validate(),
            Err(ClientValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn tax_regime_lookup_is_lenient() {
        assert_eq!(TaxRegime::from_label(" lucro real"), Some(TaxRegime::LucroReal));
        assert_eq!(TaxRegime::from_label("mei"), Some(TaxRegime::Mei));
        assert_eq!(TaxRegime::from_label("outro"), None);
    }
}

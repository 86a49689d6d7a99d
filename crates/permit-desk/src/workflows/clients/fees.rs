use serde::{Deserialize, Serialize};

use super::domain::ClientId;

/// Independent switches tracked on each yearly fee record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeFlag {
    #[serde(rename = "gerada")]
    Generated,
    #[serde(rename = "enviada")]
    Sent,
    #[serde(rename = "paga")]
    Paid,
}

impl FeeFlag {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Generated => "Gerada",
            Self::Sent => "Enviada",
            Self::Paid => "Paga",
        }
    }
}

/// Fee record (TaxaCliente): one per client and year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFeeRecord {
    pub client_id: ClientId,
    pub year: i32,
    #[serde(default, rename = "gerada")]
    pub generated: bool,
    #[serde(default, rename = "enviada")]
    pub sent: bool,
    #[serde(default, rename = "paga")]
    pub paid: bool,
    #[serde(default, rename = "protocolo")]
    pub protocol: String,
}

impl ClientFeeRecord {
    pub fn empty(client_id: ClientId, year: i32) -> Self {
        Self {
            client_id,
            year,
            generated: false,
            sent: false,
            paid: false,
            protocol: String::new(),
        }
    }

    pub fn flag(&self, flag: FeeFlag) -> bool {
        match flag {
            FeeFlag::Generated => self.generated,
            FeeFlag::Sent => self.sent,
            FeeFlag::Paid => self.paid,
        }
    }

    /// Flips one flag and returns its new value; the other flags are untouched.
    pub fn toggle(&mut self, flag: FeeFlag) -> bool {
        let slot = match flag {
            FeeFlag::Generated => &mut self.generated,
            FeeFlag::Sent => &mut self.sent,
            FeeFlag::Paid => &mut self.paid,
        };
        *slot = !*slot;
        *slot
    }
}

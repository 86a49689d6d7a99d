use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::workflows::clients::domain::{ClientId, ClientProfile, TaxId};
use crate::workflows::clients::fees::ClientFeeRecord;
use crate::workflows::clients::repository::{FeeRecordRepository, RepositoryError};
use crate::workflows::clients::service::ClientService;
pub(super) use crate::workflows::permits::tests::common::{read_json_body, MemoryClientRepository};

pub(super) const CNPJ: &str = "11.222.333/0001-81";
pub(super) const CPF: &str = "529.982.247-25";

pub(super) fn profile(tax_id: &str, legal_name: &str) -> ClientProfile {
    ClientProfile::new(TaxId::parse(tax_id).expect("valid tax id"), legal_name)
}

#[derive(Default, Clone)]
pub(super) struct MemoryFeeRepository {
    records: Arc<Mutex<BTreeMap<(ClientId, i32), ClientFeeRecord>>>,
}

impl MemoryFeeRepository {
    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("fee mutex poisoned").len()
    }
}

impl FeeRecordRepository for MemoryFeeRepository {
    fn fetch(&self, client_id: &ClientId, year: i32) -> Result<Option<ClientFeeRecord>, RepositoryError> {
        let guard = self.records.lock().expect("fee mutex poisoned");
        Ok(guard.get(&(client_id.clone(), year)).cloned())
    }

    fn upsert(&self, record: ClientFeeRecord) -> Result<ClientFeeRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("fee mutex poisoned");
        guard.insert((record.client_id.clone(), record.year), record.clone());
        Ok(record)
    }
}

/// Fee store whose writes always fail.
pub(super) struct OfflineFeeRepository;

impl FeeRecordRepository for OfflineFeeRepository {
    fn fetch(&self, _client_id: &ClientId, _year: i32) -> Result<Option<ClientFeeRecord>, RepositoryError> {
        Ok(None)
    }

    fn upsert(&self, _record: ClientFeeRecord) -> Result<ClientFeeRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("fee api offline".to_string()))
    }
}

pub(super) type TestClientService = ClientService<MemoryClientRepository, MemoryFeeRepository>;

pub(super) fn build_service() -> (Arc<TestClientService>, Arc<MemoryFeeRepository>) {
    let fees = Arc::new(MemoryFeeRepository::default());
    let service = ClientService::new(Arc::new(MemoryClientRepository::default()), fees.clone());
    (Arc::new(service), fees)
}

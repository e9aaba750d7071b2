//! Mock external-data client for testing agents without a live provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diligence_core::error::Result;
use diligence_core::service_clients::{CompanyRecord, ExternalDataClient, PersonRecord};

/// A configurable mock [`ExternalDataClient`]. Unseeded lookups return
/// `None`, matching the production client's "miss is not an error" contract.
#[derive(Clone, Default)]
pub struct MockExternalDataClient {
    companies: Arc<Mutex<HashMap<String, CompanyRecord>>>,
    people: Arc<Mutex<HashMap<String, PersonRecord>>>,
}

impl MockExternalDataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(self, name: impl Into<String>, record: CompanyRecord) -> Self {
        self.companies.lock().unwrap().insert(name.into(), record);
        self
    }

    pub fn with_person(self, name: impl Into<String>, record: PersonRecord) -> Self {
        self.people.lock().unwrap().insert(name.into(), record);
        self
    }
}

#[async_trait]
impl ExternalDataClient for MockExternalDataClient {
    async fn lookup_company(&self, name: &str) -> Result<Option<CompanyRecord>> {
        Ok(self.companies.lock().unwrap().get(name).cloned())
    }

    async fn lookup_person(&self, name: &str) -> Result<Option<PersonRecord>> {
        Ok(self.people.lock().unwrap().get(name).cloned())
    }
}

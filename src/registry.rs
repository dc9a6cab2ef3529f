//! Contract for the external company registry consumed during validation.
//!
//! Only the contract lives here; the production lookup service sits behind
//! the trait. Lookups are the single external call a validation pass makes,
//! and a timeout is a verification failure, never a silent pass.
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CompanyProfile {
    WasteProducer,
    Worker,
    Transporter,
    WasteProcessor,
    Broker,
    Intermediary,
}

impl CompanyProfile {
    pub fn label(self) -> &'static str {
        match self {
            CompanyProfile::WasteProducer => "waste producer",
            CompanyProfile::Worker => "worker",
            CompanyProfile::Transporter => "transporter",
            CompanyProfile::WasteProcessor => "waste processor",
            CompanyProfile::Broker => "broker",
            CompanyProfile::Intermediary => "intermediary",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompanyInfo {
    pub siret: String,
    pub name: String,
    pub profiles: Vec<CompanyProfile>,
    pub transport_receipt: Option<String>,
}

impl CompanyInfo {
    pub fn has_profile(&self, profile: CompanyProfile) -> bool {
        self.profiles.contains(&profile)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("registry lookup timed out")]
    Timeout,
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

pub trait CompanyRegistry {
    fn find_company(&self, siret: &str) -> Result<Option<CompanyInfo>, RegistryError>;
}

/// In-memory registry for tests and demos.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    companies: BTreeMap<String, CompanyInfo>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, info: CompanyInfo) -> Self {
        self.companies.insert(info.siret.clone(), info);
        self
    }
}

impl CompanyRegistry for StaticRegistry {
    fn find_company(&self, siret: &str) -> Result<Option<CompanyInfo>, RegistryError> {
        Ok(self.companies.get(siret).cloned())
    }
}

pub mod alerts;
pub mod dashboards;
pub mod data_sources;
pub mod destinations;
pub mod favorites;
pub mod fixers;
pub mod groups;
pub mod init;
pub mod queries;
pub mod status;
pub mod users;
pub mod visualizations;

use crate::error::{MigrateError, Result};
use crate::model::Id;
use crate::output::Report;
use crate::service::{Connect, Service};
use crate::store::ledger::Ledger;

/// Everything an importer works with during one phase.
pub struct Migration<'a> {
    pub origin: &'a dyn Service,
    pub destination: &'a dyn Service,
    pub connector: &'a dyn Connect,
    pub ledger: Ledger,
    pub report: Report,
}

impl<'a> Migration<'a> {
    pub fn new(
        origin: &'a dyn Service,
        destination: &'a dyn Service,
        connector: &'a dyn Connect,
        ledger: Ledger,
    ) -> Self {
        Self {
            origin,
            destination,
            connector,
            ledger,
            report: Report::default(),
        }
    }

    /// Destination API key of an origin user; fetched once, then cached in the ledger.
    pub fn destination_api_key(&mut self, origin_user_id: Id) -> Result<String> {
        let entry = self
            .ledger
            .users
            .get_mut(&origin_user_id)
            .ok_or(MigrateError::UserNotMapped(origin_user_id))?;
        if let Some(ref key) = entry.api_key {
            return Ok(key.clone());
        }

        let key = self.destination.user(entry.id)?.api_key.ok_or_else(|| {
            MigrateError::InvalidInput(format!(
                "destination user {} has no API key visible to the admin",
                entry.id
            ))
        })?;
        entry.api_key = Some(key.clone());
        Ok(key)
    }

    /// A destination client acting as the counterpart of an origin user.
    pub fn as_destination_user(&mut self, origin_user_id: Id) -> Result<Box<dyn Service>> {
        let key = self.destination_api_key(origin_user_id)?;
        self.connector.connect(self.destination.base_url(), &key)
    }

    /// An origin client acting as the origin user itself.
    pub fn as_origin_user(&self, origin_user_id: Id) -> Result<Box<dyn Service>> {
        let key = self.origin.user(origin_user_id)?.api_key.ok_or_else(|| {
            MigrateError::InvalidInput(format!(
                "origin user {origin_user_id} has no API key visible to the admin"
            ))
        })?;
        self.connector.connect(self.origin.base_url(), &key)
    }
}

/// Object options that came back with secrets masked by the service.
pub(crate) fn has_masked_secrets(options: &serde_json::Value) -> bool {
    options
        .as_object()
        .is_some_and(|map| map.values().any(|v| v.as_str() == Some("--------")))
}

//! Runs one phase against the ledger.
//!
//! Whatever the importer manages to do is kept: an error it returns is
//! logged and the ledger is saved before the outcome is handed back.

use tracing::{debug, error, info};

use crate::commands::{self, Migration};
use crate::error::{MigrateError, Result};
use crate::output::{Outcome, PhaseOutcome};
use crate::phase::Phase;
use crate::service::Connect;
use crate::store::ledger::LedgerStore;

pub fn run(phase: Phase, store: &LedgerStore, connector: &dyn Connect) -> Result<PhaseOutcome> {
    if !store.exists() {
        return Err(MigrateError::NotInitialized(
            store.path().display().to_string(),
        ));
    }
    let _lock = store.lock()?;
    let ledger = store.load()?;

    let origin = connector.connect(&ledger.settings.origin_url, &ledger.settings.origin_api_key)?;
    let destination = connector.connect(
        &ledger.settings.destination_url,
        &ledger.settings.destination_api_key,
    )?;
    debug!(origin = origin.base_url(), destination = destination.base_url(), "connected");

    let mut migration = Migration::new(origin.as_ref(), destination.as_ref(), connector, ledger);
    info!("Running phase {phase}");
    let result = execute(phase, &mut migration);
    if let Err(ref err) = result {
        error!("Phase {phase} aborted: {err}");
    }

    let Migration { ledger, report, .. } = migration;
    store.save(&ledger)?;
    debug!(path = %store.path().display(), "ledger saved");
    info!(
        ok = report.total(Outcome::Ok),
        skipped = report.total(Outcome::Skip),
        failed = report.total(Outcome::Fail) + report.total(Outcome::Error),
        "Phase {phase} finished"
    );

    Ok(PhaseOutcome {
        phase,
        completed: result.is_ok(),
        error: result.err().map(|err| err.to_string()),
        report,
    })
}

/// Dispatch to the importer behind `phase`.
pub fn execute(phase: Phase, m: &mut Migration) -> Result<()> {
    match phase {
        Phase::DataSources => commands::data_sources::run(m),
        Phase::CheckDataSources => commands::data_sources::check(m),
        Phase::Users => commands::users::run(m),
        Phase::Groups => commands::groups::run(m),
        Phase::Destinations => commands::destinations::run(m),
        Phase::Queries => commands::queries::run(m),
        Phase::FixQrdsRefs => commands::fixers::fix_qrds_refs(m),
        Phase::FixCsvQueries => commands::fixers::fix_csv_queries(m),
        Phase::Visualizations => commands::visualizations::run(m),
        Phase::Dashboards => commands::dashboards::run(m),
        Phase::Alerts => commands::alerts::run(m),
        Phase::Favorites => commands::favorites::run(m),
        Phase::DisableUsers => commands::users::disable(m),
    }
}

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::output::Format;
use crate::store::ledger::{Ledger, LedgerStore};

/// Mapping counts of a ledger. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    pub origin_url: String,
    pub destination_url: String,
    pub users: usize,
    pub disabled_users: usize,
    pub data_sources: usize,
    pub groups: usize,
    pub destinations: usize,
    pub queries: usize,
    pub visualizations: usize,
    pub queries_with_visualizations: usize,
    pub dashboards: usize,
    pub alerts: usize,
    pub fixed_qrds_refs: usize,
    pub fixed_csv_queries: usize,
}

impl From<&Ledger> for LedgerStatus {
    fn from(ledger: &Ledger) -> Self {
        Self {
            origin_url: ledger.settings.origin_url.clone(),
            destination_url: ledger.settings.destination_url.clone(),
            users: ledger.users.len(),
            disabled_users: ledger.users.values().filter(|u| u.disabled).count(),
            data_sources: ledger.data_sources.len(),
            groups: ledger.groups.len(),
            destinations: ledger.destinations.len(),
            queries: ledger.queries.len(),
            visualizations: ledger.visualizations.len(),
            queries_with_visualizations: ledger
                .flags
                .viz_import_complete
                .values()
                .filter(|&&done| done)
                .count(),
            dashboards: ledger.dashboards.len(),
            alerts: ledger.alerts.len(),
            fixed_qrds_refs: ledger.fix_qrds_refs.len(),
            fixed_csv_queries: ledger.fix_csv_queries.len(),
        }
    }
}

pub fn run(store: &LedgerStore, format: Format) -> Result<()> {
    let ledger = store.load()?;
    let status = LedgerStatus::from(&ledger);

    match format {
        Format::Json => println!("{}", serde_json::to_string(&status)?),
        Format::Pretty => {
            println!(
                "{} {} {} {}",
                status.origin_url.cyan(),
                "->".dimmed(),
                status.destination_url.cyan(),
                format!("({})", store.path().display()).dimmed()
            );
            let rows = [
                ("users", status.users),
                ("  disabled", status.disabled_users),
                ("data sources", status.data_sources),
                ("groups", status.groups),
                ("destinations", status.destinations),
                ("queries", status.queries),
                ("  visualized", status.queries_with_visualizations),
                ("visualizations", status.visualizations),
                ("dashboards", status.dashboards),
                ("alerts", status.alerts),
                ("qrds fixed", status.fixed_qrds_refs),
                ("csv fixed", status.fixed_csv_queries),
            ];
            for (label, count) in rows {
                println!("  {:<16} {}", format!("{label}:").dimmed(), count);
            }
        }
    }
    Ok(())
}

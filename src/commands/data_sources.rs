use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::commands::{Migration, has_masked_secrets};
use crate::error::Result;
use crate::model::{DataSource, NewDataSource};
use crate::output::{Entity, Outcome};

/// Deprecated data source types that can be imported as a supported one.
pub const TYPE_REMAP: [(&str, &str); 1] = [("url", "csv")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSupport {
    Supported,
    Remapped(&'static str),
    Unsupported,
}

pub fn type_support(origin_kind: &str, supported: &HashSet<String>) -> TypeSupport {
    if supported.contains(origin_kind) {
        return TypeSupport::Supported;
    }
    TYPE_REMAP
        .iter()
        .find(|(from, to)| *from == origin_kind && supported.contains(*to))
        .map(|(_, to)| TypeSupport::Remapped(to))
        .unwrap_or(TypeSupport::Unsupported)
}

/// Whether a destination type is an acceptable counterpart of an origin type.
fn types_compatible(origin_kind: &str, destination_kind: &str) -> bool {
    origin_kind == destination_kind
        || TYPE_REMAP
            .iter()
            .any(|(from, to)| *from == origin_kind && *to == destination_kind)
}

/// Create a stub destination data source for every unmapped origin one.
pub fn run(m: &mut Migration) -> Result<()> {
    let supported: HashSet<String> = m
        .destination
        .data_source_types()?
        .into_iter()
        .map(|t| t.kind)
        .collect();

    for source in m.origin.data_sources()? {
        if let Some(dest) = m.ledger.data_sources.get(&source.id) {
            m.report.record(
                Entity::DataSource,
                source.id,
                Outcome::Skip,
                format!("already mapped to {dest}"),
            );
            continue;
        }

        let kind = match type_support(&source.kind, &supported) {
            TypeSupport::Supported => source.kind.clone(),
            TypeSupport::Remapped(to) => {
                info!(
                    "Data source {} is of deprecated type {}; importing it as {to}",
                    source.id, source.kind
                );
                to.to_string()
            }
            TypeSupport::Unsupported => {
                m.report.record(
                    Entity::DataSource,
                    source.id,
                    Outcome::Warning,
                    format!("type {} is not supported at the destination", source.kind),
                );
                continue;
            }
        };

        if let Err(err) = import_data_source(m, &source, kind) {
            m.report
                .record(Entity::DataSource, source.id, Outcome::Error, err.to_string());
        }
    }
    Ok(())
}

fn import_data_source(m: &mut Migration, source: &DataSource, kind: String) -> Result<()> {
    let detail = m.origin.data_source(source.id)?;
    if has_masked_secrets(&detail.options) {
        warn!(
            "Data source {} has masked secrets; re-enter its credentials at the destination",
            source.id
        );
    }

    let created = m.destination.create_data_source(&NewDataSource {
        name: detail.name,
        kind,
        options: detail.options,
    })?;
    m.ledger.data_sources.insert(source.id, created.id);
    m.report.record(
        Entity::DataSource,
        source.id,
        Outcome::Ok,
        format!("created as {}", created.id),
    );
    Ok(())
}

/// Compare the data source map against both instances. Reports only; never mutates.
pub fn check(m: &mut Migration) -> Result<()> {
    if m.ledger.data_sources.is_empty() {
        m.report.record(
            Entity::DataSource,
            "map",
            Outcome::Error,
            "you have not set up the data source map in the ledger",
        );
        info!("Check complete: ERROR");
        return Ok(());
    }

    let origin_sources = m.origin.data_sources()?;
    info!(
        "You have entered {} data sources into the ledger. Your origin instance contains {} data sources.",
        m.ledger.data_sources.len(),
        origin_sources.len()
    );
    if m.ledger.data_sources.len() < origin_sources.len() {
        info!("Any queries against data sources missing from the ledger will fail to import");
    }

    let destination_sources: HashMap<_, _> = m
        .destination
        .data_sources()?
        .into_iter()
        .map(|ds| (ds.id, ds))
        .collect();

    let mut has_warning = false;
    for source in &origin_sources {
        let Some(&dest_id) = m.ledger.data_sources.get(&source.id) else {
            m.report.record(
                Entity::DataSource,
                source.id,
                Outcome::Warning,
                "origin data source does not appear in the ledger",
            );
            has_warning = true;
            continue;
        };

        match destination_sources.get(&dest_id) {
            None => {
                m.report.record(
                    Entity::DataSource,
                    source.id,
                    Outcome::Warning,
                    format!("mapped to {dest_id}, which does not exist at the destination"),
                );
                has_warning = true;
            }
            Some(dest) if !types_compatible(&source.kind, &dest.kind) => {
                m.report.record(
                    Entity::DataSource,
                    source.id,
                    Outcome::Warning,
                    format!(
                        "origin type {} does not match destination {} of type {}",
                        source.kind, dest.id, dest.kind
                    ),
                );
                has_warning = true;
            }
            Some(_) => {
                m.report.record(
                    Entity::DataSource,
                    source.id,
                    Outcome::Ok,
                    format!("mapped to {dest_id}"),
                );
            }
        }
    }

    if has_warning {
        info!("Check complete: WARNING");
    } else {
        info!("Check complete: OK");
    }
    Ok(())
}

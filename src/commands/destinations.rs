use tracing::warn;

use crate::commands::{Migration, has_masked_secrets};
use crate::error::Result;
use crate::model::{Destination, NewDestination};
use crate::output::{Entity, Outcome};

/// Recreate every unmapped alert destination.
pub fn run(m: &mut Migration) -> Result<()> {
    for destination in m.origin.destinations()? {
        if let Some(dest) = m.ledger.destinations.get(&destination.id) {
            m.report.record(
                Entity::Destination,
                destination.id,
                Outcome::Skip,
                format!("already imported as {dest}"),
            );
            continue;
        }

        if let Err(err) = import_destination(m, &destination) {
            m.report.record(
                Entity::Destination,
                destination.id,
                Outcome::Error,
                err.to_string(),
            );
        }
    }
    Ok(())
}

fn import_destination(m: &mut Migration, destination: &Destination) -> Result<()> {
    let detail = m.origin.destination(destination.id)?;
    if has_masked_secrets(&detail.options) {
        warn!(
            "Destination {} has masked secrets; re-enter them at the destination instance",
            destination.id
        );
    }

    let created = m.destination.create_destination(&NewDestination {
        name: detail.name,
        kind: detail.kind,
        options: detail.options,
    })?;
    m.ledger.destinations.insert(destination.id, created.id);
    m.report.record(
        Entity::Destination,
        destination.id,
        Outcome::Ok,
        format!("imported as {}", created.id),
    );
    Ok(())
}

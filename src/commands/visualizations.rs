use crate::commands::Migration;
use crate::error::{MigrateError, Result};
use crate::model::{Id, NewVisualization, Visualization, VisualizationUpdate};
use crate::output::{Entity, Outcome};
use crate::service::Service;

/// Migrate the visualizations of every migrated query not yet flagged complete.
pub fn run(m: &mut Migration) -> Result<()> {
    let queries: Vec<(Id, Id)> = m.ledger.queries.iter().map(|(&o, &d)| (o, d)).collect();

    for (origin_query, dest_query) in queries {
        if m.ledger.viz_import_complete(origin_query) {
            m.report.record(
                Entity::Query,
                origin_query,
                Outcome::Skip,
                "all visualizations already imported",
            );
            continue;
        }

        if let Err(err) = import_query_visualizations(m, origin_query, dest_query) {
            m.report.record(
                Entity::Query,
                origin_query,
                Outcome::Fail,
                format!("visualizations skipped: {err}"),
            );
        }
    }
    Ok(())
}

fn import_query_visualizations(m: &mut Migration, origin_query: Id, dest_query: Id) -> Result<()> {
    let query = m.origin.query(origin_query)?;
    let owner = query
        .owner()
        .ok_or_else(|| MigrateError::InvalidInput("query has no owner".into()))?;
    let client = m.as_destination_user(owner)?;

    let mut visualizations = query.visualizations;
    visualizations.sort_by_key(|v| v.id);
    let default_table = visualizations.iter().find(|v| v.is_table()).map(|v| v.id);

    let mut complete = true;
    for viz in &visualizations {
        if let Some(dest) = m.ledger.visualizations.get(&viz.id) {
            m.report.record(
                Entity::Visualization,
                viz.id,
                Outcome::Skip,
                format!("already imported as {dest}"),
            );
            continue;
        }

        let imported = if Some(viz.id) == default_table {
            match_default_table(m, client.as_ref(), viz, dest_query)
        } else {
            create_visualization(client.as_ref(), viz, dest_query)
        };
        match imported {
            Ok(dest) => {
                m.ledger.visualizations.insert(viz.id, dest);
                m.report.record(
                    Entity::Visualization,
                    viz.id,
                    Outcome::Ok,
                    format!("imported as {dest}"),
                );
            }
            Err(err) => {
                complete = false;
                m.report
                    .record(Entity::Visualization, viz.id, Outcome::Error, err.to_string());
            }
        }
    }

    if complete {
        m.ledger
            .flags
            .viz_import_complete
            .insert(origin_query, true);
    }
    Ok(())
}

/// Reuse the table the destination created along with the query, mirroring the origin's look.
fn match_default_table(
    m: &Migration,
    client: &dyn Service,
    viz: &Visualization,
    dest_query: Id,
) -> Result<Id> {
    let created = m.destination.query(dest_query)?;
    let Some(table) = created
        .visualizations
        .iter()
        .filter(|v| v.is_table())
        .min_by_key(|v| v.id)
    else {
        return create_visualization(client, viz, dest_query);
    };
    client.update_visualization(table.id, &VisualizationUpdate::mirroring(viz))?;
    Ok(table.id)
}

fn create_visualization(client: &dyn Service, viz: &Visualization, dest_query: Id) -> Result<Id> {
    let created = client.create_visualization(&NewVisualization {
        query_id: dest_query,
        kind: viz.kind.clone(),
        name: viz.name.clone(),
        description: viz.description.clone(),
        options: viz.options.clone(),
    })?;
    Ok(created.id)
}

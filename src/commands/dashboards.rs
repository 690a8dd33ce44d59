use crate::commands::Migration;
use crate::error::{MigrateError, Result};
use crate::model::{Dashboard, DashboardUpdate, Id, NewWidget, Widget, sort_by_creation};
use crate::output::{Entity, Outcome};
use crate::service::Service;

/// Updates needed to match the origin's published status.
fn publication(origin: &Dashboard) -> DashboardUpdate {
    DashboardUpdate {
        is_draft: (!origin.is_draft).then_some(false),
        ..DashboardUpdate::default()
    }
}

/// Updates needed to carry over tags and the filter switch.
fn presentation(origin: &Dashboard) -> DashboardUpdate {
    DashboardUpdate {
        tags: (!origin.tags.is_empty()).then(|| origin.tags.clone()),
        dashboard_filters_enabled: origin.dashboard_filters_enabled.then_some(true),
        ..DashboardUpdate::default()
    }
}

pub fn run(m: &mut Migration) -> Result<()> {
    let mut dashboards = m.origin.dashboards()?;
    sort_by_creation(&mut dashboards);

    for dashboard in dashboards {
        if let Some(dest) = m.ledger.dashboards.get(&dashboard.slug) {
            m.report.record(
                Entity::Dashboard,
                &dashboard.slug,
                Outcome::Skip,
                format!("already imported as {dest}"),
            );
            continue;
        }

        if let Err(err) = import_dashboard(m, &dashboard.slug) {
            m.report
                .record(Entity::Dashboard, &dashboard.slug, Outcome::Fail, err.to_string());
        }
    }
    Ok(())
}

fn import_dashboard(m: &mut Migration, slug: &str) -> Result<()> {
    let origin = m.origin.dashboard(slug)?;
    let owner = origin
        .owner()
        .ok_or_else(|| MigrateError::InvalidInput("dashboard has no owner".into()))?;
    let client = m.as_destination_user(owner)?;

    let created = client.create_dashboard(&origin.name)?;
    m.ledger
        .dashboards
        .insert(origin.slug.clone(), created.slug.clone());

    let update = publication(&origin).merge(presentation(&origin));
    let applied = if update.is_empty() {
        Ok(())
    } else {
        client.update_dashboard(created.id, &update).map(|_| ())
    };
    match applied {
        Ok(()) => m.report.record(
            Entity::Dashboard,
            slug,
            Outcome::Ok,
            format!("imported as {}", created.slug),
        ),
        Err(err) => m.report.record(
            Entity::Dashboard,
            slug,
            Outcome::Warning,
            format!(
                "imported as {} but draft status and tags not applied: {err}",
                created.slug
            ),
        ),
    }

    for widget in &origin.widgets {
        import_widget(m, client.as_ref(), widget, created.id);
    }
    Ok(())
}

fn import_widget(m: &mut Migration, client: &dyn Service, widget: &Widget, dashboard_id: Id) {
    let visualization_id = match widget.visualization {
        None => None,
        Some(ref viz) => match m.ledger.visualizations.get(&viz.id) {
            Some(&dest) => Some(dest),
            None => {
                m.report.record(
                    Entity::Widget,
                    widget.id,
                    Outcome::Skip,
                    format!(
                        "visualization {} is missing (check missing data source, query, or viz)",
                        viz.id
                    ),
                );
                return;
            }
        },
    };

    let options = if widget.options.is_null() {
        serde_json::json!({})
    } else {
        widget.options.clone()
    };
    let created = client.create_widget(&NewWidget {
        dashboard_id,
        visualization_id,
        text: widget.text.clone(),
        options,
        width: widget.width,
    });
    match created {
        Ok(created) => m.report.record(
            Entity::Widget,
            widget.id,
            Outcome::Ok,
            format!("imported as {}", created.id),
        ),
        Err(err) => m
            .report
            .record(Entity::Widget, widget.id, Outcome::Error, err.to_string()),
    }
}

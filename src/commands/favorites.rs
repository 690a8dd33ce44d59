use crate::commands::Migration;
use crate::error::Result;
use crate::model::Id;
use crate::output::{Entity, Outcome};
use crate::service::Service;

/// Replay each enabled user's favorite queries and dashboards with their own keys.
pub fn run(m: &mut Migration) -> Result<()> {
    let users: Vec<(Id, bool)> = m
        .ledger
        .users
        .iter()
        .map(|(&id, entry)| (id, entry.disabled))
        .collect();

    for (origin_user, disabled) in users {
        if disabled {
            m.report
                .record(Entity::User, origin_user, Outcome::Skip, "disabled user");
            continue;
        }

        let clients = m
            .as_origin_user(origin_user)
            .and_then(|origin| Ok((origin, m.as_destination_user(origin_user)?)));
        let (origin, destination) = match clients {
            Ok(clients) => clients,
            Err(err) => {
                m.report.record(
                    Entity::User,
                    origin_user,
                    Outcome::Error,
                    format!("favorites skipped: {err}"),
                );
                continue;
            }
        };

        let queries = favorite_queries(m, origin.as_ref(), destination.as_ref());
        let dashboards = favorite_dashboards(m, origin.as_ref(), destination.as_ref());
        match (queries, dashboards) {
            (Ok(queries), Ok(dashboards)) => m.report.record(
                Entity::User,
                origin_user,
                Outcome::Ok,
                format!("imported {queries} favorite queries and {dashboards} favorite dashboards"),
            ),
            (Err(err), _) | (_, Err(err)) => m.report.record(
                Entity::User,
                origin_user,
                Outcome::Error,
                format!("favorites: {err}"),
            ),
        }
    }
    Ok(())
}

fn favorite_queries(
    m: &mut Migration,
    origin: &dyn Service,
    destination: &dyn Service,
) -> Result<usize> {
    let mut count = 0;
    for query in origin.favorite_queries()? {
        let Some(&dest) = m.ledger.queries.get(&query.id) else {
            continue;
        };
        match destination.favorite_query(dest) {
            Ok(()) => count += 1,
            Err(err) => m.report.record(
                Entity::Favorite,
                format!("query {}", query.id),
                Outcome::Error,
                err.to_string(),
            ),
        }
    }
    Ok(count)
}

fn favorite_dashboards(
    m: &mut Migration,
    origin: &dyn Service,
    destination: &dyn Service,
) -> Result<usize> {
    let mut count = 0;
    for dashboard in origin.favorite_dashboards()? {
        let Some(dest_slug) = m.ledger.dashboards.get(&dashboard.slug) else {
            continue;
        };
        let favorited = m
            .destination
            .dashboard(dest_slug)
            .and_then(|target| destination.favorite_dashboard(target.id));
        match favorited {
            Ok(()) => count += 1,
            Err(err) => m.report.record(
                Entity::Favorite,
                format!("dashboard {}", dashboard.slug),
                Outcome::Error,
                err.to_string(),
            ),
        }
    }
    Ok(count)
}

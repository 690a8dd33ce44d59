use crate::commands::Migration;
use crate::error::Result;
use crate::model::{Alert, AlertUpdate, Id, NewAlert, Subscription, sort_by_creation};
use crate::output::{Entity, Outcome};

pub fn run(m: &mut Migration) -> Result<()> {
    let mut alerts = m.origin.alerts()?;
    sort_by_creation(&mut alerts);

    for alert in alerts {
        if let Some(dest) = m.ledger.alerts.get(&alert.id) {
            m.report.record(
                Entity::Alert,
                alert.id,
                Outcome::Skip,
                format!("already imported with new id {dest}"),
            );
            continue;
        }

        if let Err(err) = import_alert(m, alert.id) {
            m.report
                .record(Entity::Alert, alert.id, Outcome::Error, err.to_string());
        }
    }
    Ok(())
}

fn import_alert(m: &mut Migration, origin_id: Id) -> Result<()> {
    let alert = m.origin.alert(origin_id)?;

    let origin_query = alert.query.map(|q| q.id);
    let Some(&query_id) = origin_query.and_then(|id| m.ledger.queries.get(&id)) else {
        let origin_query = origin_query
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".into());
        m.report.record(
            Entity::Alert,
            origin_id,
            Outcome::Skip,
            format!("origin target query {origin_query} has not been migrated"),
        );
        return Ok(());
    };

    let created = m.destination.create_alert(&NewAlert {
        name: alert.name.clone(),
        query_id,
        options: alert.options.clone(),
    })?;
    m.ledger.alerts.insert(origin_id, created.id);
    m.report.record(
        Entity::Alert,
        origin_id,
        Outcome::Ok,
        format!("imported with new id {}", created.id),
    );

    // Creation does not take a rearm interval.
    if let Some(rearm) = alert.rearm.filter(|&r| r > 0) {
        let update = AlertUpdate { rearm: Some(rearm) };
        match m.destination.update_alert(created.id, &update) {
            Ok(_) => m
                .report
                .record(Entity::Alert, origin_id, Outcome::Ok, "fixed rearm"),
            Err(err) => m.report.record(
                Entity::Alert,
                origin_id,
                Outcome::Warning,
                format!("rearm not applied: {err}"),
            ),
        }
    }

    copy_subscriptions(m, &alert, created.id)
}

fn copy_subscriptions(m: &mut Migration, alert: &Alert, dest_alert: Id) -> Result<()> {
    for subscription in m.origin.alert_subscriptions(alert.id)? {
        if let Err(err) = copy_subscription(m, &subscription, dest_alert) {
            m.report.record(
                Entity::Subscription,
                subscription.id,
                Outcome::Error,
                err.to_string(),
            );
        }
    }
    Ok(())
}

/// Destination-bound subscriptions are created by the admin; user-bound
/// ones only by the subscribing user.
fn copy_subscription(m: &mut Migration, subscription: &Subscription, dest_alert: Id) -> Result<()> {
    let created = match (subscription.destination, subscription.user) {
        (Some(destination), _) => {
            let Some(&dest) = m.ledger.destinations.get(&destination.id) else {
                m.report.record(
                    Entity::Subscription,
                    subscription.id,
                    Outcome::Skip,
                    format!("alert destination {} has not been migrated", destination.id),
                );
                return Ok(());
            };
            m.destination.subscribe_alert(dest_alert, Some(dest))?
        }
        (None, Some(user)) => m.as_destination_user(user.id)?.subscribe_alert(dest_alert, None)?,
        (None, None) => {
            m.report.record(
                Entity::Subscription,
                subscription.id,
                Outcome::Skip,
                "bound to neither a destination nor a user",
            );
            return Ok(());
        }
    };

    m.report.record(
        Entity::Subscription,
        subscription.id,
        Outcome::Ok,
        format!("imported as {}", created.id),
    );
    Ok(())
}

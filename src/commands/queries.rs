use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::commands::Migration;
use crate::error::Result;
use crate::model::{
    Id, NewQuery, Query, QueryUpdate, convert_schedule, id_from_json, sort_by_creation,
};
use crate::output::{Entity, Outcome};

/// Rewrite every dropdown `queryId` in `options` to its destination id.
///
/// Returns the origin ids that have no mapping yet; `options` is only
/// rewritten when that list would be empty.
pub fn rewrite_parameter_refs(
    options: &Value,
    queries: &BTreeMap<Id, Id>,
) -> std::result::Result<Value, Vec<Id>> {
    let mut rewritten = options.clone();
    let mut unresolved = Vec::new();

    let params = rewritten
        .get_mut("parameters")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten();
    for param in params {
        let Some(slot) = param.get_mut("queryId") else {
            continue;
        };
        let Some(origin_id) = id_from_json(slot) else {
            continue;
        };
        match queries.get(&origin_id) {
            Some(&dest_id) => *slot = Value::from(dest_id),
            None => unresolved.push(origin_id),
        }
    }

    if unresolved.is_empty() {
        Ok(rewritten)
    } else {
        Err(unresolved)
    }
}

/// Import queries in creation order, deferring the ones whose dropdown
/// parameters point at other queries until those are mapped.
pub fn run(m: &mut Migration) -> Result<()> {
    let mut queries = m.origin.queries()?;
    sort_by_creation(&mut queries);

    let mut deferred = Vec::new();
    for query in queries {
        if query.parameter_query_refs().is_empty() {
            let options = query.options.clone();
            import_query(m, &query, options);
        } else {
            deferred.push(query);
        }
    }

    let mut round = 0;
    loop {
        round += 1;
        let before = deferred.len();
        let mut waiting = Vec::new();

        for query in deferred {
            if m.ledger.queries.contains_key(&query.id) {
                import_query(m, &query, query.options.clone());
                continue;
            }
            match rewrite_parameter_refs(&query.options, &m.ledger.queries) {
                Ok(options) => import_query(m, &query, options),
                Err(_) => waiting.push(query),
            }
        }

        deferred = waiting;
        if deferred.is_empty() || deferred.len() == before {
            break;
        }
        info!(
            "Round {round} resolved {} dependent queries; {} still waiting",
            before - deferred.len(),
            deferred.len()
        );
    }

    for query in &deferred {
        let missing = rewrite_parameter_refs(&query.options, &m.ledger.queries)
            .err()
            .unwrap_or_default();
        let missing: Vec<String> = missing.iter().map(Id::to_string).collect();
        m.report.record(
            Entity::Query,
            query.id,
            Outcome::Skip,
            format!("referenced queries were never imported ({})", missing.join(", ")),
        );
    }
    Ok(())
}

/// Import one query with already-translated `options`. Every outcome lands in the report.
fn import_query(m: &mut Migration, query: &Query, options: Value) {
    if let Some(dest) = m.ledger.queries.get(&query.id) {
        m.report.record(
            Entity::Query,
            query.id,
            Outcome::Skip,
            format!("was already imported as {dest}"),
        );
        return;
    }

    let Some(data_source_id) = query
        .data_source_id
        .and_then(|id| m.ledger.data_sources.get(&id).copied())
    else {
        let origin = query
            .data_source_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".into());
        m.report.record(
            Entity::Query,
            query.id,
            Outcome::Skip,
            format!("data source has not been mapped ({origin})"),
        );
        return;
    };

    let Some(owner) = query.owner() else {
        m.report
            .record(Entity::Query, query.id, Outcome::Fail, "query has no owner");
        return;
    };
    let client = match m.as_destination_user(owner) {
        Ok(client) => client,
        Err(err) => {
            m.report
                .record(Entity::Query, query.id, Outcome::Fail, err.to_string());
            return;
        }
    };

    let created = client.create_query(&NewQuery {
        data_source_id,
        query: query.query.clone(),
        name: query.name.clone(),
        description: query.description.clone(),
        schedule: convert_schedule(query.schedule.clone()),
        options,
        tags: query.tags.clone(),
        is_archived: query.is_archived,
    });
    let created = match created {
        Ok(created) => created,
        Err(err) => {
            m.report
                .record(Entity::Query, query.id, Outcome::Fail, err.to_string());
            return;
        }
    };
    m.ledger.queries.insert(query.id, created.id);

    // New queries start out as drafts.
    if !query.is_draft
        && let Err(err) = m.destination.update_query(created.id, &QueryUpdate::publish())
    {
        m.report.record(
            Entity::Query,
            query.id,
            Outcome::Warning,
            format!("imported as {} but still a draft: {err}", created.id),
        );
        return;
    }

    m.report.record(
        Entity::Query,
        query.id,
        Outcome::Ok,
        format!("imported as {}", created.id),
    );
}

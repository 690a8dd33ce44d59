//! Post-processing passes over already-migrated query text.
//!
//! Each pass has its own set in the ledger; a query is added once its text
//! has been rewritten (or found to need nothing), so a rerun only looks at
//! the rest.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::commands::Migration;
use crate::error::Result;
use crate::model::{Id, QUERY_RESULTS_TYPE, Query, QueryUpdate};
use crate::output::{Entity, Outcome};

/// Legacy data source type whose queries are a bare URL.
pub const LEGACY_URL_TYPE: &str = "url";

static QUERY_TABLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(cached_query|query)_(\d+)\b").expect("valid regex"));

/// Rewrite `query_<id>` and `cached_query_<id>` table references to destination ids.
pub fn rewrite_query_refs(
    text: &str,
    queries: &BTreeMap<Id, Id>,
) -> std::result::Result<String, Vec<Id>> {
    let mut unresolved = Vec::new();
    let rewritten = QUERY_TABLE_REF.replace_all(text, |caps: &Captures| {
        let Ok(origin_id) = caps[2].parse::<Id>() else {
            return caps[0].to_string();
        };
        match queries.get(&origin_id) {
            Some(dest_id) => format!("{}_{dest_id}", &caps[1]),
            None => {
                unresolved.push(origin_id);
                caps[0].to_string()
            }
        }
    });

    if unresolved.is_empty() {
        Ok(rewritten.into_owned())
    } else {
        Err(unresolved)
    }
}

/// Turn a bare URL body into the `csv` runner's `url: <url>` form.
///
/// Returns `None` when the body is not a single bare URL.
pub fn rewrite_csv_query(text: &str) -> Option<String> {
    let url = text.trim();
    let bare = (url.starts_with("http://") || url.starts_with("https://"))
        && !url.contains(char::is_whitespace);
    bare.then(|| format!("url: {url}"))
}

/// Origin queries that were migrated and whose data source is of type `kind`.
fn migrated_queries_of_type(m: &Migration, kind: &str) -> Result<Vec<(Query, Id)>> {
    let kinds: HashMap<Id, String> = m
        .origin
        .data_sources()?
        .into_iter()
        .map(|ds| (ds.id, ds.kind))
        .collect();

    Ok(m.origin
        .queries()?
        .into_iter()
        .filter(|q| {
            q.data_source_id
                .and_then(|id| kinds.get(&id))
                .is_some_and(|k| k == kind)
        })
        .filter_map(|q| m.ledger.queries.get(&q.id).map(|&dest| (q, dest)))
        .collect())
}

pub fn fix_qrds_refs(m: &mut Migration) -> Result<()> {
    for (query, dest_id) in migrated_queries_of_type(m, QUERY_RESULTS_TYPE)? {
        if m.ledger.fix_qrds_refs.contains(&query.id) {
            m.report
                .record(Entity::Query, query.id, Outcome::Skip, "references already fixed");
            continue;
        }

        let text = match rewrite_query_refs(&query.query, &m.ledger.queries) {
            Ok(text) => text,
            Err(missing) => {
                let missing: Vec<String> = missing.iter().map(Id::to_string).collect();
                m.report.record(
                    Entity::Query,
                    query.id,
                    Outcome::Warning,
                    format!("references unmigrated queries ({})", missing.join(", ")),
                );
                continue;
            }
        };

        if text != query.query
            && let Err(err) = m.destination.update_query(dest_id, &QueryUpdate::text(text))
        {
            m.report
                .record(Entity::Query, query.id, Outcome::Error, err.to_string());
            continue;
        }
        m.ledger.fix_qrds_refs.insert(query.id);
        m.report.record(
            Entity::Query,
            query.id,
            Outcome::Ok,
            format!("fixed query references of {dest_id}"),
        );
    }
    Ok(())
}

pub fn fix_csv_queries(m: &mut Migration) -> Result<()> {
    for (query, dest_id) in migrated_queries_of_type(m, LEGACY_URL_TYPE)? {
        if m.ledger.fix_csv_queries.contains(&query.id) {
            m.report
                .record(Entity::Query, query.id, Outcome::Skip, "already rewritten");
            continue;
        }

        let Some(text) = rewrite_csv_query(&query.query) else {
            m.report.record(
                Entity::Query,
                query.id,
                Outcome::Warning,
                "body is not a bare URL; rewrite it by hand",
            );
            continue;
        };

        if let Err(err) = m.destination.update_query(dest_id, &QueryUpdate::text(text)) {
            m.report
                .record(Entity::Query, query.id, Outcome::Error, err.to_string());
            continue;
        }
        m.ledger.fix_csv_queries.insert(query.id);
        m.report.record(
            Entity::Query,
            query.id,
            Outcome::Ok,
            format!("rewrote {dest_id} for the csv data source"),
        );
    }
    Ok(())
}

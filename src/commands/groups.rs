use std::collections::{BTreeMap, BTreeSet};

use crate::commands::Migration;
use crate::error::{MigrateError, Result};
use crate::model::{Group, Id};
use crate::output::{Entity, Outcome};

/// Migrate groups with their members and data source permissions.
///
/// Built-in groups already exist at the destination; they are stripped of
/// every association (except the destination admin's membership) and then
/// filled to mirror the origin group. A mapped group whose replay did not
/// finish is filled again on the next run without being reset.
pub fn run(m: &mut Migration) -> Result<()> {
    let destination_groups = m.destination.groups()?;

    for group in m.origin.groups()? {
        let dest_id = match m.ledger.groups.get(&group.id).copied() {
            Some(dest) if m.ledger.group_sync_complete(group.id) => {
                m.report.record(
                    Entity::Group,
                    group.id,
                    Outcome::Skip,
                    format!("already imported as {dest}"),
                );
                continue;
            }
            Some(dest) => dest,
            None => match establish(m, &group, &destination_groups) {
                Ok(dest) => {
                    m.ledger.groups.insert(group.id, dest);
                    dest
                }
                Err(err) => {
                    m.report
                        .record(Entity::Group, group.id, Outcome::Error, err.to_string());
                    continue;
                }
            },
        };

        let mut complete = true;
        if let Err(err) = copy_members(m, group.id, dest_id) {
            complete = false;
            m.report.record(
                Entity::Group,
                group.id,
                Outcome::Error,
                format!("members: {err}"),
            );
        }
        if let Err(err) = copy_data_sources(m, group.id, dest_id) {
            complete = false;
            m.report.record(
                Entity::Group,
                group.id,
                Outcome::Error,
                format!("data sources: {err}"),
            );
        }
        if !complete {
            continue;
        }

        m.ledger.flags.group_sync_complete.insert(group.id, true);
        m.report.record(
            Entity::Group,
            group.id,
            Outcome::Ok,
            format!("imported as {dest_id}"),
        );
    }
    Ok(())
}

/// Find and reset the matching built-in group, or create a new one.
fn establish(m: &mut Migration, group: &Group, destination_groups: &[Group]) -> Result<Id> {
    if !group.is_builtin() {
        return Ok(m.destination.create_group(&group.name)?.id);
    }
    let existing = destination_groups
        .iter()
        .find(|g| g.name == group.name)
        .ok_or_else(|| {
            MigrateError::InvalidInput(format!(
                "built-in group {:?} is missing at the destination",
                group.name
            ))
        })?;
    reset_builtin(m, existing)?;
    Ok(existing.id)
}

fn reset_builtin(m: &mut Migration, group: &Group) -> Result<()> {
    let admin = m.ledger.settings.destination_admin_user_id;
    for member in m.destination.group_members(group.id)? {
        if member.id != admin {
            m.destination.remove_group_member(group.id, member.id)?;
        }
    }
    for source in m.destination.group_data_sources(group.id)? {
        m.destination.remove_group_data_source(group.id, source.id)?;
    }
    Ok(())
}

fn copy_members(m: &mut Migration, origin_group: Id, dest_group: Id) -> Result<()> {
    let present: BTreeSet<Id> = m
        .destination
        .group_members(dest_group)?
        .into_iter()
        .map(|u| u.id)
        .collect();

    for member in m.origin.group_members(origin_group)? {
        let Some(entry) = m.ledger.users.get(&member.id) else {
            m.report.record(
                Entity::Group,
                origin_group,
                Outcome::Error,
                MigrateError::UserNotMapped(member.id).to_string(),
            );
            continue;
        };
        if present.contains(&entry.id) {
            continue;
        }
        m.destination.add_group_member(dest_group, entry.id)?;
    }
    Ok(())
}

fn copy_data_sources(m: &mut Migration, origin_group: Id, dest_group: Id) -> Result<()> {
    let present: BTreeMap<Id, bool> = m
        .destination
        .group_data_sources(dest_group)?
        .into_iter()
        .map(|ds| (ds.id, ds.view_only))
        .collect();

    for source in m.origin.group_data_sources(origin_group)? {
        let Some(&dest_source) = m.ledger.data_sources.get(&source.id) else {
            m.report.record(
                Entity::Group,
                origin_group,
                Outcome::Error,
                format!("data source {} has not been mapped", source.id),
            );
            continue;
        };
        let view_only = match present.get(&dest_source) {
            Some(&view_only) => view_only,
            None => {
                m.destination.add_group_data_source(dest_group, dest_source)?;
                false
            }
        };
        if view_only != source.view_only {
            m.destination
                .set_group_data_source_view_only(dest_group, dest_source, source.view_only)?;
        }
    }
    Ok(())
}

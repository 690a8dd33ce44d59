use std::collections::{BTreeSet, HashMap};

use tracing::{info, warn};

use crate::commands::Migration;
use crate::error::Result;
use crate::model::{NewUser, User, sort_by_creation};
use crate::output::{Entity, Outcome};
use crate::service::Service;
use crate::store::ledger::UserEntry;

/// Email of the bootstrap account that is never recreated.
const ADMIN_EMAIL: &str = "admin";

/// Enabled and disabled users together; a plain listing omits the disabled ones.
fn all_users(service: &dyn Service) -> Result<Vec<User>> {
    let mut users = service.users(false)?;
    users.extend(service.users(true)?);
    Ok(users)
}

fn emails(users: &[User]) -> BTreeSet<&str> {
    users.iter().map(|u| u.email.as_str()).collect()
}

/// Create destination users for every origin user the ledger does not know yet.
pub fn run(m: &mut Migration) -> Result<()> {
    let mut origin_users = all_users(m.origin)?;
    let destination_users = all_users(m.destination)?;

    let known: BTreeSet<&str> = m.ledger.users.values().map(|e| e.email.as_str()).collect();
    let strangers: Vec<&str> = destination_users
        .iter()
        .map(|u| u.email.as_str())
        .filter(|email| !known.contains(email))
        .collect();
    if !strangers.is_empty() {
        warn!(
            "CAUTION: {} destination users are not in the ledger: {}",
            strangers.len(),
            strangers.join(", ")
        );
    }

    let all_mapped = origin_users
        .iter()
        .all(|u| u.email == ADMIN_EMAIL || m.ledger.users.contains_key(&u.id));
    if all_mapped && emails(&origin_users) == emails(&destination_users) {
        info!("OK: origin and destination user lists are in sync");
        return Ok(());
    }

    let mut by_email: HashMap<String, User> = destination_users
        .into_iter()
        .map(|u| (u.email.clone(), u))
        .collect();

    sort_by_creation(&mut origin_users);
    for user in &origin_users {
        if m.ledger.users.contains_key(&user.id) {
            m.report
                .record(Entity::User, user.id, Outcome::Skip, "already imported");
            continue;
        }
        if user.email == ADMIN_EMAIL {
            m.report
                .record(Entity::User, user.id, Outcome::Skip, "bootstrap admin");
            continue;
        }

        if let Some(existing) = by_email.remove(&user.email) {
            m.ledger.users.insert(
                user.id,
                UserEntry {
                    id: existing.id,
                    email: existing.email,
                    invite_link: String::new(),
                    disabled: user.is_disabled,
                    api_key: None,
                },
            );
            m.report.record(
                Entity::User,
                user.id,
                Outcome::Ok,
                format!("adopted existing destination user {}", existing.id),
            );
            continue;
        }

        let created = m.destination.create_user(&NewUser {
            name: user.name.clone(),
            email: user.email.clone(),
        });
        match created {
            Ok(created) => {
                let invite_link = if m.ledger.settings.preserve_invite_links {
                    created.invite_link.clone().unwrap_or_default()
                } else {
                    String::new()
                };
                m.report.record(
                    Entity::User,
                    user.id,
                    Outcome::Ok,
                    format!("created as {}", created.id),
                );
                m.ledger.users.insert(
                    user.id,
                    UserEntry {
                        id: created.id,
                        email: created.email,
                        invite_link,
                        disabled: user.is_disabled,
                        api_key: None,
                    },
                );
            }
            Err(err) => {
                m.report
                    .record(Entity::User, user.id, Outcome::Fail, err.to_string());
            }
        }
    }

    let destination_users = all_users(m.destination)?;
    if emails(&origin_users) == emails(&destination_users) {
        info!("User list is now synced");
    } else {
        warn!(
            "CAUTION: user lists are not in sync. Destination contains {} users, origin contains {}",
            destination_users.len(),
            origin_users.len()
        );
    }
    Ok(())
}

/// Disable destination users whose origin account is disabled.
pub fn disable(m: &mut Migration) -> Result<()> {
    let mut disabled = 0;
    for (origin_id, entry) in &m.ledger.users {
        if !entry.disabled {
            continue;
        }
        match m.destination.disable_user(entry.id) {
            Ok(()) => {
                disabled += 1;
                m.report.record(
                    Entity::User,
                    origin_id,
                    Outcome::Ok,
                    format!("disabled destination user {}", entry.id),
                );
            }
            Err(err) => {
                m.report
                    .record(Entity::User, origin_id, Outcome::Error, err.to_string());
            }
        }
    }

    if disabled > 0 {
        info!("{disabled} users were disabled in the destination instance");
    } else {
        info!("No users were disabled");
    }
    Ok(())
}

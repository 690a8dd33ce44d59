use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{MigrateError, Result};
use crate::model::{Id, id_from_json};

/// Maps keyed by origin id whose values are destination ids.
const ID_TO_ID_MAPS: [&str; 6] = [
    "data_sources",
    "groups",
    "destinations",
    "queries",
    "visualizations",
    "alerts",
];

const ID_SETS: [&str; 2] = ["fix_qrds_refs", "fix_csv_queries"];

/// Origin-to-destination translation table plus migration settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub settings: Settings,
    #[serde(default)]
    pub users: BTreeMap<Id, UserEntry>,
    #[serde(default)]
    pub data_sources: BTreeMap<Id, Id>,
    #[serde(default)]
    pub groups: BTreeMap<Id, Id>,
    #[serde(default)]
    pub destinations: BTreeMap<Id, Id>,
    #[serde(default)]
    pub queries: BTreeMap<Id, Id>,
    #[serde(default)]
    pub visualizations: BTreeMap<Id, Id>,
    /// Origin slug to destination slug.
    #[serde(default)]
    pub dashboards: BTreeMap<String, String>,
    #[serde(default)]
    pub alerts: BTreeMap<Id, Id>,
    #[serde(default)]
    pub fix_qrds_refs: BTreeSet<Id>,
    #[serde(default)]
    pub fix_csv_queries: BTreeSet<Id>,
    #[serde(default)]
    pub flags: Flags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub origin_url: String,
    pub origin_api_key: String,
    pub destination_url: String,
    pub destination_api_key: String,
    #[serde(default = "default_true")]
    pub preserve_invite_links: bool,
    pub destination_admin_user_id: Id,
}

fn default_true() -> bool {
    true
}

/// Destination identity of an origin user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: Id,
    pub email: String,
    #[serde(default)]
    pub invite_link: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flags {
    #[serde(default)]
    pub viz_import_complete: BTreeMap<Id, bool>,
    /// Groups whose members and data sources were all replayed.
    #[serde(default)]
    pub group_sync_complete: BTreeMap<Id, bool>,
}

impl Ledger {
    pub fn viz_import_complete(&self, origin_query_id: Id) -> bool {
        self.flags
            .viz_import_complete
            .get(&origin_query_id)
            .copied()
            .unwrap_or(false)
    }

    pub fn group_sync_complete(&self, origin_group_id: Id) -> bool {
        self.flags
            .group_sync_complete
            .get(&origin_group_id)
            .copied()
            .unwrap_or(false)
    }
}

/// Everything `init` needs to seed a fresh ledger.
#[derive(Debug, Clone)]
pub struct InitSettings {
    pub origin_url: String,
    pub origin_api_key: String,
    pub origin_admin_user_id: Id,
    pub destination_url: String,
    pub destination_api_key: String,
    pub destination_admin_user_id: Id,
    pub destination_admin_email: String,
    pub preserve_invite_links: bool,
}

/// The ledger file in the working directory.
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub const DEFAULT_FILE: &'static str = "meta.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create a fresh ledger. Fails if one already exists.
    pub fn init(&self, settings: InitSettings) -> Result<Ledger> {
        if self.exists() {
            return Err(MigrateError::AlreadyInitialized(
                self.path.display().to_string(),
            ));
        }

        let mut ledger = Ledger {
            settings: Settings {
                origin_url: trim_base_url(&settings.origin_url),
                origin_api_key: settings.origin_api_key.trim().to_string(),
                destination_url: trim_base_url(&settings.destination_url),
                destination_api_key: settings.destination_api_key.trim().to_string(),
                preserve_invite_links: settings.preserve_invite_links,
                destination_admin_user_id: settings.destination_admin_user_id,
            },
            ..Ledger::default()
        };
        ledger.users.insert(
            settings.origin_admin_user_id,
            UserEntry {
                id: settings.destination_admin_user_id,
                email: settings.destination_admin_email.trim().to_string(),
                ..UserEntry::default()
            },
        );

        self.save(&ledger)?;
        Ok(ledger)
    }

    pub fn load(&self) -> Result<Ledger> {
        if !self.exists() {
            return Err(MigrateError::NotInitialized(
                self.path.display().to_string(),
            ));
        }
        let data = fs::read_to_string(&self.path)?;
        parse_ledger(&data)
    }

    /// Replace the ledger file as a whole via a temporary file and a rename.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let json = serde_json::to_string_pretty(ledger)?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| Self::DEFAULT_FILE.to_string());
        let staging = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        if let Err(err) = fs::write(&staging, json) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        Ok(())
    }

    /// Take the exclusive `<ledger>.lock` held while a phase runs.
    pub fn lock(&self) -> Result<LedgerLock> {
        let mut lock_name = self.path.as_os_str().to_owned();
        lock_name.push(".lock");
        let lock_path = PathBuf::from(lock_name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        file.try_lock_exclusive()
            .map_err(|_| MigrateError::Locked(lock_path.display().to_string()))?;
        Ok(LedgerLock { _file: file })
    }
}

/// Released when dropped. The lock file itself stays behind.
#[derive(Debug)]
pub struct LedgerLock {
    _file: File,
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Parse a persisted ledger, normalizing text keys back to numeric ids first.
pub fn parse_ledger(data: &str) -> Result<Ledger> {
    let mut value: Value =
        serde_json::from_str(data).map_err(|e| MigrateError::CorruptLedger(e.to_string()))?;
    normalize(&mut value)?;
    serde_json::from_value(value).map_err(|e| MigrateError::CorruptLedger(e.to_string()))
}

/// Rewrite every id-keyed map to canonical decimal keys and numeric values.
pub fn normalize(value: &mut Value) -> Result<()> {
    let Some(root) = value.as_object_mut() else {
        return Err(MigrateError::CorruptLedger(
            "top level is not an object".into(),
        ));
    };

    for field in ID_TO_ID_MAPS {
        if let Some(map) = id_keyed_map(root, field)? {
            for (key, entry) in map.iter_mut() {
                *entry = canonical_id_value(entry, &format!("{field}[{key}]"))?;
            }
        }
    }

    if let Some(users) = id_keyed_map(root, "users")? {
        for (key, entry) in users.iter_mut() {
            let Some(user) = entry.as_object_mut() else {
                return Err(MigrateError::CorruptLedger(format!(
                    "users[{key}] is not an object"
                )));
            };
            if let Some(id) = user.get_mut("id") {
                *id = canonical_id_value(id, &format!("users[{key}].id"))?;
            }
        }
    }

    if let Some(flags) = root.get_mut("flags").and_then(Value::as_object_mut) {
        id_keyed_map(flags, "viz_import_complete")?;
        id_keyed_map(flags, "group_sync_complete")?;
    }

    for field in ID_SETS {
        match root.remove(field) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                let items = items
                    .iter()
                    .map(|item| canonical_id_value(item, field))
                    .collect::<Result<Vec<_>>>()?;
                root.insert(field.to_string(), Value::Array(items));
            }
            Some(_) => {
                return Err(MigrateError::CorruptLedger(format!(
                    "{field} is not a list"
                )));
            }
        }
    }

    Ok(())
}

/// Re-key `root[field]` by canonical decimal ids. Absent or null maps are dropped.
fn id_keyed_map<'a>(
    root: &'a mut Map<String, Value>,
    field: &str,
) -> Result<Option<&'a mut Map<String, Value>>> {
    let original = match root.remove(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(MigrateError::CorruptLedger(format!(
                "{field} is not a mapping"
            )));
        }
    };
    let mut canonical = Map::with_capacity(original.len());
    for (key, entry) in original {
        let id: Id = key.trim().parse().map_err(|_| {
            MigrateError::CorruptLedger(format!("{field}: key {key:?} is not a numeric id"))
        })?;
        if canonical.insert(id.to_string(), entry).is_some() {
            return Err(MigrateError::CorruptLedger(format!(
                "{field}: id {id} appears more than once"
            )));
        }
    }
    root.insert(field.to_string(), Value::Object(canonical));
    Ok(root.get_mut(field).and_then(Value::as_object_mut))
}

fn canonical_id_value(value: &Value, at: &str) -> Result<Value> {
    id_from_json(value)
        .map(Value::from)
        .ok_or_else(|| MigrateError::CorruptLedger(format!("{at} is not a numeric id: {value}")))
}

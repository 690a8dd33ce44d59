use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Numeric identifier of a remote object.
pub type Id = u64;

/// The two groups every instance creates on its own.
pub const BUILTIN_GROUPS: [&str; 2] = ["admin", "default"];

/// Type name of the data source that reads other queries' results.
pub const QUERY_RESULTS_TYPE: &str = "results";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_link: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub options: Value,
    /// Only present in a group's data source listing.
    #[serde(default)]
    pub view_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewDataSource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Id,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Group {
    pub fn is_builtin(&self) -> bool {
        BUILTIN_GROUPS.contains(&self.name.as_str())
    }
}

/// An alert destination (email, Slack, webhook, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewDestination {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub data_source_id: Option<Id>,
    #[serde(default)]
    pub user: Option<ObjectRef>,
    #[serde(default)]
    pub user_id: Option<Id>,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub schedule: Option<Value>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visualizations: Vec<Visualization>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Query {
    pub fn owner(&self) -> Option<Id> {
        self.user.map(|u| u.id).or(self.user_id)
    }

    /// Ids of other queries referenced by dropdown-list parameters.
    pub fn parameter_query_refs(&self) -> Vec<Id> {
        parameters(&self.options)
            .filter_map(|p| p.get("queryId").and_then(id_from_json))
            .collect()
    }
}

fn parameters(options: &Value) -> impl Iterator<Item = &Value> {
    options
        .get("parameters")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[derive(Debug, Clone, Serialize)]
pub struct NewQuery {
    pub data_source_id: Id,
    pub query: String,
    pub name: String,
    pub description: Option<String>,
    pub schedule: Option<Value>,
    pub options: Value,
    pub tags: Vec<String>,
    pub is_archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub id: Id,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Value,
}

impl Visualization {
    pub const TABLE: &'static str = "TABLE";

    pub fn is_table(&self) -> bool {
        self.kind == Self::TABLE
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewVisualization {
    pub query_id: Id,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: Option<String>,
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: Id,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: Option<ObjectRef>,
    #[serde(default)]
    pub user_id: Option<Id>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub dashboard_filters_enabled: bool,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Dashboard {
    pub fn owner(&self) -> Option<Id> {
        self.user.map(|u| u.id).or(self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: Id,
    #[serde(default = "default_widget_width")]
    pub width: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub visualization: Option<Visualization>,
}

fn default_widget_width() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct NewWidget {
    pub dashboard_id: Id,
    pub visualization_id: Option<Id>,
    pub text: String,
    pub options: Value,
    pub width: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub query: Option<ObjectRef>,
    #[serde(default)]
    pub rearm: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAlert {
    pub name: String,
    pub query_id: Id,
    pub options: Value,
}

/// A subscription is bound either to an alert destination or to the subscribing user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Id,
    #[serde(default)]
    pub user: Option<ObjectRef>,
    #[serde(default)]
    pub destination: Option<ObjectRef>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u64,
    pub page_size: u64,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_draft: Option<bool>,
}

impl QueryUpdate {
    pub fn publish() -> Self {
        Self {
            is_draft: Some(false),
            ..Self::default()
        }
    }

    pub fn text(query: String) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisualizationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl VisualizationUpdate {
    /// Mirror the presentation of `source`.
    pub fn mirroring(source: &Visualization) -> Self {
        Self {
            name: Some(source.name.clone()),
            description: source.description.clone(),
            options: Some(source.options.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_draft: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_filters_enabled: Option<bool>,
}

impl DashboardUpdate {
    pub fn merge(self, other: Self) -> Self {
        Self {
            is_draft: other.is_draft.or(self.is_draft),
            tags: other.tags.or(self.tags),
            dashboard_filters_enabled: other
                .dashboard_filters_enabled
                .or(self.dashboard_filters_enabled),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rearm: Option<i64>,
}

/// Objects listed in creation order before they are replayed.
pub trait Created {
    fn created_at(&self) -> Option<DateTime<Utc>>;
}

macro_rules! impl_created {
    ($($ty:ty),*) => {
        $(impl Created for $ty {
            fn created_at(&self) -> Option<DateTime<Utc>> {
                self.created_at
            }
        })*
    };
}

impl_created!(User, Query, Dashboard, Alert);

/// Stable sort by creation time; objects without a timestamp go first.
pub fn sort_by_creation<T: Created>(items: &mut [T]) {
    items.sort_by_key(|item| item.created_at());
}

/// Read an id that may have been serialized as a number or a numeric string.
pub fn id_from_json(value: &Value) -> Option<Id> {
    match value {
        Value::Number(num) => num.as_u64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

/// Legacy schedules are a bare interval in seconds or a `HH:MM` daily time.
pub fn convert_schedule(schedule: Option<Value>) -> Option<Value> {
    let raw = match schedule? {
        Value::Null => return None,
        Value::String(raw) => raw,
        Value::Number(num) => num.to_string(),
        other => return Some(other),
    };

    let (interval, time) = if raw.contains(':') {
        (Value::from(86400), Value::String(raw))
    } else {
        let interval = raw
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or(Value::String(raw));
        (interval, Value::Null)
    };

    Some(serde_json::json!({
        "interval": interval,
        "until": null,
        "day_of_week": null,
        "time": time,
    }))
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept RFC 3339 timestamps and naive ones (read as UTC); anything else is dropped.
fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}

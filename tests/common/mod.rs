#![allow(dead_code)]

//! In-memory stand-in for a service instance.
//!
//! Every client acts as the user owning the API key it was connected with,
//! so tests can check who created what. Destination ids start high so an
//! origin id leaking through unmapped is easy to spot.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use serde_json::{Value, json};
use tempfile::TempDir;

use redash_migrate::error::{MigrateError, Result};
use redash_migrate::model::{
    Alert, AlertUpdate, Dashboard, DashboardUpdate, DataSource, DataSourceType, Destination,
    Group, Id, NewAlert, NewDataSource, NewDestination, NewQuery, NewUser, NewVisualization,
    NewWidget, ObjectRef, Query, QueryUpdate, Subscription, User, Visualization,
    VisualizationUpdate, Widget,
};
use redash_migrate::service::{Connect, Service};
use redash_migrate::store::ledger::{InitSettings, LedgerStore};

pub const ORIGIN_URL: &str = "https://origin.test";
pub const DESTINATION_URL: &str = "https://destination.test";

#[derive(Default)]
pub struct State {
    pub next_id: Id,
    pub users: BTreeMap<Id, User>,
    pub data_source_types: Vec<String>,
    pub data_sources: BTreeMap<Id, DataSource>,
    pub destinations: BTreeMap<Id, Destination>,
    pub groups: BTreeMap<Id, Group>,
    pub group_members: BTreeMap<Id, BTreeSet<Id>>,
    /// Group id to data source id to view-only flag.
    pub group_data_sources: BTreeMap<Id, BTreeMap<Id, bool>>,
    pub queries: BTreeMap<Id, Query>,
    pub dashboards: BTreeMap<Id, Dashboard>,
    pub alerts: BTreeMap<Id, Alert>,
    pub subscriptions: BTreeMap<Id, Vec<Subscription>>,
    pub favorite_queries: BTreeMap<Id, BTreeSet<Id>>,
    pub favorite_dashboards: BTreeMap<Id, BTreeSet<Id>>,
    pub disabled_calls: Vec<Id>,
    /// Operation name to the number of calls that still succeed.
    pub fail_after: HashMap<&'static str, usize>,
}

impl State {
    fn allocate(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn check(&mut self, op: &'static str) -> Result<()> {
        match self.fail_after.get_mut(op) {
            Some(0) => Err(http_error("POST", op, 500)),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn http_error(method: &str, url: &str, status: u16) -> MigrateError {
    MigrateError::Http {
        method: method.into(),
        url: url.into(),
        status,
        body: String::new(),
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> MigrateError {
    http_error("GET", &format!("{what}/{id}"), 404)
}

/// One fake instance; cheap to clone, all clones share state.
#[derive(Clone)]
pub struct FakeInstance {
    pub base_url: String,
    state: Rc<RefCell<State>>,
}

impl FakeInstance {
    pub fn new(base_url: &str, first_id: Id) -> Self {
        let state = State {
            next_id: first_id,
            data_source_types: vec!["pg".into(), "mysql".into(), "csv".into(), "results".into()],
            ..State::default()
        };
        Self {
            base_url: base_url.into(),
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn state(&self) -> Ref<'_, State> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, State> {
        self.state.borrow_mut()
    }

    pub fn api_key(&self, user_id: Id) -> String {
        format!("{}#{user_id}", self.base_url)
    }

    pub fn add_user(&self, id: Id, name: &str, email: &str) {
        let user = User {
            id,
            name: name.into(),
            email: email.into(),
            is_disabled: false,
            api_key: Some(self.api_key(id)),
            invite_link: None,
            created_at: Some(format!("2021-01-01T00:00:{:02}Z", id % 60).parse().unwrap()),
        };
        self.state_mut().users.insert(id, user);
    }

    pub fn disable(&self, id: Id) {
        self.state_mut().users.get_mut(&id).unwrap().is_disabled = true;
    }

    pub fn add_data_source(&self, id: Id, name: &str, kind: &str) {
        self.state_mut().data_sources.insert(
            id,
            DataSource {
                id,
                name: name.into(),
                kind: kind.into(),
                options: json!({"host": "db.internal"}),
                view_only: false,
            },
        );
    }

    pub fn put_query(&self, query: Query) {
        self.state_mut().queries.insert(query.id, query);
    }

    pub fn put_dashboard(&self, dashboard: Dashboard) {
        self.state_mut().dashboards.insert(dashboard.id, dashboard);
    }

    pub fn query(&self, id: Id) -> Query {
        self.state().queries[&id].clone()
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let state = self.state();
        let visualizations = state.queries.values().map(|q| q.visualizations.len()).sum();
        (
            state.users.len(),
            state.queries.len(),
            visualizations,
            state.dashboards.len(),
        )
    }

    pub fn dashboard_by_slug(&self, slug: &str) -> Dashboard {
        self.state()
            .dashboards
            .values()
            .find(|d| d.slug == slug)
            .cloned()
            .unwrap()
    }

    fn client(&self, user: Id) -> FakeClient {
        FakeClient {
            base_url: self.base_url.clone(),
            state: Rc::clone(&self.state),
            user,
        }
    }
}

/// A query as the origin lists it.
pub fn query(id: Id, owner: Id, data_source: Id, text: &str) -> Query {
    Query {
        id,
        name: format!("Query {id}"),
        description: None,
        query: text.into(),
        data_source_id: Some(data_source),
        user: Some(ObjectRef { id: owner }),
        user_id: None,
        options: json!({"parameters": []}),
        schedule: None,
        is_draft: false,
        is_archived: false,
        tags: vec![],
        visualizations: vec![],
        created_at: Some(format!("2021-02-01T00:00:{:02}Z", id % 60).parse().unwrap()),
    }
}

pub fn visualization(id: Id, kind: &str, name: &str) -> Visualization {
    Visualization {
        id,
        kind: kind.into(),
        name: name.into(),
        description: None,
        options: json!({"origin": id}),
    }
}

pub fn dashboard(id: Id, slug: &str, owner: Id, widgets: Vec<Widget>) -> Dashboard {
    Dashboard {
        id,
        slug: slug.into(),
        name: slug.into(),
        user: Some(ObjectRef { id: owner }),
        user_id: None,
        is_draft: false,
        tags: vec![],
        widgets,
        dashboard_filters_enabled: false,
        created_at: None,
    }
}

pub fn widget(id: Id, visualization: Option<Visualization>, text: &str) -> Widget {
    Widget {
        id,
        width: 1,
        text: text.into(),
        options: json!({"position": {"col": 0}}),
        visualization,
    }
}

fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

pub struct FakeClient {
    base_url: String,
    state: Rc<RefCell<State>>,
    user: Id,
}

impl FakeClient {
    fn st(&self) -> RefMut<'_, State> {
        self.state.borrow_mut()
    }
}

impl Service for FakeClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn users(&self, disabled: bool) -> Result<Vec<User>> {
        let mut st = self.st();
        st.check("users")?;
        Ok(st
            .users
            .values()
            .filter(|u| u.is_disabled == disabled)
            .cloned()
            .collect())
    }

    fn user(&self, id: Id) -> Result<User> {
        self.st().users.get(&id).cloned().ok_or_else(|| not_found("api/users", id))
    }

    fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut st = self.st();
        st.check("create_user")?;
        if st.users.values().any(|u| u.email == user.email) {
            return Err(http_error("POST", "api/users", 400));
        }
        let id = st.allocate();
        let created = User {
            id,
            name: user.name.clone(),
            email: user.email.clone(),
            is_disabled: false,
            api_key: Some(format!("{}#{id}", self.base_url)),
            invite_link: Some(format!("{}/invite/{id}", self.base_url)),
            created_at: None,
        };
        st.users.insert(id, created.clone());
        Ok(created)
    }

    fn disable_user(&self, id: Id) -> Result<()> {
        let mut st = self.st();
        st.disabled_calls.push(id);
        let user = st.users.get_mut(&id).ok_or_else(|| not_found("api/users", id))?;
        user.is_disabled = true;
        Ok(())
    }

    fn data_sources(&self) -> Result<Vec<DataSource>> {
        Ok(self.st().data_sources.values().cloned().collect())
    }

    fn data_source(&self, id: Id) -> Result<DataSource> {
        self.st()
            .data_sources
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("api/data_sources", id))
    }

    fn data_source_types(&self) -> Result<Vec<DataSourceType>> {
        Ok(self
            .st()
            .data_source_types
            .iter()
            .map(|kind| DataSourceType {
                kind: kind.clone(),
                name: kind.clone(),
            })
            .collect())
    }

    fn create_data_source(&self, data_source: &NewDataSource) -> Result<DataSource> {
        let mut st = self.st();
        let id = st.allocate();
        let created = DataSource {
            id,
            name: data_source.name.clone(),
            kind: data_source.kind.clone(),
            options: data_source.options.clone(),
            view_only: false,
        };
        st.data_sources.insert(id, created.clone());
        Ok(created)
    }

    fn destinations(&self) -> Result<Vec<Destination>> {
        Ok(self.st().destinations.values().cloned().collect())
    }

    fn destination(&self, id: Id) -> Result<Destination> {
        self.st()
            .destinations
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("api/destinations", id))
    }

    fn create_destination(&self, destination: &NewDestination) -> Result<Destination> {
        let mut st = self.st();
        let id = st.allocate();
        let created = Destination {
            id,
            name: destination.name.clone(),
            kind: destination.kind.clone(),
            options: destination.options.clone(),
        };
        st.destinations.insert(id, created.clone());
        Ok(created)
    }

    fn groups(&self) -> Result<Vec<Group>> {
        Ok(self.st().groups.values().cloned().collect())
    }

    fn group_members(&self, group_id: Id) -> Result<Vec<User>> {
        let st = self.st();
        let members = st.group_members.get(&group_id).cloned().unwrap_or_default();
        Ok(members
            .iter()
            .filter_map(|id| st.users.get(id).cloned())
            .collect())
    }

    fn group_data_sources(&self, group_id: Id) -> Result<Vec<DataSource>> {
        let st = self.st();
        let sources = st
            .group_data_sources
            .get(&group_id)
            .cloned()
            .unwrap_or_default();
        Ok(sources
            .iter()
            .filter_map(|(id, &view_only)| {
                st.data_sources.get(id).map(|ds| DataSource {
                    view_only,
                    ..ds.clone()
                })
            })
            .collect())
    }

    fn create_group(&self, name: &str) -> Result<Group> {
        let mut st = self.st();
        let id = st.allocate();
        let group = Group {
            id,
            name: name.into(),
            kind: "regular".into(),
        };
        st.groups.insert(id, group.clone());
        Ok(group)
    }

    fn add_group_member(&self, group_id: Id, user_id: Id) -> Result<()> {
        let mut st = self.st();
        st.check("add_group_member")?;
        st.group_members
            .entry(group_id)
            .or_default()
            .insert(user_id);
        Ok(())
    }

    fn remove_group_member(&self, group_id: Id, user_id: Id) -> Result<()> {
        if let Some(members) = self.st().group_members.get_mut(&group_id) {
            members.remove(&user_id);
        }
        Ok(())
    }

    fn add_group_data_source(&self, group_id: Id, data_source_id: Id) -> Result<()> {
        self.st()
            .group_data_sources
            .entry(group_id)
            .or_default()
            .insert(data_source_id, false);
        Ok(())
    }

    fn set_group_data_source_view_only(
        &self,
        group_id: Id,
        data_source_id: Id,
        view_only: bool,
    ) -> Result<()> {
        self.st()
            .group_data_sources
            .entry(group_id)
            .or_default()
            .insert(data_source_id, view_only);
        Ok(())
    }

    fn remove_group_data_source(&self, group_id: Id, data_source_id: Id) -> Result<()> {
        if let Some(sources) = self.st().group_data_sources.get_mut(&group_id) {
            sources.remove(&data_source_id);
        }
        Ok(())
    }

    fn queries(&self) -> Result<Vec<Query>> {
        let mut st = self.st();
        st.check("queries")?;
        Ok(st
            .queries
            .values()
            .map(|q| Query {
                visualizations: vec![],
                ..q.clone()
            })
            .collect())
    }

    fn query(&self, id: Id) -> Result<Query> {
        self.st()
            .queries
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("api/queries", id))
    }

    fn create_query(&self, query: &NewQuery) -> Result<Query> {
        let mut st = self.st();
        st.check("create_query")?;
        if !st.data_sources.contains_key(&query.data_source_id) {
            return Err(http_error("POST", "api/queries", 400));
        }
        let id = st.allocate();
        let table = st.allocate();
        let created = Query {
            id,
            name: query.name.clone(),
            description: query.description.clone(),
            query: query.query.clone(),
            data_source_id: Some(query.data_source_id),
            user: Some(ObjectRef { id: self.user }),
            user_id: None,
            options: query.options.clone(),
            schedule: query.schedule.clone(),
            is_draft: true,
            is_archived: query.is_archived,
            tags: query.tags.clone(),
            visualizations: vec![Visualization {
                id: table,
                kind: Visualization::TABLE.into(),
                name: "Table".into(),
                description: None,
                options: json!({}),
            }],
            created_at: None,
        };
        st.queries.insert(id, created.clone());
        Ok(created)
    }

    fn update_query(&self, id: Id, update: &QueryUpdate) -> Result<Query> {
        let mut st = self.st();
        let query = st
            .queries
            .get_mut(&id)
            .ok_or_else(|| not_found("api/queries", id))?;
        if let Some(ref text) = update.query {
            query.query = text.clone();
        }
        if let Some(is_draft) = update.is_draft {
            query.is_draft = is_draft;
        }
        Ok(query.clone())
    }

    fn favorite_queries(&self) -> Result<Vec<Query>> {
        let st = self.st();
        let ids = st.favorite_queries.get(&self.user).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| st.queries.get(id).cloned()).collect())
    }

    fn favorite_query(&self, id: Id) -> Result<()> {
        let mut st = self.st();
        if !st.queries.contains_key(&id) {
            return Err(not_found("api/queries", id));
        }
        st.favorite_queries.entry(self.user).or_default().insert(id);
        Ok(())
    }

    fn create_visualization(&self, visualization: &NewVisualization) -> Result<Visualization> {
        let mut st = self.st();
        let id = st.allocate();
        let created = Visualization {
            id,
            kind: visualization.kind.clone(),
            name: visualization.name.clone(),
            description: visualization.description.clone(),
            options: visualization.options.clone(),
        };
        st.queries
            .get_mut(&visualization.query_id)
            .ok_or_else(|| not_found("api/queries", visualization.query_id))?
            .visualizations
            .push(created.clone());
        Ok(created)
    }

    fn update_visualization(
        &self,
        id: Id,
        update: &VisualizationUpdate,
    ) -> Result<Visualization> {
        let mut st = self.st();
        let viz = st
            .queries
            .values_mut()
            .flat_map(|q| q.visualizations.iter_mut())
            .find(|v| v.id == id)
            .ok_or_else(|| not_found("api/visualizations", id))?;
        if let Some(ref name) = update.name {
            viz.name = name.clone();
        }
        if update.description.is_some() {
            viz.description = update.description.clone();
        }
        if let Some(ref options) = update.options {
            viz.options = options.clone();
        }
        Ok(viz.clone())
    }

    fn dashboards(&self) -> Result<Vec<Dashboard>> {
        Ok(self
            .st()
            .dashboards
            .values()
            .map(|d| Dashboard {
                widgets: vec![],
                ..d.clone()
            })
            .collect())
    }

    fn dashboard(&self, slug: &str) -> Result<Dashboard> {
        self.st()
            .dashboards
            .values()
            .find(|d| d.slug == slug)
            .cloned()
            .ok_or_else(|| not_found("api/dashboards", slug))
    }

    fn create_dashboard(&self, name: &str) -> Result<Dashboard> {
        let mut st = self.st();
        let id = st.allocate();
        let mut slug = slugify(name);
        if st.dashboards.values().any(|d| d.slug == slug) {
            slug = format!("{slug}_{id}");
        }
        let created = Dashboard {
            id,
            slug,
            name: name.into(),
            user: Some(ObjectRef { id: self.user }),
            user_id: None,
            is_draft: true,
            tags: vec![],
            widgets: vec![],
            dashboard_filters_enabled: false,
            created_at: None,
        };
        st.dashboards.insert(id, created.clone());
        Ok(created)
    }

    fn update_dashboard(&self, id: Id, update: &DashboardUpdate) -> Result<Dashboard> {
        let mut st = self.st();
        st.check("update_dashboard")?;
        let dashboard = st
            .dashboards
            .get_mut(&id)
            .ok_or_else(|| not_found("api/dashboards", id))?;
        if let Some(is_draft) = update.is_draft {
            dashboard.is_draft = is_draft;
        }
        if let Some(ref tags) = update.tags {
            dashboard.tags = tags.clone();
        }
        if let Some(enabled) = update.dashboard_filters_enabled {
            dashboard.dashboard_filters_enabled = enabled;
        }
        Ok(dashboard.clone())
    }

    fn favorite_dashboards(&self) -> Result<Vec<Dashboard>> {
        let st = self.st();
        let ids = st
            .favorite_dashboards
            .get(&self.user)
            .cloned()
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| st.dashboards.get(id).cloned())
            .collect())
    }

    fn favorite_dashboard(&self, id: Id) -> Result<()> {
        let mut st = self.st();
        if !st.dashboards.contains_key(&id) {
            return Err(not_found("api/dashboards", id));
        }
        st.favorite_dashboards.entry(self.user).or_default().insert(id);
        Ok(())
    }

    fn create_widget(&self, widget: &NewWidget) -> Result<Widget> {
        let mut st = self.st();
        let id = st.allocate();
        let visualization = match widget.visualization_id {
            Some(viz_id) => Some(
                st.queries
                    .values()
                    .flat_map(|q| q.visualizations.iter())
                    .find(|v| v.id == viz_id)
                    .cloned()
                    .ok_or_else(|| http_error("POST", "api/widgets", 400))?,
            ),
            None => None,
        };
        let created = Widget {
            id,
            width: widget.width,
            text: widget.text.clone(),
            options: widget.options.clone(),
            visualization,
        };
        st.dashboards
            .get_mut(&widget.dashboard_id)
            .ok_or_else(|| not_found("api/dashboards", widget.dashboard_id))?
            .widgets
            .push(created.clone());
        Ok(created)
    }

    fn alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.st().alerts.values().cloned().collect())
    }

    fn alert(&self, id: Id) -> Result<Alert> {
        self.st()
            .alerts
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("api/alerts", id))
    }

    fn create_alert(&self, alert: &NewAlert) -> Result<Alert> {
        let mut st = self.st();
        if !st.queries.contains_key(&alert.query_id) {
            return Err(http_error("POST", "api/alerts", 400));
        }
        let id = st.allocate();
        let created = Alert {
            id,
            name: alert.name.clone(),
            options: alert.options.clone(),
            query: Some(ObjectRef { id: alert.query_id }),
            rearm: None,
            created_at: None,
        };
        st.alerts.insert(id, created.clone());
        Ok(created)
    }

    fn update_alert(&self, id: Id, update: &AlertUpdate) -> Result<Alert> {
        let mut st = self.st();
        let alert = st
            .alerts
            .get_mut(&id)
            .ok_or_else(|| not_found("api/alerts", id))?;
        if update.rearm.is_some() {
            alert.rearm = update.rearm;
        }
        Ok(alert.clone())
    }

    fn alert_subscriptions(&self, alert_id: Id) -> Result<Vec<Subscription>> {
        Ok(self
            .st()
            .subscriptions
            .get(&alert_id)
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe_alert(&self, alert_id: Id, destination_id: Option<Id>) -> Result<Subscription> {
        let mut st = self.st();
        let id = st.allocate();
        let subscription = Subscription {
            id,
            user: Some(ObjectRef { id: self.user }),
            destination: destination_id.map(|id| ObjectRef { id }),
        };
        st.subscriptions
            .entry(alert_id)
            .or_default()
            .push(subscription.clone());
        Ok(subscription)
    }
}

/// Resolves base URLs and API keys to clients of the fake instances.
pub struct FakeConnector {
    pub instances: Vec<FakeInstance>,
}

impl Connect for FakeConnector {
    fn connect(&self, base_url: &str, api_key: &str) -> Result<Box<dyn Service>> {
        let instance = self
            .instances
            .iter()
            .find(|i| i.base_url == base_url)
            .ok_or_else(|| MigrateError::InvalidInput(format!("no instance at {base_url}")))?;
        let user = instance
            .state()
            .users
            .values()
            .find(|u| u.api_key.as_deref() == Some(api_key))
            .map(|u| u.id)
            .ok_or_else(|| http_error("GET", base_url, 403))?;
        Ok(Box::new(instance.client(user)))
    }
}

/// An origin with admin `1` and a destination with admin `10`, plus a ledger tying them.
pub struct Harness {
    pub dir: TempDir,
    pub origin: FakeInstance,
    pub destination: FakeInstance,
    pub store: LedgerStore,
}

impl Harness {
    pub fn new() -> Self {
        let origin = FakeInstance::new(ORIGIN_URL, 5000);
        origin.add_user(1, "Admin", "admin@example.com");
        let destination = FakeInstance::new(DESTINATION_URL, 1000);
        destination.add_user(10, "Admin", "admin@example.com");

        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("meta.json"));
        store
            .init(InitSettings {
                origin_url: ORIGIN_URL.into(),
                origin_api_key: origin.api_key(1),
                origin_admin_user_id: 1,
                destination_url: DESTINATION_URL.into(),
                destination_api_key: destination.api_key(10),
                destination_admin_user_id: 10,
                destination_admin_email: "admin@example.com".into(),
                preserve_invite_links: true,
            })
            .unwrap();

        Self {
            dir,
            origin,
            destination,
            store,
        }
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            instances: vec![self.origin.clone(), self.destination.clone()],
        }
    }

    pub fn run(&self, phase: &str) -> redash_migrate::output::PhaseOutcome {
        redash_migrate::driver::run(phase.parse().unwrap(), &self.store, &self.connector())
            .unwrap()
    }

    /// Map origin data source `origin` to a fresh destination one.
    pub fn map_data_source(&self, origin: Id, kind: &str) -> Id {
        self.origin.add_data_source(origin, "warehouse", kind);
        let dest = origin * 10;
        self.destination.add_data_source(dest, "warehouse", kind);
        let mut ledger = self.store.load().unwrap();
        ledger.data_sources.insert(origin, dest);
        self.store.save(&ledger).unwrap();
        dest
    }
}

pub fn parameter_ref(query_id: Id) -> Value {
    json!({"parameters": [{"name": "pick", "type": "query", "queryId": query_id}]})
}

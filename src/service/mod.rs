//! Typed access to one service instance.
//!
//! Importers only see the [`Service`] trait. [`HttpService`] talks to a live
//! instance; any other implementation (an in-memory fake in tests, say) can
//! stand in for it. Impersonation is expressed through [`Connect`]: a client
//! scoped to a user's own API key acts as that user.

pub mod http;

pub use http::{HttpConnector, HttpService};

use crate::error::Result;
use crate::model::{
    Alert, AlertUpdate, Dashboard, DashboardUpdate, DataSource, DataSourceType, Destination,
    Group, Id, NewAlert, NewDataSource, NewDestination, NewQuery, NewUser, NewVisualization,
    NewWidget, Page, Query, QueryUpdate, Subscription, User, Visualization, VisualizationUpdate,
    Widget,
};

/// Page size used for every paginated listing.
pub const PAGE_SIZE: u64 = 100;

pub trait Service {
    /// Base URL of the instance this client talks to.
    fn base_url(&self) -> &str;

    fn users(&self, disabled: bool) -> Result<Vec<User>>;
    /// Full user record; includes the API key when the caller is an admin.
    fn user(&self, id: Id) -> Result<User>;
    /// Create a user without sending an invitation email.
    fn create_user(&self, user: &NewUser) -> Result<User>;
    fn disable_user(&self, id: Id) -> Result<()>;

    fn data_sources(&self) -> Result<Vec<DataSource>>;
    fn data_source(&self, id: Id) -> Result<DataSource>;
    fn data_source_types(&self) -> Result<Vec<DataSourceType>>;
    fn create_data_source(&self, data_source: &NewDataSource) -> Result<DataSource>;

    fn destinations(&self) -> Result<Vec<Destination>>;
    fn destination(&self, id: Id) -> Result<Destination>;
    fn create_destination(&self, destination: &NewDestination) -> Result<Destination>;

    fn groups(&self) -> Result<Vec<Group>>;
    fn group_members(&self, group_id: Id) -> Result<Vec<User>>;
    fn group_data_sources(&self, group_id: Id) -> Result<Vec<DataSource>>;
    fn create_group(&self, name: &str) -> Result<Group>;
    fn add_group_member(&self, group_id: Id, user_id: Id) -> Result<()>;
    fn remove_group_member(&self, group_id: Id, user_id: Id) -> Result<()>;
    fn add_group_data_source(&self, group_id: Id, data_source_id: Id) -> Result<()>;
    fn set_group_data_source_view_only(
        &self,
        group_id: Id,
        data_source_id: Id,
        view_only: bool,
    ) -> Result<()>;
    fn remove_group_data_source(&self, group_id: Id, data_source_id: Id) -> Result<()>;

    fn queries(&self) -> Result<Vec<Query>>;
    fn query(&self, id: Id) -> Result<Query>;
    fn create_query(&self, query: &NewQuery) -> Result<Query>;
    fn update_query(&self, id: Id, update: &QueryUpdate) -> Result<Query>;
    /// Queries favorited by the calling user.
    fn favorite_queries(&self) -> Result<Vec<Query>>;
    fn favorite_query(&self, id: Id) -> Result<()>;

    fn create_visualization(&self, visualization: &NewVisualization) -> Result<Visualization>;
    fn update_visualization(&self, id: Id, update: &VisualizationUpdate)
    -> Result<Visualization>;

    fn dashboards(&self) -> Result<Vec<Dashboard>>;
    fn dashboard(&self, slug: &str) -> Result<Dashboard>;
    fn create_dashboard(&self, name: &str) -> Result<Dashboard>;
    fn update_dashboard(&self, id: Id, update: &DashboardUpdate) -> Result<Dashboard>;
    /// Dashboards favorited by the calling user.
    fn favorite_dashboards(&self) -> Result<Vec<Dashboard>>;
    fn favorite_dashboard(&self, id: Id) -> Result<()>;
    fn create_widget(&self, widget: &NewWidget) -> Result<Widget>;

    fn alerts(&self) -> Result<Vec<Alert>>;
    fn alert(&self, id: Id) -> Result<Alert>;
    fn create_alert(&self, alert: &NewAlert) -> Result<Alert>;
    fn update_alert(&self, id: Id, update: &AlertUpdate) -> Result<Alert>;
    fn alert_subscriptions(&self, alert_id: Id) -> Result<Vec<Subscription>>;
    /// Subscribe to an alert, either through a destination or as the calling user.
    fn subscribe_alert(&self, alert_id: Id, destination_id: Option<Id>) -> Result<Subscription>;
}

/// Builds a client acting with a given API key.
pub trait Connect {
    fn connect(&self, base_url: &str, api_key: &str) -> Result<Box<dyn Service>>;
}

/// Whether `page` is the last page of a listing of `count` items.
pub fn is_last_page(page: u64, page_size: u64, count: u64) -> bool {
    page * page_size >= count
}

/// Accumulate a paginated listing with an explicit loop.
///
/// `fetch(page, page_size)` is called with pages starting at 1 until the
/// reported count is covered or a page comes back empty.
pub fn collect_pages<T, F>(page_size: u64, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u64, u64) -> Result<Page<T>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let response = fetch(page, page_size)?;
        let exhausted = response.results.is_empty();
        items.extend(response.results);
        if exhausted || is_last_page(response.page, response.page_size, response.count) {
            return Ok(items);
        }
        page += 1;
    }
}

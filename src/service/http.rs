use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::model::{
    Alert, AlertUpdate, Dashboard, DashboardUpdate, DataSource, DataSourceType, Destination,
    Group, Id, NewAlert, NewDataSource, NewDestination, NewQuery, NewUser, NewVisualization,
    NewWidget, Page, Query, QueryUpdate, Subscription, User, Visualization, VisualizationUpdate,
    Widget,
};
use crate::service::{Connect, PAGE_SIZE, Service, collect_pages};

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Blocking REST client authenticated with one API key.
pub struct HttpService {
    base_url: String,
    client: Client,
}

impl HttpService {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Key {}", api_key.trim())).map_err(|_| {
            MigrateError::InvalidInput("API key contains characters not allowed in a header".into())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("redash-migrate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response> {
        let url = self.url(path);
        debug!(%method, %url, "request");

        let response = build(self.client.request(method.clone(), &url)).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            body.truncate(cut);
            body.push_str("...");
        }
        Err(MigrateError::Http {
            method: method.to_string(),
            url,
            status: status.as_u16(),
            body,
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.send(Method::GET, path, |req| req)?.json()?)
    }

    fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        Ok(self.send(Method::POST, path, |req| req.json(body))?.json()?)
    }

    /// POST where the response body carries nothing the caller needs.
    fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(Method::POST, path, |req| req.json(body))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, |req| req)?;
        Ok(())
    }

    fn paginate<T: DeserializeOwned>(&self, path: &str, extra: &[(&str, &str)]) -> Result<Vec<T>> {
        collect_pages(PAGE_SIZE, |page, page_size| {
            let response = self.send(Method::GET, path, |req| {
                req.query(&[("page", page), ("page_size", page_size)])
                    .query(extra)
            })?;
            Ok(response.json::<Page<T>>()?)
        })
    }
}

impl Service for HttpService {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn users(&self, disabled: bool) -> Result<Vec<User>> {
        if disabled {
            self.paginate("api/users", &[("disabled", "true")])
        } else {
            self.paginate("api/users", &[])
        }
    }

    fn user(&self, id: Id) -> Result<User> {
        self.get(&format!("api/users/{id}"))
    }

    fn create_user(&self, user: &NewUser) -> Result<User> {
        self.post("api/users?no_invite=1", user)
    }

    fn disable_user(&self, id: Id) -> Result<()> {
        self.post_unit(&format!("api/users/{id}/disable"), &json!({}))
    }

    fn data_sources(&self) -> Result<Vec<DataSource>> {
        self.get("api/data_sources")
    }

    fn data_source(&self, id: Id) -> Result<DataSource> {
        self.get(&format!("api/data_sources/{id}"))
    }

    fn data_source_types(&self) -> Result<Vec<DataSourceType>> {
        self.get("api/data_sources/types")
    }

    fn create_data_source(&self, data_source: &NewDataSource) -> Result<DataSource> {
        self.post("api/data_sources", data_source)
    }

    fn destinations(&self) -> Result<Vec<Destination>> {
        self.get("api/destinations")
    }

    fn destination(&self, id: Id) -> Result<Destination> {
        self.get(&format!("api/destinations/{id}"))
    }

    fn create_destination(&self, destination: &NewDestination) -> Result<Destination> {
        self.post("api/destinations", destination)
    }

    fn groups(&self) -> Result<Vec<Group>> {
        self.get("api/groups")
    }

    fn group_members(&self, group_id: Id) -> Result<Vec<User>> {
        self.get(&format!("api/groups/{group_id}/members"))
    }

    fn group_data_sources(&self, group_id: Id) -> Result<Vec<DataSource>> {
        self.get(&format!("api/groups/{group_id}/data_sources"))
    }

    fn create_group(&self, name: &str) -> Result<Group> {
        self.post("api/groups", &json!({ "name": name }))
    }

    fn add_group_member(&self, group_id: Id, user_id: Id) -> Result<()> {
        self.post_unit(
            &format!("api/groups/{group_id}/members"),
            &json!({ "user_id": user_id }),
        )
    }

    fn remove_group_member(&self, group_id: Id, user_id: Id) -> Result<()> {
        self.delete(&format!("api/groups/{group_id}/members/{user_id}"))
    }

    fn add_group_data_source(&self, group_id: Id, data_source_id: Id) -> Result<()> {
        self.post_unit(
            &format!("api/groups/{group_id}/data_sources"),
            &json!({ "data_source_id": data_source_id }),
        )
    }

    fn set_group_data_source_view_only(
        &self,
        group_id: Id,
        data_source_id: Id,
        view_only: bool,
    ) -> Result<()> {
        self.post_unit(
            &format!("api/groups/{group_id}/data_sources/{data_source_id}"),
            &json!({ "view_only": view_only }),
        )
    }

    fn remove_group_data_source(&self, group_id: Id, data_source_id: Id) -> Result<()> {
        self.delete(&format!("api/groups/{group_id}/data_sources/{data_source_id}"))
    }

    fn queries(&self) -> Result<Vec<Query>> {
        self.paginate("api/queries", &[])
    }

    fn query(&self, id: Id) -> Result<Query> {
        self.get(&format!("api/queries/{id}"))
    }

    fn create_query(&self, query: &NewQuery) -> Result<Query> {
        self.post("api/queries", query)
    }

    fn update_query(&self, id: Id, update: &QueryUpdate) -> Result<Query> {
        self.post(&format!("api/queries/{id}"), update)
    }

    fn favorite_queries(&self) -> Result<Vec<Query>> {
        self.paginate("api/queries/favorites", &[])
    }

    fn favorite_query(&self, id: Id) -> Result<()> {
        self.post_unit(&format!("api/queries/{id}/favorite"), &json!({}))
    }

    fn create_visualization(&self, visualization: &NewVisualization) -> Result<Visualization> {
        self.post("api/visualizations", visualization)
    }

    fn update_visualization(
        &self,
        id: Id,
        update: &VisualizationUpdate,
    ) -> Result<Visualization> {
        self.post(&format!("api/visualizations/{id}"), update)
    }

    fn dashboards(&self) -> Result<Vec<Dashboard>> {
        self.paginate("api/dashboards", &[])
    }

    fn dashboard(&self, slug: &str) -> Result<Dashboard> {
        self.get(&format!("api/dashboards/{slug}"))
    }

    fn create_dashboard(&self, name: &str) -> Result<Dashboard> {
        self.post("api/dashboards", &json!({ "name": name }))
    }

    fn update_dashboard(&self, id: Id, update: &DashboardUpdate) -> Result<Dashboard> {
        self.post(&format!("api/dashboards/{id}"), update)
    }

    fn favorite_dashboards(&self) -> Result<Vec<Dashboard>> {
        self.paginate("api/dashboards/favorites", &[])
    }

    fn favorite_dashboard(&self, id: Id) -> Result<()> {
        self.post_unit(&format!("api/dashboards/{id}/favorite"), &json!({}))
    }

    fn create_widget(&self, widget: &NewWidget) -> Result<Widget> {
        self.post("api/widgets", widget)
    }

    fn alerts(&self) -> Result<Vec<Alert>> {
        self.get("api/alerts")
    }

    fn alert(&self, id: Id) -> Result<Alert> {
        self.get(&format!("api/alerts/{id}"))
    }

    fn create_alert(&self, alert: &NewAlert) -> Result<Alert> {
        self.post("api/alerts", alert)
    }

    fn update_alert(&self, id: Id, update: &AlertUpdate) -> Result<Alert> {
        self.post(&format!("api/alerts/{id}"), update)
    }

    fn alert_subscriptions(&self, alert_id: Id) -> Result<Vec<Subscription>> {
        self.get(&format!("api/alerts/{alert_id}/subscriptions"))
    }

    fn subscribe_alert(&self, alert_id: Id, destination_id: Option<Id>) -> Result<Subscription> {
        let body = match destination_id {
            Some(id) => json!({ "destination_id": id }),
            None => json!({}),
        };
        self.post(&format!("api/alerts/{alert_id}/subscriptions"), &body)
    }
}

/// Connects [`HttpService`] clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl Connect for HttpConnector {
    fn connect(&self, base_url: &str, api_key: &str) -> Result<Box<dyn Service>> {
        Ok(Box::new(HttpService::new(base_url, api_key)?))
    }
}

use crate::client::Config;
use crate::error::{McmError, Result};
use crate::response::{decode, into_results};
use crate::transport::{connect, Transport, Verb};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::error;

/// Page selector for searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    /// No pagination, every matching object
    #[default]
    All,
    /// Zero-based page index
    Index(u32),
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Page::All => f.write_str("-1"),
            Page::Index(page) => write!(f, "{}", page),
        }
    }
}

/// Client for the McM REST API.
///
/// Every operation performs exactly one blocking request. Read operations
/// return the `"results"` payload; action operations (`put`, `approve`,
/// `delete`, ...) return the whole decoded response. A body that is not JSON is
/// logged and reported as `Ok(None)`, while transport failures are returned as
/// errors. Neither leaves the client unusable.
pub struct McmClient {
    transport: Box<dyn Transport>,
    config: Config,
}

impl McmClient {
    /// Create a client for the default configuration (development, SSO cookie)
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Create a client, resolving credentials for `config.auth`.
    ///
    /// A missing cookie jar or proxy is returned as a fatal error (see
    /// [`McmError::is_fatal`]); no request is made in that case.
    pub fn with_config(config: Config) -> Result<Self> {
        let transport = connect(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over an already built transport
    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Self {
        McmClient { transport, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of a single object, `restapi/{type}/{method}/{id}`
    pub fn object_path(object_type: &str, method: &str, object_id: &str) -> String {
        format!("restapi/{}/{}/{}", object_type, method, object_id.trim())
    }

    /// Path of a search, `search/?db_name={type}&page={page}&{query}`
    pub fn search_path(object_type: &str, query: &str, page: Page) -> String {
        format!("search/?db_name={}&page={}&{}", object_type, page, query)
    }

    /// Path of a collection action, `restapi/{type}/{method}`
    pub fn action_path(object_type: &str, method: &str) -> String {
        format!("restapi/{}/{}", object_type, method)
    }

    /// Execute a request and decode the body.
    ///
    /// Unlike the other operations this reports a non-JSON body as
    /// [`McmError::Decode`] instead of `None`.
    pub fn request(&self, verb: Verb, path: &str, body: Option<&Value>) -> Result<Value> {
        let raw = self.transport.execute(verb, path, body).map_err(|e| {
            error!(%verb, url = %self.display_url(path), error = %e, "request failed");
            e
        })?;
        decode(&raw).map_err(|source| McmError::Decode {
            verb,
            url: self.display_url(path),
            source,
        })
    }

    fn call(&self, verb: Verb, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        match self.request(verb, path, body) {
            Ok(value) => Ok(Some(value)),
            Err(McmError::Decode { verb, url, source }) => {
                error!(%verb, %url, error = %source, "error while decoding response");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn display_url(&self, path: &str) -> String {
        self.transport
            .url(path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| path.to_string())
    }

    /// Get one object, or list the collection when `object_id` is `None`.
    ///
    /// Without an id (or with an empty one) this is `search(object_type, "", Page::All)`,
    /// a listing of the whole collection rather than an error.
    pub fn get(&self, object_type: &str, object_id: Option<&str>) -> Result<Option<Value>> {
        match object_id.filter(|id| !id.is_empty()) {
            Some(id) => self.get_by_id(object_type, id),
            None => self.search(object_type, "", Page::All),
        }
    }

    /// Get one object by id, e.g. a request prepid
    pub fn get_by_id(&self, object_type: &str, object_id: &str) -> Result<Option<Value>> {
        self.get_action(object_type, object_id, "get")
    }

    /// Run a read action such as `migrate` or `inspect` on one object
    pub fn get_action(
        &self,
        object_type: &str,
        object_id: &str,
        method: &str,
    ) -> Result<Option<Value>> {
        let path = Self::object_path(object_type, method, object_id);
        Ok(self.call(Verb::Get, &path, None)?.and_then(into_results))
    }

    /// Search a collection.
    ///
    /// `query` is appended to the query string verbatim, e.g. `tags=M17p1A`.
    pub fn search(&self, object_type: &str, query: &str, page: Page) -> Result<Option<Value>> {
        let path = Self::search_path(object_type, query, page);
        Ok(self.call(Verb::Get, &path, None)?.and_then(into_results))
    }

    /// Save an object
    pub fn put<T>(&self, object_type: &str, object_data: &T) -> Result<Option<Value>>
    where
        T: Serialize + ?Sized,
    {
        self.put_with_method(object_type, object_data, "save")
    }

    /// Send an object to a collection action, e.g. `save`, `update` or `clone`
    pub fn put_with_method<T>(
        &self,
        object_type: &str,
        object_data: &T,
        method: &str,
    ) -> Result<Option<Value>>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_value(object_data)?;
        self.call(Verb::Put, &Self::action_path(object_type, method), Some(&body))
    }

    /// Update an existing object with its new JSON
    pub fn update<T>(&self, object_type: &str, object_data: &T) -> Result<Option<Value>>
    where
        T: Serialize + ?Sized,
    {
        self.put_with_method(object_type, object_data, "update")
    }

    /// Clone a request
    pub fn clone_request<T>(&self, object_data: &T) -> Result<Option<Value>>
    where
        T: Serialize + ?Sized,
    {
        self.put_with_method("requests", object_data, "clone")
    }

    /// Move an object to approval `level`. Returns the whole response.
    pub fn approve(&self, object_type: &str, object_id: &str, level: u32) -> Result<Option<Value>> {
        let path = format!("restapi/{}/approve/{}/{}", object_type, object_id, level);
        self.call(Verb::Get, &path, None)
    }

    /// Get requests matching free-form `query`, e.g. newline separated prepids or ranges
    pub fn get_range_of_requests(&self, query: &str) -> Result<Option<Value>> {
        let body = json!({ "contents": query });
        let value = self.call(Verb::Put, "restapi/requests/listwithfile", Some(&body))?;
        Ok(value.and_then(into_results))
    }

    /// Delete an object. Returns the whole response.
    pub fn delete(&self, object_type: &str, object_id: &str) -> Result<Option<Value>> {
        let path = format!("restapi/{}/delete/{}", object_type, object_id);
        self.call(Verb::Delete, &path, None)
    }
}

impl fmt::Debug for McmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McmClient")
            .field("config", &self.config)
            .field("transport", &"<dyn Transport>")
            .finish()
    }
}

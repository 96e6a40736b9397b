//! HTTP implementation of the cluster client over `reqwest`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ClusterError;
use crate::types::{
    Acknowledged, AliasAction, DeleteResult, IndexState, NodesInfo, ReindexRequest,
    ReindexStarted, TaskInfo,
};
use crate::ClusterClient;

/// Configuration for [`HttpCluster`].
#[derive(Debug, Clone)]
pub struct HttpClusterConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    pub base_url: String,

    /// Basic-auth username, if the cluster requires one.
    pub username: Option<String>,

    /// Basic-auth password.
    pub password: Option<SecretString>,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpClusterConfig {
    /// Config for an unauthenticated cluster.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set basic-auth credentials.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `reqwest`-based implementation of [`ClusterClient`].
pub struct HttpCluster {
    client: Client,
    config: HttpClusterConfig,
}

impl HttpCluster {
    /// Create a new client.
    pub fn new(config: HttpClusterConfig) -> Result<Self, ClusterError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(method = %method, path = %path, "Cluster request");
        let builder = self.client.request(method, self.url(path));
        match &self.config.username {
            Some(user) => builder.basic_auth(
                user,
                self.config.password.as_ref().map(|p| p.expose_secret()),
            ),
            None => builder,
        }
    }

    /// Send and decode, mapping non-success statuses to `ClusterError::Api`.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClusterError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(ClusterError::Api {
                status: status.as_u16(),
                reason,
            });
        }
        Ok(response.json().await?)
    }
}

/// Per-index body of a `GET /{index}/_alias` response.
#[derive(Debug, Deserialize)]
struct AliasesBody {
    #[serde(default)]
    aliases: HashMap<String, Value>,
}

#[async_trait]
impl ClusterClient for HttpCluster {
    async fn index_exists(&self, index: &str) -> Result<bool, ClusterError> {
        let response = self.request(Method::HEAD, index).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(ClusterError::Api {
                status: status.as_u16(),
                reason: String::new(),
            }),
        }
    }

    async fn get_index_state(&self, index: &str) -> Result<Option<IndexState>, ClusterError> {
        let response = self
            .request(Method::GET, &format!("{index}?flat_settings=true"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(ClusterError::Api {
                status: status.as_u16(),
                reason,
            });
        }
        // The response is keyed by the concrete index name, which may
        // differ from the requested name when queried through an alias.
        let mut body: HashMap<String, IndexState> = response.json().await?;
        let result = body
            .drain()
            .next()
            .map(|(_, state)| Some(state))
            .ok_or_else(|| ClusterError::InvalidResponse("empty index response".to_string()));
        result
    }

    async fn put_settings(&self, index: &str, body: Value) -> Result<Acknowledged, ClusterError> {
        self.send(
            self.request(Method::PUT, &format!("{index}/_settings"))
                .json(&body),
        )
        .await
    }

    async fn create_index(&self, index: &str, body: Value) -> Result<Acknowledged, ClusterError> {
        self.send(self.request(Method::PUT, index).json(&body)).await
    }

    async fn start_reindex(&self, req: ReindexRequest) -> Result<ReindexStarted, ClusterError> {
        self.send(
            self.request(
                Method::POST,
                "_reindex?wait_for_completion=false&refresh=true",
            )
            .json(&req),
        )
        .await
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskInfo, ClusterError> {
        self.send(self.request(
            Method::GET,
            &format!("_tasks/{task_id}?wait_for_completion=false"),
        ))
        .await
    }

    async fn delete_task_doc(&self, task_id: &str) -> Result<DeleteResult, ClusterError> {
        self.send(self.request(Method::DELETE, &format!(".tasks/task/{task_id}")))
            .await
    }

    async fn get_aliases(&self, index: &str) -> Result<HashMap<String, Value>, ClusterError> {
        let body: HashMap<String, AliasesBody> = self
            .send(self.request(Method::GET, &format!("{index}/_alias")))
            .await?;
        let mut aliases = HashMap::new();
        for entry in body.into_values() {
            aliases.extend(entry.aliases);
        }
        Ok(aliases)
    }

    async fn update_aliases(&self, actions: Vec<AliasAction>) -> Result<Acknowledged, ClusterError> {
        self.send(
            self.request(Method::POST, "_aliases")
                .json(&serde_json::json!({ "actions": actions })),
        )
        .await
    }

    async fn nodes_info(&self) -> Result<NodesInfo, ClusterError> {
        self.send(self.request(Method::GET, "_nodes")).await
    }

    async fn set_ml_upgrade_mode(&self, enabled: bool) -> Result<Acknowledged, ClusterError> {
        self.send(self.request(
            Method::POST,
            &format!("_ml/set_upgrade_mode?enabled={enabled}"),
        ))
        .await
    }
}

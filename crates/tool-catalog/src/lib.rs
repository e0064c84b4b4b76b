//! Client for a remote tool catalog.
//!
//! The catalog is a GraphQL-style HTTP endpoint that lists tools and runs
//! them on request. [`CatalogClient::fetch_tools`] turns every listed tool
//! into a [`CatalogTool`], which can be registered with the chat workflow
//! like any local tool.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod error;
mod proto;
mod tool;

use std::sync::Arc;

use reqwest::{Client, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use config::{CatalogConfig, CatalogConfigBuilder};
pub use error::{Error, ErrorKind};
pub use proto::ToolDefinition;
pub use tool::CatalogTool;

/// A client for the tool catalog.
///
/// Cloning is cheap, clones share the connection pool.
#[derive(Clone, Debug)]
pub struct CatalogClient {
    client: Client,
    config: Arc<CatalogConfig>,
}

impl CatalogClient {
    /// Creates a client with the given configuration.
    pub fn new(config: CatalogConfig) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Returns the configuration of this client.
    #[inline]
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Lists the tools the catalog offers.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, Error> {
        let data: proto::ToolsData = self
            .post(&proto::Request::<()> {
                query: proto::LIST_TOOLS_QUERY,
                variables: None,
            })
            .await?;
        debug!("catalog lists {} tools", data.tools.len());
        Ok(data.tools)
    }

    /// Runs a tool and returns its raw result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<Value, Error> {
        trace!("calling catalog tool {name} with args: {arguments:?}");
        let data: proto::CallToolData = self
            .post(&proto::Request {
                query: proto::CALL_TOOL_MUTATION,
                variables: Some(proto::CallToolVariables { name, arguments }),
            })
            .await?;
        Ok(data.call_tool)
    }

    /// Lists the tools and wraps each one as a callable [`CatalogTool`].
    pub async fn fetch_tools(&self) -> Result<Vec<CatalogTool>, Error> {
        let tools = self.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|definition| CatalogTool::new(self.clone(), definition))
            .collect())
    }

    async fn post<B: Serialize, D: DeserializeOwned>(
        &self,
        body: &B,
    ) -> Result<D, Error> {
        let mut req = self.client.post(&self.config.endpoint).json(body);
        if let Some(api_key) = &self.config.api_key {
            req = req.header(header::AUTHORIZATION, format!("apikey {api_key}"));
        }

        let resp = req.send().await.and_then(Response::error_for_status)?;
        let resp: proto::Response<D> = resp.json().await?;

        if let Some(errors) = resp.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|err| err.message)
                .collect::<Vec<_>>()
                .join("; ");
            warn!("catalog returned errors: {message}");
            return Err(Error::new(message, ErrorKind::Remote));
        }
        resp.data
            .ok_or_else(|| Error::new("response has no data", ErrorKind::Decode))
    }
}

use std::env;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};

use chatgraph_openai_model::{OpenAIConfig, OpenAIConfigBuilder};
use chatgraph_tool_catalog::{CatalogConfig, CatalogConfigBuilder};

const DEFAULT_MODEL: &str = "deepseek-r1-distill-llama-70b";
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const TEMPERATURE: f32 = 0.7;

/// An error returned when the environment is incomplete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set or empty.
    Missing(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => {
                write!(f, "{name} environment variable is not set")
            }
        }
    }
}

impl StdError for ConfigError {}

/// Settings read from the environment.
#[derive(Clone, PartialEq)]
pub struct Config {
    /// Key for the model provider (`GROQ_API_KEY`).
    pub model_api_key: String,
    /// Model name (`GROQ_MODEL`).
    pub model: String,
    /// OpenAI-compatible endpoint of the provider (`GROQ_BASE_URL`).
    pub model_base_url: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Tool catalog endpoint (`WXFLOWS_ENDPOINT`).
    pub catalog_endpoint: String,
    /// Tool catalog key (`WXFLOWS_APIKEY`).
    pub catalog_api_key: Option<String>,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration from `lookup`, which returns the value of a
    /// variable by name.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        Ok(Self {
            model_api_key: require("GROQ_API_KEY")?,
            model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            model_base_url: get("GROQ_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            temperature: TEMPERATURE,
            catalog_endpoint: require("WXFLOWS_ENDPOINT")?,
            catalog_api_key: get("WXFLOWS_APIKEY"),
        })
    }

    /// Returns the configuration of the model provider.
    pub fn model_config(&self) -> OpenAIConfig {
        OpenAIConfigBuilder::with_api_key(self.model_api_key.clone())
            .with_model(self.model.clone())
            .with_base_url(self.model_base_url.clone())
            .with_temperature(self.temperature)
            .build()
    }

    /// Returns the configuration of the tool catalog client.
    pub fn catalog_config(&self) -> CatalogConfig {
        let mut builder =
            CatalogConfigBuilder::with_endpoint(self.catalog_endpoint.clone());
        if let Some(api_key) = &self.catalog_api_key {
            builder = builder.with_api_key(api_key.clone());
        }
        builder.build()
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model_api_key", &"<deducted>")
            .field("model", &self.model)
            .field("model_base_url", &self.model_base_url)
            .field("temperature", &self.temperature)
            .field("catalog_endpoint", &self.catalog_endpoint)
            .field(
                "catalog_api_key",
                &self.catalog_api_key.as_ref().map(|_| "<deducted>"),
            )
            .finish()
    }
}

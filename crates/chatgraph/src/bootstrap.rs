use std::error::Error as StdError;
use std::fmt::{self, Display};

use chatgraph_core::ChatWorkflowBuilder;
use chatgraph_openai_model::OpenAIProvider;
use chatgraph_tool_catalog::CatalogClient;

use crate::config::Config;
use crate::session::Session;

/// An error returned by [`bootstrap`].
#[derive(Debug)]
pub enum BootstrapError {
    /// The tool catalog could not be reached or listed.
    Catalog(chatgraph_tool_catalog::Error),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapError::Catalog(err) => {
                write!(f, "failed to load tools: {err}")
            }
        }
    }
}

impl StdError for BootstrapError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BootstrapError::Catalog(err) => Some(err),
        }
    }
}

impl From<chatgraph_tool_catalog::Error> for BootstrapError {
    #[inline]
    fn from(err: chatgraph_tool_catalog::Error) -> Self {
        BootstrapError::Catalog(err)
    }
}

/// Builds the model provider, loads the catalog tools and returns a new
/// session for `chat_id`.
pub async fn bootstrap(
    config: &Config,
    system_prompt: &str,
    chat_id: &str,
) -> Result<Session, BootstrapError> {
    let provider = OpenAIProvider::new(config.model_config());
    let catalog = CatalogClient::new(config.catalog_config())?;
    let tools = catalog.fetch_tools().await?;
    info!("loaded {} tools from the catalog", tools.len());

    let workflow = tools
        .into_iter()
        .fold(
            ChatWorkflowBuilder::with_model_provider(provider)
                .with_system_prompt(system_prompt),
            |builder, tool| builder.with_tool(tool),
        )
        .build();
    Ok(Session::new(workflow, chat_id))
}

//! Tool Registrar - attaches declared tools to a gateway server.
//!
//! Each declared tool becomes a dynamic rmcp `ToolRoute`. The route handler
//! maps the caller's arguments onto an [`ExecuteToolRequest`], forwards it to
//! the [`ToolExecutor`] and folds every failure into a [`ToolOutcome`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use rmcp::{
    handler::server::tool::{ToolCallContext, ToolRoute},
    model::{JsonObject, Tool},
};
use tracing::{debug, info};

use super::error::ToolError;
use super::executor::{ExecuteToolRequest, ToolExecutor};
use super::outcome::ToolOutcome;
use crate::core::server::GatewayServer;
use crate::domains::instances::ToolDeclaration;

/// Argument keys accepted for each request section, first match wins.
const HEADER_KEYS: &[&str] = &["header", "headers"];
const QUERY_KEYS: &[&str] = &["query", "query_params"];
const PATH_KEYS: &[&str] = &["path", "path_params"];
const BODY_KEY: &str = "body";

/// Registers declared tools on gateway servers.
#[derive(Clone)]
pub struct ToolRegistrar {
    executor: Arc<dyn ToolExecutor>,
}

impl ToolRegistrar {
    /// Create a registrar forwarding calls to `executor`.
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    /// Attach a route for every declaration to `server`.
    ///
    /// Fails only if a declared input schema is not a JSON object.
    pub fn register_tools(
        &self,
        tools: &[ToolDeclaration],
        server: &mut GatewayServer,
    ) -> Result<(), ToolError> {
        for declaration in tools {
            let tool = to_tool(declaration)?;
            let route = self.create_route(declaration.tool_id.clone(), tool);
            server.tool_router_mut().add_route(route);
        }
        info!("Registered {} tool(s) on {}", tools.len(), server.name());
        Ok(())
    }

    fn create_route<S>(&self, tool_id: String, tool: Tool) -> ToolRoute<S>
    where
        S: Send + Sync + 'static,
    {
        let executor = self.executor.clone();
        ToolRoute::new_dyn(tool, move |ctx: ToolCallContext<'_, S>| {
            let executor = executor.clone();
            let tool_id = tool_id.clone();
            let arguments = ctx.arguments.clone();
            async move {
                let outcome = handle_call(executor.as_ref(), &tool_id, arguments).await;
                Ok(outcome.into_call_result())
            }
            .boxed()
        })
    }
}

/// Run one tool call against the executor.
pub async fn handle_call(
    executor: &dyn ToolExecutor,
    tool_id: &str,
    arguments: Option<JsonObject>,
) -> ToolOutcome {
    if tool_id.trim().is_empty() {
        return ToolOutcome::error(ToolError::MissingToolId.to_string());
    }

    let request = match build_execute_request(arguments) {
        Ok(request) => request,
        Err(e) => return ToolOutcome::error(e.to_string()),
    };

    debug!("Executing tool {}", tool_id);
    match executor.execute_tool(tool_id, request).await {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(payload) => ToolOutcome::ok(payload),
            Err(e) => ToolOutcome::error(format!("Failed to serialize tool response: {e}")),
        },
        Err(e) => ToolOutcome::error(ToolError::from(e).to_string()),
    }
}

/// Map caller arguments onto a normalised execution request.
pub fn build_execute_request(
    arguments: Option<JsonObject>,
) -> Result<ExecuteToolRequest, ToolError> {
    let arguments = arguments.unwrap_or_default();

    Ok(ExecuteToolRequest {
        headers: string_section(&arguments, HEADER_KEYS)?,
        body: arguments
            .get(BODY_KEY)
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        query_params: string_section(&arguments, QUERY_KEYS)?,
        path_params: string_section(&arguments, PATH_KEYS)?,
    })
}

fn string_section(
    arguments: &JsonObject,
    keys: &[&str],
) -> Result<HashMap<String, String>, ToolError> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|key| arguments.get(*key).map(|value| (*key, value)))
    else {
        return Ok(HashMap::new());
    };

    match value {
        serde_json::Value::Null => Ok(HashMap::new()),
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .map(|(name, value)| (name.clone(), stringify(value)))
            .collect()),
        other => Err(ToolError::invalid_arguments(format!(
            "'{key}' must be an object, got {other}"
        ))),
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_tool(declaration: &ToolDeclaration) -> Result<Tool, ToolError> {
    let input_schema = match &declaration.input_schema {
        serde_json::Value::Null => default_schema(),
        serde_json::Value::Object(map) => map.clone(),
        // Schemas stored as JSON text.
        serde_json::Value::String(text) => serde_json::from_str::<JsonObject>(text)
            .map_err(|e| ToolError::invalid_schema(&declaration.name, e))?,
        other => {
            return Err(ToolError::invalid_schema(
                &declaration.name,
                format!("expected an object, got {other}"),
            ));
        }
    };

    Ok(Tool {
        name: declaration.name.clone().into(),
        description: Some(declaration.description.clone().into()),
        input_schema: Arc::new(input_schema),
        annotations: None,
        output_schema: None,
        icons: None,
        meta: None,
        title: None,
    })
}

fn default_schema() -> JsonObject {
    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), serde_json::Value::String("object".into()));
    schema
}

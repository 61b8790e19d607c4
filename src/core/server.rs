//! Gateway MCP server handler.
//!
//! Every gateway instance owns one [`GatewayServer`]. Its tool router starts
//! empty and is filled by the tool registrar from the instance's declared
//! tools; the transports then serve clones of the finished server, one per
//! client session.

use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    model::{Implementation, ServerCapabilities, ServerInfo, Tool},
    tool_handler,
};

/// MCP server handler for one gateway instance.
#[derive(Clone)]
pub struct GatewayServer {
    name: String,
    version: String,
    instructions: String,

    /// Tool router for handling tool calls.
    tool_router: ToolRouter<Self>,
}

impl GatewayServer {
    /// Create a server with no tools.
    pub fn new(name: impl Into<String>, version: i64, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.to_string(),
            instructions: instructions.into(),
            tool_router: ToolRouter::new(),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Mutable access to the tool router, used while registering tools.
    pub fn tool_router_mut(&mut self) -> &mut ToolRouter<Self> {
        &mut self.tool_router
    }

    /// List all registered tools.
    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }
}

#[tool_handler]
impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: (!self.instructions.is_empty()).then(|| self.instructions.clone()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

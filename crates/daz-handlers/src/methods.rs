//! The MCP method table

/// Every method the router understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpMethod {
    Initialize,
    Initialized,
    ToolsList,
    ToolsCall,
    ResourcesList,
    PromptsList,
}

impl McpMethod {
    pub const ALL: [McpMethod; 6] = [
        McpMethod::Initialize,
        McpMethod::Initialized,
        McpMethod::ToolsList,
        McpMethod::ToolsCall,
        McpMethod::ResourcesList,
        McpMethod::PromptsList,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(McpMethod::Initialize),
            "notifications/initialized" => Some(McpMethod::Initialized),
            "tools/list" => Some(McpMethod::ToolsList),
            "tools/call" => Some(McpMethod::ToolsCall),
            "resources/list" => Some(McpMethod::ResourcesList),
            "prompts/list" => Some(McpMethod::PromptsList),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            McpMethod::Initialize => "initialize",
            McpMethod::Initialized => "notifications/initialized",
            McpMethod::ToolsList => "tools/list",
            McpMethod::ToolsCall => "tools/call",
            McpMethod::ResourcesList => "resources/list",
            McpMethod::PromptsList => "prompts/list",
        }
    }
}

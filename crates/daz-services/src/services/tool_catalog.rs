//! Declarative tool catalog
//!
//! One entry per exposed tool. The entry drives both the descriptor served by
//! `tools/list` and the positional arguments handed to the DAZ script, so the
//! advertised schema and the invocation cannot drift apart.

use daz_foundation::model::mcp::McpTool;
use serde_json::{json, Map, Value};
use tracing::warn;

/// JSON type of a tool argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
}

impl ArgKind {
    fn schema_type(self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
        }
    }
}

/// One positional script argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub description: &'static str,
    pub required: bool,
    /// Passed to the script when the client omits the argument
    pub default: &'static str,
}

/// A tool exposed over MCP and the script that implements it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Script file name, resolved under the configured script root
    pub script: &'static str,
    /// Arguments in the order the script expects them
    pub args: &'static [ArgSpec],
}

/// The authoritative, ordered tool list
pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "load_scene",
        description: "Load a DAZ Studio scene file",
        script: "load_scene.dsa",
        args: &[ArgSpec {
            name: "scene_path",
            kind: ArgKind::String,
            description: "Path to the scene file to load",
            required: true,
            default: "",
        }],
    },
    ToolSpec {
        name: "set_pose",
        description: "Set a pose for the selected figure",
        script: "set_pose.dsa",
        args: &[
            ArgSpec {
                name: "pose_path",
                kind: ArgKind::String,
                description: "Path to the pose file",
                required: true,
                default: "",
            },
            ArgSpec {
                name: "figure_name",
                kind: ArgKind::String,
                description: "Name of the figure to apply pose to",
                required: false,
                default: "",
            },
        ],
    },
    ToolSpec {
        name: "render_scene",
        description: "Render the current scene",
        script: "render_scene.dsa",
        args: &[
            ArgSpec {
                name: "output_path",
                kind: ArgKind::String,
                description: "Path where to save the rendered image",
                required: true,
                default: "",
            },
            ArgSpec {
                name: "width",
                kind: ArgKind::Integer,
                description: "Render width in pixels",
                required: false,
                default: "800",
            },
            ArgSpec {
                name: "height",
                kind: ArgKind::Integer,
                description: "Render height in pixels",
                required: false,
                default: "600",
            },
        ],
    },
    ToolSpec {
        name: "read_scene",
        description: "Get list of items in the current DAZ scene",
        script: "read_scene.dsa",
        args: &[],
    },
    ToolSpec {
        name: "list_content",
        description: "List available items in the DAZ Studio content library",
        script: "list_content.dsa",
        args: &[],
    },
];

/// Look up a tool by name
pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|tool| tool.name == name)
}

/// Descriptors for `tools/list`, in catalog order
pub fn descriptors() -> Vec<McpTool> {
    TOOLS.iter().map(ToolSpec::descriptor).collect()
}

impl ToolSpec {
    pub fn descriptor(&self) -> McpTool {
        McpTool {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.input_schema(),
        }
    }

    fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|arg| {
                (
                    arg.name.to_string(),
                    json!({
                        "type": arg.kind.schema_type(),
                        "description": arg.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|arg| arg.required)
            .map(|arg| arg.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Positional script arguments for a client-supplied argument map
    ///
    /// Absent or null values fall back to the argument's default.
    pub fn positional_args(&self, arguments: &Map<String, Value>) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| match arguments.get(arg.name) {
                None | Some(Value::Null) => {
                    if arg.required {
                        warn!(
                            tool_name = %self.name,
                            argument = %arg.name,
                            "Required argument missing, passing default"
                        );
                    }
                    arg.default.to_string()
                }
                Some(Value::String(value)) => value.clone(),
                Some(other) => other.to_string(),
            })
            .collect()
    }

    /// Client arguments the tool does not declare
    pub fn unknown_arguments<'a>(&self, arguments: &'a Map<String, Value>) -> Vec<&'a str> {
        arguments
            .keys()
            .filter(|key| !self.args.iter().any(|arg| arg.name == key.as_str()))
            .map(String::as_str)
            .collect()
    }
}

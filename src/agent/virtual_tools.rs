//! Virtual tools: resource templates and prompts offered to the model as
//! ordinary function declarations
//!
//! A template such as `weather://report/{location}/{days}` becomes a tool
//! named `read_weather_report` taking `location` and `days`. Calling it
//! expands the template and reads the resulting URI. A prompt `foo`
//! becomes `prompt_foo`, and concrete resources are reachable through a
//! single `read_resource` tool.

use std::collections::HashSet;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::llm::FunctionDeclaration;
use crate::mcp::protocol::{Prompt, PromptArgument, Resource, ResourceTemplate};
use crate::mcp::{McpError, McpOperations, McpResult};

/// Demo templates offered even when the server does not list them
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "animal://facts/{species}/{category}",
        "Facts about an animal species. Categories: habitat, diet, behavior, \
         conservation, physical, reproduction.",
    ),
    (
        "weather://report/{location}/{days}",
        "Weather report for a location slug such as providence-ri over 1 to 14 days.",
    ),
    (
        "climate://{location}/{year}/{month}",
        "Historical climate summary for a location slug, year (1900-2024) and month (1-12).",
    ),
];

/// Longest function name the model accepts
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed `{placeholder}` URI template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(raw: &str) -> McpResult<Self> {
        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                McpError::Protocol(format!("Unclosed placeholder in template {}", raw))
            })?;
            let name = after[..close].trim();
            if name.is_empty() || name.contains('{') {
                return Err(McpError::Protocol(format!(
                    "Invalid placeholder in template {}",
                    raw
                )));
            }
            segments.push(Segment::Param(name.to_string()));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of appearance
    pub fn params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute every placeholder from `arguments`.
    ///
    /// Each value must be a string, number or bool that renders non-empty
    /// and without `/`. Values are percent-encoded into their segment.
    pub fn expand(&self, arguments: &Value) -> McpResult<String> {
        let mut uri = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => uri.push_str(text),
                Segment::Param(name) => uri.push_str(&template_value(name, arguments.get(name))?),
            }
        }
        Ok(uri)
    }

    /// Derive a function name: scheme plus the literal path words
    pub fn tool_name(&self) -> String {
        let scheme = self.raw.split_once("://").map_or("resource", |(scheme, _)| scheme);
        let mut words = vec![scheme.to_lowercase()];
        for segment in &self.segments {
            if let Segment::Literal(text) = segment {
                let path = text.rsplit_once("://").map_or(text.as_str(), |(_, rest)| rest);
                words.extend(
                    path.split(|c: char| !c.is_ascii_alphanumeric())
                        .filter(|word| !word.is_empty())
                        .map(str::to_lowercase),
                );
            }
        }
        function_name(&format!("read_{}", words.join("_")))
    }
}

fn template_value(name: &str, value: Option<&Value>) -> McpResult<String> {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => {
            return Err(McpError::ToolInvocation(format!(
                "Argument '{}' must be a string, number or boolean, got {}",
                name, other
            )))
        }
        None => {
            return Err(McpError::ToolInvocation(format!(
                "Missing required argument '{}'",
                name
            )))
        }
    };
    if text.is_empty() {
        return Err(McpError::ToolInvocation(format!(
            "Argument '{}' must not be empty",
            name
        )));
    }
    if text.contains('/') {
        return Err(McpError::ToolInvocation(format!(
            "Argument '{}' must not contain '/'",
            name
        )));
    }
    Ok(urlencoding::encode(&text).into_owned())
}

/// Coerce a name into the character set the model accepts
fn function_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name.truncate(MAX_NAME_LEN);
    name
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    Template(UriTemplate),
    Resources(Vec<String>),
    Prompt {
        name: String,
        arguments: Vec<PromptArgument>,
    },
}

/// A function the model can call that is not a server tool
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualTool {
    name: String,
    description: String,
    target: Target,
}

impl VirtualTool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        let parameters = match &self.target {
            Target::Template(template) => {
                let params = template.params();
                let properties: Map<String, Value> = params
                    .iter()
                    .map(|param| {
                        (
                            param.to_string(),
                            json!({"type": "string", "description": format!("Value for {{{}}}", param)}),
                        )
                    })
                    .collect();
                (!properties.is_empty()).then(|| {
                    json!({"type": "object", "properties": properties, "required": params})
                })
            }
            Target::Resources(uris) => Some(json!({
                "type": "object",
                "properties": {
                    "uri": {"type": "string", "description": format!("One of: {}", uris.join(", "))}
                },
                "required": ["uri"]
            })),
            Target::Prompt { arguments, .. } => {
                let properties: Map<String, Value> = arguments
                    .iter()
                    .map(|arg| {
                        (
                            arg.name.clone(),
                            json!({"type": "string", "description": arg.description}),
                        )
                    })
                    .collect();
                let required: Vec<&str> = arguments
                    .iter()
                    .filter(|arg| arg.required)
                    .map(|arg| arg.name.as_str())
                    .collect();
                (!properties.is_empty()).then(|| {
                    json!({"type": "object", "properties": properties, "required": required})
                })
            }
        };
        FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters,
        }
    }

    /// Run the call against the session
    pub async fn invoke(&self, session: &dyn McpOperations, arguments: &Value) -> McpResult<Value> {
        match &self.target {
            Target::Template(template) => {
                let uri = template.expand(arguments)?;
                debug!("{} reads {}", self.name, uri);
                session.read_resource(&uri).await
            }
            Target::Resources(_) => {
                let uri = uri_argument(arguments)?;
                session.read_resource(uri).await
            }
            Target::Prompt { name, arguments: declared } => {
                let args = prompt_arguments(declared, arguments)?;
                session.get_prompt(name, args).await
            }
        }
    }
}

fn uri_argument(arguments: &Value) -> McpResult<&str> {
    match arguments.get("uri").and_then(Value::as_str).map(str::trim) {
        Some(uri) if !uri.is_empty() => Ok(uri),
        _ => Err(McpError::ToolInvocation(
            "Missing required argument 'uri'".to_string(),
        )),
    }
}

/// Prompt arguments travel as strings; required ones must be present
fn prompt_arguments(declared: &[PromptArgument], arguments: &Value) -> McpResult<Value> {
    let mut args = Map::new();
    if let Some(given) = arguments.as_object() {
        for (key, value) in given {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            args.insert(key.clone(), Value::String(text));
        }
    }
    if let Some(missing) = declared
        .iter()
        .find(|arg| arg.required && !args.contains_key(&arg.name))
    {
        return Err(McpError::ToolInvocation(format!(
            "Missing required argument '{}'",
            missing.name
        )));
    }
    Ok(Value::Object(args))
}

/// The virtual tools synthesized for one loop
#[derive(Debug, Clone, Default)]
pub struct VirtualToolSet {
    tools: Vec<VirtualTool>,
}

impl VirtualToolSet {
    /// Build from the server's catalogs.
    ///
    /// `reserved` holds names already taken by declared tools; generated
    /// names that collide get a numeric suffix.
    pub fn build(
        reserved: &[&str],
        resources: &[Resource],
        templates: &[ResourceTemplate],
        prompts: &[Prompt],
        include_builtins: bool,
    ) -> Self {
        let mut taken: HashSet<String> = reserved.iter().map(|name| name.to_string()).collect();
        let mut tools = Vec::new();
        let mut seen_templates = HashSet::new();

        let advertised = templates
            .iter()
            .map(|t| (t.uri_template.as_str(), t.description.as_str()));
        let builtins = BUILTIN_TEMPLATES
            .iter()
            .filter(|_| include_builtins)
            .map(|&(raw, description)| (raw, description));

        for (raw, description) in advertised.chain(builtins) {
            if !seen_templates.insert(raw.to_string()) {
                continue;
            }
            let template = match UriTemplate::parse(raw) {
                Ok(template) => template,
                Err(e) => {
                    debug!("Skipping resource template: {}", e);
                    continue;
                }
            };
            let name = unique_name(template.tool_name(), &mut taken);
            let description = if description.is_empty() {
                format!("Read the resource {}", raw)
            } else {
                format!("{} (reads {})", description, raw)
            };
            tools.push(VirtualTool {
                name,
                description,
                target: Target::Template(template),
            });
        }

        let concrete: Vec<String> = resources
            .iter()
            .filter(|r| !r.is_template())
            .map(|r| r.uri.clone())
            .collect();
        if !concrete.is_empty() {
            tools.push(VirtualTool {
                name: unique_name("read_resource".to_string(), &mut taken),
                description: "Read one of the server's resources by URI".to_string(),
                target: Target::Resources(concrete),
            });
        }

        for prompt in prompts {
            let name = unique_name(function_name(&format!("prompt_{}", prompt.name)), &mut taken);
            let description = if prompt.description.is_empty() {
                format!("Render the {} prompt", prompt.name)
            } else {
                prompt.description.clone()
            };
            tools.push(VirtualTool {
                name,
                description,
                target: Target::Prompt {
                    name: prompt.name.clone(),
                    arguments: prompt.arguments.clone(),
                },
            });
        }

        Self { tools }
    }

    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.iter().map(VirtualTool::declaration).collect()
    }

    pub fn find(&self, name: &str) -> Option<&VirtualTool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn unique_name(base: String, taken: &mut HashSet<String>) -> String {
    let mut name = base.clone();
    let mut suffix = 2;
    while taken.contains(&name) {
        let tail = format!("_{}", suffix);
        let mut stem = base.clone();
        stem.truncate(MAX_NAME_LEN - tail.len());
        name = stem + &tail;
        suffix += 1;
    }
    taken.insert(name.clone());
    name
}

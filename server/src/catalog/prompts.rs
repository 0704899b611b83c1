use serde_json::{json, Value};

use super::{PromptArgumentDefinition, PromptDefinition};
use crate::errors::{ServerError, ServerResult};

fn argument(name: &'static str, description: &'static str, required: bool) -> PromptArgumentDefinition {
    PromptArgumentDefinition {
        name,
        description,
        required,
    }
}

pub fn definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "animal_profile",
            description: "Create educational animal profile",
            arguments: vec![
                argument("animal", "Animal species to profile", true),
                argument("detail_level", "Level of detail (basic, detailed, expert)", false),
            ],
        },
        PromptDefinition {
            name: "habitat_weather",
            description: "Combine animal habitat information with current weather conditions",
            arguments: vec![
                argument("animal", "Animal species", true),
                argument("location", "Geographic location", true),
            ],
        },
        PromptDefinition {
            name: "travel_wildlife_briefing",
            description: "Create travel briefing with weather and wildlife information",
            arguments: vec![
                argument("destination", "Travel destination", true),
                argument("travel_dates", "Travel dates", false),
            ],
        },
    ]
}

/// Render a prompt, checking required arguments against its definition
pub fn render(name: &str, arguments: &Value) -> ServerResult<Value> {
    let definition = definitions()
        .into_iter()
        .find(|prompt| prompt.name == name)
        .ok_or_else(|| ServerError::InvalidParams(format!("Unknown prompt: {}", name)))?;

    let lookup = |key: &str| -> Option<String> {
        match arguments.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    };
    if let Some(missing) = definition
        .arguments
        .iter()
        .find(|arg| arg.required && lookup(arg.name).is_none())
    {
        return Err(ServerError::InvalidParams(format!(
            "Missing required argument '{}' for prompt {}",
            missing.name, name
        )));
    }
    let arg = |key: &str, fallback: &str| lookup(key).unwrap_or_else(|| fallback.to_string());

    let (description, text) = match name {
        "animal_profile" => {
            let animal = arg("animal", "unknown");
            let detail_level = arg("detail_level", "basic");
            (
                format!("Educational profile for {}", animal),
                format!(
                    "Create a {} educational profile for {}.\n\
                     Include information about habitat, diet, behavior, and conservation status.\n\
                     Format the response in a clear, engaging way suitable for educational purposes.",
                    detail_level, animal
                ),
            )
        }
        "habitat_weather" => {
            let animal = arg("animal", "unknown");
            let location = arg("location", "unknown");
            (
                format!("Habitat and weather analysis for {} in {}", animal, location),
                format!(
                    "Provide information about {} habitat characteristics and how they relate to \
                     the current weather conditions in {}.\n\
                     Include how weather affects the animal's behavior, feeding patterns, and \
                     survival strategies.",
                    animal, location
                ),
            )
        }
        _ => {
            let destination = arg("destination", "unknown");
            let travel_dates = arg("travel_dates", "unspecified");
            (
                format!("Travel briefing for {}", destination),
                format!(
                    "Create a travel briefing for {} including:\n\
                     1. Current weather conditions and forecast\n\
                     2. Local wildlife that might be encountered\n\
                     3. Best practices for wildlife viewing\n\
                     4. Safety considerations\n\
                     5. What to pack based on weather conditions\n\n\
                     Travel dates: {}",
                    destination, travel_dates
                ),
            )
        }
    };

    Ok(json!({
        "description": description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    }))
}

// Prompt templates for inference-backed agents
//
// Templates use `{{name}}` placeholders. Prompts are versioned so a work
// product can be traced back to the exact wording that produced it.

use std::collections::HashMap;

/// Prompt template structure
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
}

impl PromptTemplate {
    /// Render the user template with variables.
    ///
    /// Unknown placeholders are left in place so missing inputs are visible
    /// in the rendered prompt.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        let mut rendered = String::with_capacity(self.user_template.len());
        let mut rest = self.user_template.as_str();

        while let Some(start) = rest.find("{{") {
            rendered.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            match after_open.find("}}") {
                Some(end) => {
                    let key = after_open[..end].trim();
                    match variables.get(key) {
                        Some(value) => rendered.push_str(value),
                        None => rendered.push_str(&rest[start..start + 2 + end + 2]),
                    }
                    rest = &after_open[end + 2..];
                }
                None => {
                    rendered.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }

    /// Render using the top-level fields of a JSON object. Strings are
    /// inserted verbatim, anything else as compact JSON.
    pub fn render_json(&self, data: &serde_json::Value) -> String {
        let variables: HashMap<String, String> = data
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(key, value)| {
                        let text = match value {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (key.clone(), text)
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.render(&variables)
    }
}

pub mod library {
    use super::PromptTemplate;

    /// Generic template for running one work item through a model
    pub fn work_item() -> PromptTemplate {
        PromptTemplate {
            name: "work_item".to_string(),
            version: "1.0.0".to_string(),
            system: "You are one stage of a multi-stage pipeline. \
                     Complete the assigned work and answer with a single JSON object only."
                .to_string(),
            user_template: "Work type: {{work_type}}\n\n\
                            Input:\n{{input}}\n\n\
                            Respond with a JSON object containing the keys: {{required_keys}}"
                .to_string(),
        }
    }

    /// Template for handing a previous phase's product to the next phase
    pub fn phase_handoff() -> PromptTemplate {
        PromptTemplate {
            name: "phase_handoff".to_string(),
            version: "1.0.0".to_string(),
            system: "You continue work produced by an earlier pipeline phase. \
                     Build on it rather than starting over."
                .to_string(),
            user_template: "Previous phase: {{from_phase}}\n\
                            Work product:\n{{work_product}}\n\n\
                            Task: {{task}}"
                .to_string(),
        }
    }
}

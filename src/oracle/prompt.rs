use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Caller-supplied facts about where the command runs (cwd, shell, user...)
pub type CommandContext = BTreeMap<String, String>;

pub const RULES_PLACEHOLDER: &str = "{{RULES}}";
pub const COMMAND_PLACEHOLDER: &str = "{{COMMAND}}";
pub const CONTEXT_PLACEHOLDER: &str = "{{CONTEXT}}";

pub const NO_RULES: &str = "No specific rules defined.";

const FALLBACK_PROMPT: &str = r#"You are a DevOps security expert. Analyze this command for safety:

Command: {{COMMAND}}

Respond with valid JSON only:
{"action": "PASS"} for safe commands
{"action": "EXECUTE", "command": "corrected_command"} for fixable issues
{"action": "ERROR", "message": "explanation"} for dangerous commands"#;

/// Wrapper prompt plus the free-form rule description it embeds
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: Option<String>,
    rules: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl PromptTemplate {
    pub fn new(template: Option<String>, rules: Option<String>) -> Self {
        Self {
            template,
            rules: rules.unwrap_or_else(|| NO_RULES.to_string()),
        }
    }

    /// Read the wrapper template and rule description from disk
    ///
    /// Missing or unreadable files degrade to the embedded prompt and
    /// `NO_RULES` respectively.
    pub fn load(template_path: Option<&Path>, rules_path: Option<&Path>) -> Self {
        let template = template_path.and_then(|path| match fs::read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "prompt template not readable, using built-in prompt");
                None
            }
        });

        let rules = rules_path.and_then(|path| match fs::read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "AI rules file not found");
                None
            }
        });

        Self::new(template, rules)
    }

    pub fn uses_fallback(&self) -> bool {
        self.template.is_none()
    }

    /// Fill the placeholders for one command
    pub fn render(&self, command: &str, context: Option<&CommandContext>) -> String {
        let template = self.template.as_deref().unwrap_or(FALLBACK_PROMPT);
        let context_block = context
            .filter(|ctx| !ctx.is_empty())
            .map(format_context);

        // The command goes in last so text inside it is never treated as a placeholder
        let mut prompt = template.replace(RULES_PLACEHOLDER, &self.rules);

        if template.contains(CONTEXT_PLACEHOLDER) {
            prompt = prompt.replace(CONTEXT_PLACEHOLDER, context_block.as_deref().unwrap_or(""));
        } else if let Some(block) = &context_block {
            prompt.push_str("\n\nContext:\n");
            prompt.push_str(block);
        }

        prompt.replace(COMMAND_PLACEHOLDER, command)
    }
}

fn format_context(context: &CommandContext) -> String {
    context
        .iter()
        .map(|(key, value)| format!("  {}: {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

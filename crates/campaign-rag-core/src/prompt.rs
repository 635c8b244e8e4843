//! System and user prompt rendering.
//!
//! The system template may reference `{enabled_str}`, `{disabled_str}` and
//! `{sources_str}`. Literal braces are written `{{` and `}}`.

/// Built-in system prompt used when no template file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a concise assistant for exclusive brand campaigns.
Answer only from the context you are given. If the context does not
support an answer, reply exactly: \"It is not associated with exclusive campaigns.\"
Enabled keywords: {enabled_str}
Disabled keywords: {disabled_str}
Available sources: {sources_str}
Do not mention disabled keywords. Do not write headers or a sources list.";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.system
    }

    /// Fill the system template. `sources` are joined with `"; "`, or
    /// rendered as `none` when empty.
    pub fn render_system(&self, enabled: &str, disabled: &str, sources: &[String]) -> String {
        let sources_str = if sources.is_empty() {
            "none".to_string()
        } else {
            sources.join("; ")
        };
        self.system
            .replace("{{", "\u{0}")
            .replace("}}", "\u{1}")
            .replace("{enabled_str}", enabled)
            .replace("{disabled_str}", disabled)
            .replace("{sources_str}", &sources_str)
            .replace('\u{0}', "{")
            .replace('\u{1}', "}")
    }
}

/// The user turn: context block, topic, and answering instructions.
pub fn user_prompt(context: &str, topic: &str) -> String {
    format!(
        "Context:\n{}\n\nUser keyword or question: {}\n\n\
         Write 2–3 factual sentences strictly using the provided context. \
         Do not fabricate facts. Do not include a sources list.",
        context, topic
    )
}

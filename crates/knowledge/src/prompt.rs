//! Prompt templates.
//!
//! Templates use `{name}` placeholders. Rendering is a single pass over
//! the template, so placeholder-like text inside substituted values is
//! left alone.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{KnowledgeError, Result};

/// Summarize one chunk. Variables: `context`.
pub const MAP_PROMPT: &str = "Please provide a concise summary of the following text:\n\n{context}\n\nSummary:";

/// Combine several summaries into one. Variables: `docs`.
pub const REDUCE_PROMPT: &str = "Please combine and synthesize the following summaries into a single coherent summary:\n\n{docs}\n\nCombined Summary:";

/// Summarize a whole document in one request. Variables: `context`.
pub const SUMMARY_PROMPT: &str = "Write a concise summary of the following document. Keep names, figures and decisions.\n\n{context}\n\nSummary:";

/// Answer from retrieved context. Variables: `context`, `question`.
pub const RAG_PROMPT: &str = "Use the following retrieved context to answer the question. If the context does not contain the answer, say that you don't know.\n\n{context}\n\nQuestion: {question}\nAnswer:";

/// System instruction sent with grounded chat requests.
pub const RAG_SYSTEM_PROMPT: &str = "You answer questions using context retrieved from the user's documents. Cite the source of each fact when one is given.";

const PLACEHOLDER: &str = r"\{([A-Za-z_][A-Za-z0-9_]*)\}";

fn placeholder_regex() -> Result<&'static Regex> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(PLACEHOLDER).map_err(|e| KnowledgeError::Template(e.to_string()))?;
    Ok(RE.get_or_init(|| re))
}

/// A named prompt with `{placeholder}` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    name: String,
    template: String,
}

impl PromptTemplate {
    /// Create a template.
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }

    /// Template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable names in order of first appearance.
    pub fn variables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for caps in placeholder_regex()?.captures_iter(&self.template) {
            let name = caps[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Substitute every placeholder. Fails on the first variable without a value.
    pub fn render(&self, values: &HashMap<&str, String>) -> Result<String> {
        let variables = self.variables()?;
        if let Some(missing) = variables.into_iter().find(|v| !values.contains_key(v.as_str())) {
            return Err(KnowledgeError::MissingVariable(missing));
        }

        let rendered = placeholder_regex()?.replace_all(&self.template, |caps: &regex::Captures| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }

    /// Render with a single variable.
    pub fn render_one(&self, name: &str, value: impl Into<String>) -> Result<String> {
        let mut values = HashMap::new();
        values.insert(name, value.into());
        self.render(&values)
    }
}

/// One retrieved passage formatted for the RAG prompt.
pub fn source_block(source: &str, content: &str) -> String {
    format!("Source: {}\nContent: {}", source, content)
}

/// Build the RAG prompt for `question` over `passages` (`(source, content)` pairs).
pub fn rag_prompt(passages: &[(String, String)], question: &str) -> Result<String> {
    let context = passages
        .iter()
        .map(|(source, content)| source_block(source, content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut values = HashMap::new();
    values.insert("context", context);
    values.insert("question", question.to_string());
    PromptTemplate::new("rag", RAG_PROMPT).render(&values)
}

// Weaver — Token resolution
//
// Two token shapes are recognised inside prompt text:
//   {{entityId.tokenName}}  results of finished actions / dependency workflows
//   {{name}}                ambient context (selection, clipboard, document)
// Anything that cannot be resolved is left exactly as written.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Token map produced by one finished entity.
pub type Tokens = HashMap<String, String>;

/// Finished entities by id.
pub type ResultsById = HashMap<String, Tokens>;

static ENTITY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z0-9_-]+)\.([A-Za-z0-9_]+)\}\}").unwrap());

static CONTEXT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").unwrap());

pub const SELECTION: &str = "selection";
pub const DOCUMENT_CONTENT: &str = "documentContent";
pub const DOCUMENT_NAME: &str = "documentName";
pub const CLIPBOARD: &str = "clipboard";

/// The full ambient-context vocabulary.
pub const CONTEXT_NAMES: [&str; 4] = [SELECTION, DOCUMENT_CONTENT, DOCUMENT_NAME, CLIPBOARD];

/// Snapshot of the user's editing context, captured once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot {
    pub selection: Option<String>,
    pub document_content: Option<String>,
    pub document_name: Option<String>,
    pub clipboard: Option<String>,
}

impl ContextSnapshot {
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            SELECTION => self.selection.as_deref(),
            DOCUMENT_CONTENT => self.document_content.as_deref(),
            DOCUMENT_NAME => self.document_name.as_deref(),
            CLIPBOARD => self.clipboard.as_deref(),
            _ => None,
        }
    }
}

/// Replace `{{entity.token}}` references using a single namespace.
pub fn substitute_entities(text: &str, results: &ResultsById) -> String {
    substitute_entities_in(text, &[results])
}

/// Replace `{{entity.token}}` references, consulting `namespaces` in order.
///
/// Runs one pass: substituted values are never re-scanned. A missing entity,
/// or an entity without the named token, leaves the span untouched.
pub fn substitute_entities_in(text: &str, namespaces: &[&ResultsById]) -> String {
    ENTITY_TOKEN
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let token = &caps[2];
            namespaces
                .iter()
                .find_map(|ns| ns.get(entity).and_then(|tokens| tokens.get(token)))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Replace bare `{{name}}` references with ambient-context values.
pub fn substitute_context(text: &str, context: &ContextSnapshot) -> String {
    CONTEXT_TOKEN
        .replace_all(text, |caps: &Captures| {
            context
                .get(&caps[1])
                .map(str::to_string)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Cheap check used to decide whether context needs gathering at all.
pub fn has_context_tokens(text: &str) -> bool {
    CONTEXT_TOKEN
        .captures_iter(text)
        .any(|caps| CONTEXT_NAMES.contains(&&caps[1]))
}

/// Entity ids referenced via `{{entity.token}}`, in first-seen order.
pub fn referenced_entities(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in ENTITY_TOKEN.captures_iter(text) {
        let id = caps[1].to_string();
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

/// Whether `id` can be referenced as the entity part of a token.
pub fn is_valid_entity_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

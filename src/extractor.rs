use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::browser::{BrowserError, Node};

/// One way of reading a value out of a listing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorSpec {
    /// Visible text of the first descendant matching `css`.
    Text { css: String },
    /// An attribute of the first descendant matching `css`.
    Attribute { css: String, name: String },
    /// The `index`-th non-empty line of the node's own text.
    Line { index: usize },
}

impl SelectorSpec {
    pub fn text(css: &str) -> Self {
        SelectorSpec::Text { css: css.to_string() }
    }

    pub fn attr(css: &str, name: &str) -> Self {
        SelectorSpec::Attribute {
            css: css.to_string(),
            name: name.to_string(),
        }
    }

    pub fn line(index: usize) -> Self {
        SelectorSpec::Line { index }
    }
}

/// Ordered fallback chain for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub selectors: Vec<SelectorSpec>,
    /// Values containing any of these markers are treated as empty.
    #[serde(default)]
    pub reject: Vec<String>,
}

impl FieldSpec {
    pub fn new(selectors: Vec<SelectorSpec>) -> Self {
        FieldSpec {
            selectors,
            reject: Vec::new(),
        }
    }

    pub fn with_reject(mut self, markers: &[&str]) -> Self {
        self.reject = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    fn is_rejected(&self, value: &str) -> bool {
        let lower = value.to_lowercase();
        self.reject
            .iter()
            .any(|m| lower.contains(m.to_lowercase().as_str()))
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn read<N: Node>(node: &N, spec: &SelectorSpec, timeout: Duration) -> Result<Option<String>, BrowserError> {
    match spec {
        SelectorSpec::Text { css } => match node.find(css, timeout)? {
            Some(found) => Ok(Some(collapse_whitespace(&found.text(timeout)?))),
            None => Ok(None),
        },
        SelectorSpec::Attribute { css, name } => match node.find(css, timeout)? {
            Some(found) => Ok(found.attribute(name, timeout)?.map(|v| v.trim().to_string())),
            None => Ok(None),
        },
        SelectorSpec::Line { index } => {
            let text = node.text(timeout)?;
            Ok(text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .nth(*index)
                .map(collapse_whitespace))
        }
    }
}

/// Returns the first non-empty value produced by the field's selector chain.
///
/// A selector that errors or times out is skipped; only running out of
/// selectors yields `None`.
pub fn extract_field<N: Node>(node: &N, field: &FieldSpec, timeout: Duration) -> Option<String> {
    for spec in &field.selectors {
        match read(node, spec, timeout) {
            Ok(Some(value)) if !value.is_empty() => {
                if field.is_rejected(&value) {
                    debug!("Rejected '{}' from {:?}", value, spec);
                    continue;
                }
                return Some(value);
            }
            Ok(_) => {}
            Err(e) => debug!("Selector {:?} failed: {}", spec, e),
        }
    }
    None
}

//! Fakes for the browser capability, shared by unit tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::browser::{Browser, BrowserError, Node};

/// In-memory node: css selector -> child node, plus its own text and attributes.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeNode {
    pub text: String,
    pub attrs: HashMap<String, String>,
    pub children: HashMap<String, FakeNode>,
    pub failing: Vec<String>,
    pub broken: bool,
    pub hidden: bool,
    pub click_fails: bool,
    /// Shared between clones, so clicks on a queried copy are visible here.
    pub clicks: Rc<Cell<usize>>,
}

impl FakeNode {
    pub fn with_text(text: &str) -> Self {
        FakeNode {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn child(mut self, css: &str, node: FakeNode) -> Self {
        self.children.insert(css.to_string(), node);
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn broken() -> Self {
        FakeNode {
            broken: true,
            ..Default::default()
        }
    }

    pub fn button() -> Self {
        FakeNode::default()
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn unclickable(mut self) -> Self {
        self.click_fails = true;
        self
    }

    pub fn clicks(&self) -> usize {
        self.clicks.get()
    }

    pub fn failing_on(mut self, css: &str) -> Self {
        self.failing.push(css.to_string());
        self
    }
}

impl Node for FakeNode {
    fn find(&self, selector: &str, timeout: Duration) -> Result<Option<Self>, BrowserError> {
        if self.broken {
            return Err(BrowserError::NotFound(selector.to_string()));
        }
        if self.failing.iter().any(|f| f == selector) {
            return Err(BrowserError::Timeout(timeout));
        }
        Ok(self.children.get(selector).cloned())
    }

    fn text(&self, _timeout: Duration) -> Result<String, BrowserError> {
        if self.broken {
            return Err(BrowserError::NotFound("text".to_string()));
        }
        Ok(self.text.clone())
    }

    fn attribute(&self, name: &str, _timeout: Duration) -> Result<Option<String>, BrowserError> {
        Ok(self.attrs.get(name).cloned())
    }

    fn is_visible(&self, _timeout: Duration) -> Result<bool, BrowserError> {
        Ok(!self.hidden)
    }

    fn click(&self) -> Result<(), BrowserError> {
        self.clicks.set(self.clicks.get() + 1);
        if self.click_fails {
            return Err(BrowserError::Unsupported("click"));
        }
        Ok(())
    }
}

/// Scripted browser: container selector -> listing nodes.
#[derive(Debug, Default)]
pub(crate) struct FakeBrowser {
    pub listings: HashMap<String, Vec<FakeNode>>,
    pub navigation_timeout: bool,
    pub visited: Vec<String>,
}

impl FakeBrowser {
    pub fn with_listings(selector: &str, nodes: Vec<FakeNode>) -> Self {
        let mut browser = FakeBrowser::default();
        browser.listings.insert(selector.to_string(), nodes);
        browser
    }
}

impl Browser for FakeBrowser {
    type Node = FakeNode;

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.visited.push(url.to_string());
        if self.navigation_timeout {
            return Err(BrowserError::Timeout(timeout));
        }
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        match self.listings.get(selector) {
            Some(nodes) if !nodes.is_empty() => Ok(()),
            _ => Err(BrowserError::Timeout(timeout)),
        }
    }

    fn query_all(&self, selector: &str) -> Result<Vec<FakeNode>, BrowserError> {
        Ok(self.listings.get(selector).cloned().unwrap_or_default())
    }

    fn content(&self) -> Result<String, BrowserError> {
        Ok("<html><body>fake</body></html>".to_string())
    }
}

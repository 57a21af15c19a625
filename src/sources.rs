//! Source adapters.
//!
//! Every source runs the same control flow in [`SelectorAdapter`]; what
//! differs between sites is data only: the URL shape, the consent buttons,
//! the listing containers and the per-field selector chains in a
//! [`SourceProfile`].

use chrono::Local;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

use crate::browser::{Browser, BrowserError, Node};
use crate::classifier::KeywordClassifier;
use crate::config::Timeouts;
use crate::extractor::{extract_field, FieldSpec, SelectorSpec};
use crate::posting::{Candidate, SearchTask, UNKNOWN_COMPANY};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("invalid search url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

fn default_max_results() -> usize {
    50
}

/// Everything site-specific about one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    /// Search URL. `{term}`, `{locality}`, `{query}` and `{term_slug}` are
    /// substituted percent-encoded.
    pub url_template: String,
    /// Shape of `{query}`, e.g. `"{term} vagas {locality}"`.
    #[serde(default)]
    pub query_template: Option<String>,
    /// Base for resolving relative posting links.
    pub base_url: String,
    #[serde(default)]
    pub consent_buttons: Vec<String>,
    /// Listing-node selectors, most specific first.
    pub containers: Vec<String>,
    pub title: FieldSpec,
    #[serde(default)]
    pub company: FieldSpec,
    #[serde(default)]
    pub location: FieldSpec,
    #[serde(default)]
    pub link: FieldSpec,
    /// Drop listings whose title shares no significant word with the term.
    #[serde(default)]
    pub require_term_match: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn slug(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

impl SourceProfile {
    pub fn search_url(&self, term: &str, locality: &str) -> Result<String, SourceError> {
        let query = self
            .query_template
            .as_deref()
            .unwrap_or("{term} {locality}")
            .replace("{term}", term)
            .replace("{locality}", locality);

        let url = self
            .url_template
            .replace("{query}", &urlencoding::encode(&query))
            .replace("{term_slug}", &urlencoding::encode(&slug(term)))
            .replace("{term}", &urlencoding::encode(term))
            .replace("{locality}", &urlencoding::encode(locality));

        Url::parse(&url).map_err(|e| SourceError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(url)
    }

    /// Absolute form of an extracted link, or `None` if it cannot be made absolute.
    pub fn resolve_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        let base = Url::parse(&self.base_url).ok()?;
        base.join(href).ok().map(|u| u.to_string())
    }
}

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex"))
}

/// Words longer than three characters, lowercased. Connectives like "de"
/// and "da" never count.
fn significant_words(s: &str) -> Vec<String> {
    word_regex()
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() > 3)
        .collect()
}

/// True when `title` mentions at least one significant word of `term`.
/// A term with no significant words matches every title.
pub fn is_relevant(title: &str, term: &str) -> bool {
    let words = significant_words(term);
    if words.is_empty() {
        return true;
    }
    let title_words = significant_words(title);
    words.iter().any(|w| title_words.contains(w))
}

/// What one adapter invocation produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub candidates: Vec<Candidate>,
    /// Listings dropped because no title could be read.
    pub skipped_untitled: usize,
    /// Listings dropped by the term-relevance filter.
    pub filtered_irrelevant: usize,
    /// Listings whose markup could not be read at all.
    pub failed_nodes: usize,
}

/// A job-posting source as seen by the sweeper.
pub trait JobSource<B: Browser> {
    fn name(&self) -> &str;

    /// Searches one term. Transient page problems yield an empty report;
    /// an `Err` is reserved for failures the sweeper should log as errors.
    fn search(&self, browser: &mut B, task: &SearchTask) -> Result<SearchReport, SourceError>;
}

/// The single adapter implementation, driven by a [`SourceProfile`].
pub struct SelectorAdapter {
    profile: SourceProfile,
    classifier: KeywordClassifier,
    timeouts: Timeouts,
    snapshot_dir: Option<PathBuf>,
}

enum NodeOutcome {
    Accepted(Candidate),
    Untitled,
    Irrelevant,
    Failed(BrowserError),
}

impl SelectorAdapter {
    pub fn new(
        profile: SourceProfile,
        classifier: KeywordClassifier,
        timeouts: Timeouts,
        snapshot_dir: Option<PathBuf>,
    ) -> Self {
        SelectorAdapter {
            profile,
            classifier,
            timeouts,
            snapshot_dir,
        }
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    fn dismiss_consent<B: Browser>(&self, browser: &B) {
        for selector in &self.profile.consent_buttons {
            let button = match browser.query_all(selector) {
                Ok(nodes) => nodes.into_iter().next(),
                Err(_) => None,
            };
            let Some(button) = button else { continue };
            if !button.is_visible(self.timeouts.consent()).unwrap_or(false) {
                continue;
            }
            match button.click() {
                Ok(()) => {
                    debug!("Dismissed overlay via '{}'", selector);
                    return;
                }
                Err(e) => debug!("Could not click '{}': {}", selector, e),
            }
        }
    }

    fn find_container<B: Browser>(&self, browser: &mut B) -> Option<&str> {
        self.profile
            .containers
            .iter()
            .find(|sel| browser.wait_for_selector(sel, self.timeouts.container()).is_ok())
            .map(String::as_str)
    }

    fn extract<N: Node>(&self, node: &N, task: &SearchTask, search_url: &str) -> NodeOutcome {
        let timeout = self.timeouts.selector();
        let full_text = match node.text(timeout) {
            Ok(text) => text,
            Err(e) => return NodeOutcome::Failed(e),
        };

        let Some(title) = extract_field(node, &self.profile.title, timeout) else {
            return NodeOutcome::Untitled;
        };
        if self.profile.require_term_match && !is_relevant(&title, &task.term) {
            return NodeOutcome::Irrelevant;
        }

        let company = extract_field(node, &self.profile.company, timeout)
            .unwrap_or_else(|| UNKNOWN_COMPANY.to_string());
        let location = extract_field(node, &self.profile.location, timeout)
            .unwrap_or_else(|| task.locality.clone());
        let link = extract_field(node, &self.profile.link, timeout)
            .and_then(|href| self.profile.resolve_link(&href))
            .unwrap_or_else(|| search_url.to_string());

        let high_value = self.classifier.is_high_value(&full_text);
        NodeOutcome::Accepted(Candidate::new(
            &self.profile.name,
            &title,
            &company,
            &location,
            &link,
            high_value,
        ))
    }

    fn snapshot<B: Browser>(&self, browser: &B, task: &SearchTask) {
        let Some(dir) = &self.snapshot_dir else { return };
        match browser.content() {
            Ok(html) => match write_snapshot(dir, &self.profile.name, &task.term, &html) {
                Ok(path) => info!("   Page snapshot saved to {:?}", path),
                Err(e) => warn!("   Could not save page snapshot: {}", e),
            },
            Err(e) => debug!("No page content for snapshot: {}", e),
        }
    }
}

fn write_snapshot(dir: &Path, source: &str, term: &str, html: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let term_part: String = term
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let name = format!(
        "{}-{}-{}.html",
        source,
        term_part,
        Local::now().format("%Y%m%d-%H%M%S")
    );
    let path = dir.join(name);
    fs::write(&path, html)?;
    Ok(path)
}

impl<B: Browser> JobSource<B> for SelectorAdapter {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn search(&self, browser: &mut B, task: &SearchTask) -> Result<SearchReport, SourceError> {
        let mut report = SearchReport::default();
        let url = self.profile.search_url(&task.term, &task.locality)?;

        match browser.navigate(&url, self.timeouts.navigation()) {
            Ok(()) => {}
            Err(BrowserError::Timeout(t)) => {
                warn!("   Navigation timed out after {:?}: {}", t, url);
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        }

        self.dismiss_consent(browser);

        let Some(container) = self.find_container(browser).map(str::to_string) else {
            warn!(
                "   No listings appeared on {} for '{}'",
                self.profile.name, task.term
            );
            self.snapshot(browser, task);
            return Ok(report);
        };

        let nodes = browser.query_all(&container)?;
        info!("   Found {} potential listings ('{}')", nodes.len(), container);

        for (i, node) in nodes.iter().enumerate() {
            if report.candidates.len() >= self.profile.max_results {
                break;
            }
            match self.extract(node, task, &url) {
                NodeOutcome::Accepted(candidate) => report.candidates.push(candidate),
                NodeOutcome::Untitled => report.skipped_untitled += 1,
                NodeOutcome::Irrelevant => report.filtered_irrelevant += 1,
                NodeOutcome::Failed(e) => {
                    debug!("Listing #{} unreadable: {}", i + 1, e);
                    report.failed_nodes += 1;
                }
            }
        }

        Ok(report)
    }
}

fn text(css: &str) -> SelectorSpec {
    SelectorSpec::text(css)
}

fn attr(css: &str, name: &str) -> SelectorSpec {
    SelectorSpec::attr(css, name)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Profiles for the sources supported out of the box, in default sweep order.
pub fn builtin_profiles() -> Vec<SourceProfile> {
    vec![
        SourceProfile {
            name: "google".to_string(),
            // ibp=htl;jobs opens the jobs panel, date_posted:week keeps the last 7 days
            url_template:
                "https://www.google.com/search?q={query}&ibp=htl;jobs&htichips=date_posted:week"
                    .to_string(),
            query_template: Some("{term} vagas {locality}".to_string()),
            base_url: "https://www.google.com/".to_string(),
            consent_buttons: strings(&[
                "button#W0wltc",
                r#"button[aria-label="Agora não"]"#,
                r#"g-raised-button[data-ved] div[role="button"]"#,
            ]),
            containers: strings(&[r#"div[role="treeitem"]"#, "li"]),
            title: FieldSpec::new(vec![text(r#"div[role="heading"]"#), SelectorSpec::line(0)]),
            company: FieldSpec::new(vec![SelectorSpec::line(1), SelectorSpec::line(2)])
                .with_reject(&["há ", "via "]),
            location: FieldSpec::default(),
            link: FieldSpec::new(vec![attr("a[href^=\"http\"]", "href")]),
            require_term_match: true,
            max_results: default_max_results(),
        },
        SourceProfile {
            name: "linkedin".to_string(),
            url_template:
                "https://www.linkedin.com/jobs/search?keywords={term}&location={locality}&f_TPR=r604800"
                    .to_string(),
            query_template: None,
            base_url: "https://www.linkedin.com/".to_string(),
            consent_buttons: strings(&[
                r#"button[action-type="DENY"]"#,
                "button.artdeco-global-alert-action",
            ]),
            containers: strings(&[
                "ul.jobs-search__results-list > li",
                "div.base-search-card",
                "div.job-search-card",
            ]),
            title: FieldSpec::new(vec![
                text("h3.base-search-card__title"),
                text("span.sr-only"),
                text("h3"),
            ]),
            company: FieldSpec::new(vec![
                text("h4.base-search-card__subtitle a"),
                text("h4.base-search-card__subtitle"),
                text("h4"),
            ]),
            location: FieldSpec::new(vec![
                text("span.job-search-card__location"),
                text(".base-search-card__metadata span"),
            ]),
            link: FieldSpec::new(vec![
                attr("a.base-card__full-link", "href"),
                attr("a", "href"),
            ]),
            require_term_match: false,
            max_results: default_max_results(),
        },
        SourceProfile {
            name: "indeed".to_string(),
            url_template: "https://br.indeed.com/jobs?q={term}&l={locality}&fromage=7".to_string(),
            query_template: None,
            base_url: "https://br.indeed.com/".to_string(),
            consent_buttons: strings(&[
                "button#onetrust-reject-all-handler",
                "button#onetrust-accept-btn-handler",
            ]),
            containers: strings(&[
                "div.job_seen_beacon",
                "div.slider_item",
                "div.cardOutline",
            ]),
            title: FieldSpec::new(vec![
                text("h2.jobTitle span[title]"),
                text("h2.jobTitle"),
                text("a.jcs-JobTitle"),
            ]),
            company: FieldSpec::new(vec![
                text(r#"span[data-testid="company-name"]"#),
                text("span.companyName"),
            ]),
            location: FieldSpec::new(vec![
                text(r#"div[data-testid="text-location"]"#),
                text("div.companyLocation"),
            ]),
            link: FieldSpec::new(vec![
                attr("h2.jobTitle a", "href"),
                attr("a.jcs-JobTitle", "href"),
            ]),
            require_term_match: true,
            max_results: default_max_results(),
        },
        SourceProfile {
            name: "vagas".to_string(),
            url_template: "https://www.vagas.com.br/vagas-de-{term_slug}?q={term}&c[]={locality}&ordenar_por=mais_recentes"
                .to_string(),
            query_template: None,
            base_url: "https://www.vagas.com.br/".to_string(),
            consent_buttons: strings(&["button#onetrust-accept-btn-handler"]),
            containers: strings(&["li.vaga", "div.informacoes-header"]),
            title: FieldSpec::new(vec![text("h2.cargo a"), text("a.link-detalhes-vaga")]),
            company: FieldSpec::new(vec![text("span.emprVaga"), text(".emprVaga")]),
            location: FieldSpec::new(vec![text("span.vaga-local"), text("div.vaga-local")]),
            link: FieldSpec::new(vec![
                attr("h2.cargo a", "href"),
                attr("a.link-detalhes-vaga", "href"),
            ]),
            require_term_match: false,
            max_results: default_max_results(),
        },
    ]
}

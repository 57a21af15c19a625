use log::{debug, warn};
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use std::rc::Rc;
use std::time::Duration;

use crate::browser::{Browser, BrowserError, Node};

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Browser session backed by plain HTTP fetches and a static DOM.
///
/// The cookie jar lives as long as the session, so every task of a sweep
/// looks like the same visitor. Pages that need script execution will show
/// up as missing listing containers, which the adapters already tolerate.
pub struct HttpBrowser {
    client: Client,
    user_agent: &'static str,
    raw: Option<String>,
    document: Option<Rc<Html>>,
}

impl HttpBrowser {
    pub fn new() -> Result<Self, BrowserError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|e| BrowserError::Navigation {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        // One user agent per session, not per request.
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];

        Ok(HttpBrowser {
            client,
            user_agent,
            raw: None,
            document: None,
        })
    }

    /// Loads `html` as the current page without touching the network.
    pub fn load_html(&mut self, html: &str) {
        self.raw = Some(html.to_string());
        self.document = Some(Rc::new(Html::parse_document(html)));
    }

    fn document(&self) -> Result<&Rc<Html>, BrowserError> {
        self.document.as_ref().ok_or(BrowserError::NoPage)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, BrowserError> {
    Selector::parse(selector).map_err(|_| BrowserError::InvalidSelector(selector.to_string()))
}

fn text_lines(element: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    collect_text(element, &mut lines);
    lines.join("\n")
}

fn collect_text<'a>(element: ElementRef<'a>, lines: &mut Vec<&'a str>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let line = text.trim();
            if !line.is_empty() {
                lines.push(line);
            }
        } else if let Some(el) = ElementRef::wrap(child) {
            if !NON_RENDERED.contains(&el.value().name()) && !hidden_by_markup(el) {
                collect_text(el, lines);
            }
        }
    }
}

const NON_RENDERED: [&str; 4] = ["script", "style", "noscript", "template"];

fn hidden_by_markup(element: ElementRef<'_>) -> bool {
    let v = element.value();
    if v.attr("hidden").is_some() {
        return true;
    }
    let style: String = v
        .attr("style")
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    style.contains("display:none") || style.contains("visibility:hidden")
}

impl Browser for HttpBrowser {
    type Node = HtmlNode;

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.raw = None;
        self.document = None;

        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent)
            .timeout(timeout)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    BrowserError::Timeout(timeout)
                } else {
                    BrowserError::Navigation {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 403 || status.as_u16() == 429 {
            warn!("Blocked at {}: {}", url, status);
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("blocked ({})", status),
            });
        }
        if !status.is_success() {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("status {}", status),
            });
        }

        let body = resp.text().map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.load_html(&body);
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        // A static document never changes, so one look is as good as waiting.
        let sel = parse_selector(selector)?;
        if self.document()?.select(&sel).next().is_some() {
            Ok(())
        } else {
            Err(BrowserError::Timeout(timeout))
        }
    }

    fn query_all(&self, selector: &str) -> Result<Vec<HtmlNode>, BrowserError> {
        let sel = parse_selector(selector)?;
        let doc = self.document()?;
        Ok(doc
            .select(&sel)
            .map(|el| HtmlNode {
                doc: Rc::clone(doc),
                id: el.id(),
            })
            .collect())
    }

    fn content(&self) -> Result<String, BrowserError> {
        self.raw.clone().ok_or(BrowserError::NoPage)
    }
}

/// One element of the page it was queried from.
///
/// Holds the parsed page itself, so a node stays usable after the session
/// navigates elsewhere.
#[derive(Debug, Clone)]
pub struct HtmlNode {
    doc: Rc<Html>,
    id: NodeId,
}

impl HtmlNode {
    fn with_element<T>(&self, f: impl FnOnce(ElementRef<'_>) -> T) -> Result<T, BrowserError> {
        let element = self
            .doc
            .tree
            .get(self.id)
            .and_then(ElementRef::wrap)
            .ok_or_else(|| BrowserError::NotFound("element".to_string()))?;
        Ok(f(element))
    }
}

impl Node for HtmlNode {
    fn find(&self, selector: &str, _timeout: Duration) -> Result<Option<Self>, BrowserError> {
        let sel = parse_selector(selector)?;
        self.with_element(|el| {
            let self_id = el.id();
            el.select(&sel)
                .find(|d| d.id() != self_id)
                .map(|d| HtmlNode {
                    doc: Rc::clone(&self.doc),
                    id: d.id(),
                })
        })
    }

    fn text(&self, _timeout: Duration) -> Result<String, BrowserError> {
        self.with_element(text_lines)
    }

    fn attribute(&self, name: &str, _timeout: Duration) -> Result<Option<String>, BrowserError> {
        self.with_element(|el| el.value().attr(name).map(str::to_string))
    }

    fn is_visible(&self, _timeout: Duration) -> Result<bool, BrowserError> {
        self.with_element(|el| {
            el.value().attr("aria-hidden") != Some("true") && !hidden_by_markup(el)
        })
    }

    fn click(&self) -> Result<(), BrowserError> {
        Err(BrowserError::Unsupported("click"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <ul id="results">
            <li class="job">
              <h3 class="title">Analista de <b>PCP</b></h3>
              <span class="company">Scania</span>
              <a class="link" href="/vaga/1">ver</a>
            </li>
            <li class="job" style="display: none">
              <h3 class="title">Supervisor</h3>
            </li>
          </ul>
        </body></html>"#;

    fn browser() -> HttpBrowser {
        let mut b = HttpBrowser::new().unwrap();
        b.load_html(PAGE);
        b
    }

    #[test]
    fn wait_succeeds_only_when_present() {
        let mut b = browser();
        let t = Duration::from_millis(10);
        assert!(b.wait_for_selector("li.job", t).is_ok());
        assert!(matches!(
            b.wait_for_selector("div.none", t),
            Err(BrowserError::Timeout(_))
        ));
    }

    #[test]
    fn nodes_expose_text_and_attributes() {
        let b = browser();
        let t = Duration::from_millis(10);
        let nodes = b.query_all("li.job").unwrap();
        assert_eq!(nodes.len(), 2);

        let title = nodes[0].find(".title", t).unwrap().unwrap();
        assert_eq!(title.text(t).unwrap(), "Analista de\nPCP");

        let link = nodes[0].find("a.link", t).unwrap().unwrap();
        assert_eq!(link.attribute("href", t).unwrap().as_deref(), Some("/vaga/1"));
        assert!(nodes[0].find(".missing", t).unwrap().is_none());
    }

    #[test]
    fn find_excludes_the_node_itself() {
        let b = browser();
        let t = Duration::from_millis(10);
        let nodes = b.query_all("li.job").unwrap();
        assert!(nodes[0].find("li", t).unwrap().is_none());
    }

    #[test]
    fn hidden_nodes_are_not_visible() {
        let b = browser();
        let t = Duration::from_millis(10);
        let nodes = b.query_all("li.job").unwrap();
        assert!(nodes[0].is_visible(t).unwrap());
        assert!(!nodes[1].is_visible(t).unwrap());
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let b = browser();
        assert!(matches!(
            b.query_all("li[["),
            Err(BrowserError::InvalidSelector(_))
        ));
    }

    #[test]
    fn table_rows_keep_their_cells() {
        let mut b = HttpBrowser::new().unwrap();
        b.load_html(
            r#"<html><body><table><tbody>
                 <tr class="job">
                   <td class="title">Analista de PCP</td>
                   <td class="company"><a href="/v/1">Scania</a></td>
                 </tr>
               </tbody></table></body></html>"#,
        );
        let t = Duration::from_millis(10);

        let rows = b.query_all("tr.job").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text(t).unwrap(), "Analista de PCP\nScania");

        let title = rows[0].find("td.title", t).unwrap().unwrap();
        assert_eq!(title.text(t).unwrap(), "Analista de PCP");
        let link = rows[0].find("a", t).unwrap().unwrap();
        assert_eq!(link.attribute("href", t).unwrap().as_deref(), Some("/v/1"));

        let cells = b.query_all("td.title").unwrap();
        assert_eq!(cells[0].text(t).unwrap(), "Analista de PCP");
    }

    #[test]
    fn text_skips_scripts_and_hidden_markup() {
        let mut b = HttpBrowser::new().unwrap();
        b.load_html(
            r#"<html><body><div class="card">
                 <h3>Analista de Estoque</h3>
                 <script>var tags = "SAP";</script>
                 <style>.card { color: red }</style>
                 <span hidden>Lean</span>
                 <span style="display: none">Kaizen</span>
                 <span>Ford</span>
               </div></body></html>"#,
        );
        let t = Duration::from_millis(10);
        let card = &b.query_all("div.card").unwrap()[0];
        assert_eq!(card.text(t).unwrap(), "Analista de Estoque\nFord");
    }

    #[test]
    fn nodes_outlive_navigation() {
        let mut b = browser();
        let t = Duration::from_millis(10);
        let nodes = b.query_all("li.job").unwrap();
        b.load_html("<html><body><p>outra página</p></body></html>");
        let title = nodes[0].find(".title", t).unwrap().unwrap();
        assert_eq!(title.text(t).unwrap(), "Analista de\nPCP");
    }

    #[test]
    fn no_page_before_navigation() {
        let b = HttpBrowser::new().unwrap();
        assert!(matches!(b.content(), Err(BrowserError::NoPage)));
    }
}

//! Source registry and per-source fetch/parse adapters.
//!
//! Each configured source declares its response shape: an HTML board listing
//! parsed with CSS selectors, or a JSON feed addressed with JSON pointers.
//! A failure in one source is logged and yields an empty result so the
//! remaining sources still run.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use pulse_core::RawPost;
use pulse_storage::HttpFetcher;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use url::Url;

pub const CRATE_NAME: &str = "pulse-sources";

/// Which crawl group a source belongs to. Bug boards are polled on the fast
/// cycle; general community feeds on the global cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceGroup {
    BugBoard,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceShape {
    /// Every element matching `item_selector` becomes one post; the link is
    /// taken from `link_attr` on the element (or its first descendant `<a>`).
    HtmlList {
        item_selector: String,
        link_attr: String,
    },
    /// `items_pointer` addresses the item array; `title_pointer` and
    /// `url_pointer` are evaluated against each item.
    JsonFeed {
        items_pointer: String,
        title_pointer: String,
        url_pointer: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub source_id: String,
    pub display_name: String,
    pub group: SourceGroup,
    pub enabled: bool,
    pub url: String,
    pub shape: SourceShape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceSpec>,
}

impl SourceRegistry {
    /// Built-in source list used when no `sources.yaml` override is present.
    pub fn builtin() -> Self {
        Self {
            sources: vec![
                SourceSpec {
                    source_id: "dcinside-bug-search".to_string(),
                    display_name: "디시인사이드 버그 검색".to_string(),
                    group: SourceGroup::BugBoard,
                    enabled: true,
                    url: "https://gall.dcinside.com/mgallery/board/lists?id=pulsegame&s_type=search_subject&s_keyword=%EB%B2%84%EA%B7%B8"
                        .to_string(),
                    shape: SourceShape::HtmlList {
                        item_selector: "td.gall_tit > a:first-child".to_string(),
                        link_attr: "href".to_string(),
                    },
                },
                SourceSpec {
                    source_id: "dcinside-gallery".to_string(),
                    display_name: "디시인사이드 갤러리".to_string(),
                    group: SourceGroup::Global,
                    enabled: true,
                    url: "https://gall.dcinside.com/mgallery/board/lists?id=pulsegame".to_string(),
                    shape: SourceShape::HtmlList {
                        item_selector: "td.gall_tit > a:first-child".to_string(),
                        link_attr: "href".to_string(),
                    },
                },
                SourceSpec {
                    source_id: "reddit-search".to_string(),
                    display_name: "Reddit search".to_string(),
                    group: SourceGroup::Global,
                    enabled: true,
                    url: "https://www.reddit.com/search.json?q=pulsegame&sort=new&limit=25"
                        .to_string(),
                    shape: SourceShape::JsonFeed {
                        items_pointer: "/data/children".to_string(),
                        title_pointer: "/data/title".to_string(),
                        url_pointer: "/data/permalink".to_string(),
                    },
                },
            ],
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry yaml")
    }

    /// Load the registry from `path`, falling back to the built-in list when
    /// the file is absent or unreadable (the fallback is logged).
    pub fn load_or_builtin(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match Self::from_yaml_str(&text) {
                Ok(registry) => registry,
                Err(err) => {
                    warn!(path = %path.display(), %err, "invalid source registry; using built-in sources");
                    Self::builtin()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::builtin(),
            Err(err) => {
                warn!(path = %path.display(), %err, "unreadable source registry; using built-in sources");
                Self::builtin()
            }
        }
    }

    /// Enabled sources belonging to any of the given groups, in registry
    /// order.
    pub fn for_groups(&self, groups: &[SourceGroup]) -> Vec<&SourceSpec> {
        self.sources
            .iter()
            .filter(|s| s.enabled && groups.contains(&s.group))
            .collect()
    }
}

fn resolve_link(base_url: &str, href: &str) -> Option<String> {
    if href.trim().is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Url::parse(base_url)
            .and_then(|base| base.join(href))
            .map(|joined| joined.to_string())
            .ok(),
    }
}

pub fn parse_html_list(
    body: &str,
    spec: &SourceSpec,
    item_selector: &str,
    link_attr: &str,
) -> Result<Vec<RawPost>> {
    let selector =
        Selector::parse(item_selector).map_err(|e| anyhow!("bad selector {item_selector:?}: {e}"))?;
    let anchor = Selector::parse("a[href]").map_err(|e| anyhow!("bad anchor selector: {e}"))?;
    let document = Html::parse_document(body);

    let mut posts = Vec::new();
    for element in document.select(&selector) {
        let title = element.text().collect::<String>().trim().to_string();
        let href = element
            .value()
            .attr(link_attr)
            .map(str::to_string)
            .or_else(|| {
                element
                    .select(&anchor)
                    .next()
                    .and_then(|a| a.value().attr(link_attr))
                    .map(str::to_string)
            });
        let url = href.as_deref().and_then(|h| resolve_link(&spec.url, h));
        posts.push(RawPost {
            title,
            url,
            source: spec.source_id.clone(),
        });
    }
    Ok(posts)
}

pub fn parse_json_feed(
    body: &str,
    spec: &SourceSpec,
    items_pointer: &str,
    title_pointer: &str,
    url_pointer: &str,
) -> Result<Vec<RawPost>> {
    let value: JsonValue = serde_json::from_str(body).context("feed body is not valid JSON")?;
    let items = value
        .pointer(items_pointer)
        .and_then(JsonValue::as_array)
        .ok_or_else(|| anyhow!("no item array at pointer {items_pointer:?}"))?;

    let mut posts = Vec::new();
    for item in items {
        let Some(title) = item.pointer(title_pointer).and_then(JsonValue::as_str) else {
            continue;
        };
        let url = item
            .pointer(url_pointer)
            .and_then(JsonValue::as_str)
            .and_then(|href| resolve_link(&spec.url, href));
        posts.push(RawPost {
            title: title.to_string(),
            url,
            source: spec.source_id.clone(),
        });
    }
    Ok(posts)
}

pub fn parse_source_body(body: &str, spec: &SourceSpec) -> Result<Vec<RawPost>> {
    match &spec.shape {
        SourceShape::HtmlList {
            item_selector,
            link_attr,
        } => parse_html_list(body, spec, item_selector, link_attr),
        SourceShape::JsonFeed {
            items_pointer,
            title_pointer,
            url_pointer,
        } => parse_json_feed(body, spec, items_pointer, title_pointer, url_pointer),
    }
}

/// Fetch and parse one source. Transport, status, and parse failures are all
/// logged and mapped to an empty result so the caller's loop keeps going.
pub async fn fetch_source(http: &HttpFetcher, spec: &SourceSpec) -> Vec<RawPost> {
    let body = match http.fetch_text(&spec.source_id, &spec.url).await {
        Ok(body) => body,
        Err(err) => {
            warn!(source_id = %spec.source_id, %err, "fetch failed; treating source as empty");
            return Vec::new();
        }
    };
    match parse_source_body(&body, spec) {
        Ok(posts) => {
            debug!(source_id = %spec.source_id, count = posts.len(), "parsed source");
            posts
        }
        Err(err) => {
            warn!(source_id = %spec.source_id, %err, "parse failed; treating source as empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html_spec() -> SourceSpec {
        SourceSpec {
            source_id: "test-board".to_string(),
            display_name: "Test board".to_string(),
            group: SourceGroup::BugBoard,
            enabled: true,
            url: "https://board.example.com/lists?id=pulsegame".to_string(),
            shape: SourceShape::HtmlList {
                item_selector: "td.gall_tit > a:first-child".to_string(),
                link_attr: "href".to_string(),
            },
        }
    }

    fn json_spec() -> SourceSpec {
        SourceSpec {
            source_id: "test-feed".to_string(),
            display_name: "Test feed".to_string(),
            group: SourceGroup::Global,
            enabled: true,
            url: "https://www.reddit.com/search.json?q=pulsegame".to_string(),
            shape: SourceShape::JsonFeed {
                items_pointer: "/data/children".to_string(),
                title_pointer: "/data/title".to_string(),
                url_pointer: "/data/permalink".to_string(),
            },
        }
    }

    const BOARD_HTML: &str = r#"
        <table>
          <tr><td class="gall_tit"><a href="/board/view?no=101">전투 중 오류 제보</a></td></tr>
          <tr><td class="gall_tit"><a href="https://board.example.com/board/view?no=102">이번 패치 꿀잼</a></td></tr>
          <tr><td class="gall_tit"><a href="/board/view?no=103"></a></td></tr>
        </table>
    "#;

    #[test]
    fn html_list_parses_titles_and_resolves_relative_links() {
        let spec = html_spec();
        let posts = parse_source_body(BOARD_HTML, &spec).unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].title, "전투 중 오류 제보");
        assert_eq!(
            posts[0].url.as_deref(),
            Some("https://board.example.com/board/view?no=101")
        );
        assert_eq!(
            posts[1].url.as_deref(),
            Some("https://board.example.com/board/view?no=102")
        );
        // Empty titles are kept; the classifier maps them to `other`.
        assert_eq!(posts[2].title, "");
        assert_eq!(posts[2].source, "test-board");
    }

    #[test]
    fn html_list_rejects_invalid_selector() {
        let mut spec = html_spec();
        spec.shape = SourceShape::HtmlList {
            item_selector: ":::".to_string(),
            link_attr: "href".to_string(),
        };
        assert!(parse_source_body(BOARD_HTML, &spec).is_err());
    }

    const FEED_JSON: &str = r#"{
        "data": {
            "children": [
                {"data": {"title": "game keeps crashing", "permalink": "/r/pulsegame/comments/abc/"}},
                {"data": {"permalink": "/r/pulsegame/comments/def/"}},
                {"data": {"title": "loving the new event"}}
            ]
        }
    }"#;

    #[test]
    fn json_feed_parses_items_and_skips_untitled_ones() {
        let spec = json_spec();
        let posts = parse_source_body(FEED_JSON, &spec).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "game keeps crashing");
        assert_eq!(
            posts[0].url.as_deref(),
            Some("https://www.reddit.com/r/pulsegame/comments/abc/")
        );
        assert_eq!(posts[1].title, "loving the new event");
        assert_eq!(posts[1].url, None);
    }

    #[test]
    fn json_feed_rejects_non_json_body() {
        let spec = json_spec();
        assert!(parse_source_body("<html></html>", &spec).is_err());
    }

    #[test]
    fn json_feed_rejects_missing_item_array() {
        let spec = json_spec();
        assert!(parse_source_body(r#"{"data": {}}"#, &spec).is_err());
    }

    #[test]
    fn registry_filters_by_group_and_enabled_flag() {
        let mut registry = SourceRegistry::builtin();
        registry.sources[1].enabled = false;

        let bug = registry.for_groups(&[SourceGroup::BugBoard]);
        assert_eq!(bug.len(), 1);
        assert_eq!(bug[0].source_id, "dcinside-bug-search");

        let global = registry.for_groups(&[SourceGroup::Global]);
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].source_id, "reddit-search");

        let both = registry.for_groups(&[SourceGroup::BugBoard, SourceGroup::Global]);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn registry_yaml_round_trip() {
        let yaml = serde_yaml::to_string(&SourceRegistry::builtin()).unwrap();
        let parsed = SourceRegistry::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, SourceRegistry::builtin());
    }

    #[test]
    fn load_or_builtin_falls_back_when_file_is_absent() {
        let registry = SourceRegistry::load_or_builtin(Path::new("/nonexistent/sources.yaml"));
        assert_eq!(registry, SourceRegistry::builtin());
    }
}

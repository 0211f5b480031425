//! In-process render backend.
//!
//! Parses the page with `scraper` and runs the same candidate scoring as the
//! in-browser extraction script. Scripts never run, so pages that build their
//! content client-side come back thin.

use super::{RenderBackend, RenderSource};
use crate::error::IngestError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use tracing::debug;

static UNLIKELY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)banner|breadcrumbs|combx|comment|community|cover-wrap|disqus|extra|footer|gdpr|header|legends|menu|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|cookie|share|nav").unwrap()
});
static MAYBE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)and|article|body|column|content|main|shadow|post|entry|story|text").unwrap()
});
static POSITIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)article|body|content|entry|hentry|h-entry|main|page|post|text|blog|story")
        .unwrap()
});
static NEGATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)-ad-|hidden|banner|combx|comment|com-|contact|foot|footer|footnote|gdpr|masthead|media|meta|outbrain|promo|related|scroll|share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|tool|widget|nav|menu").unwrap()
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());

static STRIPPED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "script,style,noscript,iframe,form,button,svg,template,nav,aside,footer,header,select,textarea,object,embed",
    )
    .unwrap()
});
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static ANY: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p,pre,td,blockquote").unwrap());
static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static HTML: Lazy<Selector> = Lazy::new(|| Selector::parse("html").unwrap());
static BYLINE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[rel="author"], .byline, .author"#).unwrap());

/// Render backend that parses HTML without a browser.
pub struct StaticBackend {
    client: reqwest::Client,
    html: Option<String>,
}

impl StaticBackend {
    /// Remote pages are downloaded with `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, html: None }
    }
}

#[async_trait]
impl RenderBackend for StaticBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn load(&mut self, source: &RenderSource) -> Result<(), IngestError> {
        self.html = None;
        let html = match source {
            RenderSource::Html(html) => html.clone(),
            RenderSource::Url(url) => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| IngestError::RenderLoadFailed(format!("{url}: {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(IngestError::RenderLoadFailed(format!(
                        "{url}: HTTP {}",
                        status.as_u16()
                    )));
                }
                response
                    .text()
                    .await
                    .map_err(|e| IngestError::RenderLoadFailed(format!("{url}: {e}")))?
            }
        };
        debug!("Static backend loaded {} bytes", html.len());
        self.html = Some(html);
        Ok(())
    }

    async fn evaluate_extraction(&mut self) -> Result<Value, IngestError> {
        let html = self
            .html
            .as_deref()
            .ok_or_else(|| IngestError::ScriptEvaluation("no page loaded".into()))?;
        Ok(extract_article(html))
    }
}

fn trimmed_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn meta(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let el = doc.select(&selector).next()?;
    non_empty(el.value().attr("content").unwrap_or("").trim().to_string())
}

fn match_string(el: ElementRef<'_>) -> String {
    format!(
        "{} {}",
        el.value().attr("class").unwrap_or(""),
        el.value().id().unwrap_or("")
    )
}

fn initial_score(el: ElementRef<'_>) -> f64 {
    let m = match_string(el);
    let mut score = 0.0;
    if NEGATIVE.is_match(&m) {
        score -= 25.0;
    }
    if POSITIVE.is_match(&m) {
        score += 25.0;
    }
    score
        + match el.value().name() {
            "div" => 5.0,
            "pre" | "td" | "blockquote" => 3.0,
            "ol" | "ul" | "dl" | "dd" | "dt" | "li" => -3.0,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
            _ => 0.0,
        }
}

fn link_density(el: ElementRef<'_>) -> f64 {
    let total = el.text().map(|t| t.chars().count()).sum::<usize>();
    if total == 0 {
        return 0.0;
    }
    let links: usize = el
        .select(&LINKS)
        .flat_map(|a| a.text())
        .map(|t| t.chars().count())
        .sum();
    links as f64 / total as f64
}

/// Candidate scores in first-seen order, so ties go to the earlier node.
#[derive(Default)]
struct Scores<'a> {
    order: Vec<(ElementRef<'a>, f64)>,
}

impl<'a> Scores<'a> {
    fn add(&mut self, el: ElementRef<'a>, amount: f64) {
        match self.order.iter_mut().find(|(e, _)| e.id() == el.id()) {
            Some((_, score)) => *score += amount,
            None => self.order.push((el, initial_score(el) + amount)),
        }
    }
}

/// Scoreable ancestor: anything from the body down.
fn scoreable(el: Option<ElementRef<'_>>) -> Option<ElementRef<'_>> {
    el.filter(|e| e.value().name() != "html")
}

/// Run the extraction heuristics over `html` and return the article object.
pub(crate) fn extract_article(html: &str) -> Value {
    let mut doc = Html::parse_document(html);

    let root_el = doc.select(&HTML).next();
    let dir = root_el.and_then(|e| e.value().attr("dir")).map(str::to_string);
    let lang = root_el.and_then(|e| e.value().attr("lang")).map(str::to_string);
    let title = meta(&doc, r#"meta[property="og:title"]"#)
        .or_else(|| doc.select(&TITLE).next().map(trimmed_text).and_then(non_empty))
        .or_else(|| doc.select(&H1).next().map(trimmed_text))
        .unwrap_or_default();
    let byline = meta(&doc, r#"meta[name="author"]"#)
        .or_else(|| doc.select(&BYLINE).next().map(trimmed_text).and_then(non_empty));
    let description = meta(&doc, r#"meta[name="description"]"#)
        .or_else(|| meta(&doc, r#"meta[property="og:description"]"#));
    let site_name = meta(&doc, r#"meta[property="og:site_name"]"#);

    let Some(body_id) = doc.select(&BODY).next().map(|b| b.id()) else {
        return Value::Null;
    };

    // Strip non-content elements and unlikely candidates.
    let doomed: Vec<_> = {
        let Some(body) = doc.tree.get(body_id).and_then(ElementRef::wrap) else {
            return Value::Null;
        };
        body.select(&STRIPPED)
            .map(|e| e.id())
            .chain(
                body.select(&ANY)
                    .filter(|e| e.id() != body_id && e.value().name() != "a")
                    .filter(|e| {
                        let m = match_string(*e);
                        UNLIKELY.is_match(&m) && !MAYBE.is_match(&m)
                    })
                    .map(|e| e.id()),
            )
            .collect()
    };
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    let Some(body) = doc.tree.get(body_id).and_then(ElementRef::wrap) else {
        return Value::Null;
    };

    let mut scores = Scores::default();
    for p in body.select(&PARAGRAPHS) {
        let content = trimmed_text(p);
        let length = content.chars().count();
        if length < 25 {
            continue;
        }
        let Some(parent) = scoreable(p.parent().and_then(ElementRef::wrap)) else {
            continue;
        };
        let score = 1.0 + content.matches(',').count() as f64 + (length / 100).min(3) as f64;
        scores.add(parent, score);
        if let Some(grand) = scoreable(parent.parent().and_then(ElementRef::wrap)) {
            scores.add(grand, score / 2.0);
        }
    }

    let mut top = body;
    let mut best = f64::NEG_INFINITY;
    for &(el, score) in &scores.order {
        let adjusted = score * (1.0 - link_density(el));
        if adjusted > best {
            best = adjusted;
            top = el;
        }
    }

    let text_content = top
        .text()
        .collect::<String>()
        .split('\n')
        .map(|line| WHITESPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let excerpt = description.or_else(|| {
        top.select(&P)
            .map(trimmed_text)
            .find(|t| !t.is_empty())
    });

    json!({
        "title": title,
        "byline": byline,
        "dir": dir,
        "lang": lang,
        "content": format!("<div>{}</div>", top.inner_html()),
        "textContent": text_content,
        "length": text_content.chars().count(),
        "excerpt": excerpt,
        "siteName": site_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readability::article_from_value;

    const PAGE: &str = r#"<!doctype html>
<html lang="en"><head>
<title> Fallback title </title>
<meta property="og:title" content="The Real Title">
<meta name="author" content="A. Writer">
<script>var tracking = 1;</script>
</head><body>
<nav><a href="/">Home</a> <a href="/about">About</a></nav>
<div class="sidebar"><p>Sign up for our newsletter today, friends, and never miss a thing.</p></div>
<div id="story" class="article-body">
  <h2>Section</h2>
  <p>The first paragraph of the story is long enough, with commas, to be scored.</p>
  <p>A second paragraph adds more weight, more commas, and more words to the pile.</p>
</div>
<footer>Copyright</footer>
</body></html>"#;

    #[test]
    fn picks_the_story_over_chrome() {
        let article = article_from_value(extract_article(PAGE)).unwrap();
        assert_eq!(article.title, "The Real Title");
        assert_eq!(article.byline.as_deref(), Some("A. Writer"));
        assert_eq!(article.lang.as_deref(), Some("en"));
        assert!(article.content.starts_with("<div>"));
        assert!(article.content.contains("first paragraph"));
        assert!(!article.content.contains("newsletter"));
        assert!(!article.text_content.contains("Home"));
        assert!(!article.text_content.contains("Copyright"));
        assert_eq!(article.length, article.text_content.chars().count());
        assert!(article
            .excerpt
            .as_deref()
            .unwrap()
            .starts_with("The first paragraph"));
    }

    #[test]
    fn title_falls_back_to_title_element() {
        let article = article_from_value(extract_article(
            "<html><head><title> Plain </title></head><body><p>hi</p></body></html>",
        ))
        .unwrap();
        assert_eq!(article.title, "Plain");
        assert_eq!(article.text_content, "hi");
    }

    #[test]
    fn link_heavy_blocks_lose() {
        let links = "<a href=\"/x\">a long link text that goes on and on, and on</a>".repeat(4);
        let html = format!(
            "<body><div class=\"content\"><p>{links}</p></div>\
             <div><p>Ordinary text in a paragraph, long enough to be counted here.</p></div></body>"
        );
        let article = article_from_value(extract_article(&html)).unwrap();
        assert!(article.text_content.starts_with("Ordinary text"));
    }

    #[tokio::test]
    async fn evaluate_without_load_fails() {
        let mut backend = StaticBackend::new(reqwest::Client::new());
        let err = backend.evaluate_extraction().await.unwrap_err();
        assert!(matches!(err, IngestError::ScriptEvaluation(_)));
    }

    #[tokio::test]
    async fn loads_raw_html() {
        let mut backend = StaticBackend::new(reqwest::Client::new());
        backend
            .load(&RenderSource::Html("<title>T</title><p>body text</p>".into()))
            .await
            .unwrap();
        let value = backend.evaluate_extraction().await.unwrap();
        assert_eq!(value["title"], "T");
    }
}

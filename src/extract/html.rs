//! HTML extractor: boilerplate removal through the Readability engine.
//!
//! Remote pages are navigated by the render backend; local files are loaded
//! as raw HTML. The article markup is sanitised before it leaves this module.

use super::postprocess::tidy_markdown;
use super::richtext::{from_html::from_html, markdown::to_markdown};
use super::{ExtractContext, HtmlSource, ParsedDocument};
use crate::config::ExportFormat;
use crate::error::IngestError;
use crate::readability::{sanitize_html, RenderSource};
use tracing::debug;

pub(crate) async fn parse(
    source: HtmlSource,
    format: Option<ExportFormat>,
    ctx: &ExtractContext<'_>,
) -> Result<ParsedDocument, IngestError> {
    let format = format.unwrap_or(ExportFormat::Html);
    if matches!(format, ExportFormat::Xml | ExportFormat::Csv) {
        return Err(IngestError::unable_to_export(format));
    }

    let source = match source {
        HtmlSource::Remote(url) => RenderSource::Url(url),
        HtmlSource::Local(data) => RenderSource::Html(String::from_utf8_lossy(&data).into_owned()),
    };
    let article = ctx.readability.extract(source, ctx.cancel).await?;
    if article.text_content.trim().is_empty() {
        return Err(IngestError::EmptyDocument);
    }
    debug!(
        "Article \"{}\": {} characters of text",
        article.title, article.length
    );

    let clean = sanitize_html(&article.content);
    let content = match format {
        ExportFormat::Html => clean,
        ExportFormat::PlainText => article.text_content,
        ExportFormat::Markdown => tidy_markdown(&to_markdown(&from_html(&clean))),
        ExportFormat::Xml | ExportFormat::Csv => return Err(IngestError::unable_to_export(format)),
    };

    let title = article.title.trim();
    Ok(ParsedDocument {
        title: (!title.is_empty()).then(|| title.to_string()),
        author: article.byline,
        cover: None,
        content: vec![content],
        needs_chunking: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readability::{ReadabilityEngine, StaticBackend};
    use bytes::Bytes;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const PAGE: &str = "<html><head><title>Guide</title></head><body>\
        <nav class=\"menu\"><a href=\"/\">Home</a></nav>\
        <div class=\"content\"><h2>Setup</h2>\
        <p>Install the tool, then run it once, with <b>care</b>, to create a profile.</p>\
        <script>track()</script></div></body></html>";

    async fn run(html: &str, format: Option<ExportFormat>) -> Result<ParsedDocument, IngestError> {
        let engine = ReadabilityEngine::with_backend(
            Box::new(StaticBackend::new(reqwest::Client::new())),
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        let ctx = ExtractContext {
            readability: &engine,
            cancel: &cancel,
            pdfium_lib_path: None,
        };
        parse(
            HtmlSource::Local(Bytes::from(html.to_string())),
            format,
            &ctx,
        )
        .await
    }

    #[tokio::test]
    async fn defaults_to_sanitised_article_html() {
        let doc = run(PAGE, None).await.unwrap();
        assert_eq!(doc.title.as_deref(), Some("Guide"));
        assert!(doc.needs_chunking);
        let html = &doc.content[0];
        assert!(html.contains("<h2>Setup</h2>"), "{html}");
        assert!(html.contains("<b>care</b>"), "{html}");
        assert!(!html.contains("Home"), "{html}");
        assert!(!html.contains("track"), "{html}");
    }

    #[tokio::test]
    async fn markdown_from_article() {
        let doc = run(PAGE, Some(ExportFormat::Markdown)).await.unwrap();
        assert!(doc.content[0].starts_with("## Setup"), "{}", doc.content[0]);
        assert!(doc.content[0].contains("**care**"), "{}", doc.content[0]);
    }

    #[tokio::test]
    async fn plain_text_is_article_text() {
        let doc = run(PAGE, Some(ExportFormat::PlainText)).await.unwrap();
        assert!(doc.content[0].contains("Install the tool"));
        assert!(!doc.content[0].contains('<'));
    }

    #[tokio::test]
    async fn csv_is_unavailable() {
        let err = run(PAGE, Some(ExportFormat::Csv)).await.unwrap_err();
        assert_eq!(err, IngestError::unable_to_export(ExportFormat::Csv));
    }

    #[tokio::test]
    async fn blank_page_is_empty() {
        let err = run("<html><body> </body></html>", None).await.unwrap_err();
        assert_eq!(err, IngestError::EmptyDocument);
    }
}

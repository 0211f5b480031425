//! Integration tests for edgequake-ingest.
//!
//! Every fixture is built in-test (tempfile directories, zip-written
//! xlsx/epub/docx, a one-shot TCP HTTP server), and HTML goes through the
//! static render backend, so these run offline and without Chrome or pdfium.
//!
//! Run with:
//!   cargo test --test ingest -- --nocapture

use edgequake_ingest::{
    DocumentTree, ErrorKind, ExportFormat, IngestConfig, IngestError, IngestProgressCallback,
    Ingestor, NodeId, NodeStatus, RenderBackendKind,
};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn config() -> IngestConfig {
    IngestConfig::builder()
        .render_backend(RenderBackendKind::Static)
        .fetch_timeout_secs(5)
        .build()
        .unwrap()
}

fn ingestor() -> Ingestor {
    Ingestor::new(config()).unwrap()
}

fn root(tree: &DocumentTree) -> NodeId {
    tree.roots()[0]
}

/// The child of `parent` whose file name is `name`.
fn child(tree: &DocumentTree, parent: NodeId, name: &str) -> NodeId {
    *tree
        .children(parent)
        .iter()
        .find(|id| tree.node(**id).filename() == name)
        .unwrap_or_else(|| panic!("no child named {name}"))
}

fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = SimpleFileOptions::default();
        for (name, body) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// One sheet named `Data`: `A B / 1 2`.
fn xlsx_two_by_two() -> Vec<u8> {
    zip_of(&[
        (
            "[Content_Types].xml",
            b"<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
              <Default Extension=\"xml\" ContentType=\"application/xml\"/></Types>",
        ),
        (
            "xl/workbook.xml",
            b"<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
              xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
              <sheets><sheet name=\"Data\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>",
        ),
        (
            "xl/_rels/workbook.xml.rels",
            b"<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
              <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" \
              Target=\"worksheets/sheet1.xml\"/></Relationships>",
        ),
        (
            "xl/sharedStrings.xml",
            b"<sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" count=\"2\" uniqueCount=\"2\">\
              <si><t>A</t></si><si><t>B</t></si></sst>",
        ),
        (
            "xl/worksheets/sheet1.xml",
            b"<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>\
              <row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\" t=\"s\"><v>1</v></c></row>\
              <row r=\"2\"><c r=\"A2\"><v>1</v></c><c r=\"B2\"><v>2</v></c></row>\
              </sheetData></worksheet>",
        ),
    ])
}

/// Two-chapter EPUB 3 with title and author.
fn epub() -> Vec<u8> {
    let chapter = |body: &str| {
        format!(
            "<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head><body>{body}</body></html>"
        )
    };
    let one = chapter("<h1>Departure</h1><p>The ship left at dawn.</p>");
    let two = chapter("<p>They reached the island by <em>noon</em>.</p>");
    zip_of(&[
        ("mimetype", b"application/epub+zip"),
        (
            "META-INF/container.xml",
            b"<container xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\" version=\"1.0\">\
              <rootfiles><rootfile full-path=\"OPS/package.opf\" media-type=\"application/oebps-package+xml\"/>\
              </rootfiles></container>",
        ),
        (
            "OPS/package.opf",
            b"<?xml version=\"1.0\"?><package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\">\
              <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
              <dc:title>Voyage</dc:title><dc:creator>R. Sailor</dc:creator></metadata>\
              <manifest>\
              <item id=\"one\" href=\"one.xhtml\" media-type=\"application/xhtml+xml\"/>\
              <item id=\"two\" href=\"two.xhtml\" media-type=\"application/xhtml+xml\"/>\
              </manifest><spine><itemref idref=\"one\"/><itemref idref=\"two\"/></spine></package>",
        ),
        ("OPS/one.xhtml", one.as_bytes()),
        ("OPS/two.xhtml", two.as_bytes()),
    ])
}

fn docx() -> Vec<u8> {
    zip_of(&[
        (
            "[Content_Types].xml",
            br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
        ),
        (
            "_rels/.rels",
            br#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
        ),
        (
            "word/_rels/document.xml.rels",
            br#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#,
        ),
        (
            "word/document.xml",
            br#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Minutes</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">Budget was </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>approved</w:t></w:r></w:p></w:body></w:document>"#,
        ),
        (
            "docProps/core.xml",
            br#"<?xml version="1.0"?><cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Board meeting</dc:title><dc:creator>Sam</dc:creator></cp:coreProperties>"#,
        ),
    ])
}

/// Serve exactly one canned HTTP response on a random port.
async fn serve_once(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}/missing")
}

fn write(dir: &Path, name: &str, body: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

// ── Folders ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn folder_children_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "b.png", b"\x89PNG");

    let tree = ingestor()
        .ingest(&dir.path().to_string_lossy(), None)
        .await
        .unwrap();
    let root = root(&tree);

    assert_eq!(tree.node(root).status(), &NodeStatus::Parsed);
    assert!(tree.node(root).exported_content().is_empty());
    assert_eq!(tree.children(root).len(), 2);

    let a = tree.node(child(&tree, root, "a.txt"));
    assert_eq!(a.status(), &NodeStatus::Parsed);
    assert_eq!(a.exported_content(), &["alpha".to_string()]);
    assert_eq!(a.parent(), Some(root));

    let b = tree.node(child(&tree, root, "b.png"));
    match b.status() {
        NodeStatus::Failed(IngestError::DocumentTypeNotSupported { doc_type }) => {
            assert_eq!(doc_type, "png")
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(b.raw_content().is_empty());
}

#[tokio::test]
async fn nested_folders_and_hidden_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    write(&dir.path().join("sub"), "deep.md", b"# Deep\n");
    write(dir.path(), ".secret.txt", b"hidden");

    let tree = ingestor()
        .ingest(&dir.path().to_string_lossy(), None)
        .await
        .unwrap();
    let root = root(&tree);
    assert_eq!(tree.children(root).len(), 1);

    let sub = child(&tree, root, "sub");
    let deep = tree.node(child(&tree, sub, "deep.md"));
    assert_eq!(deep.exported_content(), &["# Deep\n".to_string()]);
    assert_eq!(tree.walk(root).len(), 3);
}

#[tokio::test]
async fn refetch_and_reparse_do_not_regress() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes.txt", b"first draft");

    let ingestor = ingestor();
    let cancel = tokio_util::sync::CancellationToken::new();
    let mut tree = ingestor
        .ingest(&dir.path().to_string_lossy(), None)
        .await
        .unwrap();
    let root = root(&tree);
    let before = tree.report(root);

    ingestor.fetch(&mut tree, root, true, &cancel).await;
    ingestor.parse(&mut tree, root, None, true, &cancel).await;
    let after = tree.report(root);

    assert_eq!(before.status, after.status);
    assert_eq!(before.children.len(), after.children.len());
    assert_eq!(before.children[0].content, after.children[0].content);
    assert_eq!(tree.len(), 2);
}

// ── Extractors through the tree ──────────────────────────────────────────────

#[tokio::test]
async fn spreadsheet_to_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "grid.xlsx", &xlsx_two_by_two());

    let tree = ingestor().ingest(&path, None).await.unwrap();
    let node = tree.node(root(&tree));
    assert_eq!(node.status(), &NodeStatus::Parsed);
    assert_eq!(
        node.exported_content(),
        &["| A | B |\n|---|---|\n| 1 | 2 |\n".to_string()]
    );
    assert_eq!(node.title(), Some("Data"));
}

#[tokio::test]
async fn epub_chapters_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "voyage.epub", &epub());

    let tree = ingestor()
        .ingest(&path, Some(ExportFormat::Markdown))
        .await
        .unwrap();
    let node = tree.node(root(&tree));
    assert_eq!(node.status(), &NodeStatus::Parsed);
    assert_eq!(node.title(), Some("Voyage"));
    assert_eq!(node.author(), Some("R. Sailor"));
    assert_eq!(node.exported_content().len(), 2);
    assert!(node.exported_content()[0].starts_with("# Departure"));
    assert!(node.exported_content()[1].contains("*noon*"));
    assert!(node.needs_chunking());
}

#[tokio::test]
async fn epub_to_csv_is_unable_to_export() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "voyage.epub", &epub());

    let tree = ingestor()
        .ingest(&path, Some(ExportFormat::Csv))
        .await
        .unwrap();
    let node = tree.node(root(&tree));
    let err = node.status().error().unwrap();
    assert_eq!(err.kind(), ErrorKind::UnableToExportToRequestedFormat);
    assert!(node.exported_content().is_empty());
}

#[tokio::test]
async fn docx_to_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "minutes.docx", &docx());

    let tree = ingestor().ingest(&path, None).await.unwrap();
    let node = tree.node(root(&tree));
    assert_eq!(node.status(), &NodeStatus::Parsed, "{:?}", node.status());
    assert_eq!(node.title(), Some("Board meeting"));
    assert_eq!(node.author(), Some("Sam"));
    let md = &node.exported_content()[0];
    assert!(md.starts_with("# Minutes"), "{md}");
    assert!(md.contains("**approved**"), "{md}");
}

#[tokio::test]
async fn plain_text_passes_through_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let body = "key = \"value\"\n\n  indented\n";
    let path = write(dir.path(), "settings.toml.txt", body.as_bytes());

    let ingestor = ingestor();
    for format in [
        ExportFormat::PlainText,
        ExportFormat::Html,
        ExportFormat::Xml,
        ExportFormat::Markdown,
        ExportFormat::Csv,
    ] {
        let tree = ingestor.ingest(&path, Some(format)).await.unwrap();
        let node = tree.node(root(&tree));
        assert_eq!(node.status(), &NodeStatus::Parsed, "{format}");
        assert_eq!(node.exported_content(), &[body.to_string()], "{format}");
    }
}

#[tokio::test]
async fn binary_webloc_exports_its_url() {
    let mut dict = plist::Dictionary::new();
    dict.insert(
        "URL".into(),
        plist::Value::String("https://example.com/notes".into()),
    );
    let mut body = Vec::new();
    plist::Value::Dictionary(dict)
        .to_writer_binary(&mut body)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "Notes.webloc", &body);

    let tree = ingestor().ingest(&path, None).await.unwrap();
    let node = tree.node(root(&tree));
    assert_eq!(node.status(), &NodeStatus::Parsed, "{:?}", node.status());
    assert_eq!(
        node.exported_content(),
        &["https://example.com/notes".to_string()]
    );
}

#[tokio::test]
async fn local_html_goes_through_readability() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "post.html",
        b"<html><head><title>Release notes</title></head><body>\
          <div class=\"sidebar\"><a href=\"/a\">Archive</a> <a href=\"/b\">Tags</a></div>\
          <article><p>This release speeds up folder listing and fixes a crash when a \
          spreadsheet has no rows at all.</p></article></body></html>",
    );

    let tree = ingestor()
        .ingest(&path, Some(ExportFormat::PlainText))
        .await
        .unwrap();
    let node = tree.node(root(&tree));
    assert_eq!(node.status(), &NodeStatus::Parsed, "{:?}", node.status());
    assert_eq!(node.title(), Some("Release notes"));
    let text = &node.exported_content()[0];
    assert!(text.contains("speeds up folder listing"), "{text}");
    assert!(!text.contains("Archive"), "{text}");
}

#[tokio::test]
async fn corrupted_spreadsheet_fails_only_that_node() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "broken.xlsx", b"not a zip at all");
    write(dir.path(), "fine.csv", b"x,y\n1,2\n");

    let tree = ingestor()
        .ingest(&dir.path().to_string_lossy(), None)
        .await
        .unwrap();
    let root = root(&tree);
    let broken = tree.node(child(&tree, root, "broken.xlsx"));
    assert_eq!(
        broken.status().error().map(IngestError::kind),
        Some(ErrorKind::FileCorrupted)
    );
    let fine = tree.node(child(&tree, root, "fine.csv"));
    assert_eq!(fine.status(), &NodeStatus::Parsed);
    assert_eq!(tree.node(root).status(), &NodeStatus::Parsed);
}

// ── Remote ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_404_fails_with_http_status() {
    let url = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
    )
    .await;

    let tree = ingestor().ingest(&url, None).await.unwrap();
    let root = root(&tree);
    match tree.node(root).status() {
        NodeStatus::Failed(IngestError::HttpStatus { status, .. }) => assert_eq!(*status, 404),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(tree.children(root).is_empty());
    assert!(tree.node(root).exported_content().is_empty());
}

#[tokio::test]
async fn remote_csv_is_typed_by_mime() {
    let url = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: 8\r\nConnection: close\r\n\r\nn,v\nx,1\n",
    )
    .await;

    let tree = ingestor()
        .ingest(&url, Some(ExportFormat::Markdown))
        .await
        .unwrap();
    let node = tree.node(root(&tree));
    assert_eq!(node.status(), &NodeStatus::Parsed, "{:?}", node.status());
    assert_eq!(
        node.exported_content(),
        &["| n | v |\n|---|---|\n| x | 1 |\n".to_string()]
    );
}

// ── Entry points and callbacks ───────────────────────────────────────────────

#[test]
fn invalid_locator_is_an_error() {
    let result = tokio_test::block_on(async {
        Ingestor::new(config())
            .unwrap()
            .ingest("gopher://example.com/x", None)
            .await
    });
    assert!(matches!(result, Err(IngestError::InvalidUrl { .. })));
}

#[test]
fn sync_entry_point_and_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "data.json", br#"{"a": 1}"#);

    let tree = edgequake_ingest::ingest_sync(&path, &config()).unwrap();
    let report = tree.report(root(&tree));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["filename"], "data.json");
    assert_eq!(json["content"][0], r#"{"a": 1}"#);
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl IngestProgressCallback for Events {
    fn on_fetch_start(&self, _node: NodeId, locator: &str) {
        self.push(format!("fetch {}", name(locator)));
    }
    fn on_node_downloaded(&self, _node: NodeId, locator: &str, children: usize) {
        self.push(format!("downloaded {} {children}", name(locator)));
    }
    fn on_node_parsed(&self, _node: NodeId, locator: &str, sections: usize) {
        self.push(format!("parsed {} {sections}", name(locator)));
    }
    fn on_node_failed(&self, _node: NodeId, locator: &str, error: &IngestError) {
        self.push(format!("failed {} {:?}", name(locator), error.kind()));
    }
}

impl Events {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

fn name(locator: &str) -> &str {
    locator.rsplit('/').next().unwrap_or(locator)
}

#[tokio::test]
async fn callbacks_follow_fetch_then_parse_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "z.bmp", b"BM");
    let folder = dir.path().file_name().unwrap().to_string_lossy().into_owned();

    let events = Arc::new(Events::default());
    let config = IngestConfig::builder()
        .render_backend(RenderBackendKind::Static)
        .progress_callback(events.clone() as Arc<dyn IngestProgressCallback>)
        .build()
        .unwrap();
    Ingestor::new(config)
        .unwrap()
        .ingest(&dir.path().to_string_lossy(), None)
        .await
        .unwrap();

    let log = events.0.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            format!("fetch {folder}"),
            format!("downloaded {folder} 2"),
            "fetch a.txt".to_string(),
            "downloaded a.txt 0".to_string(),
            "failed z.bmp DocumentTypeNotSupported".to_string(),
            "parsed a.txt 1".to_string(),
            format!("parsed {folder} 0"),
        ]
    );
}

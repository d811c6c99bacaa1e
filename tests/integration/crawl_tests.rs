//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test fetching
//! and full crawls end-to-end.

use async_trait::async_trait;
use site_crawl::config::Config;
use site_crawl::crawler::{build_http_client, Crawler, Fetch, Fetcher, LinkParser, LogErrors};
use site_crawl::sink::BodySink;
use site_crawl::{CrawlError, ParseError};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LINES: &str = "http://b\nhttp://c\n";

/// Parser treating every body line as a link
struct LineParser;

#[async_trait]
impl LinkParser for LineParser {
    async fn parse_body(
        &self,
        _page_url: &Url,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Vec<String>, ParseError> {
        let mut text = String::new();
        body.read_to_string(&mut text).await?;
        Ok(text.lines().map(str::to_string).collect())
    }
}

/// Parser that gives up without reading
struct FailingParser;

#[async_trait]
impl LinkParser for FailingParser {
    async fn parse_body(
        &self,
        _page_url: &Url,
        _body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Vec<String>, ParseError> {
        Err(ParseError::Malformed("parser error".to_string()))
    }
}

/// Sink keeping every body it reads
#[derive(Default)]
struct CollectingSink {
    bodies: Mutex<Vec<(String, Vec<u8>)>>,
}

impl CollectingSink {
    fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .bodies
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    fn body(&self, index: usize) -> Vec<u8> {
        self.bodies.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl BodySink for CollectingSink {
    async fn consume(
        &self,
        _ctx: &CancellationToken,
        page_url: &Url,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<()> {
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await?;
        self.bodies
            .lock()
            .unwrap()
            .push((page_url.to_string(), buf));
        Ok(())
    }
}

/// Sink that fails without reading
struct FailingSink;

#[async_trait]
impl BodySink for FailingSink {
    async fn consume(
        &self,
        _ctx: &CancellationToken,
        _page_url: &Url,
        _body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<()> {
        Err(io::Error::other("reader error"))
    }
}

fn client() -> reqwest::Client {
    build_http_client(&Config::default()).expect("Failed to build client")
}

async fn serve_lines() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LINES))
        .mount(&mock_server)
        .await;
    mock_server
}

fn html(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    format!("<html><head><title>t</title></head><body>{}</body></html>", anchors)
}

async fn mount_page(server: &MockServer, page: &str, links: &[&str], times: u64) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html(links))
                .insert_header("content-type", "text/html"),
        )
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_without_sink() {
    let mock_server = serve_lines().await;
    let fetcher = Fetcher::new(client(), Arc::new(LineParser));

    let urls = fetcher
        .fetch(&CancellationToken::new(), &mock_server.uri())
        .await
        .unwrap();

    assert_eq!(urls, vec!["http://b", "http://c"]);
}

#[tokio::test]
async fn test_fetch_with_cancelled_context() {
    let fetcher = Fetcher::new(client(), Arc::new(LineParser));
    let ctx = CancellationToken::new();
    ctx.cancel();

    let err = fetcher.fetch(&ctx, "http://localhost").await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(err.to_string().contains("canceled"));
}

#[tokio::test]
async fn test_fetch_parser_error() {
    let mock_server = serve_lines().await;
    let fetcher = Fetcher::new(client(), Arc::new(FailingParser));

    let err = fetcher
        .fetch(&CancellationToken::new(), &mock_server.uri())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Parse(_)));
    assert!(err.to_string().contains("parser error"));
}

#[tokio::test]
async fn test_transport_error() {
    // Nothing listens on the discard port
    let fetcher = Fetcher::new(client(), Arc::new(LineParser));
    let err = fetcher
        .fetch(&CancellationToken::new(), "http://127.0.0.1:9/")
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Transport { .. }));
}

#[tokio::test]
async fn test_body_sink_sees_whole_body() {
    let mock_server = serve_lines().await;
    let sink = Arc::new(CollectingSink::default());
    let fetcher = Fetcher::new(client(), Arc::new(LineParser)).with_sink(sink.clone());

    let urls = fetcher
        .fetch(&CancellationToken::new(), &mock_server.uri())
        .await
        .unwrap();

    assert_eq!(urls, vec!["http://b", "http://c"]);
    assert_eq!(sink.body(0), LINES.as_bytes());
}

#[tokio::test]
async fn test_body_sink_with_parser_error() {
    let mock_server = serve_lines().await;
    let sink = Arc::new(CollectingSink::default());
    let fetcher = Fetcher::new(client(), Arc::new(FailingParser)).with_sink(sink);

    let err = fetcher
        .fetch(&CancellationToken::new(), &mock_server.uri())
        .await
        .unwrap_err();

    // The sink's closed stream must not show up as a second failure
    assert!(matches!(err, CrawlError::Parse(_)));
    assert!(err.to_string().contains("parser error"));
    assert!(!err.to_string().contains("body read error"));
}

#[tokio::test]
async fn test_body_sink_error_discards_links() {
    let mock_server = serve_lines().await;
    let fetcher = Fetcher::new(client(), Arc::new(LineParser)).with_sink(Arc::new(FailingSink));

    let result = fetcher
        .fetch(&CancellationToken::new(), &mock_server.uri())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, CrawlError::BodyRead(_)));
    assert!(err.to_string().contains("reader error"));
}

#[tokio::test]
async fn test_parser_and_body_sink_errors_combined() {
    let mock_server = serve_lines().await;
    let fetcher = Fetcher::new(client(), Arc::new(FailingParser)).with_sink(Arc::new(FailingSink));

    let err = fetcher
        .fetch(&CancellationToken::new(), &mock_server.uri())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("parser error"));
    assert!(message.contains("reader error"));
}

#[tokio::test]
async fn test_large_body_with_small_buffer() {
    let mock_server = MockServer::start().await;
    let mut page = String::from("<html><body>");
    page.push_str(&"<p>filler text</p>".repeat(100_000));
    page.push_str(r#"<a href="/last">last</a></body></html>"#);

    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page.clone()))
        .mount(&mock_server)
        .await;

    let base = mock_server.uri();
    let visited = Arc::new(site_crawl::InMemoryCache::new());
    let parser = site_crawl::crawler::HtmlLinkParser::new(base.clone(), visited);
    let sink = Arc::new(CollectingSink::default());
    let fetcher = Fetcher::new(client(), Arc::new(parser))
        .with_sink(sink.clone())
        .with_stream_buffer(1);

    let urls = fetcher
        .fetch(&CancellationToken::new(), &format!("{}/big", base))
        .await
        .unwrap();

    assert_eq!(urls, vec![format!("{}/last", base)]);
    assert_eq!(sink.body(0).len(), page.len());
}

#[tokio::test]
async fn test_relative_links_resolve_after_redirect() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new/"))
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/new/", &["child"], 1).await;

    let base = mock_server.uri();
    let visited = Arc::new(site_crawl::InMemoryCache::new());
    let parser = site_crawl::crawler::HtmlLinkParser::new(base.clone(), visited);
    let fetcher = Fetcher::new(client(), Arc::new(parser));

    let urls = fetcher
        .fetch(&CancellationToken::new(), &format!("{}/old", base))
        .await
        .unwrap();

    assert_eq!(urls, vec![format!("{}/new/child", base)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_crawl_fetches_each_page_once() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/site/", mock_server.uri());

    mount_page(
        &mock_server,
        "/site/",
        &["a", "b", "/other/x", "http://elsewhere.invalid/"],
        1,
    )
    .await;
    mount_page(&mock_server, "/site/a", &["c", "/site/", "#top"], 1).await;
    mount_page(&mock_server, "/site/b", &["c", "a#frag", "/site/b"], 1).await;
    mount_page(&mock_server, "/site/c", &["/site/a", "/site/b"], 1).await;
    mount_page(&mock_server, "/other/x", &[], 0).await;

    let sink = Arc::new(CollectingSink::default());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let reported = Arc::clone(&errors);

    let crawler = Crawler::new(
        &Config::default(),
        &base_url,
        Some(sink.clone()),
        Arc::new(move |err: CrawlError| reported.lock().unwrap().push(err.to_string())),
    )
    .expect("Failed to create crawler");

    let summary = tokio::time::timeout(Duration::from_secs(10), crawler.run(CancellationToken::new()))
        .await
        .expect("crawl did not finish");

    assert_eq!(summary.fetched, 4);
    assert_eq!(summary.failed, 0);
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(crawler.visited(), 4);
    assert_eq!(
        sink.urls(),
        vec![
            base_url.clone(),
            format!("{}a", base_url),
            format!("{}b", base_url),
            format!("{}c", base_url),
        ]
    );
}

#[tokio::test]
async fn test_failed_page_is_dead_end() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/site/", mock_server.uri());

    mount_page(&mock_server, "/site/", &["ok", "broken"], 1).await;
    mount_page(&mock_server, "/site/ok", &[], 1).await;

    let errors = Arc::new(Mutex::new(Vec::new()));
    let reported = Arc::clone(&errors);

    // The sink fails only for the broken page
    struct PickySink;

    #[async_trait]
    impl BodySink for PickySink {
        async fn consume(
            &self,
            _ctx: &CancellationToken,
            page_url: &Url,
            body: &mut (dyn AsyncRead + Send + Unpin),
        ) -> io::Result<()> {
            if page_url.path().ends_with("broken") {
                return Err(io::Error::other("disk full"));
            }
            tokio::io::copy(body, &mut tokio::io::sink()).await?;
            Ok(())
        }
    }

    let crawler = Crawler::new(
        &Config::default(),
        &base_url,
        Some(Arc::new(PickySink)),
        Arc::new(move |err: CrawlError| reported.lock().unwrap().push(err.to_string())),
    )
    .expect("Failed to create crawler");

    let summary = crawler.run(CancellationToken::new()).await;

    // wiremock answers the unmocked /site/broken with an empty 404
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.failed, 1);
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("disk full"));
}

#[tokio::test]
async fn test_cancelled_crawl_drains_promptly() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/slow/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/slow/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&mock_server)
        .await;

    let crawler = Crawler::new(&Config::default(), &base_url, None, Arc::new(LogErrors))
        .expect("Failed to create crawler");

    let ctx = CancellationToken::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), crawler.run(ctx))
        .await
        .expect("cancelled crawl did not drain");

    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.failed, 1);
}

//! Integration tests for discovery and fetching
//!
//! These tests use wiremock to create mock HTTP servers and run the frontier,
//! the admission gate and the fetch worker against a real SQLite file.

use chrono::{TimeZone, Utc};
use harvest_robot::config::{parse_config, Config};
use harvest_robot::crawler::{
    build_http_client, Admission, AdmissionGate, FetchWorker, Frontier, PassReport,
};
use harvest_robot::extract::ExtractorRegistry;
use harvest_robot::state::CrawlState;
use harvest_robot::storage::{open_shared, DocumentRecord, QueueTask, SharedStorage, Storage};
use harvest_robot::{ConfigError, HarvestError, Normalizer};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE_TEXT: &str = "Тревога знакома каждому, но справиться с ней помогают простые ежедневные практики.";

/// A mock site, a scratch directory and a configuration pointing at both
struct Harness {
    server: MockServer,
    dir: TempDir,
    config: Arc<Config>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_retries(0).await
    }

    async fn with_retries(retries: u32) -> Self {
        Self::with_settings(retries, 0).await
    }

    async fn with_settings(retries: u32, delay_ms: u64) -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let toml = format!(
            r#"
[crawler]
recrawl-interval = 3600
min-text-length = 40
request-timeout = 5
delay-min = {delay}
delay-max = {delay}
listing-delay = 0
pass-delay = 0
fetch-retries = {retries}
upgrade-http = false

[storage]
database-path = "{db}"
cursor-path = "{cursor}"
corpus-dir = "{corpus}"

[[source]]
name = "b17"
listing-url = "{uri}/article/?page={{page}}"
base-url = "{uri}"
links = {{ kind = "path", prefix = "/article/", slashes = 3 }}
"#,
            delay = delay_ms,
            retries = retries,
            db = dir.path().join("harvest.db").display(),
            cursor = dir.path().join("crawl_state.json").display(),
            corpus = dir.path().join("corpus").display(),
            uri = server.uri(),
        );

        let config = Arc::new(parse_config(&toml).expect("test config should be valid"));
        Self {
            server,
            dir,
            config,
        }
    }

    fn storage(&self) -> SharedStorage {
        open_shared(Path::new(&self.config.storage.database_path)).unwrap()
    }

    fn cursor_path(&self) -> std::path::PathBuf {
        self.dir.path().join("crawl_state.json")
    }

    fn client(&self) -> reqwest::Client {
        build_http_client(&self.config.http, Duration::from_secs(5)).unwrap()
    }

    fn gate(&self, storage: SharedStorage) -> AdmissionGate {
        AdmissionGate::new(storage, Normalizer::new(false), Duration::from_secs(3600))
    }

    fn frontier(&self) -> Frontier {
        let state = CrawlState::load(&self.cursor_path()).unwrap();
        Frontier::new(
            Arc::clone(&self.config),
            self.client(),
            self.gate(self.storage()),
            state,
        )
        .unwrap()
    }

    fn worker(&self, storage: SharedStorage) -> FetchWorker {
        FetchWorker::new(
            Arc::clone(&self.config),
            storage,
            self.client(),
            ExtractorRegistry::from_config(&self.config).unwrap(),
        )
    }

    /// Normalized key of an article path on the mock server
    fn article_url(&self, id: u32) -> String {
        format!("{}/article/{}", self.server.uri(), id)
    }

    fn enqueue(&self, storage: &SharedStorage, id: u32) {
        storage
            .lock()
            .unwrap()
            .upsert_task(&QueueTask::new(self.article_url(id), "b17", Utc::now()))
            .unwrap();
    }

    async fn mount_listing(&self, page: &str, body: String) {
        Mock::given(method("GET"))
            .and(path("/article/"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    async fn mount_article(&self, id: u32, title: &str, text: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/article/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_page(title, text)))
            .mount(&self.server)
            .await;
    }
}

fn article_page(title: &str, text: &str) -> String {
    format!(
        r#"<html><body>
        <h1 class="from_bb_h1">{}</h1>
        <div itemprop="articleBody">
            <div class="art_start">Реклама</div>
            <p>{}</p>
        </div>
        </body></html>"#,
        title, text
    )
}

fn listing_page() -> String {
    r##"<html><body>
        <a href="/article/">All articles</a>
        <a href="/article/1/">First</a>
        <a href="/article/2/#comments">Second</a>
        <a href="/article/1/">First again</a>
        <a href="/forum/5/">Forum</a>
        <a href="https://elsewhere.example/article/3/">Elsewhere</a>
    </body></html>"##
        .to_string()
}

fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

// ===== Discovery =====

#[tokio::test]
async fn test_discovery_pass_queues_article_links() {
    let h = Harness::new().await;
    h.mount_listing("1", listing_page()).await;

    let mut frontier = h.frontier();
    let report = frontier.run_pass().await.unwrap();

    assert_eq!(report.listings_fetched, 1);
    assert_eq!(report.queued, 2);
    assert_eq!(report.recent, 0);

    let storage = h.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_tasks().unwrap(), 2);
    assert!(storage.get_task(&h.article_url(1)).unwrap().is_some());
    assert!(storage.get_task(&h.article_url(2)).unwrap().is_some());

    let saved = CrawlState::load(&h.cursor_path()).unwrap();
    assert_eq!(saved.page_for(&h.config.sources[0]), 2);
}

#[tokio::test]
async fn test_rediscovery_within_interval_reports_recent() {
    let h = Harness::new().await;
    h.mount_listing("1", listing_page()).await;
    h.mount_listing("2", listing_page()).await;

    let mut frontier = h.frontier();
    frontier.run_pass().await.unwrap();
    let second = frontier.run_pass().await.unwrap();

    assert_eq!(second.queued, 0);
    assert_eq!(second.recent, 2);
    assert_eq!(h.storage().lock().unwrap().count_tasks().unwrap(), 2);
    assert_eq!(frontier.state().page_for(&h.config.sources[0]), 3);
}

#[tokio::test]
async fn test_empty_listing_does_not_advance() {
    let h = Harness::new().await;
    h.mount_listing("1", "<html><body><a href=\"/about/\">About</a></body></html>".to_string())
        .await;

    let mut frontier = h.frontier();
    let report = frontier.run_pass().await.unwrap();

    assert_eq!(report.listings_empty, 1);
    assert_eq!(frontier.state().page_for(&h.config.sources[0]), 1);
    assert_eq!(h.storage().lock().unwrap().count_tasks().unwrap(), 0);
}

#[tokio::test]
async fn test_failed_listing_does_not_advance() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/article/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let mut frontier = h.frontier();
    let report = frontier.run_pass().await.unwrap();

    assert_eq!(report.listings_failed, 1);
    assert_eq!(frontier.state().page_for(&h.config.sources[0]), 1);
}

#[tokio::test]
async fn test_run_stops_after_requested_passes() {
    let h = Harness::new().await;
    h.mount_listing("1", listing_page()).await;
    h.mount_listing("2", listing_page()).await;

    let mut frontier = h.frontier();
    let (_tx, rx) = no_shutdown();
    let total = frontier.run(rx, Some(2)).await.unwrap();

    assert_eq!(total.listings_fetched, 2);
    assert_eq!(total.queued, 2);
    assert_eq!(total.recent, 2);

    let saved = CrawlState::load(&h.cursor_path()).unwrap();
    assert_eq!(saved.page_for(&h.config.sources[0]), 3);
}

#[tokio::test]
async fn test_run_after_shutdown_does_not_save_cursor() {
    let h = Harness::new().await;
    h.mount_listing("1", listing_page()).await;

    let mut frontier = h.frontier();
    let (tx, rx) = no_shutdown();
    tx.send(true).unwrap();
    let total = frontier.run(rx, None).await.unwrap();

    assert_eq!(total.listings_fetched, 0);
    assert!(!h.cursor_path().exists());
}

#[tokio::test]
async fn test_shutdown_mid_pass_keeps_last_checkpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cursor = dir.path().join("crawl_state.json");
    std::fs::write(&cursor, r#"{"b17": 4, "mirror": 2}"#).unwrap();

    let toml = format!(
        r#"
[crawler]
recrawl-interval = 3600
min-text-length = 40
delay-min = 0
delay-max = 0
listing-delay = 60000
pass-delay = 0
upgrade-http = false

[storage]
database-path = "{db}"
cursor-path = "{cursor}"

[[source]]
name = "b17"
listing-url = "{uri}/article/?page={{page}}"
base-url = "{uri}"
links = {{ kind = "path", prefix = "/article/", slashes = 3 }}

[[source]]
name = "mirror"
extractor = "b17"
listing-url = "{uri}/mirror/?page={{page}}"
base-url = "{uri}"
links = {{ kind = "path", prefix = "/mirror/", slashes = 3 }}
"#,
        db = dir.path().join("harvest.db").display(),
        cursor = cursor.display(),
        uri = server.uri(),
    );
    let h = Harness {
        server,
        dir,
        config: Arc::new(parse_config(&toml).unwrap()),
    };

    h.mount_listing("4", listing_page()).await;
    Mock::given(method("GET"))
        .and(path("/mirror/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page()))
        .expect(0)
        .mount(&h.server)
        .await;

    let mut frontier = h.frontier();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });

    let total = frontier.run(rx, None).await.unwrap();
    assert_eq!(total, PassReport::default());

    // the first source moved on in memory only
    assert_eq!(frontier.state().page_for(&h.config.sources[0]), 5);
    let saved = CrawlState::load(&cursor).unwrap();
    assert_eq!(saved.page_for(&h.config.sources[0]), 4);
    assert_eq!(saved.page_for(&h.config.sources[1]), 2);

    // its links were still admitted; the repeat pass will find them recent
    assert_eq!(h.storage().lock().unwrap().count_tasks().unwrap(), 2);
}

// ===== Admission =====

#[tokio::test]
async fn test_equivalent_urls_share_one_task() {
    let h = Harness::new().await;
    let storage = h.storage();
    let gate = AdmissionGate::new(
        Arc::clone(&storage),
        Normalizer::default(),
        Duration::from_secs(3600),
    );

    assert!(matches!(
        gate.admit("http://Site.com/article/1/", "b17"),
        Admission::Queued
    ));
    assert!(matches!(
        gate.admit("https://site.com/article/1", "b17"),
        Admission::SkippedRecent
    ));

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_tasks().unwrap(), 1);
    assert!(storage.get_task("https://site.com/article/1").unwrap().is_some());
}

// ===== Fetching =====

#[tokio::test]
async fn test_worker_saves_new_article() {
    let h = Harness::new().await;
    h.mount_article(1, "Как справиться с тревогой", ARTICLE_TEXT).await;

    let storage = h.storage();
    h.enqueue(&storage, 1);

    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.saved, 1);
    assert_eq!(report.processed(), 1);

    let storage = storage.lock().unwrap();
    let doc = storage.get_document(&h.article_url(1)).unwrap().unwrap();
    assert_eq!(doc.source, "b17");
    assert_eq!(doc.title, "Как справиться с тревогой");
    assert_eq!(doc.clean_text, ARTICLE_TEXT);
    assert!(doc.raw_html.unwrap().contains("art_start"));
    assert_eq!(storage.count_tasks().unwrap(), 0);
}

#[tokio::test]
async fn test_unchanged_refetch_only_touches_timestamp() {
    let h = Harness::new().await;
    h.mount_article(1, "A different headline", ARTICLE_TEXT).await;

    let storage = h.storage();
    let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    storage
        .lock()
        .unwrap()
        .replace_document(&DocumentRecord {
            url: h.article_url(1),
            source: "b17".to_string(),
            title: "Original headline".to_string(),
            raw_html: Some("<old/>".to_string()),
            clean_text: ARTICLE_TEXT.to_string(),
            fetched_at: old,
        })
        .unwrap();
    h.enqueue(&storage, 1);

    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.unchanged, 1);

    let doc = storage
        .lock()
        .unwrap()
        .get_document(&h.article_url(1))
        .unwrap()
        .unwrap();
    assert!(doc.fetched_at > old);
    assert_eq!(doc.title, "Original headline");
    assert_eq!(doc.clean_text, ARTICLE_TEXT);
    assert_eq!(doc.raw_html.as_deref(), Some("<old/>"));
}

#[tokio::test]
async fn test_changed_refetch_replaces_article() {
    let h = Harness::new().await;
    h.mount_article(1, "Updated headline", ARTICLE_TEXT).await;

    let storage = h.storage();
    let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    storage
        .lock()
        .unwrap()
        .replace_document(&DocumentRecord {
            url: h.article_url(1),
            source: "b17".to_string(),
            title: "Original headline".to_string(),
            raw_html: None,
            clean_text: "An older revision of the article text that has since been edited.".to_string(),
            fetched_at: old,
        })
        .unwrap();
    h.enqueue(&storage, 1);

    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.updated, 1);

    let storage = storage.lock().unwrap();
    let doc = storage.get_document(&h.article_url(1)).unwrap().unwrap();
    assert!(doc.fetched_at > old);
    assert_eq!(doc.title, "Updated headline");
    assert_eq!(doc.clean_text, ARTICLE_TEXT);
    assert_eq!(storage.count_documents().unwrap(), 1);
}

#[tokio::test]
async fn test_short_article_is_not_stored() {
    let h = Harness::new().await;
    h.mount_article(1, "Stub", "Too short to keep.").await;

    let storage = h.storage();
    h.enqueue(&storage, 1);

    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.too_short, 1);

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_documents().unwrap(), 0);
    assert_eq!(storage.count_tasks().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_article_is_dropped_and_drain_continues() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/article/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&h.server)
        .await;
    h.mount_article(1, "Survivor", ARTICLE_TEXT).await;

    let storage = h.storage();
    h.enqueue(&storage, 404);
    h.enqueue(&storage, 1);

    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.fetch_failed, 1);
    assert_eq!(report.saved, 1);
    assert_eq!(report.requeued, 0);

    let storage = storage.lock().unwrap();
    assert!(storage.get_document(&h.article_url(404)).unwrap().is_none());
    assert!(storage.get_task(&h.article_url(404)).unwrap().is_none());
    assert_eq!(storage.count_tasks().unwrap(), 0);
}

#[tokio::test]
async fn test_transient_failure_retried_within_budget() {
    let h = Harness::with_retries(1).await;
    Mock::given(method("GET"))
        .and(path("/article/1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&h.server)
        .await;

    let storage = h.storage();
    h.enqueue(&storage, 1);

    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.fetch_failed, 2);
    assert_eq!(report.requeued, 1);
    assert_eq!(storage.lock().unwrap().count_tasks().unwrap(), 0);
}

#[tokio::test]
async fn test_two_workers_one_task() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/article/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page("Only", ARTICLE_TEXT)))
        .expect(1)
        .mount(&h.server)
        .await;

    let first_storage = h.storage();
    h.enqueue(&first_storage, 1);

    // separate connections, as two processes would have
    let mut first = h.worker(first_storage);
    let mut second = h.worker(h.storage());

    let (_tx, rx) = no_shutdown();
    let (mut rx1, mut rx2) = (rx.clone(), rx);
    let (a, b) = tokio::join!(first.drain(&mut rx1), second.drain(&mut rx2));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.saved + b.saved, 1);
    assert_eq!(a.processed() + b.processed(), 1);
}

#[tokio::test]
async fn test_missing_extractor_is_fatal_and_keeps_task() {
    let h = Harness::new().await;
    let storage = h.storage();
    h.mount_article(1, "Unreadable", ARTICLE_TEXT).await;
    h.enqueue(&storage, 1);

    let mut worker = FetchWorker::new(
        Arc::clone(&h.config),
        Arc::clone(&storage),
        h.client(),
        ExtractorRegistry::new(),
    );

    let (_tx, mut rx) = no_shutdown();
    let result = worker.drain(&mut rx).await;
    assert!(matches!(
        result,
        Err(HarvestError::Config(ConfigError::MissingExtractor(ref source))) if source == "b17"
    ));
    assert!(storage
        .lock()
        .unwrap()
        .get_task(&h.article_url(1))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_missing_extractor_is_fatal_before_fetching() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/article/1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&h.server)
        .await;

    let storage = h.storage();
    h.enqueue(&storage, 1);

    let mut worker = FetchWorker::new(
        Arc::clone(&h.config),
        Arc::clone(&storage),
        h.client(),
        ExtractorRegistry::new(),
    );

    let (_tx, mut rx) = no_shutdown();
    let result = worker.drain(&mut rx).await;
    assert!(matches!(
        result,
        Err(HarvestError::Config(ConfigError::MissingExtractor(_)))
    ));

    let task = storage
        .lock()
        .unwrap()
        .get_task(&h.article_url(1))
        .unwrap()
        .unwrap();
    assert_eq!(task.attempts, 0);
}

#[tokio::test]
async fn test_failed_write_is_requeued_within_budget() {
    let h = Harness::with_retries(1).await;
    Mock::given(method("GET"))
        .and(path("/article/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page("Lost", ARTICLE_TEXT)))
        .expect(2)
        .mount(&h.server)
        .await;

    let storage = h.storage();
    h.enqueue(&storage, 1);

    // every document write fails; requeues are recorded on the side
    let sabotage = Connection::open(&h.config.storage.database_path).unwrap();
    sabotage
        .execute_batch(
            "CREATE TRIGGER reject_documents BEFORE INSERT ON documents
             BEGIN SELECT RAISE(ABORT, 'documents are read-only'); END;
             CREATE TABLE requeue_log (url TEXT NOT NULL, attempts INTEGER NOT NULL);
             CREATE TRIGGER log_requeue AFTER INSERT ON queue
             BEGIN INSERT INTO requeue_log VALUES (NEW.url, NEW.attempts); END;",
        )
        .unwrap();

    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.store_failed, 2);
    assert_eq!(report.requeued, 1);

    let requeues: Vec<(String, u32)> = sabotage
        .prepare("SELECT url, attempts FROM requeue_log")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(requeues, vec![(h.article_url(1), 1)]);

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_documents().unwrap(), 0);
    assert_eq!(storage.count_tasks().unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_during_delay_returns_task() {
    let h = Harness::with_settings(0, 60_000).await;
    let storage = h.storage();
    h.enqueue(&storage, 1);

    let (tx, mut rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
    });

    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.processed(), 0);

    let task = storage
        .lock()
        .unwrap()
        .get_task(&h.article_url(1))
        .unwrap()
        .unwrap();
    assert_eq!(task.attempts, 0);
}

#[tokio::test]
async fn test_discovery_then_fetch_end_to_end() {
    let h = Harness::new().await;
    h.mount_listing("1", listing_page()).await;
    h.mount_article(1, "First", ARTICLE_TEXT).await;
    h.mount_article(2, "Second", &ARTICLE_TEXT.repeat(2)).await;

    h.frontier().run_pass().await.unwrap();

    let storage = h.storage();
    let (_tx, mut rx) = no_shutdown();
    let report = h.worker(Arc::clone(&storage)).drain(&mut rx).await.unwrap();
    assert_eq!(report.saved, 2);

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_documents().unwrap(), 2);
    assert_eq!(storage.count_tasks().unwrap(), 0);

    let doc = storage.get_document(&h.article_url(2)).unwrap().unwrap();
    assert_eq!(doc.title, "Second");
}


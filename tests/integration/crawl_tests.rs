//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small linearization and run the
//! full claim, fetch, classify and emit cycle end-to-end.

use icd_harvester::auth::{StaticToken, TokenCache, TokenProvider};
use icd_harvester::config::{parse_config, Config};
use icd_harvester::crawler::{Coordinator, FetchError, RunOptions};
use icd_harvester::model::{Classification, ClassifiedRecord};
use icd_harvester::output::{JsonDirectorySink, JsonLinesSink, MemorySink};
use icd_harvester::storage::{RunStatus, SqliteStorage, Storage};
use icd_harvester::HarvestError;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration rooted at `{server}/root`
fn create_test_config(server: &MockServer, crawler: &str, output: &str) -> Config {
    parse_config(&format!(
        r#"
[api]
release-url = "{}/root"
release-id = "2024-01"
force-https = false
request-timeout-secs = 1

[crawler]
{}

[output]
path = "unused.jsonl"
{}
"#,
        server.uri(),
        crawler,
        output
    ))
    .expect("test config parses")
}

fn fast_crawler() -> &'static str {
    "concurrency = 4\nmax-attempts = 1\ninitial-backoff-ms = 1\nrequeue-limit = 0"
}

fn tokens() -> Arc<dyn TokenProvider> {
    Arc::new(TokenCache::new(StaticToken::new("integration-token")))
}

async fn mount_entity(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Chapter at the root, one block below it, one diagnosis below the block
async fn mount_three_level_tree(server: &MockServer) {
    let base = server.uri();
    mount_entity(
        server,
        "/root",
        serde_json::json!({"code": "1", "classKind": "chapter", "title": "Infections", "child": ["/s"]}),
    )
    .await;
    mount_entity(
        server,
        "/s",
        serde_json::json!({
            "code": "1A", "classKind": "block", "title": "Intestinal infections",
            "parent": [format!("{}/root", base)], "child": ["/d"]
        }),
    )
    .await;
    mount_entity(
        server,
        "/d",
        serde_json::json!({
            "code": "1A.0", "classKind": "foundation", "title": "Cholera",
            "parent": [format!("{}/s", base)]
        }),
    )
    .await;
}

fn find(records: &[ClassifiedRecord], class: Classification) -> Vec<&ClassifiedRecord> {
    records
        .iter()
        .filter(|r| r.classification() == class)
        .collect()
}

#[tokio::test]
async fn test_three_level_tree_is_linked() {
    let server = MockServer::start().await;
    mount_three_level_tree(&server).await;

    let config = create_test_config(&server, fast_crawler(), "");
    let (sink, collected) = MemorySink::new();
    let coordinator = Coordinator::new(config, Box::new(sink), tokens(), RunOptions::default())
        .expect("coordinator builds");

    let report = coordinator.run().await.expect("crawl succeeds");
    assert_eq!(report.urls_completed, 3);
    assert!(report.validation.is_clean());

    let collected = collected.lock().unwrap();
    assert_eq!(collected.end_calls, 1);
    assert_eq!(collected.records.len(), 3);

    let chapters = find(&collected.records, Classification::Chapter);
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].id(), 1);

    match find(&collected.records, Classification::Section)[..] {
        [ClassifiedRecord::Section(section)] => {
            assert_eq!(section.id, 1);
            assert_eq!(section.chapter_id, Some(1));
        }
        ref other => panic!("expected one section, got {:?}", other),
    }

    let diagnosis = collected.diagnoses().next().expect("one diagnosis");
    assert_eq!(diagnosis.id, 1);
    assert_eq!(diagnosis.code, "1A.0");
    assert_eq!(diagnosis.chapter_id, Some(1));
    assert_eq!(diagnosis.section_id, Some(1));
    assert_eq!(diagnosis.subsection_id, None);
    assert_eq!(diagnosis.parent_diagnosis_id, None);
}

#[tokio::test]
async fn test_timeouts_exhaust_retries_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/root"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"code": "1", "classKind": "chapter"}))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let config = create_test_config(
        &server,
        "concurrency = 1\nmax-attempts = 3\ninitial-backoff-ms = 2000\nrequeue-limit = 0",
        "",
    );
    let (sink, collected) = MemorySink::new();
    let started = Instant::now();
    let report = Coordinator::new(config, Box::new(sink), tokens(), RunOptions::default())
        .unwrap()
        .run()
        .await
        .expect("a terminal per-URL failure does not fail the run");

    // Three one-second timeouts plus 2s and 4s of backoff
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(report.validation.failed_urls.len(), 1);
    assert!(report.validation.failed_urls[0].url.ends_with("/root"));
    assert_eq!(report.total_records(), 0);

    let collected = collected.lock().unwrap();
    assert!(collected.records.is_empty());
    assert_eq!(collected.end_calls, 1);
}

#[tokio::test]
async fn test_rejected_token_aborts_without_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/root"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let config = create_test_config(
        &server,
        fast_crawler(),
        &format!("state-path = \"{}\"", db.display()),
    );

    let (sink, collected) = MemorySink::new();
    let coordinator = Coordinator::new(
        config,
        Box::new(sink),
        tokens(),
        RunOptions {
            fresh: true,
            config_hash: "h".to_string(),
        },
    )
    .unwrap();
    let run_id = coordinator.run_id().expect("state database in use");

    match coordinator.run().await {
        Err(HarvestError::Aborted { url, source }) => {
            assert!(url.ends_with("/root"));
            assert!(matches!(source, FetchError::Unauthorized { status: 401, .. }));
        }
        other => panic!("expected an aborted crawl, got {:?}", other.map(|r| r.urls_completed)),
    }

    assert_eq!(collected.lock().unwrap().end_calls, 0);

    let storage = SqliteStorage::new(&db).unwrap();
    assert_eq!(storage.get_run(run_id).unwrap().status, RunStatus::Failed);
    assert_eq!(storage.frontier_counts().unwrap().pending, 1);
}

#[tokio::test]
async fn test_resume_continues_ids_after_abort() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_entity(
        &server,
        "/root",
        serde_json::json!({"code": "1", "classKind": "chapter", "title": "Infections", "child": ["/s"]}),
    )
    .await;
    mount_entity(
        &server,
        "/s",
        serde_json::json!({
            "code": "1A", "classKind": "block", "parent": [format!("{}/root", base)], "child": ["/d"]
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let output = format!("state-path = \"{}\"", db.display());

    let (sink, _first) = MemorySink::new();
    let first = Coordinator::new(
        create_test_config(&server, fast_crawler(), &output),
        Box::new(sink),
        tokens(),
        RunOptions {
            fresh: true,
            config_hash: "h".to_string(),
        },
    )
    .unwrap()
    .run()
    .await;
    assert!(matches!(first, Err(HarvestError::Aborted { .. })));

    // Only the interrupted URL may be fetched again
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "1A.0", "classKind": "foundation", "title": "Cholera",
            "parent": [format!("{}/s", base)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (sink, collected) = MemorySink::new();
    let report = Coordinator::new(
        create_test_config(&server, fast_crawler(), &output),
        Box::new(sink),
        tokens(),
        RunOptions {
            fresh: false,
            config_hash: "h".to_string(),
        },
    )
    .unwrap()
    .run()
    .await
    .expect("resumed crawl succeeds");

    assert_eq!(report.urls_completed, 1);

    let collected = collected.lock().unwrap();
    assert_eq!(collected.records.len(), 1);
    let diagnosis = collected.diagnoses().next().expect("resumed diagnosis");
    assert_eq!(diagnosis.id, 1);
    assert_eq!(diagnosis.chapter_id, Some(1));
    assert_eq!(diagnosis.section_id, Some(1));
    assert_eq!(collected.end_calls, 1);
}

fn read_json_array(path: &Path) -> Vec<serde_json::Value> {
    let text = std::fs::read_to_string(path).expect("output file exists");
    serde_json::from_str(&text).expect("output file is a JSON array")
}

#[tokio::test]
async fn test_json_directory_output_survives_resume() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_entity(
        &server,
        "/root",
        serde_json::json!({"code": "1", "classKind": "chapter", "title": "Infections", "child": ["/s"]}),
    )
    .await;
    mount_entity(
        &server,
        "/s",
        serde_json::json!({
            "code": "1A", "classKind": "block", "parent": [format!("{}/root", base)], "child": ["/d"]
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let out = dir.path().join("records");
    let output = format!("state-path = \"{}\"", db.display());

    let first = Coordinator::new(
        create_test_config(&server, fast_crawler(), &output),
        Box::new(JsonDirectorySink::open(&out, false).unwrap()),
        tokens(),
        RunOptions {
            fresh: true,
            config_hash: "h".to_string(),
        },
    )
    .unwrap()
    .run()
    .await;
    assert!(matches!(first, Err(HarvestError::Aborted { .. })));

    // The stopped run already left its chapter and section on disk
    assert_eq!(read_json_array(&out.join("chapters.json")).len(), 1);
    assert_eq!(read_json_array(&out.join("sections.json")).len(), 1);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "1A.0", "classKind": "foundation", "title": "Cholera",
            "parent": [format!("{}/s", base)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Coordinator::new(
        create_test_config(&server, fast_crawler(), &output),
        Box::new(JsonDirectorySink::open(&out, true).unwrap()),
        tokens(),
        RunOptions {
            fresh: false,
            config_hash: "h".to_string(),
        },
    )
    .unwrap()
    .run()
    .await
    .expect("resumed crawl succeeds");

    let chapters = read_json_array(&out.join("chapters.json"));
    let sections = read_json_array(&out.join("sections.json"));
    let diagnoses = read_json_array(&out.join("diagnoses.json"));
    assert_eq!(chapters.len(), 1);
    assert_eq!(sections.len(), 1);
    assert_eq!(diagnoses.len(), 1);
    assert_eq!(chapters[0]["id"], 1);
    assert_eq!(sections[0]["id"], 1);
    assert_eq!(diagnoses[0]["chapter_id"], 1);
    assert_eq!(diagnoses[0]["section_id"], 1);
}

#[tokio::test]
async fn test_completed_frontier_performs_no_fetches() {
    let server = MockServer::start().await;
    mount_three_level_tree(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let output = format!("state-path = \"{}\"", db.display());

    let (sink, _) = MemorySink::new();
    Coordinator::new(
        create_test_config(&server, fast_crawler(), &output),
        Box::new(sink),
        tokens(),
        RunOptions::default(),
    )
    .unwrap()
    .run()
    .await
    .expect("first crawl succeeds");

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (sink, collected) = MemorySink::new();
    let started = Instant::now();
    let report = Coordinator::new(
        create_test_config(&server, fast_crawler(), &output),
        Box::new(sink),
        tokens(),
        RunOptions::default(),
    )
    .unwrap()
    .run()
    .await
    .expect("second crawl succeeds");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.urls_completed, 0);
    assert_eq!(report.frontier.completed, 3);
    assert_eq!(collected.lock().unwrap().end_calls, 1);
}

#[tokio::test]
async fn test_jsonl_output_carries_subclassification_update() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_entity(
        &server,
        "/root",
        serde_json::json!({"code": "1", "classKind": "chapter", "child": ["/a"]}),
    )
    .await;
    mount_entity(
        &server,
        "/a",
        serde_json::json!({
            "code": "1A00", "classKind": "foundation", "title": "Cholera",
            "parent": [format!("{}/root", base)], "child": ["/a0"]
        }),
    )
    .await;
    mount_entity(
        &server,
        "/a0",
        serde_json::json!({
            "code": "1A00.0", "classKind": "foundation", "title": "Classical cholera",
            "parent": [format!("{}/a", base)]
        }),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("records.jsonl");
    let sink = JsonLinesSink::create(&out, false).unwrap();

    Coordinator::new(
        create_test_config(&server, fast_crawler(), ""),
        Box::new(sink),
        tokens(),
        RunOptions::default(),
    )
    .unwrap()
    .run()
    .await
    .expect("crawl succeeds");

    let lines = read_json_lines(&out);
    assert_eq!(lines.len(), 4);

    let kinds: Vec<&str> = lines.iter().map(|l| l["kind"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["chapter", "diagnosis", "diagnosis", "update"]);

    assert_eq!(lines[2]["code"], "1A00.0");
    assert_eq!(lines[2]["parent_diagnosis_id"], 1);
    assert_eq!(lines[3]["diagnosis_id"], 1);
    assert_eq!(lines[3]["has_subclassification"], true);
}

fn read_json_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

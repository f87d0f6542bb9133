use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use gazette_core::index::DocRecord;
use gazette_core::persist::{save_meta, write_json_line, DictEntry, IndexPaths, MetaFile, TermLine};
use http_body_util::BodyExt;
use serde_json::Value;
use std::fs::File;
use tempfile::tempdir;
use tower::ServiceExt;

fn record(name: &str, city: Option<&str>, title: Option<&str>) -> DocRecord {
    DocRecord {
        name: name.to_string(),
        length: 120,
        max_tf: 3,
        unique_terms: 12,
        path: "corpus.jsonl".to_string(),
        city: city.map(str::to_string),
        date: None,
        title: title.map(str::to_string),
        language: None,
    }
}

/// One term ("trade" in d1 and d2) plus filler docs so its IDF stays
/// positive.
fn build_tiny_index(dir: &std::path::Path) {
    let paths = IndexPaths::new(dir);
    paths.create_all().unwrap();

    let mut postings = File::create(paths.bucket_file("T")).unwrap();
    write_json_line(
        &mut postings,
        &TermLine {
            name: "trade".into(),
            appearances: vec![("d1".into(), 3), ("d2".into(), 1)],
        },
    )
    .unwrap();

    let mut dict = File::create(paths.dictionary()).unwrap();
    write_json_line(&mut dict, &DictEntry { term: "trade".into(), appearances: 4, ptr: 0 })
        .unwrap();

    let mut docs = File::create(paths.docs_file()).unwrap();
    write_json_line(&mut docs, &record("d1", Some("LONDON"), Some("Trade deal signed")))
        .unwrap();
    write_json_line(&mut docs, &record("d2", Some("PARIS"), None)).unwrap();
    for i in 3..=10 {
        write_json_line(&mut docs, &record(&format!("d{i}"), None, None)).unwrap();
    }

    save_meta(
        &paths,
        &MetaFile {
            num_docs: 10,
            num_terms: 1,
            created_at: "2024-06-01T00:00:00Z".into(),
            version: 1,
        },
    )
    .unwrap();
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::String(
        String::from_utf8_lossy(&body).into_owned(),
    ));
    (status, json)
}

#[tokio::test]
async fn health_responds_ok() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = gazette_server::build_app(dir.path()).unwrap();
    let (status, body) = call(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = gazette_server::build_app(dir.path()).unwrap();

    let (status, json) = call(app, "/search?q=trade").await;
    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["doc_id"], "d1");
    assert_eq!(results[0]["title"], "Trade deal signed");
    assert_eq!(results[1]["doc_id"], "d2");
    assert_eq!(json["total_hits"], 2);
}

#[tokio::test]
async fn k_limits_returned_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = gazette_server::build_app(dir.path()).unwrap();

    let (status, json) = call(app.clone(), "/search?q=trade&k=1").await;
    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["doc_id"], "d1");
    // total_hits still reports the full match count.
    assert_eq!(json["total_hits"], 2);

    // k above the cap behaves like the default.
    let (_, json) = call(app, "/search?q=trade&k=500").await;
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn city_filter_narrows_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = gazette_server::build_app(dir.path()).unwrap();

    let (status, json) = call(app, "/search?q=trade&cities=london").await;
    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["doc_id"], "d1");
}

#[tokio::test]
async fn doc_endpoint_returns_metadata() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let app = gazette_server::build_app(dir.path()).unwrap();

    let (status, json) = call(app.clone(), "/doc/d1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["doc_id"], "d1");
    assert_eq!(json["city"], "LONDON");

    let (_, missing) = call(app, "/doc/nope").await;
    assert_eq!(missing["error"], "not found");
}

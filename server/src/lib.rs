use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use gazette_core::persist::{load_dictionary, load_docs, load_meta, IndexPaths};
use gazette_core::rank::Ranker;
use gazette_core::search::{NeighborFile, NoSimilarity, SearchOptions, Searcher, Similarity};
use gazette_core::source::JsonlSource;
use gazette_core::stopwords;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub semantic: bool,
    #[serde(default)]
    pub entities: bool,
    /// Comma-separated upper-cased city names to filter by.
    pub cities: Option<String>,
}

const MAX_K: usize = 50;

fn default_k() -> usize {
    MAX_K
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<(String, u32)>>,
}

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher>,
}

pub fn build_app(index_dir: &FsPath) -> Result<Router> {
    let paths = IndexPaths::new(index_dir);
    let meta = load_meta(&paths)?;
    tracing::info!(
        num_docs = meta.num_docs,
        num_terms = meta.num_terms,
        "loading index from {}",
        index_dir.display()
    );
    let dictionary = load_dictionary(&paths)?;
    let docs = load_docs(&paths)?;
    let stop_words = stopwords::load_or_builtin(index_dir);

    let neighbor_path = index_dir.join("neighbors.json");
    let similarity: Box<dyn Similarity> = if neighbor_path.is_file() {
        Box::new(NeighborFile::load(&neighbor_path)?)
    } else {
        Box::new(NoSimilarity)
    };

    let searcher = Searcher::new(
        dictionary,
        paths,
        Ranker::new(docs),
        stop_words,
        similarity,
        Box::new(JsonlSource),
    );
    let state = AppState { searcher: Arc::new(searcher) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(state)
        .layer(cors);
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let opts = SearchOptions {
        semantic: params.semantic,
        entities: params.entities,
        cities: params
            .cities
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_uppercase())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    };
    let mut output = state.searcher.search(&params.q, &opts);
    let total_hits = output.results.len();
    output.results.truncate(params.k.clamp(1, MAX_K));

    let results: Vec<SearchHit> = output
        .results
        .iter()
        .map(|(doc, score)| {
            let record = state.searcher.doc_record(doc);
            SearchHit {
                doc_id: doc.clone(),
                score: *score,
                title: record.and_then(|r| r.title.clone()),
                city: record.and_then(|r| r.city.clone()),
                date: record.and_then(|r| r.date.clone()),
                entities: output.entities.remove(doc),
            }
        })
        .collect();

    let took_s = start.elapsed().as_secs_f64();
    tracing::debug!(query = %params.q, hits = results.len(), took_s, "query answered");
    Json(SearchResponse { query: params.q, took_s, total_hits, results })
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Json<serde_json::Value> {
    match state.searcher.doc_record(&doc_id) {
        Some(record) => Json(serde_json::json!({
            "doc_id": record.name,
            "length": record.length,
            "max_tf": record.max_tf,
            "unique_terms": record.unique_terms,
            "city": record.city,
            "date": record.date,
            "title": record.title,
            "language": record.language,
        })),
        None => Json(serde_json::json!({ "error": "not found" })),
    }
}

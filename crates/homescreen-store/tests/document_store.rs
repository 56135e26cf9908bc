/// Integration test: drive DocumentStore against an in-process fake of the
/// collection/document REST API, including paged listing.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use homescreen_store::document::{Document, ListDocumentsResponse};
use homescreen_store::{DocumentStore, KeyedStore, Records};
use homescreen_types::models::NotificationType;

#[derive(Clone, Default)]
struct Fake {
    docs: Arc<Mutex<BTreeMap<(String, String), Document>>>,
    list_calls: Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
    failing: Arc<AtomicBool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    page_size: Option<usize>,
    page_token: Option<String>,
}

async fn list_docs(
    State(fake): State<Fake>,
    Path(collection): Path<String>,
    Query(q): Query<PageQuery>,
) -> Response {
    if fake.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    fake.list_calls.fetch_add(1, Ordering::SeqCst);

    let all: Vec<Document> = {
        let docs = fake.docs.lock().unwrap();
        docs.iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, d)| d.clone())
            .collect()
    };
    // collections only exist once they hold a document
    if all.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let start: usize = q.page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
    let end = (start + q.page_size.unwrap_or(100)).min(all.len());
    Json(ListDocumentsResponse {
        documents: all[start..end].to_vec(),
        next_page_token: (end < all.len()).then(|| end.to_string()),
    })
    .into_response()
}

async fn get_doc(State(fake): State<Fake>, Path((collection, id)): Path<(String, String)>) -> Response {
    if fake.failing.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let doc = fake.docs.lock().unwrap().get(&(collection, id)).cloned();
    match doc {
        Some(doc) => Json(doc).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn patch_doc(
    State(fake): State<Fake>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(mut doc): Json<Document>,
) -> Response {
    *fake.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    doc.name = Some(format!("{}/{}", collection, id));
    fake.docs.lock().unwrap().insert((collection, id), doc.clone());
    Json(doc).into_response()
}

async fn delete_doc(State(fake): State<Fake>, Path((collection, id)): Path<(String, String)>) -> StatusCode {
    match fake.docs.lock().unwrap().remove(&(collection, id)) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn spawn_fake() -> (String, Fake) {
    let fake = Fake::default();
    let app = Router::new()
        .route("/v1/docs/{collection}", get(list_docs))
        .route(
            "/v1/docs/{collection}/{id}",
            get(get_doc).patch(patch_doc).delete(delete_doc),
        )
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1/docs", addr), fake)
}

#[tokio::test]
async fn set_get_delete_round_trip() {
    let (url, fake) = spawn_fake().await;
    let store = DocumentStore::new(&url, Some("secret-token".into())).unwrap();

    assert_eq!(store.get("user:u1").await.unwrap(), None);

    let value = r#"{"id":"u1","displayName":"Aki ✓"}"#;
    store.set("user:u1", value).await.unwrap();
    assert_eq!(store.get("user:u1").await.unwrap().as_deref(), Some(value));
    assert_eq!(
        fake.last_auth.lock().unwrap().as_deref(),
        Some("Bearer secret-token")
    );

    {
        let docs = fake.docs.lock().unwrap();
        let doc = &docs[&("users".to_string(), "u1".to_string())];
        assert_eq!(doc.original_key(), Some("user:u1"));
        assert!(doc.fields.updated_at.is_some());
    }

    store.delete("user:u1").await.unwrap();
    assert_eq!(store.get("user:u1").await.unwrap(), None);
    // already gone
    store.delete("user:u1").await.unwrap();
}

#[tokio::test]
async fn list_pages_and_filters_by_original_key() {
    let (url, fake) = spawn_fake().await;
    let store = DocumentStore::new(&url, None).unwrap().with_page_size(2);

    for i in 0..5 {
        store.set(&format!("screen:a:s{}", i), "{}").await.unwrap();
    }
    store.set("screen:b:s9", "{}").await.unwrap();
    store.set("screen:a:current", "{}").await.unwrap();

    let keys = store.list("screen:a:").await.unwrap();
    assert_eq!(
        keys,
        vec![
            "screen:a:current",
            "screen:a:s0",
            "screen:a:s1",
            "screen:a:s2",
            "screen:a:s3",
            "screen:a:s4",
        ]
    );
    // 7 documents at 2 per page
    assert_eq!(fake.list_calls.load(Ordering::SeqCst), 4);

    assert!(store.list("notification:a:").await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_prefix_spans_every_collection() {
    let (url, _fake) = spawn_fake().await;
    let store = DocumentStore::new(&url, None).unwrap();

    store.set("current-user", "\"u1\"").await.unwrap();
    store.set("user:u1", "{}").await.unwrap();
    store.set("action:u1:a1", "{}").await.unwrap();

    assert_eq!(
        store.list("").await.unwrap(),
        vec!["action:u1:a1", "current-user", "user:u1"]
    );
    assert_eq!(store.list("current-").await.unwrap(), vec!["current-user"]);
}

#[tokio::test]
async fn colliding_doc_ids_do_not_leak_values() {
    let (url, _fake) = spawn_fake().await;
    let store = DocumentStore::new(&url, None).unwrap();

    // both map to screens/a_b_c
    store.set("screen:a_b:c", "first").await.unwrap();
    store.set("screen:a:b_c", "second").await.unwrap();

    assert_eq!(store.get("screen:a_b:c").await.unwrap(), None);
    assert_eq!(store.get("screen:a:b_c").await.unwrap().as_deref(), Some("second"));
}

#[tokio::test]
async fn clear_is_a_no_op() {
    let (url, _fake) = spawn_fake().await;
    let store = DocumentStore::new(&url, None).unwrap();
    store.set("user:u1", "{}").await.unwrap();
    store.clear().await.unwrap();
    assert_eq!(store.get("user:u1").await.unwrap().as_deref(), Some("{}"));
}

#[tokio::test]
async fn service_faults_are_errors_not_empty_results() {
    let (url, fake) = spawn_fake().await;
    let store = DocumentStore::new(&url, None).unwrap();
    store.set("notification:a:n1", "{}").await.unwrap();

    fake.failing.store(true, Ordering::SeqCst);
    let err = store.list("notification:a:").await.unwrap_err();
    assert!(err.is_backend_fault());
    assert!(store.get("notification:a:n1").await.unwrap_err().is_backend_fault());

    let unreachable = DocumentStore::new("http://127.0.0.1:1/v1/docs", None).unwrap();
    assert!(unreachable.get("user:u1").await.unwrap_err().is_backend_fault());
}

#[tokio::test]
async fn records_work_over_the_document_backend() {
    let (url, _fake) = spawn_fake().await;
    let records = Records::new(Arc::new(DocumentStore::new(&url, None).unwrap()));

    let first = records
        .upload_screen("a", vec!["data:image/png;base64,AAAA".into(); 3])
        .await
        .unwrap();
    let second = records
        .upload_screen("a", vec!["data:image/png;base64,BBBB".into()])
        .await
        .unwrap();
    assert!(!records.get_screen("a", &first.screen.id).await.unwrap().unwrap().is_current);

    let (view, added) = records.toggle_like("b", "a", &second.screen.id).await.unwrap();
    assert!(added && view.is_current);
    assert_eq!(view.screen.likes, vec!["b".to_string()]);

    let notes = records.notifications("a").await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].0.kind, NotificationType::Like);

    let own = records.profile_screens("a", "a").await.unwrap();
    assert_eq!(own.len(), 2);
    assert_eq!(own[0].screen.id, second.screen.id);
}

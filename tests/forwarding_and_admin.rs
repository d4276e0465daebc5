use std::collections::HashSet;
use std::sync::Arc;

use rlb::backend::{Backend, BackendRegistry};
use rlb::forwarder::Forwarder;
use rlb::ratelimiter::RateLimiterStore;
use rlb::selector::build_selector;
use rlb::storage::memory::InMemoryRepository;
use rlb::storage::{ClientRecord, ClientRepository};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn round_robin_spreads_concurrent_requests_across_both_backends() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    for server in [&server_a, &server_b] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    let registry = BackendRegistry::new(vec![
        Arc::new(Backend::new("a".to_string(), server_a.uri().parse().unwrap())),
        Arc::new(Backend::new("b".to_string(), server_b.uri().parse().unwrap())),
    ]);
    let selector = build_selector("round_robin", registry.backends().to_vec());
    let forwarder = Arc::new(Forwarder::new(selector));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let forwarder = Arc::clone(&forwarder);
        handles.push(tokio::spawn(async move {
            forwarder.forward(get("/")).await.status()
        }));
    }
    let mut statuses = HashSet::new();
    for h in handles {
        statuses.insert(h.await.unwrap());
    }
    assert_eq!(statuses, HashSet::from([StatusCode::OK]));

    assert!(server_a.received_requests().await.unwrap().len() >= 1);
    assert!(server_b.received_requests().await.unwrap().len() >= 1);
}

#[tokio::test]
async fn unreachable_backend_is_retried_against_the_next_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dead = Arc::new(Backend::new(
        "dead".to_string(),
        "http://127.0.0.1:1".parse().unwrap(),
    ));
    let live = Arc::new(Backend::new("live".to_string(), server.uri().parse().unwrap()));
    let registry = BackendRegistry::new(vec![dead.clone(), live]);
    let selector = build_selector("round_robin", registry.backends().to_vec());
    let forwarder = Forwarder::new(selector);

    let resp = forwarder.forward(get("/")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!dead.is_alive());
}

#[tokio::test]
async fn admin_registration_binds_the_api_key_to_a_fresh_bucket() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = RateLimiterStore::new(10, 1, repo).await.unwrap();

    store
        .add_client(ClientRecord {
            client_id: "k".to_string(),
            capacity: 5,
            rate_per_sec: 1,
        })
        .await
        .unwrap();

    let clients = store.list_clients().await.unwrap();
    assert_eq!(clients["k"].capacity, 5);

    let bucket = store.get_bucket("k").await;
    assert_eq!(bucket.capacity, 5);
    for _ in 0..5 {
        assert!(bucket.allow());
    }
    assert!(!bucket.allow());
}

#[tokio::test]
async fn persisted_depletion_survives_store_reconstruction() {
    let repo: Arc<dyn ClientRepository> = Arc::new(InMemoryRepository::new());
    let store = RateLimiterStore::new(10, 1, Arc::clone(&repo)).await.unwrap();

    store
        .add_client(ClientRecord {
            client_id: "k".to_string(),
            capacity: 3,
            rate_per_sec: 0,
        })
        .await
        .unwrap();
    let bucket = store.get_bucket("k").await;
    assert!(bucket.allow());
    assert!(bucket.allow());
    assert!(bucket.allow());
    assert!(!bucket.allow());

    store.persist_tick().await;

    let states = repo.load_bucket_state().await.unwrap();
    assert_eq!(states.iter().find(|s| s.client_id == "k").unwrap().tokens, 0);

    let restarted = RateLimiterStore::new(10, 1, repo).await.unwrap();
    let restarted_bucket = restarted.get_bucket("k").await;
    assert_eq!(restarted_bucket.snapshot_tokens(), 0);
    assert!(!restarted_bucket.allow());
}

use std::{sync::Arc, time::Duration};

use beacon::{
    engine::{DigestFire, DigestScheduler, DispatchOutcome, Dispatcher},
    models::{Category, StatsPeriod},
    persistence::{SharedStore, SqliteStore},
    test_helpers::{IncidentBuilder, StaticStatsProvider, create_test_channel, create_test_config},
};
use chrono::Utc;
use mockito::Matcher;

const SEND_PATH: &str = "/botTEST_TOKEN/sendMessage";

async fn open_store(url: &str) -> Arc<SqliteStore> {
    let store = SqliteStore::new(url).await.expect("Failed to open store");
    store.run_migrations().await.expect("Failed to run migrations");
    Arc::new(store)
}

fn worker(server_url: &str, store: Arc<SqliteStore>) -> Arc<Dispatcher> {
    let config = create_test_config(server_url);
    Arc::new(Dispatcher::new(
        &config,
        store as Arc<dyn SharedStore>,
        Some(create_test_channel(server_url)),
        Arc::default(),
    ))
}

#[tokio::test]
async fn workers_sharing_a_database_deduplicate_together() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("state.db").display());
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", SEND_PATH).with_status(200).expect(1).create_async().await;

    let first = worker(&server.url(), open_store(&url).await);
    let second = worker(&server.url(), open_store(&url).await);

    let event = IncidentBuilder::new().location("/checkout").kind("TimeoutError").build();
    let outcomes = futures::future::join_all([
        first.handle(event.clone()),
        second.handle(event.clone()),
        first.handle(event),
    ])
    .await;

    let dispatched =
        outcomes.iter().filter(|o| matches!(o, DispatchOutcome::Dispatched(_))).count();
    let duplicates = outcomes.iter().filter(|o| matches!(o, DispatchOutcome::Duplicate)).count();
    assert_eq!(dispatched, 1);
    assert_eq!(duplicates, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn daily_digest_is_sent_by_one_worker_only() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("state.db").display());
    let mut server = mockito::Server::new_async().await;
    let digest = server
        .mock("POST", SEND_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("Daily report".to_string()),
            Matcher::Regex("Total users: 12".to_string()),
        ]))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let _alerts = server.mock("POST", SEND_PATH).with_status(200).create_async().await;

    let first = worker(&server.url(), open_store(&url).await);
    let second = worker(&server.url(), open_store(&url).await);
    first.handle(IncidentBuilder::new().build()).await;

    let counts = second.incident_counts(&StatsPeriod::last_day(Utc::now())).await;
    assert_eq!(counts.get(&Category::Error), Some(&1));

    let stats = Arc::new(StaticStatsProvider::new(12));
    let schedulers = [
        DigestScheduler::new(Arc::clone(&first), Some(stats.clone()), 9, 0),
        DigestScheduler::new(Arc::clone(&second), Some(stats), 9, 0),
    ];
    let now = Utc::now();
    let mut sent = 0;
    for scheduler in &schedulers {
        if let DigestFire::Sent(_) = scheduler.fire_once(now).await {
            sent += 1;
        }
    }

    assert_eq!(sent, 1);
    digest.assert_async().await;
}

#[tokio::test]
async fn purge_removes_only_expired_records() {
    let store = open_store("sqlite::memory:").await;
    store.conditional_create("beacon:dedup:short", Duration::from_millis(10)).await.unwrap();
    store.increment_with_expiry("beacon:rate:global", Duration::from_secs(60)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert_eq!(store.get_counter("beacon:rate:global").await.unwrap(), Some(1));
}

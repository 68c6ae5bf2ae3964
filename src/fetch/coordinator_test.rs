use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing_test::traced_test;

use crate::test_utils::features_document;
use crate::test_utils::test_key;
use crate::test_utils::CountingFetcher;
use crate::ConfigKey;
use crate::FeatureFetcher;
use crate::FetchCoordinator;
use crate::Payload;
use crate::Result;

fn work(
    fetcher: &Arc<CountingFetcher>,
    key: &ConfigKey,
) -> impl FnOnce() -> BoxFuture<'static, Result<Arc<Payload>>> {
    let fetcher = fetcher.clone();
    let key = key.clone();
    move || async move { fetcher.fetch(&key).await.map(Arc::new) }.boxed()
}

async fn explode() -> Result<Arc<Payload>> {
    panic!("fetch blew up")
}

#[tokio::test]
async fn concurrent_fetches_for_one_key_share_a_single_request() {
    let coordinator = Arc::new(FetchCoordinator::new());
    let fetcher = Arc::new(
        CountingFetcher::new(features_document("flag1", "true")).with_delay(Duration::from_millis(50)),
    );
    let key = test_key();

    let callers = (0..10).map(|_| {
        let coordinator = coordinator.clone();
        let fetcher = fetcher.clone();
        let key = key.clone();
        tokio::spawn(async move { coordinator.fetch(&key, work(&fetcher, &key)).await })
    });
    let results = join_all(callers).await;

    assert_eq!(fetcher.calls(), 1);
    let first = results[0].as_ref().unwrap().clone().unwrap();
    for result in results {
        let payload = result.unwrap().unwrap();
        assert!(Arc::ptr_eq(&payload, &first));
    }
    assert!(!coordinator.is_in_flight(&key));
}

#[tokio::test]
async fn different_keys_are_fetched_independently() {
    let coordinator = FetchCoordinator::new();
    let fetcher = Arc::new(
        CountingFetcher::new(features_document("flag1", "true")).with_delay(Duration::from_millis(20)),
    );
    let a = ConfigKey::new("https://api.example.com", "a");
    let b = ConfigKey::new("https://api.example.com", "b");

    let (ra, rb) = tokio::join!(
        coordinator.fetch(&a, work(&fetcher, &a)),
        coordinator.fetch(&b, work(&fetcher, &b))
    );

    assert!(ra.is_some());
    assert!(rb.is_some());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
#[traced_test]
async fn failure_resolves_to_none_and_next_call_starts_fresh() {
    let coordinator = FetchCoordinator::new();
    let fetcher = Arc::new(CountingFetcher::failing());
    let key = test_key();

    assert!(coordinator.fetch(&key, work(&fetcher, &key)).await.is_none());
    assert!(!coordinator.is_in_flight(&key));
    assert!(logs_contain("feature fetch failed"));

    fetcher.respond_with(features_document("flag1", "false"));
    let payload = coordinator.fetch(&key, work(&fetcher, &key)).await.unwrap();
    assert_eq!(payload.as_json(), features_document("flag1", "false").as_json());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
#[traced_test]
async fn panicking_work_clears_the_in_flight_marker() {
    let coordinator = FetchCoordinator::new();
    let key = test_key();

    let outcome = coordinator.fetch(&key, explode).await;

    assert!(outcome.is_none());
    assert!(!coordinator.is_in_flight(&key));
    assert_eq!(coordinator.in_flight_count(), 0);
    assert!(logs_contain("Fetch task failed"));
}

#[tokio::test]
async fn dropping_every_caller_does_not_abort_the_fetch() {
    let coordinator = FetchCoordinator::new();
    let finished = Arc::new(AtomicBool::new(false));
    let key = test_key();

    let flag = finished.clone();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(5),
        coordinator.fetch(&key, move || async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(Arc::new(features_document("flag1", "true")))
        }),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(coordinator.is_in_flight(&key));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(finished.load(Ordering::SeqCst));
    assert!(!coordinator.is_in_flight(&key));
}

#[tokio::test]
async fn background_refresh_registers_before_returning_and_joins_in_flight() {
    let coordinator = FetchCoordinator::new();
    let fetcher = Arc::new(
        CountingFetcher::new(features_document("flag1", "true")).with_delay(Duration::from_millis(30)),
    );
    let key = test_key();

    assert!(coordinator.refresh_in_background(&key, work(&fetcher, &key)));
    assert!(coordinator.is_in_flight(&key));
    assert!(!coordinator.refresh_in_background(&key, work(&fetcher, &key)));

    // a blocking caller joins the background fetch
    let payload = coordinator.fetch(&key, work(&fetcher, &key)).await;
    assert!(payload.is_some());
    assert_eq!(fetcher.calls(), 1);
}

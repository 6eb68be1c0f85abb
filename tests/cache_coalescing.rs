use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use modbot::cache::{CacheConfig, CacheError, TtlCache};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

fn counted(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
    outcome: Result<String, CacheError>,
) -> impl FnOnce() -> BoxFuture<'static, Result<String, CacheError>> + Send + 'static {
    let calls = calls.clone();
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            sleep(delay).await;
            outcome
        }
        .boxed()
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_retrieval() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let lookups = (0..10).map(|_| {
        cache.get(
            "k",
            counted(&calls, Duration::from_millis(50), Ok("value".into())),
            false,
            false,
        )
    });
    let results = join_all(lookups).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r == &Ok("value".to_string())));
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced, 9);

    // Populated now: a later lookup is a plain hit.
    let again = cache
        .get("k", counted(&calls, Duration::ZERO, Ok("other".into())), false, false)
        .await;
    assert_eq!(again, Ok("value".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failures_reach_every_waiter_and_are_not_cached() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    let missing = CacheError::NotFound("User not found!".into());

    let lookups = (0..3).map(|_| {
        cache.get(
            "k",
            counted(&calls, Duration::from_millis(20), Err(missing.clone())),
            false,
            false,
        )
    });
    for result in join_all(lookups).await {
        assert_eq!(result, Err(missing.clone()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty().await);

    let retry = cache
        .get("k", counted(&calls, Duration::ZERO, Ok("found".into())), false, false)
        .await;
    assert_eq!(retry, Ok("found".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_retrieval_times_out_and_can_be_retried() {
    let limit = Duration::from_millis(100);
    let cache = TtlCache::<String>::with_config(
        CacheConfig::new("test", Duration::ZERO).with_retrieve_timeout(limit),
    );
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = cache
        .get("k", counted(&calls, Duration::from_secs(5), Ok("late".into())), false, false)
        .await;
    assert_eq!(slow, Err(CacheError::TimedOut(limit)));

    let fast = cache
        .get("k", counted(&calls, Duration::from_millis(10), Ok("quick".into())), false, false)
        .await;
    assert_eq!(fast, Ok("quick".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn override_cache_refreshes_the_entry() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    cache.put("k", "old".to_string()).await;

    let fresh = cache
        .get("k", counted(&calls, Duration::ZERO, Ok("new".into())), true, false)
        .await;
    assert_eq!(fresh, Ok("new".to_string()));

    let cached = cache
        .get("k", counted(&calls, Duration::ZERO, Ok("newer".into())), false, false)
        .await;
    assert_eq!(cached, Ok("new".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn invalidation_during_retrieval_keeps_the_result_out() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let (result, _) = tokio::join!(
        cache.get(1, counted(&calls, Duration::from_millis(50), Ok("v1".into())), false, true),
        async {
            sleep(Duration::from_millis(10)).await;
            cache.remove(1).await
        }
    );
    assert_eq!(result, Ok("v1".to_string()));
    assert!(cache.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn removing_another_key_keeps_the_retrieved_value() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    cache.put(2, "two".to_string()).await;

    let (result, removed) = tokio::join!(
        cache.get(1, counted(&calls, Duration::from_millis(50), Ok("one".into())), false, true),
        async {
            sleep(Duration::from_millis(10)).await;
            cache.remove(2).await
        }
    );
    assert_eq!(result, Ok("one".to_string()));
    assert!(removed);
    assert_eq!(cache.len().await, 1);

    let cached = cache
        .get(1, counted(&calls, Duration::ZERO, Ok("again".into())), false, true)
        .await;
    assert_eq!(cached, Ok("one".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_during_retrieval_keeps_the_result_out() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let (result, _) = tokio::join!(
        cache.get("k", counted(&calls, Duration::from_millis(50), Ok("v".into())), false, false),
        async {
            sleep(Duration::from_millis(10)).await;
            cache.clear().await
        }
    );
    assert_eq!(result, Ok("v".to_string()));
    assert!(cache.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn cancelled_first_caller_does_not_strand_waiters() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let (first, second) = tokio::join!(
        tokio::time::timeout(
            Duration::from_millis(10),
            cache.get("k", counted(&calls, Duration::from_millis(50), Ok("value".into())), false, false),
        ),
        async {
            sleep(Duration::from_millis(5)).await;
            cache
                .get("k", counted(&calls, Duration::ZERO, Ok("other".into())), false, false)
                .await
        }
    );
    assert!(first.is_err());
    assert_eq!(second, Ok("value".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn override_cache_joins_a_running_retrieval() {
    let cache = TtlCache::<String>::new("test", Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let (plain, forced) = tokio::join!(
        cache.get("k", counted(&calls, Duration::from_millis(50), Ok("first".into())), false, false),
        async {
            sleep(Duration::from_millis(10)).await;
            cache
                .get("k", counted(&calls, Duration::ZERO, Ok("second".into())), true, false)
                .await
        }
    );
    assert_eq!(plain, Ok("first".to_string()));
    assert_eq!(forced, Ok("first".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().coalesced, 1);
}

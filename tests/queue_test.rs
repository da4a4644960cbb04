mod common;

use claim_audit::config::QueueConfig;
use claim_audit::models::{Catalog, CatalogEntry, JobEvent, JobStatus, LineItem, PriceFlag};
use claim_audit::service::{ItemAuditor, JobQueue, ResultCache};
use claim_audit::QueueError;
use common::{FaultyAuditor, GaugeAuditor, PanickingAuditor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn queue_with(config: QueueConfig, auditor: Arc<dyn ItemAuditor>) -> (JobQueue, Arc<ResultCache>) {
    let cache = Arc::new(ResultCache::in_memory(Duration::from_secs(3600)));
    (JobQueue::new(config, auditor, Arc::clone(&cache)), cache)
}

fn queue() -> (JobQueue, Arc<ResultCache>) {
    queue_with(QueueConfig::default(), Arc::new(common::engine()))
}

#[tokio::test]
async fn test_job_completes_with_ordered_results() {
    let (queue, _cache) = queue();
    let items = common::items(&["Drywall", "Unknown gadget", "Ceiling fan"]);
    let engine = common::engine();

    let handle = queue.enqueue_batch("job-1", items.clone(), None).unwrap();
    let result = handle.wait().await.unwrap();

    assert_eq!(result.results.len(), 3);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(result.results[i], engine.audit(item));
    }
    assert_eq!(result.cached_count, 0);
    assert_eq!(result.computed_count, 3);
    assert!(!result.partial_cache);
    assert_eq!(result.summary.total_items, 3);

    let status = queue.get_job_status("job-1").unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.progress, 100);
}

#[tokio::test]
async fn test_events_follow_state_machine() {
    let (queue, _cache) = queue();
    let mut handle = queue
        .enqueue_batch("job-events", common::items(&["Drywall"]), None)
        .unwrap();

    let first = handle.next_event().await.unwrap();
    assert_eq!(first.status(), JobStatus::Processing);
    assert_eq!(first.job_id(), "job-events");

    match handle.next_event().await.unwrap() {
        JobEvent::Completed { result, .. } => assert_eq!(result.results.len(), 1),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(handle.next_event().await.is_none());
}

#[tokio::test]
async fn test_partial_cache_merge() {
    let (queue, cache) = queue();
    let engine = common::engine();
    let items = common::items(&[
        "Drywall",
        "Interior door",
        "Ceiling fan",
        "Asphalt shingles",
        "Hot tub",
    ]);

    for i in [1, 3] {
        cache.set(&items[i].name, &engine.audit(&items[i]), Some("60601"), engine.generation());
    }

    let result = queue
        .enqueue_batch("job-partial", items.clone(), Some("60601".to_string()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(result.results.len(), 5);
    assert!(result.partial_cache);
    assert_eq!(result.cached_count, 2);
    assert_eq!(result.computed_count, 3);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(result.results[i], engine.audit(item), "index {}", i);
    }

    // 第二次提交全部命中缓存
    let again = queue
        .enqueue_batch("job-partial-2", items, Some("60601".to_string()))
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(again.cached_count, 5);
    assert!(!again.partial_cache);
    assert_eq!(again.results, result.results);
}

#[tokio::test]
async fn test_failed_job_is_isolated() {
    let auditor = Arc::new(FaultyAuditor {
        engine: common::engine(),
        poison: "explode",
    });
    let (queue, cache) = queue_with(QueueConfig::default(), auditor);

    let job1 = queue.enqueue_batch("job-1", common::items(&["Drywall", "Ceiling fan"]), None).unwrap();
    let job2 = queue
        .enqueue_batch("job-2", common::items(&["Interior door", "explode", "Drywall"]), None)
        .unwrap();
    let job3 = queue.enqueue_batch("job-3", common::items(&["Asphalt shingles"]), None).unwrap();

    let (r1, r2, r3) = tokio::join!(job1.wait(), job2.wait(), job3.wait());

    assert_eq!(r1.unwrap().results.len(), 2);
    assert_eq!(r3.unwrap().results.len(), 1);
    match r2 {
        Err(QueueError::Execution { job_id, message }) => {
            assert_eq!(job_id, "job-2");
            assert!(message.contains("forced failure"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let failed = queue.get_job("job-2").unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(!failed.error.unwrap_or_default().is_empty());

    // 失败前写入的缓存仍然可用
    let door = LineItem::new("Interior door", 1.0, 100.0);
    assert!(cache.get(&door, None, 0).is_some());

    let stats = queue.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn test_panic_is_contained() {
    let auditor = Arc::new(PanickingAuditor {
        engine: common::engine(),
        poison: "kaboom",
    });
    let (queue, _cache) = queue_with(QueueConfig::default(), auditor);

    let bad = queue.enqueue_batch("bad", common::items(&["kaboom"]), None).unwrap();
    let good = queue.enqueue_batch("good", common::items(&["Drywall"]), None).unwrap();

    let err = bad.wait().await.unwrap_err();
    assert!(err.to_string().contains("auditor crashed on kaboom"));
    assert!(good.wait().await.is_ok());
}

#[tokio::test]
async fn test_duplicate_job_id_rejected() {
    let (queue, _cache) = queue();
    let handle = queue.enqueue_batch("same", common::items(&["Drywall"]), None).unwrap();
    assert!(matches!(
        queue.enqueue_batch("same", vec![], None),
        Err(QueueError::DuplicateJob(id)) if id == "same"
    ));
    handle.wait().await.unwrap();
}

#[tokio::test]
async fn test_empty_batch_completes() {
    let (queue, _cache) = queue();
    let result = queue.enqueue_batch("empty", vec![], None).unwrap().wait().await.unwrap();
    assert!(result.results.is_empty());
    assert_eq!(result.summary.total_items, 0);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let auditor = Arc::new(GaugeAuditor::new(Duration::from_millis(40)));
    let config = QueueConfig {
        concurrency: 2,
        ..QueueConfig::default()
    };
    let (queue, _cache) = queue_with(config, auditor.clone());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            queue
                .enqueue_batch(format!("job-{}", i), vec![LineItem::new(format!("Drywall {}", i), 1.0, 2.0)], None)
                .unwrap()
        })
        .collect();

    let outcomes = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert!(auditor.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(queue.stats().concurrency, 2);
}

#[tokio::test]
async fn test_pause_holds_admission_until_resume() {
    let (queue, _cache) = queue();
    queue.pause();

    let handle = queue.enqueue_batch("paused", common::items(&["Drywall"]), None).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(queue.get_job_status("paused").unwrap().status, JobStatus::Queued);
    let stats = queue.stats();
    assert!(stats.is_paused);
    assert_eq!(stats.size, 1);
    assert_eq!(stats.pending, 0);

    queue.resume();
    handle.wait().await.unwrap();
    assert_eq!(queue.get_job_status("paused").unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_clear_drops_waiting_jobs() {
    let (queue, _cache) = queue();
    queue.pause();

    let a = queue.enqueue_batch("wait-a", common::items(&["Drywall"]), None).unwrap();
    let b = queue.enqueue_batch("wait-b", common::items(&["Ceiling fan"]), None).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(queue.clear(), 2);
    assert!(matches!(a.wait().await, Err(QueueError::Cleared(_))));
    assert!(matches!(b.wait().await, Err(QueueError::Cleared(_))));
    assert_eq!(queue.get_job_status("wait-a").unwrap().status, JobStatus::Failed);
    assert_eq!(queue.stats().size, 0);

    // 清空后队列仍可继续使用
    queue.resume();
    let c = queue.enqueue_batch("after-clear", common::items(&["Drywall"]), None).unwrap();
    assert!(c.wait().await.is_ok());
}

#[tokio::test]
async fn test_rate_window_delays_admission() {
    let config = QueueConfig {
        rate_limit: 2,
        rate_window_secs: 1,
        ..QueueConfig::default()
    };
    let (queue, _cache) = queue_with(config, Arc::new(common::engine()));
    let start = Instant::now();

    let handles: Vec<_> = (0..3)
        .map(|i| queue.enqueue_batch(format!("rate-{}", i), common::items(&["Drywall"]), None).unwrap())
        .collect();
    let outcomes = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_timeout_fails_job_and_frees_slot() {
    let config = QueueConfig {
        concurrency: 1,
        job_timeout_secs: 1,
        ..QueueConfig::default()
    };
    let auditor = Arc::new(GaugeAuditor::new(Duration::from_millis(1500)));
    let (queue, _cache) = queue_with(config, auditor);

    let slow = queue.enqueue_batch("slow", common::items(&["Drywall"]), None).unwrap();
    let err = slow.wait().await.unwrap_err();
    assert!(matches!(err, QueueError::Timeout { .. }));
    assert_eq!(queue.get_job_status("slow").unwrap().status, JobStatus::Failed);

    // 计算线程跑完当前明细前槽位仍被占用
    assert_eq!(queue.stats().pending, 1);
    queue.wait_idle().await;
    assert_eq!(queue.stats().pending, 0);
}

#[tokio::test]
async fn test_timed_out_job_does_not_exceed_concurrency() {
    let config = QueueConfig {
        concurrency: 1,
        job_timeout_secs: 1,
        ..QueueConfig::default()
    };
    let auditor = Arc::new(GaugeAuditor::new(Duration::from_millis(400)));
    let (queue, cache) = queue_with(config, auditor.clone());

    let names: Vec<String> = (0..10).map(|i| format!("Drywall {}", i)).collect();
    let long_items = names.iter().map(|n| LineItem::new(n.as_str(), 1.0, 2.0)).collect();
    let long = queue.enqueue_batch("long", long_items, None).unwrap();
    let next = queue
        .enqueue_batch("next", vec![LineItem::new("Ceiling fan", 1.0, 150.0)], None)
        .unwrap();

    assert!(matches!(long.wait().await, Err(QueueError::Timeout { .. })));
    assert!(next.wait().await.is_ok());
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(auditor.peak.load(Ordering::SeqCst) <= 1);
    // 超时后计算在下一条明细前停止
    assert!(cache.stats().entries <= 5);
}

#[tokio::test]
async fn test_clear_wins_over_immediate_admission() {
    let (queue, _cache) = queue();

    let handle = queue.enqueue_batch("racing", common::items(&["Drywall"]), None).unwrap();
    assert_eq!(queue.clear(), 1);

    assert!(matches!(handle.wait().await, Err(QueueError::Cleared(_))));
    assert_eq!(queue.get_job_status("racing").unwrap().status, JobStatus::Failed);
}

fn repriced_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.insert(
        "Drywall",
        CatalogEntry::from_prices("Drywall", "SF", vec![3.0, 3.5, 4.0]).unwrap(),
    );
    catalog.insert(
        "Ceiling fan",
        CatalogEntry::from_prices("Electrical", "EA", vec![300.0, 350.0, 400.0]).unwrap(),
    );
    catalog
}

#[tokio::test]
async fn test_job_uses_one_catalog_snapshot() {
    let auditor = Arc::new(GaugeAuditor::new(Duration::from_millis(300)));
    let (queue, _cache) = queue_with(QueueConfig::default(), auditor.clone());
    let items = vec![
        LineItem::new("Drywall", 10.0, 2.0),
        LineItem::new("Ceiling fan", 1.0, 150.0),
    ];

    let handle = queue.enqueue_batch("snapshot", items, None).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    auditor.engine.replace_catalog(repriced_catalog());

    let result = handle.wait().await.unwrap();
    assert_eq!(result.results[0].flag(), PriceFlag::Ok);
    assert_eq!(result.results[1].flag(), PriceFlag::Ok);
}

#[tokio::test]
async fn test_verdicts_from_replaced_catalog_are_not_served() {
    let auditor = Arc::new(GaugeAuditor::new(Duration::from_millis(300)));
    let (queue, cache) = queue_with(QueueConfig::default(), auditor.clone());
    let item = LineItem::new("Drywall", 10.0, 2.0);

    let in_flight = queue.enqueue_batch("in-flight", vec![item.clone()], None).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    auditor.engine.replace_catalog(repriced_catalog());
    cache.flush().unwrap();

    let stale = in_flight.wait().await.unwrap();
    assert_eq!(stale.results[0].flag(), PriceFlag::Ok);

    let fresh = queue
        .enqueue_batch("after-reload", vec![item.clone()], None)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(fresh.cached_count, 0);
    assert_eq!(fresh.results[0].flag(), PriceFlag::BelowMinimum);
    assert_eq!(fresh.results[0], auditor.engine.audit(&item));
}

#[tokio::test]
async fn test_terminal_jobs_are_evicted_after_retention() {
    let config = QueueConfig {
        retention_secs: 1,
        ..QueueConfig::default()
    };
    let (queue, _cache) = queue_with(config, Arc::new(common::engine()));

    queue
        .enqueue_batch("short-lived", common::items(&["Drywall"]), None)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(queue.get_job_status("short-lived").is_some());

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(queue.get_job_status("short-lived").is_none());

    // 移除后可复用任务 ID
    assert!(queue.enqueue_batch("short-lived", vec![], None).is_ok());
}

mod common;

use common::{FailingPlugin, GatedPlugin, eventually, harness, quick_job};
use forum_pilot::db::PluginData;
use forum_pilot::service::plugin_actor::{self, LAST_RUN_KEY};
use forum_pilot::types::{RunOutcome, RunStatus, TriggerAck, TriggerSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn overlapping_trigger_is_a_no_op() {
    let h = harness(BTreeMap::new());
    let (plugin, gate) = GatedPlugin::new();
    let handle = plugin_actor::spawn(h.deps.runtime(plugin)).await.unwrap();

    assert_eq!(handle.trigger(TriggerSource::Manual).await, TriggerAck::Started);
    assert_eq!(handle.trigger(TriggerSource::Schedule).await, TriggerAck::Busy);
    assert!(handle.status().await.unwrap().running);

    gate.add_permits(1);
    let done = eventually(|| {
        let handle = handle.clone();
        async move { !handle.status().await.unwrap().running }
    })
    .await;
    assert!(done, "run never completed");

    let status = handle.status().await.unwrap();
    let last = status.last_run.expect("last run recorded");
    assert_eq!(last.status, RunStatus::Succeeded);
    assert_eq!(last.trigger, TriggerSource::Manual);
    assert_eq!(last.summary, "released");

    // only the first trigger ran, so one notification
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(handle.trigger(TriggerSource::Manual).await, TriggerAck::Started);
    gate.add_permits(1);
    handle.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn failed_run_records_failed_and_notifies() {
    let h = harness(BTreeMap::new());
    let runtime = h.deps.runtime(Arc::new(FailingPlugin { job: quick_job() }));

    let outcome = runtime.run_once(TriggerSource::Cli).await;
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.summary.contains("site is down"));

    let stored: RunOutcome = PluginData::new(h.store.clone(), "failing")
        .load(LAST_RUN_KEY)
        .await
        .unwrap()
        .expect("last_run stored");
    assert_eq!(stored.status.as_str(), "failed");

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].plugin, "failing");
    assert_eq!(sent[0].title, "Failing failed");
}

#[tokio::test]
async fn notify_flag_off_stays_quiet() {
    let h = harness(BTreeMap::new());
    let mut job = quick_job();
    job.notify = false;
    let runtime = h.deps.runtime(Arc::new(FailingPlugin { job }));

    let outcome = runtime.run_once(TriggerSource::Cli).await;
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn last_run_survives_actor_restart() {
    let h = harness(BTreeMap::new());
    let runtime = h.deps.runtime(Arc::new(FailingPlugin { job: quick_job() }));
    runtime.run_once(TriggerSource::Cli).await;

    let handle = plugin_actor::spawn(runtime).await.unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.last_run.unwrap().status, RunStatus::Failed);
    assert!(!status.running);
    handle.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn shutdown_closes_and_waits_for_grace() {
    let h = harness(BTreeMap::new());
    let (plugin, _gate) = GatedPlugin::new();
    let handle = plugin_actor::spawn(h.deps.runtime(plugin)).await.unwrap();
    assert_eq!(handle.trigger(TriggerSource::Manual).await, TriggerAck::Started);

    let started = tokio::time::Instant::now();
    handle.shutdown(Duration::from_millis(300)).await;
    assert!(started.elapsed() >= Duration::from_millis(300));

    assert_eq!(handle.trigger(TriggerSource::Manual).await, TriggerAck::Closed);
}

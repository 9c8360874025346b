#![allow(dead_code)]

use async_trait::async_trait;
use forum_pilot::config::{JobSettings, SiteConfig};
use forum_pilot::db::{KvStore, MemoryKvStore};
use forum_pilot::error::PilotError;
use forum_pilot::notify::{Notification, Notifier};
use forum_pilot::plugins::{Plugin, PluginContext};
use forum_pilot::service::RuntimeDeps;
use forum_pilot::site::SiteRegistry;
use forum_pilot::types::RunReport;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

/// Keeps every notification for inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), PilotError> {
        self.sent.lock().expect("notifier lock").push(n.clone());
        Ok(())
    }
}

/// Enabled, no retries, notifications on.
pub fn quick_job() -> JobSettings {
    JobSettings {
        enabled: true,
        retry_times: 0,
        retry_interval_secs: 0,
        ..JobSettings::default()
    }
}

pub fn site(server_url: &str) -> SiteConfig {
    SiteConfig {
        base_url: Some(Url::parse(&format!("{server_url}/")).expect("server url")),
        timeout_secs: 5,
        ..SiteConfig::default()
    }
}

pub struct Harness {
    pub store: Arc<dyn KvStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub deps: RuntimeDeps,
}

pub fn harness(sites: BTreeMap<String, SiteConfig>) -> Harness {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let deps = RuntimeDeps {
        store: store.clone(),
        sites: Arc::new(SiteRegistry::new(sites)),
        proxy: None,
        notifier: notifier.clone(),
    };
    Harness {
        store,
        notifier,
        deps,
    }
}

/// Blocks inside `run` until a permit is added to `gate`.
pub struct GatedPlugin {
    pub job: JobSettings,
    pub gate: Arc<Semaphore>,
}

impl GatedPlugin {
    pub fn new() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let plugin = Arc::new(Self {
            job: quick_job(),
            gate: gate.clone(),
        });
        (plugin, gate)
    }
}

#[async_trait]
impl Plugin for GatedPlugin {
    fn id(&self) -> &'static str {
        "gated"
    }

    fn name(&self) -> &'static str {
        "Gated"
    }

    fn job(&self) -> &JobSettings {
        &self.job
    }

    async fn run(&self, _ctx: &PluginContext) -> Result<RunReport, PilotError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| PilotError::RactorError(e.to_string()))?;
        permit.forget();
        let mut report = RunReport::new("Gated");
        report.line("released");
        Ok(report)
    }
}

/// Always fails with an upstream-style error.
pub struct FailingPlugin {
    pub job: JobSettings,
}

#[async_trait]
impl Plugin for FailingPlugin {
    fn id(&self) -> &'static str {
        "failing"
    }

    fn name(&self) -> &'static str {
        "Failing"
    }

    fn job(&self) -> &JobSettings {
        &self.job
    }

    async fn run(&self, _ctx: &PluginContext) -> Result<RunReport, PilotError> {
        Err(PilotError::UnexpectedResponse("site is down".to_string()))
    }
}

/// Poll `cond` every 20ms for up to two seconds.
pub async fn eventually<F, Fut>(mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

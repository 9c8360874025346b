use crate::error::PilotError;
use crate::notify::{Notification, Notifier, dispatch};
use crate::plugins::{Plugin, PluginContext};
use crate::types::{PluginStatus, RunOutcome, RunReport, RunStatus, TriggerAck, TriggerSource};

use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const LAST_RUN_KEY: &str = "last_run";

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Public messages handled by a plugin actor.
#[derive(Debug)]
pub enum PluginMessage {
    /// Start a run unless one is already in flight.
    Trigger(TriggerSource, RpcReplyPort<TriggerAck>),
    Status(RpcReplyPort<PluginStatus>),
    /// Stop accepting triggers; an in-flight run is left to finish.
    Close,

    // Internal messages (sent by the actor's own run task)
    /// The run finished and its outcome has been stored.
    RunComplete(RunOutcome),
}

/// A plugin together with everything needed to run it.
#[derive(Clone)]
pub struct PluginRuntime {
    pub plugin: Arc<dyn Plugin>,
    pub ctx: PluginContext,
    pub notifier: Arc<dyn Notifier>,
}

impl PluginRuntime {
    /// Execute one run, store `last_run` and notify as configured.
    ///
    /// Bypasses the actor's lock; callers that share a store with a running
    /// actor should go through [`PluginHandle::trigger`].
    pub async fn run_once(&self, trigger: TriggerSource) -> RunOutcome {
        let started_at = Utc::now();
        let plugin = self.plugin.clone();
        let ctx = self.ctx.clone();
        info!(plugin = plugin.id(), %trigger, "run started");

        let result = match tokio::spawn(async move { plugin.run(&ctx).await }).await {
            Ok(result) => result,
            Err(e) => Err(PilotError::RactorError(format!("run task aborted: {e}"))),
        };
        self.finish(trigger, started_at, result).await
    }

    async fn finish(
        &self,
        trigger: TriggerSource,
        started_at: DateTime<Utc>,
        result: Result<RunReport, PilotError>,
    ) -> RunOutcome {
        let id = self.plugin.id();
        let (status, title, summary) = match result {
            Ok(report) => {
                info!(plugin = id, lines = report.lines.len(), "run succeeded");
                (RunStatus::Succeeded, report.title.clone(), report.body())
            }
            Err(e) => {
                error!(plugin = id, error = %e, "run failed");
                (
                    RunStatus::Failed,
                    format!("{} failed", self.plugin.name()),
                    e.to_string(),
                )
            }
        };

        let outcome = RunOutcome {
            trigger,
            started_at,
            finished_at: Utc::now(),
            status,
            summary,
        };

        if let Err(e) = self.ctx.data.save(LAST_RUN_KEY, &outcome).await {
            warn!(plugin = id, error = %e, "failed to store last run");
        }

        if self.plugin.job().notify {
            let notification = Notification {
                plugin: id.to_string(),
                title,
                body: outcome.summary.clone(),
            };
            dispatch(self.notifier.as_ref(), &notification).await;
        }
        outcome
    }
}

/// Handle for interacting with one plugin actor.
#[derive(Clone)]
pub struct PluginHandle {
    id: &'static str,
    actor: ActorRef<PluginMessage>,
}

impl PluginHandle {
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Ask for a run. A stopped actor answers as if closed.
    pub async fn trigger(&self, source: TriggerSource) -> TriggerAck {
        match ractor::call!(self.actor, PluginMessage::Trigger, source) {
            Ok(ack) => ack,
            Err(e) => {
                debug!(plugin = self.id, error = %e, "trigger sent to stopped actor");
                TriggerAck::Closed
            }
        }
    }

    pub async fn status(&self) -> Result<PluginStatus, PilotError> {
        ractor::call!(self.actor, PluginMessage::Status)
            .map_err(|e| PilotError::RactorError(format!("Status RPC failed: {e}")))
    }

    /// Close, wait up to `grace` for an in-flight run, then stop the actor.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = ractor::cast!(self.actor, PluginMessage::Close);

        let deadline = Instant::now() + grace;
        loop {
            match self.status().await {
                Ok(s) if s.running => {}
                _ => break,
            }
            if Instant::now() >= deadline {
                warn!(plugin = self.id, "run still in flight after grace period; stopping anyway");
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
        self.actor.stop(None);
        debug!(plugin = self.id, "actor stopped");
    }
}

/// Internal state held by a plugin actor.
struct PluginActorState {
    runtime: PluginRuntime,
    running: bool,
    accepting: bool,
    last_run: Option<RunOutcome>,
}

struct PluginActor;

#[ractor::async_trait]
impl Actor for PluginActor {
    type Msg = PluginMessage;
    type State = PluginActorState;
    type Arguments = PluginRuntime;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        runtime: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let last_run = runtime
            .ctx
            .data
            .load::<RunOutcome>(LAST_RUN_KEY)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("load last run failed: {e}")))?;

        info!(
            plugin = runtime.plugin.id(),
            last_status = last_run.as_ref().map(|o| o.status.as_str()).unwrap_or("-"),
            "plugin actor started"
        );

        Ok(PluginActorState {
            runtime,
            running: false,
            accepting: true,
            last_run,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PluginMessage::Trigger(source, rp) => {
                let ack = self.handle_trigger(state, &myself, source);
                let _ = rp.send(ack);
            }
            PluginMessage::Status(rp) => {
                let plugin = &state.runtime.plugin;
                let _ = rp.send(PluginStatus {
                    id: plugin.id().to_string(),
                    name: plugin.name().to_string(),
                    running: state.running,
                    accepting: state.accepting,
                    job: plugin.job().clone(),
                    last_run: state.last_run.clone(),
                });
            }
            PluginMessage::Close => {
                state.accepting = false;
                info!(plugin = state.runtime.plugin.id(), running = state.running, "plugin closed");
            }
            PluginMessage::RunComplete(outcome) => {
                state.running = false;
                debug!(
                    plugin = state.runtime.plugin.id(),
                    status = outcome.status.as_str(),
                    "run complete"
                );
                state.last_run = Some(outcome);
            }
        }
        Ok(())
    }
}

impl PluginActor {
    fn handle_trigger(
        &self,
        state: &mut PluginActorState,
        myself: &ActorRef<PluginMessage>,
        source: TriggerSource,
    ) -> TriggerAck {
        let id = state.runtime.plugin.id();
        if !state.accepting {
            debug!(plugin = id, %source, "trigger ignored; plugin closed");
            return TriggerAck::Closed;
        }
        if state.running {
            info!(plugin = id, %source, "previous run still in progress; skipping");
            return TriggerAck::Busy;
        }

        state.running = true;
        let runtime = state.runtime.clone();
        let me = myself.clone();
        tokio::spawn(async move {
            let outcome = runtime.run_once(source).await;
            let _ = ractor::cast!(me, PluginMessage::RunComplete(outcome));
        });
        TriggerAck::Started
    }
}

/// Spawn an actor for one plugin and return its handle.
pub async fn spawn(runtime: PluginRuntime) -> Result<PluginHandle, PilotError> {
    let id = runtime.plugin.id();
    let (actor, _jh) = Actor::spawn(None, PluginActor, runtime)
        .await
        .map_err(|e| PilotError::RactorError(format!("failed to spawn actor for {id}: {e}")))?;
    Ok(PluginHandle { id, actor })
}

//! The plugins. Each one owns its login flow, requests and parsing; they only
//! share the context handed to them by the runner.

pub mod invite_verify;
pub mod reward_claim;
pub mod signin;
pub mod totp;

use crate::config::{Config, JobSettings};
use crate::db::PluginData;
use crate::error::PilotError;
use crate::site::{SiteRegistry, SiteSession};
use crate::types::RunReport;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier, also the storage namespace.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    fn job(&self) -> &JobSettings;

    async fn run(&self, ctx: &PluginContext) -> Result<RunReport, PilotError>;
}

/// Everything a run may touch besides the network.
#[derive(Clone)]
pub struct PluginContext {
    pub data: PluginData,
    pub sites: Arc<SiteRegistry>,
    pub proxy: Option<Url>,
}

impl PluginContext {
    pub fn session(&self, site: &str, job: &JobSettings) -> Result<SiteSession, PilotError> {
        self.sites.session(site, job, self.proxy.as_ref())
    }

    pub fn session_for_url(&self, url: &Url, job: &JobSettings) -> Result<SiteSession, PilotError> {
        self.sites.session_for_url(url, job, self.proxy.as_ref())
    }
}

/// Instantiate every enabled plugin from configuration.
pub fn build_all(cfg: &Config) -> Vec<Arc<dyn Plugin>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();
    if let Some(c) = cfg.plugins.signin.clone().filter(|c| c.job.enabled) {
        plugins.push(Arc::new(signin::SignInPlugin::new(c)));
    }
    if let Some(c) = cfg.plugins.invite_verify.clone().filter(|c| c.job.enabled) {
        plugins.push(Arc::new(invite_verify::InviteVerifyPlugin::new(c)));
    }
    if let Some(c) = cfg.plugins.reward_claim.clone().filter(|c| c.job.enabled) {
        plugins.push(Arc::new(reward_claim::RewardClaimPlugin::new(c)));
    }
    if let Some(c) = cfg.plugins.totp.clone().filter(|c| c.job.enabled) {
        plugins.push(Arc::new(totp::TotpPlugin::new(c)));
    }
    plugins
}

/// Today's date in the form stored in sign-in and claim records.
pub(crate) fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

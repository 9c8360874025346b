//! Invite-review verification.
//!
//! Pulls pending invite applications from the site's invite-list API, reads
//! each applicant's profile page (often on another tracker), extracts
//! username / e-mail / level through fallback chains and records a verdict.

pub mod judge;
pub mod record;

use crate::config::JobSettings;
use crate::error::PilotError;
use crate::plugins::{Plugin, PluginContext};
use crate::site::SiteSession;
use crate::types::RunReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroU32;
use tracing::{debug, info, warn};

pub use judge::{
    ExtractionChains, JudgeRules, LevelRanking, NamedLevels, ProfileFacts, Verdict, judge,
    normalize_link,
};
pub use record::{InviteRecord, parse_invite_list};

pub const ID: &str = "invite_verify";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InviteVerifyConfig {
    pub job: JobSettings,
    /// Registry name of the site serving the invite list.
    pub site: String,
    pub list_path: String,
    /// `{id}` and `{action}` (`approve` / `reject`) are substituted.
    pub review_path: Option<String>,
    pub auto_review: bool,
    pub min_level: Option<String>,
    /// Level names, lowest first.
    pub level_ranking: Vec<String>,
    pub concurrency: usize,
    pub requests_per_minute: u32,
    pub chains: ExtractionChains,
}

impl Default for InviteVerifyConfig {
    fn default() -> Self {
        Self {
            job: JobSettings::default(),
            site: String::new(),
            list_path: "api/invite/pending".to_string(),
            review_path: None,
            auto_review: false,
            min_level: None,
            level_ranking: [
                "User",
                "Power User",
                "Elite User",
                "Crazy User",
                "Insane User",
                "Veteran User",
                "Extreme User",
                "Ultimate User",
                "Nexus Master",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            concurrency: 4,
            requests_per_minute: 30,
            chains: ExtractionChains::default(),
        }
    }
}

/// Everything known about one invite after a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteDetails {
    pub record: InviteRecord,
    pub facts: ProfileFacts,
    pub verdict: Verdict,
    pub checked_at: DateTime<Utc>,
}

/// Decided invites; never checked again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgedInvite {
    pub invitee: String,
    pub profile_url: String,
    pub verdict: Verdict,
    pub judged_at: DateTime<Utc>,
}

pub struct InviteVerifyPlugin {
    cfg: InviteVerifyConfig,
    ranking: NamedLevels,
}

impl InviteVerifyPlugin {
    pub fn new(cfg: InviteVerifyConfig) -> Self {
        let ranking = NamedLevels::new(cfg.level_ranking.clone());
        Self { cfg, ranking }
    }

    async fn fetch_profile(
        &self,
        ctx: &PluginContext,
        site: &SiteSession,
        record: &InviteRecord,
    ) -> Result<String, PilotError> {
        let url = site.url(&record.profile_url)?;
        let session = ctx.session_for_url(&url, &self.cfg.job)?;
        debug!(invite = %record.id, profile = %url, via = %session.name(), "fetching profile");
        session.get_text(url.as_str()).await
    }

    async fn submit_review(&self, site: &SiteSession, id: &str, verdict: &Verdict) -> Result<(), PilotError> {
        let Some(template) = self.cfg.review_path.as_deref() else {
            return Ok(());
        };
        let (action, reason) = match verdict {
            Verdict::Pass => ("approve", String::new()),
            Verdict::Fail { reasons } => ("reject", reasons.join("; ")),
            Verdict::Unverifiable { .. } => return Ok(()),
        };
        let path = template.replace("{id}", id).replace("{action}", action);
        site.post_form_text(&path, &[("reason".to_string(), reason)])
            .await?;
        info!(invite = id, action, "review submitted");
        Ok(())
    }
}

#[async_trait]
impl Plugin for InviteVerifyPlugin {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "Invite verification"
    }

    fn job(&self) -> &JobSettings {
        &self.cfg.job
    }

    async fn run(&self, ctx: &PluginContext) -> Result<RunReport, PilotError> {
        let site = ctx.session(&self.cfg.site, &self.cfg.job)?;
        let payload: Value = site.get_json(&self.cfg.list_path).await?;
        let records = parse_invite_list(&payload)?;

        let mut judged: BTreeMap<String, JudgedInvite> = ctx.data.load_or_default("judged").await?;
        let mut pending: BTreeMap<String, InviteDetails> = ctx.data.load_or_default("pending").await?;

        let listed: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        pending.retain(|id, _| listed.contains(id.as_str()));

        let fresh: Vec<InviteRecord> = records
            .iter()
            .filter(|r| !judged.contains_key(&r.id))
            .cloned()
            .collect();
        info!(
            listed = records.len(),
            fresh = fresh.len(),
            "invite list fetched"
        );

        let mut report = RunReport::new("Invite verification");
        if fresh.is_empty() {
            report.line("no new invites to verify");
            ctx.data.save("pending", &pending).await?;
            return Ok(report);
        }

        let rpm = NonZeroU32::new(self.cfg.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(rpm));
        let limiter = &limiter;
        let site_ref = &site;

        let mut fetched: Vec<(usize, InviteRecord, Result<String, PilotError>)> =
            stream::iter(fresh.into_iter().enumerate())
                .map(|(pos, record)| async move {
                    limiter.until_ready().await;
                    let page = self.fetch_profile(ctx, site_ref, &record).await;
                    (pos, record, page)
                })
                .buffer_unordered(self.cfg.concurrency.max(1))
                .collect()
                .await;
        // list order, so a shared profile passes the invite listed first
        fetched.sort_by_key(|(pos, ..)| *pos);

        let mut used_profiles: HashSet<String> = judged
            .values()
            .filter(|j| j.verdict == Verdict::Pass)
            .map(|j| normalize_link(&j.profile_url))
            .collect();

        for (_, record, page) in fetched {
            let (facts, verdict) = match page {
                Ok(html) => {
                    let facts = ProfileFacts::from_page(&html, &self.cfg.chains);
                    let rules = JudgeRules {
                        min_level: self.cfg.min_level.as_deref(),
                        ranking: &self.ranking,
                        used_profiles: &used_profiles,
                    };
                    let verdict = judge(&record, &facts, &rules);
                    (facts, verdict)
                }
                Err(e) => {
                    warn!(invite = %record.id, error = %e, "profile page unavailable");
                    (
                        ProfileFacts::default(),
                        Verdict::Unverifiable {
                            reason: format!("profile fetch failed: {e}"),
                        },
                    )
                }
            };

            report.line(format!(
                "#{} {} (invited by {}): {}",
                record.id,
                record.invitee,
                if record.inviter.is_empty() { "-" } else { record.inviter.as_str() },
                verdict.summary()
            ));

            if verdict == Verdict::Pass {
                used_profiles.insert(normalize_link(&record.profile_url));
            }
            if verdict.is_decided() {
                if self.cfg.auto_review
                    && let Err(e) = self.submit_review(&site, &record.id, &verdict).await
                {
                    warn!(invite = %record.id, error = %e, "review submission failed");
                    report.line(format!("#{}: review submission failed: {e}", record.id));
                }
                judged.insert(
                    record.id.clone(),
                    JudgedInvite {
                        invitee: record.invitee.clone(),
                        profile_url: record.profile_url.clone(),
                        verdict: verdict.clone(),
                        judged_at: Utc::now(),
                    },
                );
            }
            pending.insert(
                record.id.clone(),
                InviteDetails {
                    record,
                    facts,
                    verdict,
                    checked_at: Utc::now(),
                },
            );
        }

        ctx.data.save("pending", &pending).await?;
        ctx.data.save("judged", &judged).await?;
        Ok(report)
    }
}

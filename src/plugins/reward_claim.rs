//! Claim pending rewards listed on a site's rewards/credit page.

use crate::config::JobSettings;
use crate::db::store::push_capped;
use crate::error::PilotError;
use crate::plugins::{Plugin, PluginContext, today};
use crate::scrape::text::{contains_any_ci, strip_tags, truncate};
use crate::scrape::{Strategy, extract_all, extract_value};
use crate::types::RunReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const ID: &str = "reward_claim";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardClaimConfig {
    pub job: JobSettings,
    pub site: String,
    pub rewards_path: String,
    /// Yields every claim link on the rewards page.
    pub claim: Vec<Strategy>,
    pub credit: Vec<Strategy>,
    pub success_markers: Vec<String>,
    pub history_limit: usize,
}

impl Default for RewardClaimConfig {
    fn default() -> Self {
        Self {
            job: JobSettings::default(),
            site: String::new(),
            rewards_path: "mybonus.php".to_string(),
            claim: vec![
                Strategy::css_attr("a.claim", "href"),
                Strategy::css_attr("a[href*='claim']", "href"),
                Strategy::Regex {
                    pattern: r#"href="([^"]*(?:claim|receive|draw)[^"]*)""#.to_string(),
                    group: Some(1),
                },
            ],
            credit: vec![
                Strategy::css("#bonus"),
                Strategy::regex(r"(?i)(?:bonus|credit|魔力值|积分)\s*[:：]?\s*(?:<[^>]+>)*\s*([\d,]+(?:\.\d+)?)"),
            ],
            success_markers: vec![
                "success".to_string(),
                "成功".to_string(),
                "claimed".to_string(),
                "已领取".to_string(),
            ],
            history_limit: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClaimRecord {
    pub date: String,
    pub at: DateTime<Utc>,
    pub claimed: Vec<String>,
    pub failed: Vec<String>,
    pub credit_before: Option<String>,
    pub credit_after: Option<String>,
}

pub struct RewardClaimPlugin {
    cfg: RewardClaimConfig,
}

impl RewardClaimPlugin {
    pub fn new(cfg: RewardClaimConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for RewardClaimPlugin {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "Reward claim"
    }

    fn job(&self) -> &JobSettings {
        &self.cfg.job
    }

    async fn run(&self, ctx: &PluginContext) -> Result<RunReport, PilotError> {
        let session = ctx.session(&self.cfg.site, &self.cfg.job)?;

        let page = session.get_text(&self.cfg.rewards_path).await?;
        let credit_before = extract_value(&page, &self.cfg.credit);
        let links = extract_all(&page, &self.cfg.claim);
        info!(site = %session.name(), claimable = links.len(), "rewards page read");

        let mut claimed = Vec::new();
        let mut failed = Vec::new();
        for link in links {
            let link = crate::scrape::text::normalize_entities(&link);
            match session.get_text(&link).await {
                Ok(resp) if contains_any_ci(&resp, &self.cfg.success_markers) => {
                    claimed.push(link);
                }
                Ok(resp) => {
                    warn!(site = %session.name(), %link, "claim not confirmed");
                    failed.push(format!("{link}: {}", truncate(&strip_tags(&resp), 80)));
                }
                Err(e) => {
                    warn!(site = %session.name(), %link, error = %e, "claim request failed");
                    failed.push(format!("{link}: {e}"));
                }
            }
        }

        let credit_after = match session.get_text(&self.cfg.rewards_path).await {
            Ok(page) => extract_value(&page, &self.cfg.credit),
            Err(e) => {
                warn!(site = %session.name(), error = %e, "failed to re-read rewards page");
                None
            }
        };

        let mut report = RunReport::new("Reward claim");
        if claimed.is_empty() && failed.is_empty() {
            report.line("no rewards to claim");
        } else {
            report.line(format!("claimed {} reward(s)", claimed.len()));
        }
        for f in &failed {
            report.line(format!("failed: {f}"));
        }
        match (&credit_before, &credit_after) {
            (Some(before), Some(after)) if before != after => {
                report.line(format!("credit {before} -> {after}"));
            }
            (_, Some(after)) => {
                report.line(format!("credit {after}"));
            }
            _ => {}
        }

        let mut history: Vec<ClaimRecord> = ctx.data.load_or_default("history").await?;
        push_capped(
            &mut history,
            ClaimRecord {
                date: today(),
                at: Utc::now(),
                claimed,
                failed: failed.clone(),
                credit_before,
                credit_after,
            },
            self.cfg.history_limit,
        );
        ctx.data.save("history", &history).await?;

        if !failed.is_empty() && history[0].claimed.is_empty() {
            return Err(PilotError::UnexpectedResponse(format!(
                "no reward could be claimed: {}",
                failed.join("; ")
            )));
        }
        Ok(report)
    }
}

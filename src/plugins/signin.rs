//! Daily forum sign-in.
//!
//! Defaults target Discuz!-style forums (`formhash` tokens, `k_misign`
//! sign-in plugin); every path, marker and extraction chain is configurable.

use crate::config::{JobSettings, SiteConfig};
use crate::db::store::push_capped;
use crate::error::PilotError;
use crate::plugins::{Plugin, PluginContext, today};
use crate::scrape::text::{contains_any_ci, strip_tags, truncate};
use crate::scrape::{Strategy, extract_value};
use crate::site::SiteSession;
use crate::types::RunReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

pub const ID: &str = "signin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignInMethod {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignInConfig {
    pub job: JobSettings,
    /// Registry names of the sites to sign in to.
    pub sites: Vec<String>,
    pub login_page_path: String,
    pub login_path: String,
    pub signin_page_path: String,
    /// `{formhash}` is substituted.
    pub signin_path: String,
    pub signin_method: SignInMethod,
    /// Extra form fields for POST sign-ins; values may contain `{formhash}`.
    pub signin_form: BTreeMap<String, String>,
    pub credit_path: Option<String>,
    pub logged_in_markers: Vec<String>,
    pub login_failed_markers: Vec<String>,
    pub success_markers: Vec<String>,
    pub already_markers: Vec<String>,
    pub formhash: Vec<Strategy>,
    pub credit: Vec<Strategy>,
    pub history_limit: usize,
}

impl Default for SignInConfig {
    fn default() -> Self {
        Self {
            job: JobSettings::default(),
            sites: Vec::new(),
            login_page_path: "member.php?mod=logging&action=login".to_string(),
            login_path: "member.php?mod=logging&action=login&loginsubmit=yes&inajax=1".to_string(),
            signin_page_path: "plugin.php?id=k_misign:sign".to_string(),
            signin_path:
                "plugin.php?id=k_misign:sign&operation=qiandao&formhash={formhash}&format=empty&inajax=1"
                    .to_string(),
            signin_method: SignInMethod::Get,
            signin_form: BTreeMap::new(),
            credit_path: Some("home.php?mod=spacecp&ac=credit&showcredit=1".to_string()),
            logged_in_markers: vec!["action=logout".to_string(), "退出".to_string()],
            login_failed_markers: vec![
                "errorhandle_".to_string(),
                "密码错误".to_string(),
                "登录失败".to_string(),
                "invalid".to_string(),
            ],
            success_markers: vec!["签到成功".to_string(), "sign in success".to_string()],
            already_markers: vec![
                "已签到".to_string(),
                "今日已签".to_string(),
                "already signed".to_string(),
            ],
            formhash: vec![
                Strategy::css_attr("input[name=formhash]", "value"),
                Strategy::regex(r"formhash=([0-9a-zA-Z]{8})"),
                Strategy::between("name=\"formhash\" value=\"", "\""),
            ],
            credit: vec![
                Strategy::css("#extcreditmenu"),
                Strategy::regex(r"积分[:：]\s*</?\w*>?\s*(-?\d+)"),
                Strategy::between("积分: ", "<"),
            ],
            history_limit: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInStatus {
    Success,
    Already,
    Failed,
}

impl SignInStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "signed in",
            Self::Already => "already signed in",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SignInRecord {
    pub site: String,
    pub date: String,
    pub at: DateTime<Utc>,
    pub status: SignInStatus,
    pub message: String,
    pub credit: Option<String>,
}

pub struct SignInPlugin {
    cfg: SignInConfig,
}

impl SignInPlugin {
    pub fn new(cfg: SignInConfig) -> Self {
        Self { cfg }
    }

    fn logged_in(&self, page: &str) -> bool {
        contains_any_ci(page, &self.cfg.logged_in_markers)
    }

    async fn sign_site(&self, ctx: &PluginContext, site_name: &str) -> Result<SignInRecord, PilotError> {
        let site = ctx.sites.get(site_name)?;
        let session = ctx.session(site_name, &self.cfg.job)?;

        let mut page = session.get_text(&self.cfg.signin_page_path).await?;
        if !self.logged_in(&page) {
            if !site.has_login() {
                return Err(PilotError::LoginFailed {
                    site: site_name.to_string(),
                    reason: "session cookie rejected and no username/password configured"
                        .to_string(),
                });
            }
            self.login(&session, site).await?;
            page = session.get_text(&self.cfg.signin_page_path).await?;
            if !self.logged_in(&page) {
                return Err(PilotError::LoginFailed {
                    site: site_name.to_string(),
                    reason: "still logged out after submitting the login form".to_string(),
                });
            }
        }

        let (status, message) = if contains_any_ci(&page, &self.cfg.already_markers) {
            (SignInStatus::Already, "signed in earlier today".to_string())
        } else {
            self.submit_signin(&session, &page).await?
        };

        let credit = self.fetch_credit(&session).await;
        info!(site = site_name, status = status.label(), credit = ?credit, "sign-in finished");

        Ok(SignInRecord {
            site: site_name.to_string(),
            date: today(),
            at: Utc::now(),
            status,
            message,
            credit,
        })
    }

    async fn login(&self, session: &SiteSession, site: &SiteConfig) -> Result<(), PilotError> {
        let login_page = session.get_text(&self.cfg.login_page_path).await?;
        let formhash = extract_value(&login_page, &self.cfg.formhash).unwrap_or_default();

        let form = vec![
            ("formhash".to_string(), formhash),
            ("referer".to_string(), session.base().to_string()),
            ("loginfield".to_string(), "username".to_string()),
            ("username".to_string(), site.username.clone().unwrap_or_default()),
            ("password".to_string(), site.password.clone().unwrap_or_default()),
            ("questionid".to_string(), "0".to_string()),
            ("answer".to_string(), String::new()),
            ("cookietime".to_string(), "2592000".to_string()),
        ];
        let resp = session.post_form_text(&self.cfg.login_path, &form).await?;
        if contains_any_ci(&resp, &self.cfg.login_failed_markers) {
            return Err(PilotError::LoginFailed {
                site: session.name().to_string(),
                reason: truncate(&strip_tags(&resp), 120),
            });
        }
        info!(site = %session.name(), "login form accepted");
        Ok(())
    }

    async fn submit_signin(
        &self,
        session: &SiteSession,
        page: &str,
    ) -> Result<(SignInStatus, String), PilotError> {
        let formhash = extract_value(page, &self.cfg.formhash)
            .ok_or_else(|| PilotError::Extraction("formhash".to_string()))?;
        let path = self.cfg.signin_path.replace("{formhash}", &formhash);

        let resp = match self.cfg.signin_method {
            SignInMethod::Get => session.get_text(&path).await?,
            SignInMethod::Post => {
                let form: Vec<(String, String)> = self
                    .cfg
                    .signin_form
                    .iter()
                    .map(|(k, v)| (k.clone(), v.replace("{formhash}", &formhash)))
                    .collect();
                session.post_form_text(&path, &form).await?
            }
        };

        let text = truncate(&strip_tags(&resp), 120);
        if contains_any_ci(&resp, &self.cfg.success_markers) {
            return Ok((SignInStatus::Success, text));
        }
        if contains_any_ci(&resp, &self.cfg.already_markers) {
            return Ok((SignInStatus::Already, text));
        }

        // Some sign-in endpoints answer with an empty body; the page tells the truth.
        let after = session.get_text(&self.cfg.signin_page_path).await?;
        if contains_any_ci(&after, &self.cfg.already_markers) {
            return Ok((SignInStatus::Success, "signed in".to_string()));
        }
        Ok((
            SignInStatus::Failed,
            if text.is_empty() {
                "sign-in endpoint returned no confirmation".to_string()
            } else {
                text
            },
        ))
    }

    async fn fetch_credit(&self, session: &SiteSession) -> Option<String> {
        let path = self.cfg.credit_path.as_deref()?;
        match session.get_text(path).await {
            Ok(page) => extract_value(&page, &self.cfg.credit),
            Err(e) => {
                warn!(site = %session.name(), error = %e, "failed to read credit page");
                None
            }
        }
    }
}

#[async_trait]
impl Plugin for SignInPlugin {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "Forum sign-in"
    }

    fn job(&self) -> &JobSettings {
        &self.cfg.job
    }

    async fn run(&self, ctx: &PluginContext) -> Result<RunReport, PilotError> {
        let mut history: Vec<SignInRecord> = ctx.data.load_or_default("history").await?;
        let mut last: HashMap<String, SignInRecord> = ctx.data.load_or_default("last").await?;
        let mut report = RunReport::new("Forum sign-in");
        let mut failed = 0usize;

        for site in &self.cfg.sites {
            let record = match self.sign_site(ctx, site).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(site = %site, error = %e, "sign-in failed");
                    SignInRecord {
                        site: site.clone(),
                        date: today(),
                        at: Utc::now(),
                        status: SignInStatus::Failed,
                        message: e.to_string(),
                        credit: None,
                    }
                }
            };

            let mut line = format!("{}: {}", record.site, record.status.label());
            if record.status == SignInStatus::Failed {
                failed += 1;
                line.push_str(&format!(" ({})", record.message));
            }
            if let Some(credit) = &record.credit {
                line.push_str(&format!(", credit {credit}"));
            }
            report.line(line);

            last.insert(record.site.clone(), record.clone());
            push_capped(&mut history, record, self.cfg.history_limit);
        }

        ctx.data.save("history", &history).await?;
        ctx.data.save("last", &last).await?;

        if !self.cfg.sites.is_empty() && failed == self.cfg.sites.len() {
            return Err(PilotError::UnexpectedResponse(format!(
                "sign-in failed on every site: {}",
                report.body()
            )));
        }
        Ok(report)
    }
}

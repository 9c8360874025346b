use crate::error::PilotError;
use crate::plugins::invite_verify::InviteVerifyConfig;
use crate::plugins::reward_claim::RewardClaimConfig;
use crate::plugins::signin::SignInConfig;
use crate::plugins::totp::TotpConfig;
use crate::service::scheduler::parse_cron;
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "forum-pilot.toml";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub notify: NotifyConfig,
    pub sites: BTreeMap<String, SiteConfig>,
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub api_key: String,
    pub loglevel: String,
    pub database_url: String,
    pub proxy: Option<Url>,
    pub timezone: String,
    pub shutdown_grace_secs: u64,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8010".to_string(),
            api_key: String::new(),
            loglevel: "info".to_string(),
            database_url: "sqlite://forum-pilot.sqlite".to_string(),
            proxy: None,
            timezone: "UTC".to_string(),
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<Url>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// One entry of the site-credential registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: Option<Url>,
    pub cookie: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            cookie: None,
            username: None,
            password: None,
            user_agent: None,
            timeout_secs: 20,
        }
    }
}

impl SiteConfig {
    pub fn has_login(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_cookie(&self) -> bool {
        self.cookie.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Scheduling, retry and notification settings every plugin carries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct JobSettings {
    pub enabled: bool,
    pub cron: Option<String>,
    pub interval_secs: Option<u64>,
    pub run_on_start: bool,
    pub retry_times: usize,
    pub retry_interval_secs: u64,
    pub notify: bool,
    pub use_proxy: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: None,
            interval_secs: None,
            run_on_start: false,
            retry_times: 3,
            retry_interval_secs: 5,
            notify: true,
            use_proxy: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub signin: Option<SignInConfig>,
    pub invite_verify: Option<InviteVerifyConfig>,
    pub reward_claim: Option<RewardClaimConfig>,
    pub totp: Option<TotpConfig>,
}

impl Config {
    /// Layer `forum-pilot.toml` (or `path`) and `PILOT_*` env vars over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, PilotError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PILOT_CONFIG").map(Into::into))
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());

        let cfg: Config = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PILOT_").split("__"))
            .extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, PilotError> {
        let cfg: Config = Figment::new().merge(Toml::string(raw)).extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn timezone(&self) -> Result<Tz, PilotError> {
        self.basic
            .timezone
            .parse::<Tz>()
            .map_err(|e| PilotError::Config(format!("unknown timezone `{}`: {e}", self.basic.timezone)))
    }

    /// Check cross references the type system cannot: site names, cron syntax, timezone.
    pub fn validate(&self) -> Result<(), PilotError> {
        self.timezone()?;

        for (name, site) in &self.sites {
            if site.base_url.is_none() {
                return Err(PilotError::Config(format!("site `{name}` has no base_url")));
            }
        }

        for (id, job, sites) in self.plugin_site_refs() {
            if !job.enabled {
                continue;
            }
            if let Some(expr) = job.cron.as_deref() {
                parse_cron(expr)?;
            }
            if job.interval_secs == Some(0) {
                return Err(PilotError::Config(format!(
                    "plugin `{id}`: interval_secs must be positive"
                )));
            }
            for site in sites {
                if !self.sites.contains_key(site) {
                    return Err(PilotError::Config(format!(
                        "plugin `{id}` references unknown site `{site}`"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Extra checks for `serve`: the HTTP API needs a key.
    pub fn validate_serve(&self) -> Result<(), PilotError> {
        if self.basic.api_key.trim().is_empty() {
            return Err(PilotError::Config(
                "basic.api_key must be set to serve the HTTP API".to_string(),
            ));
        }
        Ok(())
    }

    fn plugin_site_refs(&self) -> Vec<(&'static str, &JobSettings, Vec<&String>)> {
        let mut refs = Vec::new();
        if let Some(p) = &self.plugins.signin {
            refs.push(("signin", &p.job, p.sites.iter().collect()));
        }
        if let Some(p) = &self.plugins.invite_verify {
            refs.push(("invite_verify", &p.job, vec![&p.site]));
        }
        if let Some(p) = &self.plugins.reward_claim {
            refs.push(("reward_claim", &p.job, vec![&p.site]));
        }
        if let Some(p) = &self.plugins.totp {
            refs.push(("totp", &p.job, Vec::new()));
        }
        refs
    }
}

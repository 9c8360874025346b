//! TOTP code keeper.
//!
//! Secrets come from configuration (inline or `otpauth://` URIs), from a
//! directory of JSON files and from the HTTP API. A run merges them into the
//! stored list and refreshes the stored `codes`.

pub mod loader;
pub mod otp;

use crate::config::JobSettings;
use crate::db::PluginData;
use crate::error::PilotError;
use crate::plugins::{Plugin, PluginContext};
use crate::types::RunReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

pub use otp::{Algorithm, TotpSecret};

pub const ID: &str = "totp";
pub const SECRETS_KEY: &str = "secrets";
pub const CODES_KEY: &str = "codes";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TotpConfig {
    pub job: JobSettings,
    pub secrets: Vec<TotpSecret>,
    pub otpauth_uris: Vec<String>,
    pub secrets_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpCode {
    pub issuer: String,
    pub account: String,
    pub code: String,
    /// Seconds left in the current period.
    pub remaining: u64,
    pub period: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSheet {
    pub generated_at: DateTime<Utc>,
    pub codes: Vec<TotpCode>,
}

/// Codes for every secret at `unix_secs`; secrets that fail to produce a code
/// are logged and left out.
pub fn codes_at(secrets: &[TotpSecret], unix_secs: u64) -> Vec<TotpCode> {
    secrets
        .iter()
        .filter_map(|s| match s.code_at(unix_secs) {
            Ok(code) => Some(TotpCode {
                issuer: s.issuer.clone(),
                account: s.account.clone(),
                code,
                remaining: s.remaining_at(unix_secs),
                period: s.period,
            }),
            Err(e) => {
                warn!(secret = %s.label(), error = %e, "cannot compute code");
                None
            }
        })
        .collect()
}

pub fn current_codes(secrets: &[TotpSecret]) -> CodeSheet {
    let now = Utc::now();
    CodeSheet {
        generated_at: now,
        codes: codes_at(secrets, now.timestamp().max(0) as u64),
    }
}

/// Merge `incoming` into `stored`: same issuer+account replaces in place,
/// new ones are appended, stored-only entries stay.
pub fn merge_secrets(stored: &mut Vec<TotpSecret>, incoming: Vec<TotpSecret>) -> usize {
    let mut added = 0;
    for secret in incoming {
        match stored.iter_mut().find(|s| s.key() == secret.key()) {
            Some(existing) => *existing = secret,
            None => {
                stored.push(secret);
                added += 1;
            }
        }
    }
    added
}

pub async fn stored_secrets(data: &PluginData) -> Result<Vec<TotpSecret>, PilotError> {
    data.load_or_default(SECRETS_KEY).await
}

/// Validate and store a complete secret list, replacing the previous one.
pub async fn replace_secrets(
    data: &PluginData,
    secrets: Vec<TotpSecret>,
) -> Result<Vec<TotpSecret>, PilotError> {
    for s in &secrets {
        s.validate()?;
    }
    let mut deduped = Vec::with_capacity(secrets.len());
    merge_secrets(&mut deduped, secrets);
    data.save(SECRETS_KEY, &deduped).await?;
    Ok(deduped)
}

pub struct TotpPlugin {
    cfg: TotpConfig,
}

impl TotpPlugin {
    pub fn new(cfg: TotpConfig) -> Self {
        Self { cfg }
    }

    pub fn configured_secrets(&self) -> Result<Vec<TotpSecret>, PilotError> {
        let mut secrets = Vec::new();
        for s in &self.cfg.secrets {
            s.validate()?;
            secrets.push(s.clone());
        }
        for uri in &self.cfg.otpauth_uris {
            secrets.push(TotpSecret::from_uri(uri)?);
        }
        if let Some(dir) = &self.cfg.secrets_dir {
            secrets.extend(loader::load_from_dir(dir)?);
        }
        Ok(secrets)
    }
}

#[async_trait]
impl Plugin for TotpPlugin {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        "TOTP codes"
    }

    fn job(&self) -> &JobSettings {
        &self.cfg.job
    }

    async fn run(&self, ctx: &PluginContext) -> Result<RunReport, PilotError> {
        let mut stored = stored_secrets(&ctx.data).await?;
        let added = merge_secrets(&mut stored, self.configured_secrets()?);
        ctx.data.save(SECRETS_KEY, &stored).await?;

        let sheet = current_codes(&stored);
        ctx.data.save(CODES_KEY, &sheet).await?;
        info!(secrets = stored.len(), added, "totp codes refreshed");

        let mut report = RunReport::new("TOTP codes");
        if stored.is_empty() {
            report.line("no secrets configured");
        }
        for c in &sheet.codes {
            let label = if c.issuer.is_empty() {
                c.account.clone()
            } else {
                format!("{}:{}", c.issuer, c.account)
            };
            report.line(format!("{label} {} ({}s left)", c.code, c.remaining));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryKvStore, PluginData};
    use crate::site::SiteRegistry;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn ctx() -> PluginContext {
        PluginContext {
            data: PluginData::new(Arc::new(MemoryKvStore::new()), ID),
            sites: Arc::new(SiteRegistry::new(BTreeMap::new())),
            proxy: None,
        }
    }

    #[test]
    fn merge_replaces_by_issuer_and_account() {
        let mut stored = vec![
            TotpSecret::new("One", "alice", SEED),
            TotpSecret::new("Api", "zed", SEED),
        ];
        let mut updated = TotpSecret::new("ONE", "Alice", SEED);
        updated.digits = 8;
        let added = merge_secrets(
            &mut stored,
            vec![updated, TotpSecret::new("Two", "bob", SEED)],
        );
        assert_eq!(added, 1);
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].digits, 8);
        assert_eq!(stored[1].account, "zed");
    }

    #[test]
    fn codes_at_fixed_time() {
        let codes = codes_at(&[TotpSecret::new("RFC", "6238", SEED)], 59);
        assert_eq!(codes[0].code, "287082");
        assert_eq!(codes[0].remaining, 1);
    }

    #[tokio::test]
    async fn run_keeps_api_added_secrets_and_stores_codes() {
        let ctx = ctx();
        replace_secrets(&ctx.data, vec![TotpSecret::new("Api", "zed", SEED)])
            .await
            .unwrap();

        let plugin = TotpPlugin::new(TotpConfig {
            secrets: vec![TotpSecret::new("One", "alice", SEED)],
            otpauth_uris: vec![format!("otpauth://totp/Two:bob?secret={SEED}")],
            ..TotpConfig::default()
        });
        let report = plugin.run(&ctx).await.unwrap();
        assert_eq!(report.lines.len(), 3);

        let stored = stored_secrets(&ctx.data).await.unwrap();
        let accounts: Vec<_> = stored.iter().map(|s| s.account.as_str()).collect();
        assert_eq!(accounts, vec!["zed", "alice", "bob"]);

        let sheet: CodeSheet = ctx.data.load(CODES_KEY).await.unwrap().unwrap();
        assert_eq!(sheet.codes.len(), 3);
        assert!(sheet.codes.iter().all(|c| c.code.len() == 6));
    }

    #[tokio::test]
    async fn replace_rejects_invalid_secret() {
        let ctx = ctx();
        let err = replace_secrets(&ctx.data, vec![TotpSecret::new("x", "y", "@@@")])
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::InvalidSecret(_)));
        assert!(stored_secrets(&ctx.data).await.unwrap().is_empty());
    }
}

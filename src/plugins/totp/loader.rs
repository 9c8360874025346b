use super::otp::TotpSecret;
use crate::error::PilotError;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::{info, warn};

/// A secrets file holds either one secret or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum SecretFile {
    One(TotpSecret),
    Many(Vec<TotpSecret>),
}

/// Load every `*.json` secrets file in `dir`. Unreadable or invalid files are
/// logged and skipped.
pub fn load_from_dir(dir: &Path) -> Result<Vec<TotpSecret>, PilotError> {
    if !dir.exists() {
        info!(path = %dir.display(), "secrets directory not found; skipping load");
        return Ok(Vec::new());
    }

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                let err: PilotError = e.into();
                warn!(error = %err, "failed to read secrets dir entry");
                None
            }
        })
        .filter(|path| is_json_file(path))
        .collect();
    paths.sort();

    let loaded = paths
        .iter()
        .filter_map(|path| {
            load_file(path)
                .inspect_err(|e| {
                    warn!(path = %path.display(), error = %e, "failed to load secrets file");
                })
                .ok()
        })
        .flatten()
        .collect();

    Ok(loaded)
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        == Some(true)
}

fn load_file(path: &Path) -> Result<Vec<TotpSecret>, PilotError> {
    let contents = fs::read_to_string(path)?;
    let secrets = match serde_json::from_str::<SecretFile>(&contents)? {
        SecretFile::One(s) => vec![s],
        SecretFile::Many(list) => list,
    };
    for s in &secrets {
        s.validate()?;
    }
    Ok(secrets)
}

use crate::error::PilotError;
use data_encoding::BASE32_NOPAD;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl std::str::FromStr for Algorithm {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA512" => Ok(Self::Sha512),
            other => Err(PilotError::InvalidSecret(format!("unsupported algorithm `{other}`"))),
        }
    }
}

fn default_digits() -> u32 {
    6
}

fn default_period() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpSecret {
    #[serde(default)]
    pub issuer: String,
    pub account: String,
    /// Base32, spaces and padding tolerated.
    pub secret: String,
    #[serde(default = "default_digits")]
    pub digits: u32,
    #[serde(default = "default_period")]
    pub period: u64,
    #[serde(default)]
    pub algorithm: Algorithm,
}

impl TotpSecret {
    pub fn new(issuer: &str, account: &str, secret: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            account: account.to_string(),
            secret: secret.to_string(),
            digits: default_digits(),
            period: default_period(),
            algorithm: Algorithm::Sha1,
        }
    }

    /// Identity used to merge secret lists.
    pub fn key(&self) -> (String, String) {
        (self.issuer.to_lowercase(), self.account.to_lowercase())
    }

    pub fn label(&self) -> String {
        if self.issuer.is_empty() {
            self.account.clone()
        } else {
            format!("{}:{}", self.issuer, self.account)
        }
    }

    pub fn key_bytes(&self) -> Result<Vec<u8>, PilotError> {
        let cleaned: String = self
            .secret
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if cleaned.is_empty() {
            return Err(PilotError::InvalidSecret(format!("{}: empty secret", self.label())));
        }
        BASE32_NOPAD
            .decode(cleaned.as_bytes())
            .map_err(|e| PilotError::InvalidSecret(format!("{}: {e}", self.label())))
    }

    pub fn validate(&self) -> Result<(), PilotError> {
        if self.account.trim().is_empty() {
            return Err(PilotError::InvalidSecret("account must not be empty".to_string()));
        }
        if !(6..=8).contains(&self.digits) {
            return Err(PilotError::InvalidSecret(format!(
                "{}: digits must be between 6 and 8",
                self.label()
            )));
        }
        if self.period == 0 {
            return Err(PilotError::InvalidSecret(format!(
                "{}: period must be positive",
                self.label()
            )));
        }
        self.key_bytes().map(|_| ())
    }

    /// Code for the period containing `unix_secs`.
    pub fn code_at(&self, unix_secs: u64) -> Result<String, PilotError> {
        let key = self.key_bytes()?;
        let counter = unix_secs / self.period.max(1);
        hotp(&key, counter, self.digits, self.algorithm)
    }

    pub fn remaining_at(&self, unix_secs: u64) -> u64 {
        let period = self.period.max(1);
        period - unix_secs % period
    }

    /// Parse an `otpauth://totp/Issuer:account?secret=...` URI.
    pub fn from_uri(uri: &str) -> Result<Self, PilotError> {
        let url = Url::parse(uri.trim())
            .map_err(|e| PilotError::InvalidSecret(format!("bad otpauth uri: {e}")))?;
        if url.scheme() != "otpauth" || url.host_str() != Some("totp") {
            return Err(PilotError::InvalidSecret(format!(
                "not an otpauth totp uri: {uri}"
            )));
        }

        let label = urlencoding::decode(url.path().trim_start_matches('/'))
            .map_err(|e| PilotError::InvalidSecret(format!("bad label encoding: {e}")))?
            .into_owned();
        let (label_issuer, account) = match label.split_once(':') {
            Some((i, a)) => (i.trim().to_string(), a.trim().to_string()),
            None => (String::new(), label.trim().to_string()),
        };

        let mut parsed = Self::new(&label_issuer, &account, "");
        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "secret" => parsed.secret = v.into_owned(),
                "issuer" => parsed.issuer = v.into_owned(),
                "digits" => {
                    parsed.digits = v
                        .parse()
                        .map_err(|_| PilotError::InvalidSecret(format!("bad digits `{v}`")))?
                }
                "period" => {
                    parsed.period = v
                        .parse()
                        .map_err(|_| PilotError::InvalidSecret(format!("bad period `{v}`")))?
                }
                "algorithm" => parsed.algorithm = v.parse()?,
                _ => {}
            }
        }
        parsed.validate()?;
        Ok(parsed)
    }
}

fn mac_bytes<M: Mac + KeyInit>(key: &[u8], msg: &[u8]) -> Result<Vec<u8>, PilotError> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|e| PilotError::InvalidSecret(format!("hmac key: {e}")))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hmac_digest(key: &[u8], msg: &[u8], algorithm: Algorithm) -> Result<Vec<u8>, PilotError> {
    match algorithm {
        Algorithm::Sha1 => mac_bytes::<Hmac<Sha1>>(key, msg),
        Algorithm::Sha256 => mac_bytes::<Hmac<Sha256>>(key, msg),
        Algorithm::Sha512 => mac_bytes::<Hmac<Sha512>>(key, msg),
    }
}

/// RFC 4226 HOTP with dynamic truncation.
pub fn hotp(
    key: &[u8],
    counter: u64,
    digits: u32,
    algorithm: Algorithm,
) -> Result<String, PilotError> {
    let digest = hmac_digest(key, &counter.to_be_bytes(), algorithm)?;
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((u32::from(digest[offset]) & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);
    let code = binary % 10u32.pow(digits);
    Ok(format!("{:0width$}", code, width = digits as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B seeds, base32 encoded.
    const SHA1_SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn rfc_secret(digits: u32) -> TotpSecret {
        TotpSecret {
            digits,
            ..TotpSecret::new("RFC", "6238", SHA1_SEED)
        }
    }

    #[test]
    fn rfc6238_sha1_vectors() {
        let s = rfc_secret(8);
        assert_eq!(s.code_at(59).unwrap(), "94287082");
        assert_eq!(s.code_at(1_111_111_109).unwrap(), "07081804");
        assert_eq!(s.code_at(1_234_567_890).unwrap(), "89005924");
        assert_eq!(s.code_at(2_000_000_000).unwrap(), "69279037");
    }

    #[test]
    fn rfc6238_sha256_vector() {
        let seed = data_encoding::BASE32_NOPAD.encode(b"12345678901234567890123456789012");
        let s = TotpSecret {
            digits: 8,
            algorithm: Algorithm::Sha256,
            ..TotpSecret::new("RFC", "6238", &seed)
        };
        assert_eq!(s.code_at(59).unwrap(), "46119246");
    }

    #[test]
    fn six_digit_codes_are_zero_padded_truncations() {
        let s = rfc_secret(6);
        assert_eq!(s.code_at(59).unwrap(), "287082");
        assert_eq!(s.code_at(1_111_111_109).unwrap(), "081804");
        assert_eq!(s.remaining_at(59), 1);
        assert_eq!(s.remaining_at(60), 30);
    }

    #[test]
    fn tolerant_secret_formatting() {
        let spaced = TotpSecret::new("x", "y", "gezd gnbv gy3t qojq gezd gnbv gy3t qojq====");
        assert_eq!(spaced.key_bytes().unwrap(), b"12345678901234567890".to_vec());
        assert!(TotpSecret::new("x", "y", "not base32!").validate().is_err());
        assert!(TotpSecret::new("x", "y", "").validate().is_err());
    }

    #[test]
    fn parses_otpauth_uri() {
        let s = TotpSecret::from_uri(
            "otpauth://totp/Tracker%20One:alice%40example.org?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ&issuer=Tracker%20One&digits=8&period=60&algorithm=SHA256",
        )
        .unwrap();
        assert_eq!(s.issuer, "Tracker One");
        assert_eq!(s.account, "alice@example.org");
        assert_eq!(s.digits, 8);
        assert_eq!(s.period, 60);
        assert_eq!(s.algorithm, Algorithm::Sha256);
    }

    #[test]
    fn rejects_hotp_and_bad_params() {
        assert!(TotpSecret::from_uri("otpauth://hotp/x:y?secret=GEZDGNBV").is_err());
        assert!(
            TotpSecret::from_uri("otpauth://totp/x:y?secret=GEZDGNBVGY3TQOJQ&digits=12").is_err()
        );
        assert!(
            TotpSecret::from_uri("otpauth://totp/x:y?secret=GEZDGNBVGY3TQOJQ&algorithm=MD5")
                .is_err()
        );
    }
}

use crate::error::PilotError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One pending invite application as returned by the invite-list API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRecord {
    pub id: String,
    pub inviter: String,
    pub invitee: String,
    pub email: Option<String>,
    pub profile_url: String,
    /// Username the invitee claims on the profile site, when it differs from `invitee`.
    pub profile_username: Option<String>,
}

impl InviteRecord {
    pub fn expected_username(&self) -> &str {
        self.profile_username.as_deref().unwrap_or(&self.invitee)
    }
}

const ID_KEYS: &[&str] = &["id", "invite_id", "inviteId", "uid"];
const INVITER_KEYS: &[&str] = &["inviter", "inviter_name", "inviterName", "from"];
const INVITEE_KEYS: &[&str] = &["invitee", "username", "name", "invitee_name"];
const EMAIL_KEYS: &[&str] = &["email", "invitee_email", "mail"];
const LINK_KEYS: &[&str] = &["profile_url", "profileUrl", "link", "url", "proof"];
const PROFILE_NAME_KEYS: &[&str] = &["profile_username", "profileUsername", "site_username"];

/// Normalise the invite-list payload.
///
/// Accepts a bare array, `{data: [...]}`, `{data: {list: [...]}}`,
/// `{rows: [...]}` or `{list: [...]}`. Entries missing an id, invitee or
/// profile link are skipped.
pub fn parse_invite_list(payload: &Value) -> Result<Vec<InviteRecord>, PilotError> {
    let items = list_of(payload).ok_or_else(|| {
        PilotError::UnexpectedResponse("invite list payload has no recognisable array".to_string())
    })?;
    Ok(items.iter().filter_map(record_from).collect())
}

fn list_of(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(arr) = payload.as_array() {
        return Some(arr);
    }
    for key in ["data", "rows", "list", "items"] {
        match payload.get(key) {
            Some(Value::Array(arr)) => return Some(arr),
            Some(inner @ Value::Object(_)) => {
                if let Some(arr) = list_of(inner) {
                    return Some(arr);
                }
            }
            _ => {}
        }
    }
    None
}

fn field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match item.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn record_from(item: &Value) -> Option<InviteRecord> {
    Some(InviteRecord {
        id: field(item, ID_KEYS)?,
        inviter: field(item, INVITER_KEYS).unwrap_or_default(),
        invitee: field(item, INVITEE_KEYS)?,
        email: field(item, EMAIL_KEYS),
        profile_url: field(item, LINK_KEYS)?,
        profile_username: field(item, PROFILE_NAME_KEYS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_list_with_aliases() {
        let payload = json!({
            "code": 0,
            "data": {
                "list": [
                    {"id": 12, "inviter_name": "bob", "username": "carol",
                     "mail": "carol@example.org", "link": "https://t.example/u/5"},
                    {"id": "13", "inviter": "bob", "invitee": "dave"}
                ]
            }
        });
        let records = parse_invite_list(&payload).unwrap();
        assert_eq!(records.len(), 1, "entry without a profile link is skipped");
        let r = &records[0];
        assert_eq!(r.id, "12");
        assert_eq!(r.inviter, "bob");
        assert_eq!(r.invitee, "carol");
        assert_eq!(r.email.as_deref(), Some("carol@example.org"));
        assert_eq!(r.expected_username(), "carol");
    }

    #[test]
    fn bare_array_and_profile_username() {
        let payload = json!([
            {"id": 1, "invitee": "erin", "profile_username": "Erin_T",
             "url": "https://t.example/u/1"}
        ]);
        let records = parse_invite_list(&payload).unwrap();
        assert_eq!(records[0].expected_username(), "Erin_T");
        assert_eq!(records[0].inviter, "");
    }

    #[test]
    fn rejects_payload_without_list() {
        assert!(parse_invite_list(&json!({"msg": "not logged in"})).is_err());
    }
}

use super::record::InviteRecord;
use crate::scrape::{Extracted, Strategy, extract};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").expect("static regex"));

/// What could be read off a profile page, and how.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFacts {
    pub username: Option<Extracted>,
    pub email: Option<Extracted>,
    pub level: Option<Extracted>,
}

impl ProfileFacts {
    pub fn from_page(html: &str, chains: &ExtractionChains) -> Self {
        Self {
            username: extract(html, &chains.username),
            email: extract(html, &chains.email),
            level: extract(html, &chains.level),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionChains {
    pub username: Vec<Strategy>,
    pub email: Vec<Strategy>,
    pub level: Vec<Strategy>,
}

impl Default for ExtractionChains {
    fn default() -> Self {
        Self {
            username: vec![
                Strategy::css("#outer h1 b"),
                Strategy::css(".username"),
                Strategy::css("h1"),
                Strategy::regex(r"(?i)user(?:name)?\s*[:：]\s*(?:<[^>]+>)*\s*([^<\s]+)"),
                Strategy::between("<title>", "</title>"),
            ],
            email: vec![
                Strategy::css("a[href^='mailto:']"),
                Strategy::css(".email"),
                Strategy::regex(r"[A-Za-z0-9._%+*\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}"),
            ],
            level: vec![
                Strategy::css_attr("img[class$='_Name']", "title"),
                Strategy::css(".level"),
                Strategy::regex(r"(?i)(?:class|level|等级)\s*[:：]\s*(?:<[^>]+>)*\s*([^<\n]+)"),
                Strategy::between("等级", "<"),
            ],
        }
    }
}

/// Orders level names; the position in the list is the rank, lowest first.
pub trait LevelRanking: Send + Sync {
    fn rank(&self, level: &str) -> Option<usize>;
}

pub struct NamedLevels {
    levels: Vec<String>,
}

impl NamedLevels {
    pub fn new(levels: Vec<String>) -> Self {
        Self {
            levels: levels.into_iter().map(|l| l.to_lowercase()).collect(),
        }
    }
}

impl LevelRanking for NamedLevels {
    /// Exact match first, then the longest configured name contained in `level`.
    fn rank(&self, level: &str) -> Option<usize> {
        let level = level.trim().to_lowercase();
        if let Some(pos) = self.levels.iter().position(|l| *l == level) {
            return Some(pos);
        }
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_empty() && level.contains(l.as_str()))
            .max_by_key(|(_, l)| l.len())
            .map(|(pos, _)| pos)
    }
}

fn leading_number(s: &str) -> Option<i64> {
    NUMBER.find(s)?.as_str().parse().ok()
}

/// Compare an extracted level against the required minimum.
pub fn compare_level(found: &str, min: &str, ranking: &dyn LevelRanking) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (leading_number(found), leading_number(min)) {
        return Some(a.cmp(&b));
    }
    Some(ranking.rank(found)?.cmp(&ranking.rank(min)?))
}

/// Case-insensitive match that tolerates masked profile e-mails (`a***@x.com`).
pub fn emails_match(claimed: &str, shown: &str) -> bool {
    let claimed = claimed.trim().to_lowercase();
    let shown = shown.trim().to_lowercase();
    if claimed == shown {
        return true;
    }
    let (Some((c_local, c_domain)), Some((s_local, s_domain))) =
        (claimed.split_once('@'), shown.split_once('@'))
    else {
        return false;
    };
    if !s_local.contains('*') || c_domain != s_domain {
        return false;
    }
    let visible: String = s_local.chars().take_while(|c| *c != '*').collect();
    !visible.is_empty() && c_local.starts_with(&visible)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { reasons: Vec<String> },
    /// Nothing to decide on yet; the invite is retried on the next run.
    Unverifiable { reason: String },
}

impl Verdict {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Unverifiable { .. })
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Pass => "pass".to_string(),
            Self::Fail { reasons } => format!("fail ({})", reasons.join(", ")),
            Self::Unverifiable { reason } => format!("unverifiable ({reason})"),
        }
    }
}

pub struct JudgeRules<'a> {
    pub min_level: Option<&'a str>,
    pub ranking: &'a dyn LevelRanking,
    /// Profile links already backing a passing verdict.
    pub used_profiles: &'a HashSet<String>,
}

pub fn judge(record: &InviteRecord, facts: &ProfileFacts, rules: &JudgeRules<'_>) -> Verdict {
    let Some(username) = facts.username.as_ref() else {
        return Verdict::Unverifiable {
            reason: "username not found on profile page".to_string(),
        };
    };

    let mut reasons = Vec::new();

    if !record.inviter.is_empty() && record.inviter.eq_ignore_ascii_case(&record.invitee) {
        reasons.push("self-invite".to_string());
    }

    if rules.used_profiles.contains(&normalize_link(&record.profile_url)) {
        reasons.push("duplicate profile".to_string());
    }

    if !username
        .value
        .trim()
        .eq_ignore_ascii_case(record.expected_username().trim())
    {
        reasons.push(format!(
            "username mismatch: profile shows `{}`, expected `{}`",
            username.value,
            record.expected_username()
        ));
    }

    if let (Some(claimed), Some(shown)) = (record.email.as_deref(), facts.email.as_ref())
        && !emails_match(claimed, &shown.value)
    {
        reasons.push("email mismatch".to_string());
    }

    if let Some(min) = rules.min_level {
        match facts.level.as_ref() {
            None => reasons.push("level unknown".to_string()),
            Some(level) => match compare_level(&level.value, min, rules.ranking) {
                Some(Ordering::Less) => {
                    reasons.push(format!("level too low: `{}` < `{min}`", level.value))
                }
                Some(_) => {}
                None => reasons.push(format!("level unknown: `{}`", level.value)),
            },
        }
    }

    if reasons.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail { reasons }
    }
}

/// Canonical form used to spot the same profile submitted twice.
pub fn normalize_link(link: &str) -> String {
    link.trim()
        .trim_end_matches('/')
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .to_lowercase()
}

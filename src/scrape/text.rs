pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii() {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}

/// Case-insensitive slice between `start` and the next `end` after it.
///
/// Lowercasing keeps byte offsets stable because only ASCII is folded.
pub fn slice_between_ci<'a>(s: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let lc = to_lower(s);
    let from = lc.find(&to_lower(start))? + start.len();
    let len = lc[from..].find(&to_lower(end))?;
    Some(&s[from..from + len])
}

pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&normalize_entities(&out))
}

pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

pub fn contains_any_ci<S: AsRef<str>>(haystack: &str, needles: &[S]) -> bool {
    let lc = haystack.to_lowercase();
    needles
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| !n.is_empty())
        .any(|n| lc.contains(&n.to_lowercase()))
}

/// Cut a message down to `max` chars for logs and notifications.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_between_ignores_ascii_case() {
        let html = r#"<INPUT NAME="formhash" VALUE="ab12cd34" />"#;
        assert_eq!(
            slice_between_ci(html, r#"name="formhash" value=""#, "\""),
            Some("ab12cd34")
        );
    }

    #[test]
    fn strip_tags_collapses_markup_and_entities() {
        let html = "<div><b>Credit:</b>&nbsp;<span>42</span>\n</div>";
        assert_eq!(strip_tags(html), "Credit: 42");
    }

    #[test]
    fn contains_any_skips_empty_needles() {
        assert!(!contains_any_ci("anything", &[""]));
        assert!(contains_any_ci("Already Signed Today", &["already signed"]));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("签到成功啦", 2), "签到...");
        assert_eq!(truncate("ok", 10), "ok");
    }
}

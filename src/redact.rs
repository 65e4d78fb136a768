//! Scrubbing of credentials from upstream error bodies before they are logged
//! or surfaced to callers.

use std::sync::OnceLock;

use regex::Regex;

/// Upstream bodies are truncated to this many characters in error messages.
const MAX_DETAIL_CHARS: usize = 512;

fn patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
            (
                r#"(?i)\b(token|api[_\-]?key|secret|password|private[_\-]?key)\b("?\s*[:=]\s*"?)([^,\s"]+)"#,
                "$1$2[REDACTED]",
            ),
            (r"(?i)\b(sk|ck)_(production|staging|development)_[a-z0-9]+", "${1}_${2}_[REDACTED]"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Redact credential-looking fragments and cap the length.
pub fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    for (re, replacement) in patterns() {
        value = re.replace_all(&value, *replacement).to_string();
    }
    if value.chars().count() > MAX_DETAIL_CHARS {
        value = value.chars().take(MAX_DETAIL_CHARS).collect::<String>() + "…";
    }
    value
}

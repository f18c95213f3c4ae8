use super::record::Severity;

/// Buckets a local-tier diagnosis by health flag and confidence percentage.
///
/// Thresholds are strict: 81 is severe, 80 is moderate, 51 is moderate,
/// 50 is mild.
pub fn bucket_severity(is_healthy: bool, confidence_pct: f32) -> Severity {
    if is_healthy {
        Severity::Healthy
    } else if confidence_pct > 80.0 {
        Severity::Severe
    } else if confidence_pct > 50.0 {
        Severity::Moderate
    } else {
        Severity::Mild
    }
}

const KEYWORDS: &[(&[&str], Severity)] = &[
    (&["healthy", "no disease"], Severity::Healthy),
    (&["severe", "critical"], Severity::Severe),
    (&["moderate", "medium"], Severity::Moderate),
    (&["mild", "minor"], Severity::Mild),
];

fn match_keywords(text: &str) -> Severity {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Unknown)
}

/// Value of the first `Severity: <level>` line, ignoring list markers and emphasis.
fn declared_severity(text: &str) -> Option<Severity> {
    text.lines().find_map(|line| {
        let line = line.trim_start_matches(|c: char| !c.is_alphabetic());
        let (key, value) = line.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case("severity") {
            return None;
        }
        let value = value.trim().trim_matches(|c: char| !c.is_alphanumeric());
        if value.eq_ignore_ascii_case("none") {
            return Some(Severity::Healthy);
        }
        match match_keywords(value) {
            Severity::Unknown => None,
            severity => Some(severity),
        }
    })
}

/// Infers severity from free-text remote answers.
///
/// A `Severity:` line wins when it names a level (`none` meaning healthy).
/// Otherwise keywords are matched over the whole text, first match wins.
pub fn infer_severity_from_text(text: &str) -> Severity {
    declared_severity(text).unwrap_or_else(|| match_keywords(text))
}

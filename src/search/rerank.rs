use crate::types::SearchResult;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Hosts whose suffix marks a result as high-authority.
const GOOD_DOMAINS: [&str; 7] = [
    ".gov", ".edu", "arxiv.org", "acm.org", "ieee.org", "who.int", "un.org",
];

/// URL substrings that mark low-signal content farms and tag pages.
const BAD_HINTS: [&str; 4] = ["pinterest.", "quora.", "/tag/", "/category/"];

/// Dedupe by URL, score, sort, and apply a per-domain diversity cap.
///
/// Scoring is additive: keyword-in-title +2, keyword-in-body +1, authority
/// domain +2, recency +2 (≤30 days) or +1 (≤180 days), content-farm
/// penalty −2. The sort is stable, so equal scores keep engine priority
/// order from the aggregate.
pub fn rerank(results: Vec<SearchResult>, keyword: &str, per_domain_cap: usize) -> Vec<SearchResult> {
    // Dedupe by href, first occurrence wins.
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut deduped: Vec<SearchResult> = Vec::new();
    for r in results {
        if !r.href.is_empty() && seen.insert(r.href.clone()) {
            deduped.push(r);
        }
    }

    let mut scored: Vec<(f64, SearchResult)> = deduped
        .into_iter()
        .map(|r| (score_result(&r, keyword), r))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    // Diversity pass: admit each result only while its domain is under the cap.
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();
    for (_, r) in scored {
        let domain = host_of(&r.href);
        let count = counts.entry(domain).or_insert(0);
        if *count < per_domain_cap {
            *count += 1;
            out.push(r);
        }
    }

    debug!("reranked to {} results for '{}'", out.len(), keyword);
    out
}

pub fn score_result(item: &SearchResult, keyword: &str) -> f64 {
    let title = item.title.to_lowercase();
    let body = item.body.to_lowercase();
    let host = host_of(&item.href);

    let is_good = GOOD_DOMAINS.iter().any(|d| host.ends_with(d));
    let has_bad = BAD_HINTS.iter().any(|h| item.href.contains(h));

    let kw = keyword.to_lowercase();
    let title_score = if !kw.is_empty() && title.contains(&kw) { 2.0 } else { 0.0 };
    let body_score = if !kw.is_empty() && body.contains(&kw) { 1.0 } else { 0.0 };
    let domain_score = if is_good { 2.0 } else { 0.0 };
    let penalty = if has_bad { -2.0 } else { 0.0 };

    // Recency: published hint first, then body, then title.
    let date = item
        .published
        .as_deref()
        .and_then(try_parse_date)
        .or_else(|| try_parse_date(&item.body))
        .or_else(|| try_parse_date(&item.title));
    let recency = match date {
        Some(d) => {
            let days = (Utc::now().date_naive() - d).num_days().max(1);
            if days < 30 {
                2.0
            } else if days < 180 {
                1.0
            } else {
                0.0
            }
        }
        None => 0.0,
    };

    title_score + body_score + domain_score + recency + penalty
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
}

/// Fuzzy date extraction: whole-string formats first, then the first
/// date-looking token anywhere in the text.
pub fn try_parse_date(text: &str) -> Option<NaiveDate> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(t) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }

    // Embedded ISO date.
    if let Some(m) = iso_date_re().find(t) {
        if let Ok(d) = NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d") {
            return Some(d);
        }
    }

    // Embedded "Jan 2, 2026" / "January 2, 2026".
    if let Some(caps) = month_date_re().captures(t) {
        let normalized = format!("{} {}, {}", &caps[1], &caps[2], &caps[3]);
        for fmt in ["%b %d, %Y", "%B %d, %Y"] {
            if let Ok(d) = NaiveDate::parse_from_str(&normalized, fmt) {
                return Some(d);
            }
        }
    }

    None
}

fn iso_date_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\b(20\d{2}-\d{2}-\d{2})\b").unwrap())
}

fn month_date_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\s+(\d{1,2}),\s+(20\d{2})\b",
        )
        .unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(href: &str, title: &str, body: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            href: href.to_string(),
            body: body.to_string(),
            source: "test".to_string(),
            published: None,
        }
    }

    #[test]
    fn dedupes_by_url_first_occurrence_wins() {
        let results = vec![
            result("https://a.com/x", "first", ""),
            result("https://a.com/x", "second", ""),
            result("https://b.com/y", "third", ""),
        ];
        let out = rerank(results, "", 3);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|r| r.title == "first"));
        assert!(!out.iter().any(|r| r.title == "second"));
    }

    #[test]
    fn diversity_cap_limits_single_domain() {
        let results: Vec<SearchResult> = (0..10)
            .map(|i| result(&format!("https://example.com/p{}", i), "t", ""))
            .collect();
        let out = rerank(results, "t", 3);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn urls_unique_after_rerank() {
        let results: Vec<SearchResult> = (0..6)
            .map(|i| result(&format!("https://d{}.com/p", i % 3), "t", ""))
            .collect();
        let out = rerank(results, "t", 3);
        let mut urls: Vec<&str> = out.iter().map(|r| r.href.as_str()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), out.len());
    }

    #[test]
    fn keyword_and_domain_scoring() {
        let r = result("https://nih.gov/study", "Quantum study", "about quantum stuff");
        assert_eq!(score_result(&r, "quantum"), 2.0 + 1.0 + 2.0);

        let r = result("https://pinterest.com/pin/1", "Quantum", "");
        assert_eq!(score_result(&r, "quantum"), 2.0 - 2.0);
    }

    #[test]
    fn recency_from_published_hint() {
        let recent = Utc::now().date_naive() - chrono::Duration::days(5);
        let mut r = result("https://a.com/x", "t", "");
        r.published = Some(recent.format("%Y-%m-%d").to_string());
        assert_eq!(score_result(&r, ""), 2.0);

        let old = Utc::now().date_naive() - chrono::Duration::days(90);
        r.published = Some(old.format("%Y-%m-%d").to_string());
        assert_eq!(score_result(&r, ""), 1.0);

        let ancient = Utc::now().date_naive() - chrono::Duration::days(900);
        r.published = Some(ancient.format("%Y-%m-%d").to_string());
        assert_eq!(score_result(&r, ""), 0.0);
    }

    #[test]
    fn recency_falls_back_to_body_then_title() {
        let recent = Utc::now().date_naive() - chrono::Duration::days(3);
        let body = format!("Updated {} with new data", recent.format("%Y-%m-%d"));
        let r = result("https://a.com/x", "t", &body);
        assert_eq!(score_result(&r, ""), 2.0);
    }

    #[test]
    fn parses_month_name_dates() {
        assert_eq!(
            try_parse_date("Posted on January 2, 2026 by staff"),
            NaiveDate::from_ymd_opt(2026, 1, 2)
        );
        assert_eq!(
            try_parse_date("Mar 15, 2025"),
            NaiveDate::from_ymd_opt(2025, 3, 15)
        );
        assert_eq!(try_parse_date("no date here"), None);
    }

    #[test]
    fn higher_scores_sort_first() {
        let results = vec![
            result("https://random.net/a", "unrelated", ""),
            result("https://mit.edu/paper", "quantum batteries overview", "quantum batteries"),
        ];
        let out = rerank(results, "quantum batteries", 3);
        assert_eq!(out[0].href, "https://mit.edu/paper");
    }
}

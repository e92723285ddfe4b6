//! Gmail access: credentials, search and message retrieval.
//!
//! - [`auth`]: load and refresh a stored OAuth token
//! - [`client`]: list/search messages and fetch them with resolved text

pub mod auth;
pub mod client;

use chrono::NaiveDate;
use itertools::Itertools;

/// Build the Gmail search query for a set of senders and a date range.
///
/// Gmail treats `after:` as inclusive and `before:` as exclusive. Senders are
/// de-duplicated while keeping their configured order.
///
/// ```text
/// (from:a@x.com OR from:b@y.com) AND after:2025-11-03 before:2025-11-10
/// ```
pub fn build_query(senders: &[String], start: NaiveDate, end: NaiveDate) -> String {
    let date_query = format!("after:{} before:{}", start, end);
    let sender_query = senders
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unique()
        .map(|s| format!("from:{s}"))
        .join(" OR ");

    if sender_query.is_empty() {
        date_query
    } else {
        format!("({sender_query}) AND {date_query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_build_query() {
        let senders = vec!["ai.plus@axios.com".to_string(), "news@daily.therundown.ai".to_string()];
        assert_eq!(
            build_query(&senders, date("2025-11-03"), date("2025-11-10")),
            "(from:ai.plus@axios.com OR from:news@daily.therundown.ai) AND after:2025-11-03 before:2025-11-10"
        );
    }

    #[test]
    fn test_build_query_dedupes_and_skips_blank() {
        let senders = vec!["a@x.com".to_string(), " ".to_string(), "a@x.com".to_string()];
        assert_eq!(
            build_query(&senders, date("2025-01-01"), date("2025-01-08")),
            "(from:a@x.com) AND after:2025-01-01 before:2025-01-08"
        );
    }

    #[test]
    fn test_build_query_without_senders() {
        assert_eq!(
            build_query(&[], date("2025-01-01"), date("2025-01-08")),
            "after:2025-01-01 before:2025-01-08"
        );
    }
}

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%B %d, %Y - (%I:%M %p)";

/// Result of re-scanning one known site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteOutcome {
    pub same: bool,
    pub url: String,
    pub title: String,
    /// When the site last changed before this scan, if ever.
    pub previous_update: Option<DateTime<Utc>>,
}

/// A composed notification: subject line and HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub html_body: String,
}

/// Builds the operator digest for one scan cycle.
pub fn compose_digest<Tz>(outcomes: &[SiteOutcome], added: &[String], now: &DateTime<Tz>) -> Digest
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut body = String::new();
    for url in added {
        body.push_str(&format!("Site : {} Added\n\n", escape_html(url)));
    }

    let mut changed = 0usize;
    for outcome in outcomes {
        let update_line = if !outcome.same {
            changed += 1;
            "--- Updated now".to_string()
        } else if let Some(previous) = &outcome.previous_update {
            format!("--- Updated {}", time_difference_description(previous, now))
        } else {
            "Never - Updated".to_string()
        };
        body.push_str(&format!(
            "<p><a href=\"{}\" target=\"_blank\">{}</a></p>\n{}\n\n",
            escape_html(&outcome.url),
            escape_html(&collapse_whitespace(&outcome.title)),
            update_line
        ));
    }

    let mut subject = format!("Updates : {changed}");
    if !added.is_empty() {
        subject.push_str(&format!(" & {} New Sites Added", added.len()));
    }
    subject.push_str(&format!(" @ {}", now.format(DATE_FORMAT)));

    Digest {
        subject,
        html_body: body,
    }
}

/// Human-readable age of `previous` relative to `now`.
pub fn time_difference_description<Tz>(previous: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let elapsed = now.with_timezone(&Utc) - *previous;
    let days = elapsed.num_days();
    if days > 30 {
        let local = previous.with_timezone(&now.timezone());
        return format!("More than 30 days ago @ {}", local.format(DATE_FORMAT));
    }
    if days >= 1 {
        return plural(days, "day");
    }
    let hours = elapsed.num_hours();
    if hours >= 1 {
        return plural(hours, "hour");
    }
    let minutes = elapsed.num_minutes();
    if minutes >= 1 {
        return plural(minutes, "minute");
    }
    "Just now".to_string()
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 15, 45, 0).unwrap()
    }

    fn outcome(same: bool, previous_update: Option<DateTime<Utc>>) -> SiteOutcome {
        SiteOutcome {
            same,
            url: "https://a.com/".into(),
            title: "  A \n Site ".into(),
            previous_update,
        }
    }

    #[test]
    fn relative_descriptions() {
        let now = now();
        assert_eq!(time_difference_description(&now, &now), "Just now");
        assert_eq!(
            time_difference_description(&(now - Duration::minutes(1)), &now),
            "1 minute ago"
        );
        assert_eq!(
            time_difference_description(&(now - Duration::minutes(59)), &now),
            "59 minutes ago"
        );
        assert_eq!(
            time_difference_description(&(now - Duration::hours(3)), &now),
            "3 hours ago"
        );
        assert_eq!(
            time_difference_description(&(now - Duration::days(2)), &now),
            "2 days ago"
        );
        assert_eq!(
            time_difference_description(&(now - Duration::days(45)), &now),
            "More than 30 days ago @ January 25, 2024 - (03:45 PM)"
        );
    }

    #[test]
    fn future_timestamps_read_as_just_now() {
        let now = now();
        assert_eq!(
            time_difference_description(&(now + Duration::hours(2)), &now),
            "Just now"
        );
    }

    #[test]
    fn subject_counts_changes_and_additions() {
        let outcomes = vec![outcome(false, None), outcome(true, None), outcome(false, None)];
        let digest = compose_digest(&outcomes, &["https://new.com/".to_string()], &now());
        assert_eq!(
            digest.subject,
            "Updates : 2 & 1 New Sites Added @ March 10, 2024 - (03:45 PM)"
        );

        let quiet = compose_digest(&[], &[], &now());
        assert_eq!(quiet.subject, "Updates : 0 @ March 10, 2024 - (03:45 PM)");
        assert_eq!(quiet.html_body, "");
    }

    #[test]
    fn body_lists_added_sites_then_outcomes() {
        let outcomes = vec![
            outcome(false, None),
            outcome(true, Some(now() - Duration::hours(5))),
            outcome(true, None),
        ];
        let digest = compose_digest(&outcomes, &["https://new.com/".to_string()], &now());
        let expected = concat!(
            "Site : https://new.com/ Added\n\n",
            "<p><a href=\"https://a.com/\" target=\"_blank\">A Site</a></p>\n--- Updated now\n\n",
            "<p><a href=\"https://a.com/\" target=\"_blank\">A Site</a></p>\n--- Updated 5 hours ago\n\n",
            "<p><a href=\"https://a.com/\" target=\"_blank\">A Site</a></p>\nNever - Updated\n\n",
        );
        assert_eq!(digest.html_body, expected);
    }

    #[test]
    fn titles_are_escaped() {
        let outcomes = vec![SiteOutcome {
            same: true,
            url: "https://a.com/?a=1&b=2".into(),
            title: "<b>Tom & Jerry</b>".into(),
            previous_update: None,
        }];
        let digest = compose_digest(&outcomes, &[], &now());
        assert!(digest
            .html_body
            .contains("href=\"https://a.com/?a=1&amp;b=2\""));
        assert!(digest.html_body.contains("&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;"));
    }
}

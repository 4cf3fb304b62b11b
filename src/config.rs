use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

/// Fallback date-format token when the data URL template carries none.
pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DD";

/// Portal endpoints and session storage. The URL fields are templates:
/// `{{BASE}}` and `{{systemID}}` are substituted once, and the data URL
/// additionally carries a bracketed date-format token (e.g. `{{YYYY/M/D}}`)
/// that is replaced per requested day.
#[derive(Debug)]
pub struct PortalConfig {
    pub base_url: String,
    pub logon_url: String,
    pub data_url: String,
    pub system_id: String,
    pub cookie_path: PathBuf,
    /// Path prefix the portal redirects to when the session is gone.
    pub logon_path: String,

    resolved: OnceLock<ResolvedUrls>,
}

#[derive(Debug, Clone)]
pub struct ResolvedUrls {
    pub logon_url: String,
    pub data_url: String,
    pub date_format: String,
    pub format_found: bool,
}

impl PortalConfig {
    pub fn new(
        base_url: String,
        logon_url: String,
        data_url: String,
        system_id: String,
        cookie_path: PathBuf,
        logon_path: String,
    ) -> Self {
        Self {
            base_url,
            logon_url,
            data_url,
            system_id,
            cookie_path,
            logon_path,
            resolved: OnceLock::new(),
        }
    }

    /// Resolve the URL templates. Runs at most once; concurrent callers all
    /// observe the first caller's result.
    pub fn resolved(&self) -> &ResolvedUrls {
        self.resolved.get_or_init(|| {
            let logon_url = substitute(&self.logon_url, &self.base_url, &self.system_id);
            let data_url = substitute(&self.data_url, &self.base_url, &self.system_id);
            let (date_format, format_found) = match extract_date_format(&data_url) {
                Some(df) => (df, true),
                None => (DEFAULT_DATE_FORMAT.to_string(), false),
            };
            if format_found {
                debug!(format = %date_format, "date format token in data URL");
            } else {
                warn!(url = %data_url, "no date format token in data URL, assuming {DEFAULT_DATE_FORMAT}");
            }
            ResolvedUrls {
                logon_url,
                data_url,
                date_format,
                format_found,
            }
        })
    }
}

impl ResolvedUrls {
    /// Data URL for one concrete day: the bracketed date token is replaced
    /// with the formatted date (first occurrence only).
    pub fn data_url_for(&self, day: NaiveDate) -> String {
        let token = format!("{{{{{}}}}}", self.date_format);
        self.data_url
            .replacen(&token, &format_day(day, &self.date_format), 1)
    }
}

fn substitute(template: &str, base_url: &str, system_id: &str) -> String {
    template
        .replace("{{BASE}}", base_url)
        .replace("{{systemID}}", system_id)
}

/// First `{{...}}` span whose content looks like a date format, i.e.
/// contains a four-digit-year token (`YYYY`, or `2006` for templates written
/// against a Go-style reference date).
fn extract_date_format(url: &str) -> Option<String> {
    let start = url.find("{{")?;
    let rest = &url[start + 2..];
    let end = rest.find("}}")?;
    let content = &rest[..end];
    if content.contains("YYYY") || content.contains("2006") {
        Some(content.to_string())
    } else {
        None
    }
}

/// Render a day through a date-format token. Longer tokens take precedence
/// at each position; unrecognized characters pass through untouched.
pub fn format_day(day: NaiveDate, format: &str) -> String {
    const TOKENS: &[(&str, Field)] = &[
        ("YYYY", Field::Year),
        ("2006", Field::Year),
        ("MM", Field::MonthPadded),
        ("DD", Field::DayPadded),
        ("01", Field::MonthPadded),
        ("02", Field::DayPadded),
        ("M", Field::Month),
        ("D", Field::Day),
        ("1", Field::Month),
        ("2", Field::Day),
    ];

    let mut out = String::with_capacity(format.len() + 4);
    let mut rest = format;
    'outer: while !rest.is_empty() {
        for (tok, field) in TOKENS {
            if let Some(tail) = rest.strip_prefix(tok) {
                out.push_str(&field.render(day));
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        // rest is non-empty here
        out.push(chars.next().unwrap());
        rest = chars.as_str();
    }
    out
}

#[derive(Clone, Copy)]
enum Field {
    Year,
    MonthPadded,
    Month,
    DayPadded,
    Day,
}

impl Field {
    fn render(self, day: NaiveDate) -> String {
        match self {
            Field::Year => format!("{:04}", day.year()),
            Field::MonthPadded => format!("{:02}", day.month()),
            Field::Month => day.month().to_string(),
            Field::DayPadded => format!("{:02}", day.day()),
            Field::Day => day.day().to_string(),
        }
    }
}

//! Shapes content into channel-specific messages.
//!
//! Mail content becomes a [`MailData`] map (the fields a mail template
//! binds to); Slack content becomes a [`SlackMessage`] with an optional
//! attachment. Both carry the same payload: bounded text, or an error report
//! with its request fields.

use serde::{Deserialize, Serialize};

use crate::content::{Content, ErrorReport};
use crate::options::{OptionSet, RequestFields};

/// Maximum text bytes in a mail body.
pub const MAIL_TEXT_LIMIT: usize = 3500;

/// Maximum text bytes in a Slack message.
pub const SLACK_TEXT_LIMIT: usize = 3000;

/// Marker appended to text cut at `limit` bytes.
pub fn text_marker(limit: usize) -> String {
    format!(" ... ----- TEXT IS LIMITED TO {limit} CHARS-----")
}

/// Return the longest prefix of `text` no longer than `limit` bytes, or
/// `None` if `text` already fits. Never splits a UTF-8 character.
pub fn truncate(text: &str, limit: usize) -> Option<&str> {
    if text.len() <= limit {
        return None;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(&text[..end])
}

/// Cap `text` at `limit` bytes, appending the limit marker when cut.
pub fn bound_text(text: &str, limit: usize) -> String {
    match truncate(text, limit) {
        Some(cut) => format!("{cut}{}", text_marker(limit)),
        None => text.to_string(),
    }
}

// ── Mail ────────────────────────────────────────────────────────────

/// Data bound to the notification mail template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailData {
    /// Body lines of a text notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl MailData {
    /// Plain-text mail body, laid out like the notification template.
    pub fn to_plain_text(&self) -> String {
        let mut out = Vec::new();

        if let Some(text) = &self.text {
            out.extend(text.iter().cloned());
        } else {
            out.push(format!(
                "{}{}",
                self.error_name.as_deref().unwrap_or_default(),
                self.error_place.as_deref().unwrap_or_default()
            ));
            if let Some(title) = &self.error_title {
                out.push(title.clone());
            }
            out.push(String::new());
            if let Some(trace) = &self.trace {
                out.extend(trace.iter().cloned());
            }
        }

        let labeled = [
            ("HTTP_USER_AGENT", &self.user_agent),
            ("REQUEST_URI", &self.request_uri),
            ("IP_ADDRESS", &self.ip_address),
        ];
        if labeled.iter().any(|(_, v)| v.is_some()) {
            out.push(String::new());
        }
        for (label, value) in labeled {
            if let Some(value) = value {
                out.push(format!("{label} : {value}"));
            }
        }

        out.join("\n")
    }
}

/// Render content for the mail channel.
///
/// `Structured` content is expected to be normalized already; if not, it is
/// dumped here.
pub fn render_mail(content: &Content, options: &OptionSet) -> MailData {
    match content {
        Content::Report(report) => {
            let mut data = MailData {
                error_name: Some(report.kind.clone()),
                error_place: Some(report.place()),
                error_title: Some(report.title.clone()),
                trace: Some(report.trace.clone()),
                ..MailData::default()
            };
            if let Some(fields) = &options.fields {
                data.user_agent = Some(fields.user_agent.clone());
                data.request_uri = Some(fields.request_uri.clone());
                data.ip_address = fields.ip_address.clone();
            }
            data
        }
        other => {
            let text = bound_text(&plain_text(other), MAIL_TEXT_LIMIT);
            MailData {
                text: Some(text.split('\n').map(str::to_string).collect()),
                ..MailData::default()
            }
        }
    }
}

// ── Slack ───────────────────────────────────────────────────────────

/// A Slack message: top-level text plus attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackAttachment {
    pub color: String,
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SlackField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mrkdwn_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

/// Render content for the Slack channel.
pub fn render_slack(content: &Content, options: &OptionSet) -> SlackMessage {
    match content {
        Content::Report(report) => render_slack_report(report, options),
        other => {
            let text = bound_text(&plain_text(other), SLACK_TEXT_LIMIT);
            let body = if options.is_raw() {
                text
            } else {
                format!("```{text}```")
            };
            let text = match &options.mention {
                Some(mention) => format!("{mention} {body}"),
                None => body,
            };
            SlackMessage {
                text,
                attachments: vec![],
            }
        }
    }
}

fn render_slack_report(report: &ErrorReport, options: &OptionSet) -> SlackMessage {
    let mention = options
        .mention
        .as_ref()
        .map(|m| format!("{m}\n"))
        .unwrap_or_default();

    let text = format!(
        "{mention}*{}* in `{}` line: {}",
        report.kind, report.file, report.line
    );

    let attachment = SlackAttachment {
        color: "danger".to_string(),
        title: report.title.clone(),
        text: report.trace_text(),
        fields: options.fields.as_ref().map(slack_fields).unwrap_or_default(),
        mrkdwn_in: vec!["text".to_string(), "fields".to_string()],
        ts: Some(chrono::Utc::now().timestamp()),
    };

    SlackMessage {
        text,
        attachments: vec![attachment],
    }
}

fn slack_fields(fields: &RequestFields) -> Vec<SlackField> {
    let mut out = vec![
        SlackField {
            title: "HTTP_USER_AGENT".to_string(),
            value: fields.user_agent.clone(),
            short: false,
        },
        SlackField {
            title: "REQUEST_URI".to_string(),
            value: fields.request_uri.clone(),
            short: false,
        },
    ];
    if let Some(ip) = &fields.ip_address {
        out.push(SlackField {
            title: "IP_ADDRESS".to_string(),
            value: ip.clone(),
            short: false,
        });
    }
    out
}

fn plain_text(content: &Content) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::Structured(_) => match content.clone().normalize() {
            Content::Text(text) => text,
            _ => String::new(),
        },
        Content::Report(report) => report.title.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ErrorReport {
        ErrorReport::new(
            "QueryError",
            "src/db.rs",
            88,
            "connection reset",
            "#0 connection reset\n#1 broken pipe",
        )
    }

    fn fields() -> RequestFields {
        RequestFields::new("Mozilla/5.0", "https://app.test/orders").with_ip("10.0.0.7")
    }

    // ── Truncation ──────────────────────────────────────────────────

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate("abc", 3), None);
        assert_eq!(truncate("abcd", 3), Some("abc"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // "é" is two bytes; a cut at byte 1 must back off to 0.
        assert_eq!(truncate("é", 1), Some(""));
        assert_eq!(truncate("aé", 2), Some("a"));
    }

    #[test]
    fn bound_text_appends_marker() {
        let long = "x".repeat(SLACK_TEXT_LIMIT + 10);
        let out = bound_text(&long, SLACK_TEXT_LIMIT);
        let marker = text_marker(SLACK_TEXT_LIMIT);
        assert_eq!(out.len(), SLACK_TEXT_LIMIT + marker.len());
        assert!(out.ends_with(&marker));
    }

    #[test]
    fn text_exactly_at_limit_is_unchanged() {
        let text = "y".repeat(MAIL_TEXT_LIMIT);
        assert_eq!(bound_text(&text, MAIL_TEXT_LIMIT), text);
    }

    // ── Mail ────────────────────────────────────────────────────────

    #[test]
    fn mail_text_is_split_into_lines() {
        let data = render_mail(&Content::from("first\nsecond"), &OptionSet::new());
        assert_eq!(data.text, Some(vec!["first".to_string(), "second".to_string()]));
        assert!(data.error_name.is_none());
    }

    #[test]
    fn mail_text_over_limit_is_cut() {
        let long = "z".repeat(MAIL_TEXT_LIMIT * 2);
        let data = render_mail(&Content::from(long), &OptionSet::new());
        let lines = data.text.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("TEXT IS LIMITED TO 3500 CHARS-----"));
        assert_eq!(lines[0].len(), MAIL_TEXT_LIMIT + text_marker(MAIL_TEXT_LIMIT).len());
    }

    #[test]
    fn mail_report_has_template_keys() {
        let data = render_mail(&Content::from(report()), &OptionSet::new().fields(fields()));
        let map = serde_json::to_value(&data).unwrap();
        assert_eq!(map["errorName"], "QueryError");
        assert_eq!(map["errorPlace"], " in src/db.rs line: 88");
        assert_eq!(map["errorTitle"], "connection reset");
        assert_eq!(map["trace"][1], "#1 broken pipe");
        assert_eq!(map["userAgent"], "Mozilla/5.0");
        assert_eq!(map["requestUri"], "https://app.test/orders");
        assert_eq!(map["ipAddress"], "10.0.0.7");
        assert!(map.get("text").is_none());
    }

    #[test]
    fn mail_report_without_fields_omits_them() {
        let data = render_mail(&Content::from(report()), &OptionSet::new());
        let map = serde_json::to_value(&data).unwrap();
        assert!(map.get("userAgent").is_none());
        assert!(map.get("ipAddress").is_none());
    }

    #[test]
    fn mail_ignores_mention() {
        let data = render_mail(&Content::from("hi"), &OptionSet::new().mention("@here"));
        assert_eq!(data.text, Some(vec!["hi".to_string()]));
    }

    #[test]
    fn mail_plain_text_body() {
        let data = render_mail(&Content::from(report()), &OptionSet::new().fields(fields()));
        let body = data.to_plain_text();
        assert!(body.starts_with("QueryError in src/db.rs line: 88\nconnection reset\n"));
        assert!(body.contains("#0 connection reset\n#1 broken pipe"));
        assert!(body.contains("HTTP_USER_AGENT : Mozilla/5.0"));
        assert!(body.ends_with("IP_ADDRESS : 10.0.0.7"));

        let text = render_mail(&Content::from("a\nb"), &OptionSet::new()).to_plain_text();
        assert_eq!(text, "a\nb");
    }

    // ── Slack ───────────────────────────────────────────────────────

    #[test]
    fn slack_text_is_wrapped_in_code_block() {
        let msg = render_slack(&Content::from("hello"), &OptionSet::new());
        assert_eq!(msg.text, "```hello```");
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn slack_raw_text_is_not_wrapped() {
        let msg = render_slack(&Content::from("*bold*"), &OptionSet::new().raw(true));
        assert_eq!(msg.text, "*bold*");
    }

    #[test]
    fn slack_mention_is_prefixed() {
        let msg = render_slack(&Content::from("down"), &OptionSet::new().mention("@oncall"));
        assert_eq!(msg.text, "@oncall ```down```");
    }

    #[test]
    fn slack_text_over_limit_is_cut() {
        let long = "q".repeat(SLACK_TEXT_LIMIT + 1);
        let msg = render_slack(&Content::from(long), &OptionSet::new().raw(true));
        assert!(msg.text.ends_with(&text_marker(SLACK_TEXT_LIMIT)));
        assert_eq!(msg.text.len(), SLACK_TEXT_LIMIT + text_marker(SLACK_TEXT_LIMIT).len());
    }

    #[test]
    fn slack_report_has_attachment() {
        let opts = OptionSet::new().fields(fields()).mention("@here");
        let msg = render_slack(&Content::from(report()), &opts);
        assert_eq!(msg.text, "@here\n*QueryError* in `src/db.rs` line: 88");

        let att = &msg.attachments[0];
        assert_eq!(att.color, "danger");
        assert_eq!(att.title, "connection reset");
        assert_eq!(att.text, "#0 connection reset\n#1 broken pipe");
        let titles: Vec<_> = att.fields.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, ["HTTP_USER_AGENT", "REQUEST_URI", "IP_ADDRESS"]);
        assert!(att.ts.is_some());
    }

    #[test]
    fn slack_report_fields_without_ip() {
        let opts = OptionSet::new().fields(RequestFields::new("UA", "/x"));
        let msg = render_slack(&Content::from(report()), &opts);
        assert_eq!(msg.attachments[0].fields.len(), 2);
    }

    #[test]
    fn structured_content_renders_as_dump() {
        let content = Content::from(serde_json::json!(["a", "b"]));
        let msg = render_slack(&content, &OptionSet::new().raw(true));
        assert!(msg.text.contains("\"a\""));
    }
}

//! Plain-text and Slack rendering of queued notifications

use serde::Serialize;
use vss_common::models::{ClassificationRecord, MAX_STAR_RATING};

use super::fanout::NotificationItem;

const CLINVAR_VARIATION_URL: &str = "https://www.ncbi.nlm.nih.gov/clinvar/variation";

/// `"1 star"`, `"3 stars"`; absent counts as zero
pub fn render_rating(gold_stars: Option<u8>) -> String {
    match gold_stars.unwrap_or(0).min(MAX_STAR_RATING) {
        1 => "1 star".to_string(),
        n => format!("{} stars", n),
    }
}

/// Fixed-width bar, e.g. `★★☆☆`
pub fn render_rating_bar(gold_stars: Option<u8>) -> String {
    let filled = gold_stars.unwrap_or(0).min(MAX_STAR_RATING) as usize;
    let empty = MAX_STAR_RATING as usize - filled;
    format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
}

pub fn clinvar_url(variation_id: &str) -> String {
    format!("{}/{}/", CLINVAR_VARIATION_URL, variation_id)
}

/// Email subject for a user's queue
pub fn subject(items: &[NotificationItem]) -> String {
    match items {
        [single] => format!("🎉  News for your variant: {}", single.new_doc.key),
        _ => format!("🎉  News for {} variants", items.len()),
    }
}

fn significance(record: Option<&ClassificationRecord>) -> &str {
    record
        .map(|r| r.clinical_significance.as_str())
        .unwrap_or("not classified")
}

fn stars(record: Option<&ClassificationRecord>) -> Option<u8> {
    record.and_then(|r| r.gold_stars)
}

/// One list entry of the email body
fn render_item(user_id: &str, item: &NotificationItem) -> String {
    let new = item.new_doc.classification.current.as_ref();
    let old = item.old_doc.classification.current.as_ref();
    let mut lines = Vec::new();

    match old {
        Some(_) => {
            lines.push(format!("classification updated: {}", item.new_doc.coordinates));
            if let Some(tag) = item.new_doc.tag_for(user_id) {
                lines.push(format!("  - tag: {}", tag));
            }
            lines.push(format!(
                "  - new classification: {} ({})",
                significance(new),
                render_rating(stars(new))
            ));
            lines.push(format!(
                "  - previous classification: {} ({})",
                significance(old),
                render_rating(stars(old))
            ));
        }
        None => {
            lines.push(format!("new classification: {}", item.new_doc.coordinates));
            if let Some(tag) = item.new_doc.tag_for(user_id) {
                lines.push(format!("  - tag: {}", tag));
            }
            lines.push(format!(
                "  - {} ({})",
                significance(new),
                render_rating(stars(new))
            ));
        }
    }

    if let Some(id) = item.new_doc.classification.variation_id.as_deref() {
        lines.push(format!(
            "  - See ClinVar for more information: {}",
            clinvar_url(id)
        ));
    }

    lines.join("\n") + "\n"
}

/// Numbered plain-text body covering every queued item
pub fn email_body(user_id: &str, items: &[NotificationItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, render_item(user_id, item)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One attachment field per notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackAttachment {
    pub fallback: String,
    pub color: String,
    pub pretext: String,
    pub author_name: String,
    pub author_link: String,
    pub fields: Vec<SlackField>,
    pub footer: String,
}

/// Body posted to a Slack incoming webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackPayload {
    pub attachments: Vec<SlackAttachment>,
}

pub fn slack_field(user_id: &str, item: &NotificationItem) -> SlackField {
    let new = item.new_doc.classification.current.as_ref();
    let old = item.old_doc.classification.current.as_ref();

    let mut value = item.new_doc.coordinates.to_string();
    if let Some(tag) = item.new_doc.tag_for(user_id) {
        value.push_str(&format!(" [{}]", tag));
    }

    let title = match old {
        Some(_) => {
            value.push_str(&format!(
                "\n{} {} → {} {}",
                significance(old),
                render_rating_bar(stars(old)),
                significance(new),
                render_rating_bar(stars(new))
            ));
            "Classification updated"
        }
        None => {
            value.push_str(&format!(
                "\n{} {}",
                significance(new),
                render_rating_bar(stars(new))
            ));
            "New classification"
        }
    };

    if let Some(id) = item.new_doc.classification.variation_id.as_deref() {
        value.push_str(&format!(
            "\nSee ClinVar for more information: {}",
            clinvar_url(id)
        ));
    }

    SlackField {
        title: title.to_string(),
        value,
        short: false,
    }
}

/// Slack message summarizing a user's queue
pub fn slack_payload(user_id: &str, items: &[NotificationItem], base_url: &str) -> SlackPayload {
    SlackPayload {
        attachments: vec![SlackAttachment {
            fallback: "Summary of your variants".to_string(),
            color: "#36a64f".to_string(),
            pretext: format!("You have {} updates for your variants", items.len()),
            author_name: "Variant Facts".to_string(),
            author_link: base_url.to_string(),
            fields: items.iter().map(|item| slack_field(user_id, item)).collect(),
            footer: "Variant Facts".to_string(),
        }],
    }
}

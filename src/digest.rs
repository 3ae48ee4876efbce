// src/digest.rs
//! Rank qualifying items and render the digest markdown.

use std::collections::HashSet;

use crate::model::{Digest, ScoredItem};

/// Rendered body when no item clears the threshold. Distinct from delivery
/// failure: an empty digest is a valid terminal state that suppresses
/// notification.
pub const EMPTY_SENTINEL: &str = "No highly relevant posts found in the latest batch.";

const EXCERPT_CHARS: usize = 280;

/// Separator between rendered items. Sinks with payload caps cut at the
/// last whole separator, so a truncated digest never shows half an item.
pub const ITEM_SEPARATOR: &str = "\n\n---\n\n";

/// Select items with `score >= threshold` and rank them by score desc,
/// engagement desc, recency desc, id asc. The id tail makes the order a
/// strict total order, so repeated builds over the same input are identical.
pub fn build(scored: Vec<ScoredItem>, threshold: u8) -> Digest {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut items: Vec<ScoredItem> = scored
        .into_iter()
        .filter(|s| s.score >= threshold)
        .filter(|s| seen_ids.insert(s.item.id.clone()))
        .collect();

    items.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.item.engagement().cmp(&a.item.engagement()))
            .then(b.item.created_at.cmp(&a.item.created_at))
            .then(a.item.id.cmp(&b.item.id))
    });

    let rendered = render(&items);
    metrics::counter!("digest_items_total").increment(items.len() as u64);
    Digest { items, rendered }
}

fn render(items: &[ScoredItem]) -> String {
    if items.is_empty() {
        return EMPTY_SENTINEL.to_string();
    }

    let mut out = String::from("# Relevant List Digest\n\n");
    for s in items {
        out.push_str(&format!(
            "## @{}: {}/10 Relevance\n\n",
            s.item.author, s.score
        ));
        out.push_str(&excerpt(&s.item.text, EXCERPT_CHARS));
        out.push_str("\n\n");
        out.push_str(&format!("[View Post]({})", s.item.url));
        out.push_str(ITEM_SEPARATOR);
    }
    out
}

/// Head of `text` capped at `max` chars, with an ellipsis when cut. Char
/// boundaries, not bytes.
fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", head.trim_end())
}

//! Content signal parser
//!
//! Finds `<@user@instance>` mentions and `<cite:instance|postId>` citations
//! in article text.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Characters of surrounding text kept on each side of a marker
const CONTEXT_RADIUS: usize = 80;

lazy_static! {
    static ref MENTION_PATTERN: Regex =
        Regex::new(r"<@([^\s@<>]+)@([^\s<>]+)>").expect("mention pattern compiles");
    static ref CITATION_PATTERN: Regex =
        Regex::new(r"<cite:([^|<>]+)\|([^<>]+)>").expect("citation pattern compiles");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionSignal {
    pub username: String,
    pub instance: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationSignal {
    pub instance: String,
    pub post_id: String,
    pub context: String,
}

/// Extract mention and citation signals
///
/// Results keep first-occurrence order and are deduplicated by
/// `user@instance` and `instance|postId`.
pub fn parse_signals(content: &str) -> (Vec<MentionSignal>, Vec<CitationSignal>) {
    if content.trim().is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut mentions = Vec::new();
    let mut seen_mentions = HashSet::new();
    for captures in MENTION_PATTERN.captures_iter(content) {
        let (Some(whole), Some(user), Some(instance)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        let username = user.as_str().trim();
        let instance = instance.as_str().trim();
        if username.is_empty() || instance.is_empty() {
            continue;
        }
        if !seen_mentions.insert(format!("{}@{}", username, instance)) {
            continue;
        }

        mentions.push(MentionSignal {
            username: username.to_string(),
            instance: instance.to_string(),
            context: context_window(content, whole.start(), whole.end()),
        });
    }

    let mut citations = Vec::new();
    let mut seen_citations = HashSet::new();
    for captures in CITATION_PATTERN.captures_iter(content) {
        let (Some(whole), Some(instance), Some(post_id)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        let instance = instance.as_str().trim();
        let post_id = post_id.as_str().trim();
        if instance.is_empty() || post_id.is_empty() {
            continue;
        }
        if !seen_citations.insert(format!("{}|{}", instance, post_id)) {
            continue;
        }

        citations.push(CitationSignal {
            instance: instance.to_string(),
            post_id: post_id.to_string(),
            context: context_window(content, whole.start(), whole.end()),
        });
    }

    (mentions, citations)
}

/// Up to `CONTEXT_RADIUS` chars before `start` and after `end`, trimmed.
fn context_window(content: &str, start: usize, end: usize) -> String {
    let before: Vec<char> = content[..start].chars().collect();
    let from = before.len().saturating_sub(CONTEXT_RADIUS);

    let mut window: String = before[from..].iter().collect();
    window.push_str(&content[start..end]);
    window.extend(content[end..].chars().take(CONTEXT_RADIUS));

    window.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_one_mention_and_one_citation() {
        let (mentions, citations) = parse_signals(
            "Hi <@alice@blog.example.com>, see <cite:blog.example.com|123>.",
        );

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].username, "alice");
        assert_eq!(mentions[0].instance, "blog.example.com");

        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].instance, "blog.example.com");
        assert_eq!(citations[0].post_id, "123");
        assert_eq!(
            citations[0].context,
            "Hi <@alice@blog.example.com>, see <cite:blog.example.com|123>."
        );
    }

    #[test]
    fn repeated_markers_are_not_duplicated() {
        let (mentions, citations) = parse_signals(
            "<@alice@a.example> <@bob@a.example> <@alice@a.example> \
             <cite:a.example|1> <cite:a.example|1> <cite:b.example|1>",
        );

        let users: Vec<_> = mentions.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob"]);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[1].instance, "b.example");
    }

    #[test]
    fn blank_captures_are_skipped() {
        let (_, citations) = parse_signals("<cite: |42> <cite:a.example|  >");
        assert!(citations.is_empty());
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        let (mentions, citations) = parse_signals("  \n\t ");
        assert!(mentions.is_empty());
        assert!(citations.is_empty());
    }

    #[test]
    fn context_is_bounded_in_characters() {
        let prefix = "é".repeat(100);
        let suffix = "ü".repeat(100);
        let content = format!("{prefix}<@alice@a.example>{suffix}");

        let (mentions, _) = parse_signals(&content);
        let context = &mentions[0].context;

        assert_eq!(context.chars().count(), 80 + "<@alice@a.example>".len() + 80);
        assert!(context.starts_with('é'));
        assert!(context.ends_with('ü'));
    }
}

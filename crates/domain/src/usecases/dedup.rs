//! Duplicate suppression - inexact title matching against recent messages
//!
//! Guards against re-posting articles that are still visible in a channel
//! after the ledger was lost (for example, a wiped database). The ledger
//! remains the authority; this check only supplements it.

use crate::model::RecentMessage;

/// Reports whether `title` looks like it was already posted in one of
/// `messages`.
///
/// Tokenizes the title on whitespace and lowercases it, then counts the
/// tokens longer than three characters that occur as substrings of each
/// message (content plus embed titles and descriptions, lowercased). A
/// message counts as a duplicate when strictly more than half of the
/// title tokens match and at least two do.
pub fn is_duplicate_title(title: &str, messages: &[RecentMessage]) -> bool {
    let title_words: Vec<String> = title
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if title_words.is_empty() {
        return false;
    }

    for message in messages {
        let mut text = message.content.to_lowercase();
        for embed in &message.embeds {
            if !embed.title.is_empty() {
                text.push(' ');
                text.push_str(&embed.title.to_lowercase());
            }
            if !embed.description.is_empty() {
                text.push(' ');
                text.push_str(&embed.description.to_lowercase());
            }
        }

        let match_count = title_words
            .iter()
            .filter(|word| word.len() > 3 && text.contains(word.as_str()))
            .count();

        if match_count > title_words.len() / 2 && match_count >= 2 {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EmbedText;

    fn message_with_embed_title(title: &str) -> RecentMessage {
        RecentMessage {
            content: String::new(),
            embeds: vec![EmbedText {
                title: title.to_string(),
                description: String::new(),
            }],
        }
    }

    #[test]
    fn matches_title_reposted_in_embed() {
        let messages = [message_with_embed_title("tholian assembly update coming soon")];
        assert!(is_duplicate_title("Tholian Assembly Update", &messages));
    }

    #[test]
    fn matches_title_in_plain_content() {
        let messages = [RecentMessage {
            content: "New post: Season Twelve Anniversary Event details inside".to_string(),
            embeds: vec![],
        }];
        assert!(is_duplicate_title(
            "Season Twelve Anniversary Event",
            &messages
        ));
    }

    #[test]
    fn unrelated_messages_do_not_match() {
        let messages = [message_with_embed_title("weekly server maintenance notice")];
        assert!(!is_duplicate_title("Tholian Assembly Update", &messages));
    }

    #[test]
    fn empty_title_never_matches() {
        let messages = [message_with_embed_title("anything at all")];
        assert!(!is_duplicate_title("", &messages));
        assert!(!is_duplicate_title("   ", &messages));
    }

    #[test]
    fn requires_at_least_two_significant_matches() {
        // One matching word out of one is over half but below the floor of two.
        let messages = [message_with_embed_title("tholians everywhere")];
        assert!(!is_duplicate_title("Tholians", &messages));
    }

    #[test]
    fn short_words_are_ignored() {
        // Every token is <= 3 chars, so nothing can count as a match.
        let messages = [message_with_embed_title("a big day for all of us")];
        assert!(!is_duplicate_title("a big day for all of us", &messages));
    }

    #[test]
    fn no_messages_means_no_duplicate() {
        assert!(!is_duplicate_title("Tholian Assembly Update", &[]));
    }
}

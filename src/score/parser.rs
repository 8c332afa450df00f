//! Score comment parsing.
//!
//! A score comment is exactly `{digits}-{digits}` optionally followed by
//! whitespace and the scorer's surname, e.g. `"1-0"` or `"2-1 богомолов"`.
//! Anything else is simply not a score — absence, not an error.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// A parsed score comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreEvent {
    /// The reported scoreline, in the order it appeared in the comment.
    pub pair: (u32, u32),
    /// Scorer surname, case preserved; alias matching happens in the
    /// celebration selector, not here.
    pub player: Option<String>,
}

fn score_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // \p{L} so Cyrillic (and any other script) surnames match.
    RE.get_or_init(|| Regex::new(r"^(\d+)-(\d+)(?:\s+(\p{L}+))?$").unwrap())
}

/// Parse one comment text into a score event, if it has the score shape.
pub fn parse_score(text: &str) -> Option<ScoreEvent> {
    let caps = score_re().captures(text.trim())?;
    // Digit runs too long for u32 are not realistic scores; treat as no match.
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    Some(ScoreEvent {
        pair: (first, second),
        player: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_score() {
        let ev = parse_score("1-0").unwrap();
        assert_eq!(ev.pair, (1, 0));
        assert_eq!(ev.player, None);
    }

    #[test]
    fn test_score_with_surname() {
        let ev = parse_score("2-1 богомолов").unwrap();
        assert_eq!(ev.pair, (2, 1));
        assert_eq!(ev.player.as_deref(), Some("богомолов"));
    }

    #[test]
    fn test_surname_case_preserved() {
        let ev = parse_score("3-0 Писарев").unwrap();
        assert_eq!(ev.player.as_deref(), Some("Писарев"));
    }

    #[test]
    fn test_whitespace_trimmed() {
        let ev = parse_score("  0-2  ").unwrap();
        assert_eq!(ev.pair, (0, 2));
    }

    #[test]
    fn test_not_a_score() {
        assert!(parse_score("hello").is_none());
        assert!(parse_score("").is_none());
        assert!(parse_score("1-0 and more words").is_none());
        assert!(parse_score("score 1-0").is_none());
        assert!(parse_score("1-0-2").is_none());
        assert!(parse_score("one-zero").is_none());
        assert!(parse_score("1-0 team42").is_none());
    }

    #[test]
    fn test_big_scores() {
        assert_eq!(parse_score("12-11").unwrap().pair, (12, 11));
        // A digit run beyond u32 is not a score.
        assert!(parse_score("99999999999999999999-0").is_none());
    }
}

//! Parsing of VK URLs into engine identifiers.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::OnceLock;

use super::platform::BroadcastId;

fn video_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"video(-?\d+)_(\d+)").unwrap())
}

/// Parse a VK broadcast URL into a `BroadcastId`.
///
/// Accepts both the canonical form `https://vk.com/video-123_456` and the
/// embedded form `https://vk.com/video?z=video-123_456`. Malformed URLs are
/// an error for the caller, never for the engine.
pub fn parse_video_url(url: &str) -> Result<BroadcastId> {
    let caps = video_re()
        .captures(url.trim())
        .ok_or_else(|| anyhow!("not a VK broadcast URL: {url}"))?;
    let owner_id: i64 = caps[1].parse()?;
    let video_id: i64 = caps[2].parse()?;
    Ok(BroadcastId::new(owner_id, video_id))
}

/// Extract a numeric group id from the forms users paste: a bare number,
/// `vk.com/club123`, `vk.com/public123`, or any vk.com URL containing the id.
pub fn extract_group_id(input: &str) -> Result<i64> {
    let input = input.trim();
    if let Ok(id) = input.parse::<i64>() {
        return Ok(id.abs());
    }

    static CLUB_RE: OnceLock<Regex> = OnceLock::new();
    let club_re =
        CLUB_RE.get_or_init(|| Regex::new(r"vk\.com/(?:club|public)(\d+)").unwrap());
    if let Some(caps) = club_re.captures(input) {
        return Ok(caps[1].parse()?);
    }

    // Named group URLs carry no numeric id; fall back to any digits present.
    if input.contains("vk.com") {
        static NUM_RE: OnceLock<Regex> = OnceLock::new();
        let num_re = NUM_RE.get_or_init(|| Regex::new(r"(\d+)").unwrap());
        if let Some(caps) = num_re.captures(input) {
            return Ok(caps[1].parse()?);
        }
    }

    Err(anyhow!("could not extract a group id from: {input}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_owned_video_url() {
        let id = parse_video_url("https://vk.com/video-123456789_456123789").unwrap();
        assert_eq!(id, BroadcastId::new(-123456789, 456123789));
    }

    #[test]
    fn test_parse_embedded_video_url() {
        let id = parse_video_url("https://vk.com/video?z=video-12_34%2Fvideos-12").unwrap();
        assert_eq!(id, BroadcastId::new(-12, 34));
    }

    #[test]
    fn test_parse_user_owned_video_url() {
        let id = parse_video_url("https://vk.com/video98765_111").unwrap();
        assert_eq!(id, BroadcastId::new(98765, 111));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_video_url("https://vk.com/im").is_err());
        assert!(parse_video_url("not a url at all").is_err());
    }

    #[test]
    fn test_broadcast_id_roundtrip_through_url() {
        let id = BroadcastId::new(-42, 7);
        assert_eq!(parse_video_url(&id.url()).unwrap(), id);
    }

    #[test]
    fn test_extract_group_id_forms() {
        assert_eq!(extract_group_id("123456789").unwrap(), 123456789);
        assert_eq!(extract_group_id("https://vk.com/club123").unwrap(), 123);
        assert_eq!(extract_group_id("https://vk.com/public456").unwrap(), 456);
        assert!(extract_group_id("just words").is_err());
    }
}

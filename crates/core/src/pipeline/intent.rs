//! # Intent Classification
//!
//! Specification-stage analysis of raw query text: which intents the query
//! carries and which categorical entities it names. Pattern-based, cheap,
//! and deterministic; no capability call involved.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ExtractedEntities, QueryIntent};

/// Genre words worth bucketing on. Lowercase, matched as whole words.
const GENRES: &[&str] = &[
    "action",
    "animation",
    "comedy",
    "crime",
    "documentary",
    "drama",
    "fantasy",
    "horror",
    "romance",
    "sci-fi",
    "thriller",
    "western",
];

/// Platform names recognized in query text, normalized form second
const PLATFORMS: &[(&str, &str)] = &[
    ("netflix", "netflix"),
    ("prime video", "prime_video"),
    ("prime", "prime_video"),
    ("disney", "disney_plus"),
    ("hulu", "hulu"),
    ("max", "max"),
    ("apple tv", "apple_tv"),
];

fn similarity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:like|similar to)\s+(.+?)(?:\s+on\s+|\s+in\s+|[.,!?]|$)")
            .expect("similarity regex")
    })
}

fn device_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:cast|play (?:it |this |that )?on|send (?:it |this )?to|watch on)\b")
            .expect("device regex")
    })
}

fn search_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:find|search|look(?:ing)? for|show me|where)\b").expect("search regex"))
}

fn browse_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:browse|trending|popular|what'?s new|something to watch)\b")
            .expect("browse regex")
    })
}

/// Classify raw query text into one or more intents.
///
/// A query carries every intent its phrasing signals ("find shows like X"
/// is both search and recommend). Text signalling nothing defaults to
/// search, so classification never fails.
pub fn classify(text: &str) -> Vec<QueryIntent> {
    let mut intents = Vec::new();
    if search_re().is_match(text) {
        intents.push(QueryIntent::Search);
    }
    if similarity_re().is_match(text) {
        intents.push(QueryIntent::Recommend);
    }
    if browse_re().is_match(text) {
        intents.push(QueryIntent::Browse);
    }
    if device_re().is_match(text) {
        intents.push(QueryIntent::DeviceControl);
    }
    if intents.is_empty() {
        intents.push(QueryIntent::Search);
    }
    intents
}

/// Extract categorical entities plus any reference titles from query text.
/// `region` comes from the request, not the text.
pub fn extract_entities(text: &str, region: &str) -> ExtractedEntities {
    let lower = text.to_lowercase();
    let mut entities = ExtractedEntities {
        region: Some(region.to_string()),
        ..Default::default()
    };

    for genre in GENRES {
        if word_match(&lower, genre) {
            entities.genres.push((*genre).to_string());
        }
    }

    if word_match(&lower, "movie") || word_match(&lower, "movies") || word_match(&lower, "film") {
        entities.media_type = Some("movie".to_string());
    } else if word_match(&lower, "show")
        || word_match(&lower, "shows")
        || word_match(&lower, "series")
    {
        entities.media_type = Some("series".to_string());
    }

    for (needle, normalized) in PLATFORMS {
        if lower.contains(needle) && !entities.platforms.iter().any(|p| p == normalized) {
            entities.platforms.push((*normalized).to_string());
        }
    }

    if let Some(caps) = similarity_re().captures(text) {
        if let Some(title) = caps.get(1) {
            let title = title.as_str().trim();
            if !title.is_empty() {
                entities.titles.push(title.to_string());
            }
        }
    }

    entities
}

fn word_match(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .any(|token| token == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_phrasing_is_search_and_recommend() {
        let intents = classify("find sci-fi shows like Severance");
        assert!(intents.contains(&QueryIntent::Search));
        assert!(intents.contains(&QueryIntent::Recommend));
    }

    #[test]
    fn test_unclassifiable_text_defaults_to_search() {
        assert_eq!(classify("severance"), vec![QueryIntent::Search]);
        assert_eq!(classify(""), vec![QueryIntent::Search]);
    }

    #[test]
    fn test_device_phrasing() {
        assert!(classify("play it on the living room tv").contains(&QueryIntent::DeviceControl));
        assert!(classify("cast Dune to bedroom").contains(&QueryIntent::DeviceControl));
    }

    #[test]
    fn test_browse_phrasing() {
        assert!(classify("what's trending this week").contains(&QueryIntent::Browse));
    }

    #[test]
    fn test_entity_extraction() {
        let entities = extract_entities("find sci-fi shows like Severance on Netflix", "US");
        assert_eq!(entities.genres, vec!["sci-fi"]);
        assert_eq!(entities.media_type.as_deref(), Some("series"));
        assert_eq!(entities.platforms, vec!["netflix"]);
        assert_eq!(entities.titles, vec!["Severance"]);
        assert_eq!(entities.region.as_deref(), Some("US"));
    }

    #[test]
    fn test_title_capture_stops_at_platform_clause() {
        let entities = extract_entities("shows similar to The Expanse on prime", "GB");
        assert_eq!(entities.titles, vec!["The Expanse"]);
        assert_eq!(entities.platforms, vec!["prime_video"]);
    }

    #[test]
    fn test_genre_needs_whole_word() {
        // "dramatic" must not match the drama genre
        let entities = extract_entities("a dramatic finale", "US");
        assert!(entities.genres.is_empty());
    }
}

//! Language tags and pairs.
//!
//! Everything downstream of the HTTP boundary works on normalized tags, so
//! `"Vietnamese"`, `"vietnamese"` and `" VI "` all end up as `vi` before any
//! model id is built.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display names the clients send instead of codes, with the ISO 639-3 code
/// multilingual models use to select an output language.
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("english", "en", "eng"),
    ("vietnamese", "vi", "vie"),
    ("french", "fr", "fra"),
    ("spanish", "es", "spa"),
    ("german", "de", "deu"),
    ("italian", "it", "ita"),
    ("portuguese", "pt", "por"),
    ("dutch", "nl", "nld"),
    ("russian", "ru", "rus"),
    ("chinese", "zh", "cmn"),
    ("japanese", "ja", "jpn"),
    ("korean", "ko", "kor"),
    ("arabic", "ar", "ara"),
    ("hindi", "hi", "hin"),
    ("thai", "th", "tha"),
    ("indonesian", "id", "ind"),
    ("malay", "ms", "zsm"),
    ("turkish", "tr", "tur"),
    ("polish", "pl", "pol"),
    ("czech", "cs", "ces"),
    ("swedish", "sv", "swe"),
    ("finnish", "fi", "fin"),
    ("danish", "da", "dan"),
    ("norwegian", "no", "nob"),
];

/// A normalized, lowercase language code such as `en`, `vi` or `zh-cn`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized language '{0}'")]
pub struct InvalidLanguage(pub String);

impl LanguageTag {
    /// Normalize a display name or code.
    pub fn parse(input: &str) -> Result<Self, InvalidLanguage> {
        let lowered = input.trim().to_lowercase();

        if let Some((_, code, _)) = LANGUAGES.iter().find(|(name, _, _)| *name == lowered) {
            return Ok(Self((*code).to_string()));
        }

        if is_code(&lowered) {
            Ok(Self(lowered))
        } else {
            Err(InvalidLanguage(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Three-letter code for the primary language, when it is a known one.
    pub fn alpha3(&self) -> Option<&'static str> {
        let primary = self.0.split('-').next().unwrap_or(&self.0);
        LANGUAGES
            .iter()
            .find(|(_, code, alpha3)| *code == primary || *alpha3 == primary)
            .map(|(_, _, alpha3)| *alpha3)
    }
}

fn is_code(value: &str) -> bool {
    let (primary, subtag) = match value.split_once('-') {
        Some((primary, subtag)) => (primary, Some(subtag)),
        None => (value, None),
    };

    let primary_ok = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_lowercase());
    let subtag_ok = subtag.map_or(true, |s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()));

    primary_ok && subtag_ok
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LanguageTag {
    type Err = InvalidLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: LanguageTag,
    pub target: LanguageTag,
}

impl LanguagePair {
    pub fn new(source: LanguageTag, target: LanguageTag) -> Self {
        Self { source, target }
    }

    /// Parse both sides from display names or codes.
    pub fn parse(source: &str, target: &str) -> Result<Self, InvalidLanguage> {
        Ok(Self::new(LanguageTag::parse(source)?, LanguageTag::parse(target)?))
    }

    pub fn is_identity(&self) -> bool {
        self.source == self.target
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.target.clone(), self.source.clone())
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_map_to_codes() {
        assert_eq!(LanguageTag::parse("English").unwrap().as_str(), "en");
        assert_eq!(LanguageTag::parse("  VIETNAMESE ").unwrap().as_str(), "vi");
        assert_eq!(LanguageTag::parse("Norwegian").unwrap().as_str(), "no");
    }

    #[test]
    fn codes_are_lowercased() {
        assert_eq!(LanguageTag::parse("FR").unwrap().as_str(), "fr");
        assert_eq!(LanguageTag::parse("zh-CN").unwrap().as_str(), "zh-cn");
        assert_eq!(LanguageTag::parse("mul").unwrap().as_str(), "mul");
    }

    #[test]
    fn three_letter_codes() {
        assert_eq!(LanguageTag::parse("Vietnamese").unwrap().alpha3(), Some("vie"));
        assert_eq!(LanguageTag::parse("zh-CN").unwrap().alpha3(), Some("cmn"));
        assert_eq!(LanguageTag::parse("fra").unwrap().alpha3(), Some("fra"));
        assert_eq!(LanguageTag::parse("xx").unwrap().alpha3(), None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(LanguageTag::parse("").is_err());
        assert!(LanguageTag::parse("klingonese").is_err());
        assert!(LanguageTag::parse("e").is_err());
        assert!(LanguageTag::parse("en-").is_err());
        assert!(LanguageTag::parse("en/../x").is_err());
    }

    #[test]
    fn pair_identity_and_reverse() {
        let pair = LanguagePair::parse("English", "en").unwrap();
        assert!(pair.is_identity());

        let pair = LanguagePair::parse("en", "vi").unwrap();
        assert_eq!(pair.reversed().to_string(), "vi->en");
    }
}

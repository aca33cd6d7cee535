//! Metered features

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// A capability subject to metering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    LyricGenerations,
    MusicGenerations,
    CodeTranslations,
    VulnerabilityScans,
    CodebeatGenerations,
    TextGenerations,
}

impl Feature {
    /// Every metered feature, in reporting order
    pub const ALL: [Feature; 6] = [
        Feature::LyricGenerations,
        Feature::MusicGenerations,
        Feature::CodeTranslations,
        Feature::VulnerabilityScans,
        Feature::CodebeatGenerations,
        Feature::TextGenerations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LyricGenerations => "lyric_generations",
            Self::MusicGenerations => "music_generations",
            Self::CodeTranslations => "code_translations",
            Self::VulnerabilityScans => "vulnerability_scans",
            Self::CodebeatGenerations => "codebeat_generations",
            Self::TextGenerations => "text_generations",
        }
    }
}

impl FromStr for Feature {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("Unknown feature '{}'", s)))
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

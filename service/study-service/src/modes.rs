//! Answer modes and the single table that maps each one to its retrieval and
//! generation settings.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerMode {
    TwoMark,
    FiveMark,
    TenMark,
    ShowAll,
    BuildNotes,
}

/// How long a generated answer should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerLength {
    Short,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeBehavior {
    /// One grounded generator call over the retrieved context.
    Generative(AnswerLength),
    /// Per-topic retrieved excerpts, no generation.
    TopicExcerpts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    /// Chunks retrieved per query (per topic for excerpt modes).
    pub top_k: usize,
    /// Generation budget; zero for modes that never call the generator.
    pub max_new_tokens: usize,
    pub behavior: ModeBehavior,
}

impl AnswerMode {
    pub const ALL: [AnswerMode; 5] = [
        AnswerMode::TwoMark,
        AnswerMode::FiveMark,
        AnswerMode::TenMark,
        AnswerMode::ShowAll,
        AnswerMode::BuildNotes,
    ];

    pub fn profile(self) -> ModeProfile {
        use AnswerLength::*;
        use ModeBehavior::*;
        let (top_k, max_new_tokens, behavior) = match self {
            AnswerMode::TwoMark => (4, 120, Generative(Short)),
            AnswerMode::FiveMark => (4, 250, Generative(Detailed)),
            AnswerMode::TenMark => (6, 0, TopicExcerpts),
            AnswerMode::ShowAll => (6, 0, TopicExcerpts),
            AnswerMode::BuildNotes => (6, 0, TopicExcerpts),
        };
        ModeProfile { top_k, max_new_tokens, behavior }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerMode::TwoMark => "2-mark",
            AnswerMode::FiveMark => "5-mark",
            AnswerMode::TenMark => "10-mark",
            AnswerMode::ShowAll => "show-all",
            AnswerMode::BuildNotes => "build-notes",
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown answer mode `{0}` (expected one of: 2-mark, 5-mark, 10-mark, show-all, build-notes)")]
pub struct UnknownMode(pub String);

impl FromStr for AnswerMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        AnswerMode::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

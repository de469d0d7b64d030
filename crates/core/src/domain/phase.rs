use serde::{Deserialize, Serialize};

use crate::domain::step::Step;
use crate::error::CoreError;

/// Sub-position within a step. `Pending` and `Running` bracket execution
/// (`Running` doubles as the single-flight lock), `Review` holds approved
/// candidates for selection, `QaFailed` marks a fully-rejected step awaiting
/// an auto-retry, `Blocked` means a human must act.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Running,
    Review,
    QaFailed,
    Blocked,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Review => "review",
            Self::QaFailed => "qa_failed",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "review" => Some(Self::Review),
            "qa_failed" => Some(Self::QaFailed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Pending,
            Self::Running,
            Self::Review,
            Self::QaFailed,
            Self::Blocked,
        ]
    }
}

/// Exact pipeline position. A `Phase` is the pair (step, stage); the string
/// token form is `<step name>_<stage>` (`style_pending`, `merge_review`, ...)
/// and the mapping from token to step is total and fixed, so a phase can
/// never point at a different step than the one encoded in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Phase {
    pub step: Step,
    pub stage: Stage,
}

impl Phase {
    pub fn new(step: Step, stage: Stage) -> Self {
        Self { step, stage }
    }

    pub fn pending(step: Step) -> Self {
        Self::new(step, Stage::Pending)
    }

    pub fn running(step: Step) -> Self {
        Self::new(step, Stage::Running)
    }

    pub fn review(step: Step) -> Self {
        Self::new(step, Stage::Review)
    }

    pub fn as_token(&self) -> String {
        format!("{}_{}", self.step.name(), self.stage.as_str())
    }

    pub fn parse(token: &str) -> Option<Self> {
        // Step names themselves contain underscores, so split on the known
        // suffix rather than on position.
        for stage in Stage::all() {
            let suffix = format!("_{}", stage.as_str());
            if let Some(name) = token.strip_suffix(&suffix) {
                if let Some(step) = Step::parse(name) {
                    return Some(Self { step, stage });
                }
            }
        }
        None
    }

    /// The full 40-token vocabulary, in (step, stage) order.
    pub fn vocabulary() -> Vec<Phase> {
        let mut out = Vec::with_capacity(40);
        for step in Step::all() {
            for stage in Stage::all() {
                out.push(Phase::new(step, stage));
            }
        }
        out
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.step.name(), self.stage.as_str())
    }
}

impl Serialize for Phase {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_token())
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Phase::parse(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown phase token: {token}")))
    }
}

/// Validates (phase token, step number) pairs against the fixed mapping.
/// Called at the persistence boundary before every pipeline write; the
/// database mirrors the same table with triggers so no code path can
/// desynchronize phase and step.
pub struct PhaseGuard;

impl PhaseGuard {
    /// The step a phase token belongs to, or an error for unknown tokens.
    pub fn step_of(token: &str) -> Result<Step, CoreError> {
        Phase::parse(token)
            .map(|p| p.step)
            .ok_or_else(|| CoreError::UnknownPhase(token.to_string()))
    }

    /// Checks that `step_number` is exactly the step encoded in `phase`.
    pub fn validate(phase: &Phase, step_number: u8) -> Result<(), CoreError> {
        if phase.step.number() == step_number {
            Ok(())
        } else {
            Err(CoreError::PhaseStepMismatch {
                phase: phase.as_token(),
                step: step_number,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        for phase in Phase::vocabulary() {
            let token = phase.as_token();
            assert_eq!(Phase::parse(&token), Some(phase), "token {token}");
        }
    }

    #[test]
    fn test_vocabulary_size() {
        let vocab = Phase::vocabulary();
        assert_eq!(vocab.len(), 40);
        let tokens: std::collections::HashSet<String> =
            vocab.iter().map(|p| p.as_token()).collect();
        assert_eq!(tokens.len(), 40);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(Phase::parse("style_done"), None);
        assert_eq!(Phase::parse("unknown_pending"), None);
        assert_eq!(Phase::parse("style"), None);
        assert_eq!(Phase::parse(""), None);
    }

    #[test]
    fn test_parse_multi_word_step_names() {
        let phase = Phase::parse("space_renders_pending").unwrap();
        assert_eq!(phase.step, Step::SpaceRenders);
        assert_eq!(phase.stage, Stage::Pending);

        let phase = Phase::parse("space_panoramas_qa_failed").unwrap();
        assert_eq!(phase.step, Step::SpacePanoramas);
        assert_eq!(phase.stage, Stage::QaFailed);
    }

    #[test]
    fn test_guard_accepts_consistent_pairs() {
        for phase in Phase::vocabulary() {
            assert!(PhaseGuard::validate(&phase, phase.step.number()).is_ok());
        }
    }

    #[test]
    fn test_guard_rejects_every_inconsistent_pair() {
        for phase in Phase::vocabulary() {
            for n in 0..=Step::MAX {
                if n != phase.step.number() {
                    assert!(PhaseGuard::validate(&phase, n).is_err());
                }
            }
        }
    }

    #[test]
    fn test_serde_as_token() {
        let phase = Phase::review(Step::Style);
        let json = serde_json::to_string(&phase).unwrap();
        assert_eq!(json, "\"style_review\"");
        let back: Phase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, phase);
    }
}

use serde::{Deserialize, Serialize};

/// Per-candidate judge decision. There is no "unknown": a candidate either
/// has a verdict or has none at all, and an absent verdict is never treated
/// as approval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JudgeDecision {
    Approved,
    Rejected,
}

impl JudgeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Structured rejection category emitted directly by the judge. Retry
/// constraints switch on this enum; prose descriptions are display-only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    Geometry,
    Proportion,
    BedSizing,
    FurnitureHallucination,
    Other,
}

impl RejectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geometry => "geometry",
            Self::Proportion => "proportion",
            Self::BedSizing => "bed_sizing",
            Self::FurnitureHallucination => "furniture_hallucination",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JudgeReason {
    pub category: RejectionCategory,
    pub description: String,
}

/// Full verdict for one candidate. `qa_executed` is false when the judge
/// call timed out or never ran; such verdicts are always `Rejected`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeVerdict {
    pub decision: JudgeDecision,
    pub score: u8,
    pub reasons: Vec<JudgeReason>,
    pub qa_executed: bool,
}

impl JudgeVerdict {
    pub fn approved(score: u8) -> Self {
        Self {
            decision: JudgeDecision::Approved,
            score: score.min(100),
            reasons: Vec::new(),
            qa_executed: true,
        }
    }

    pub fn rejected(score: u8, reasons: Vec<JudgeReason>) -> Self {
        Self {
            decision: JudgeDecision::Rejected,
            score: score.min(100),
            reasons,
            qa_executed: true,
        }
    }

    /// Fail-closed verdict for a judge that never answered. Never approved.
    pub fn not_executed(description: impl Into<String>) -> Self {
        Self {
            decision: JudgeDecision::Rejected,
            score: 0,
            reasons: vec![JudgeReason {
                category: RejectionCategory::Other,
                description: description.into(),
            }],
            qa_executed: false,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == JudgeDecision::Approved
    }

    /// Distinct rejection categories, in first-seen order.
    pub fn categories(&self) -> Vec<RejectionCategory> {
        let mut seen = Vec::new();
        for reason in &self.reasons {
            if !seen.contains(&reason.category) {
                seen.push(reason.category);
            }
        }
        seen
    }
}

/// Step-level verdict over all candidates of one invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepVerdict {
    Approved,
    Rejected,
    PartialSuccess,
}

impl StepVerdict {
    /// Aggregation law: approved iff zero rejections, rejected iff all
    /// rejected, partial success otherwise. `total` must be >= 1.
    pub fn aggregate(total: usize, rejected: usize) -> Self {
        debug_assert!(rejected <= total && total >= 1);
        if rejected == 0 {
            Self::Approved
        } else if rejected == total {
            Self::Rejected
        } else {
            Self::PartialSuccess
        }
    }

    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a JudgeVerdict>) -> Self {
        let mut total = 0;
        let mut rejected = 0;
        for v in verdicts {
            total += 1;
            if !v.is_approved() {
                rejected += 1;
            }
        }
        Self::aggregate(total, rejected)
    }

    /// Partial success is not a failure: the step still proceeds to review.
    pub fn proceeds_to_review(&self) -> bool {
        !matches!(self, Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::PartialSuccess => "partial_success",
        }
    }
}

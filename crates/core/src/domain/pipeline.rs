use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::phase::Phase;
use crate::domain::quality::{QualityPolicy, SpaceInfo};
use crate::domain::retry::RetryState;
use crate::domain::step::Step;
use crate::domain::verdict::JudgeDecision;

/// Per-step attempt ceiling for the auto-retry controller.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Shared auto-retry budget across all steps of one pipeline run.
pub const GLOBAL_RETRY_BUDGET: u32 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    #[default]
    Linear,
    MultiSpace,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::MultiSpace => "multi_space",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "linear" => Some(Self::Linear),
            "multi_space" => Some(Self::MultiSpace),
            _ => None,
        }
    }
}

/// Current/latest summary of one generated candidate. The immutable audit
/// trail lives in the attempt table; this is what review and input
/// resolution read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSummary {
    pub artifact_id: Uuid,
    pub decision: JudgeDecision,
    pub reason: Option<String>,
    pub prompt: String,
    /// Human sign-off, required on the structural output before step 2.
    #[serde(default)]
    pub manually_approved: bool,
    /// Candidate chosen during review; used as the next step's input.
    #[serde(default)]
    pub selected: bool,
    /// Space this output belongs to, for batch steps in multi-space mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    /// Camera-angle keyword recorded for pose derivation in later
    /// panorama-type steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_angle: Option<String>,
}

/// A step records either one output or a candidate list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StepOutputSlot {
    Single(OutputSummary),
    Candidates(Vec<OutputSummary>),
}

impl StepOutputSlot {
    pub fn summaries(&self) -> &[OutputSummary] {
        match self {
            Self::Single(s) => std::slice::from_ref(s),
            Self::Candidates(v) => v.as_slice(),
        }
    }

    pub fn summaries_mut(&mut self) -> &mut [OutputSummary] {
        match self {
            Self::Single(s) => std::slice::from_mut(s),
            Self::Candidates(v) => v.as_mut_slice(),
        }
    }

    /// The output a downstream step consumes: the selected candidate,
    /// else the first approved one, else nothing.
    pub fn usable_output(&self) -> Option<&OutputSummary> {
        let summaries = self.summaries();
        summaries
            .iter()
            .find(|s| s.selected)
            .or_else(|| summaries.iter().find(|s| s.decision == JudgeDecision::Approved))
    }

    pub fn artifact_ids(&self) -> Vec<Uuid> {
        self.summaries().iter().map(|s| s.artifact_id).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipelineRequest {
    pub owner: String,
    #[serde(default)]
    pub mode: PipelineMode,
    #[serde(default)]
    pub quality: QualityPolicy,
    /// Source image, base64.
    pub source_image: String,
    #[serde(default = "default_source_mime")]
    pub source_mime: String,
}

fn default_source_mime() -> String {
    "image/jpeg".to_string()
}

/// The root aggregate. All mutation goes through read-modify-write with a
/// version compare-and-swap at the store; `total_retry_count` doubles as the
/// fencing token checked by late-arriving retry continuations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub owner: String,
    pub current_step: Step,
    pub phase: Phase,
    pub mode: PipelineMode,
    pub quality: QualityPolicy,
    pub source_artifact_id: Uuid,
    pub spaces: Vec<SpaceInfo>,
    pub last_error: Option<String>,
    pub step_outputs: BTreeMap<u8, StepOutputSlot>,
    pub step_retry_state: BTreeMap<u8, RetryState>,
    pub total_retry_count: u32,
    pub version: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(
        owner: impl Into<String>,
        mode: PipelineMode,
        quality: QualityPolicy,
        source_artifact_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            current_step: Step::Analysis,
            phase: Phase::pending(Step::Analysis),
            mode,
            quality,
            source_artifact_id,
            spaces: Vec::new(),
            last_error: None,
            step_outputs: BTreeMap::new(),
            step_retry_state: BTreeMap::new(),
            total_retry_count: 0,
            version: 0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Phase and step move together; the guard table makes any other pair
    /// unwritable.
    pub fn set_phase(&mut self, phase: Phase) {
        self.current_step = phase.step;
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    pub fn retry_state_mut(&mut self, step: Step) -> &mut RetryState {
        self.step_retry_state.entry(step.number()).or_default()
    }

    pub fn step_output(&self, step: Step) -> Option<&StepOutputSlot> {
        self.step_outputs.get(&step.number())
    }

    /// Walks backward from `below` to step 1 and returns the nearest usable
    /// recorded output, tolerating previously-skipped steps.
    pub fn resolve_input(&self, below: Step) -> Option<(Step, &OutputSummary)> {
        let mut n = below.number().checked_sub(1)?;
        while n >= 1 {
            if let Some(step) = Step::from_number(n) {
                if let Some(output) = self.step_output(step).and_then(|s| s.usable_output()) {
                    return Some((step, output));
                }
            }
            n -= 1;
        }
        None
    }

    /// Nearest camera-angle keyword recorded at or below `below`, for pose
    /// derivation in panorama-type steps.
    pub fn nearest_camera_angle(&self, below: Step) -> Option<&str> {
        let mut n = below.number().checked_sub(1)?;
        while n >= 1 {
            if let Some(slot) = Step::from_number(n).and_then(|s| self.step_output(s)) {
                if let Some(angle) = slot
                    .summaries()
                    .iter()
                    .filter_map(|s| s.camera_angle.as_deref())
                    .next()
                {
                    return Some(angle);
                }
            }
            n -= 1;
        }
        None
    }

    pub fn retry_budget_left(&self) -> bool {
        self.total_retry_count < GLOBAL_RETRY_BUDGET
    }

    /// Every artifact referenced at or beyond `from`, for rollback purging.
    /// The source artifact is never included.
    pub fn artifact_ids_from_step(&self, from: Step) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for (step, slot) in &self.step_outputs {
            if *step >= from.number() {
                ids.extend(slot.artifact_ids());
            }
        }
        for (step, state) in &self.step_retry_state {
            if *step >= from.number() {
                for attempt in &state.attempts {
                    ids.extend(attempt.artifact_ids.iter().copied());
                }
            }
        }
        ids.retain(|id| *id != self.source_artifact_id);
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

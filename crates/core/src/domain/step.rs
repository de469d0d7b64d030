use serde::{Deserialize, Serialize};

/// One of the eight fixed pipeline stages. The sequence is strictly linear;
/// step 0 runs as a separate single-attempt operation outside the
/// quality-gated loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Analysis,
    Structure,
    Style,
    Angles,
    Panorama,
    SpaceRenders,
    SpacePanoramas,
    Merge,
}

/// Which judge variant inspects a candidate for a given step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JudgeType {
    Render,
    Panorama,
    Merge,
}

impl JudgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Panorama => "panorama",
            Self::Merge => "merge",
        }
    }
}

impl Step {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 7;

    pub fn number(&self) -> u8 {
        match self {
            Self::Analysis => 0,
            Self::Structure => 1,
            Self::Style => 2,
            Self::Angles => 3,
            Self::Panorama => 4,
            Self::SpaceRenders => 5,
            Self::SpacePanoramas => 6,
            Self::Merge => 7,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Analysis),
            1 => Some(Self::Structure),
            2 => Some(Self::Style),
            3 => Some(Self::Angles),
            4 => Some(Self::Panorama),
            5 => Some(Self::SpaceRenders),
            6 => Some(Self::SpacePanoramas),
            7 => Some(Self::Merge),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Structure => "structure",
            Self::Style => "style",
            Self::Angles => "angles",
            Self::Panorama => "panorama",
            Self::SpaceRenders => "space_renders",
            Self::SpacePanoramas => "space_panoramas",
            Self::Merge => "merge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(Self::Analysis),
            "structure" => Some(Self::Structure),
            "style" => Some(Self::Style),
            "angles" => Some(Self::Angles),
            "panorama" => Some(Self::Panorama),
            "space_renders" => Some(Self::SpaceRenders),
            "space_panoramas" => Some(Self::SpacePanoramas),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(&self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }

    /// All eight steps in pipeline order.
    pub fn all() -> [Self; 8] {
        [
            Self::Analysis,
            Self::Structure,
            Self::Style,
            Self::Angles,
            Self::Panorama,
            Self::SpaceRenders,
            Self::SpacePanoramas,
            Self::Merge,
        ]
    }

    pub fn judge_type(&self) -> Option<JudgeType> {
        match self {
            Self::Analysis => None,
            Self::Structure | Self::Style | Self::Angles | Self::SpaceRenders => {
                Some(JudgeType::Render)
            }
            Self::Panorama | Self::SpacePanoramas => Some(JudgeType::Panorama),
            Self::Merge => Some(JudgeType::Merge),
        }
    }

    /// Structural conversion always renders exactly one candidate.
    pub fn single_candidate(&self) -> bool {
        matches!(self, Self::Structure)
    }

    /// Panorama-type steps derive camera poses from earlier camera-angle
    /// metadata when none are supplied.
    pub fn is_panorama(&self) -> bool {
        matches!(self, Self::Panorama | Self::SpacePanoramas)
    }

    /// Batch steps fan out over the analyzed spaces in multi-space mode.
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::SpaceRenders | Self::SpacePanoramas)
    }

    /// Steps eligible for asynchronous budgeted auto-retry. The panorama
    /// step runs its own bounded synchronous loop; batch and merge steps
    /// block for a human on full rejection.
    pub fn auto_retry_eligible(&self) -> bool {
        matches!(self, Self::Structure | Self::Style | Self::Angles)
    }
}

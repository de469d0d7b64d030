use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    #[default]
    Standard,
    High,
    Ultra,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::High => "high",
            Self::Ultra => "ultra",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "high" => Some(Self::High),
            "ultra" => Some(Self::Ultra),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    #[default]
    Landscape,
    Portrait,
    Square,
    Wide,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Square => "square",
            Self::Wide => "wide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "landscape" => Some(Self::Landscape),
            "portrait" => Some(Self::Portrait),
            "square" => Some(Self::Square),
            "wide" => Some(Self::Wide),
            _ => None,
        }
    }
}

/// Quality policy fixed at pipeline creation and applied to every
/// generation call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QualityPolicy {
    pub resolution: ResolutionTier,
    pub aspect_ratio: AspectRatio,
}

/// One space identified by the step-0 analysis. Batch steps fan out over
/// these in multi-space mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceInfo {
    pub name: String,
    pub kind: String,
}

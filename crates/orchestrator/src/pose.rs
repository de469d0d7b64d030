//! Camera pose derivation for panorama-type steps. The pose comes from the
//! nearest recorded camera-angle keyword of an earlier step; with no keyword
//! on record the pose falls back to room center.

/// Viewpoint handed to the panorama prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraPose {
    pub keyword: &'static str,
    pub description: &'static str,
}

pub const ROOM_CENTER: CameraPose = CameraPose {
    keyword: "center",
    description: "standing at the center of the room at eye height",
};

const POSES: &[CameraPose] = &[
    ROOM_CENTER,
    CameraPose {
        keyword: "corner",
        description: "standing in the far corner of the room, looking across it",
    },
    CameraPose {
        keyword: "doorway",
        description: "standing in the doorway, looking into the room",
    },
    CameraPose {
        keyword: "window",
        description: "standing with the back to the main window, facing the room",
    },
    CameraPose {
        keyword: "overhead",
        description: "elevated viewpoint near the ceiling, angled down into the room",
    },
];

/// Keyword lookup. Matching is substring-based so a recorded angle like
/// "left corner view" still resolves.
pub fn derive_pose(camera_angle: Option<&str>) -> CameraPose {
    let Some(angle) = camera_angle else {
        return ROOM_CENTER;
    };
    let angle = angle.to_ascii_lowercase();
    POSES
        .iter()
        .find(|pose| angle.contains(pose.keyword))
        .copied()
        .unwrap_or(ROOM_CENTER)
}

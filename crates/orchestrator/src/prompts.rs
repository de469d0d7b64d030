//! Prompt assembly for the generation steps. Corrective clauses are derived
//! from the structured rejection categories, never by re-parsing judge prose;
//! the panorama loop is the one place verbatim judge feedback is quoted back.

use pipeline_core::{RejectionCategory, Step};

/// Base instruction for a step's generation call.
pub fn base_prompt(step: Step) -> &'static str {
    match step {
        Step::Analysis => "",
        Step::Structure => {
            "Convert the floor plan in the reference image into a clean structural \
             3D rendering. Preserve every wall, opening and fixed dimension exactly; \
             add no furniture that is not drawn in the plan."
        }
        Step::Style => {
            "Apply the requested interior style to the structural rendering in the \
             reference image. Keep walls, openings and proportions unchanged."
        }
        Step::Angles => {
            "Render the styled interior from a new camera angle. Keep geometry, \
             furnishing and lighting consistent with the reference image."
        }
        Step::Panorama => {
            "Produce a seamless 360-degree equirectangular panorama of the interior \
             shown in the reference image. Left and right edges must join without a \
             visible seam and vertical lines must stay vertical."
        }
        Step::SpaceRenders => {
            "Render the named space of this property in the established style. Stay \
             consistent with the reference image for materials and lighting."
        }
        Step::SpacePanoramas => {
            "Produce a seamless 360-degree equirectangular panorama of the named \
             space, consistent with its still render in the reference image."
        }
        Step::Merge => {
            "Merge the reference renders into one coherent presentation image. Do \
             not invent rooms or furniture absent from the references."
        }
    }
}

/// Constraint sentence appended for one structured rejection category.
pub fn corrective_clause(category: RejectionCategory) -> &'static str {
    match category {
        RejectionCategory::Geometry => {
            "Keep all wall lines straight and room geometry exactly as in the reference; \
             do not bend, skew or move any structural element."
        }
        RejectionCategory::Proportion => {
            "Respect real-world proportions: ceiling height, door and window sizes must \
             match the reference dimensions."
        }
        RejectionCategory::BedSizing => {
            "Render beds at realistic dimensions for the room; a bed must never span a \
             full wall or crowd out circulation space."
        }
        RejectionCategory::FurnitureHallucination => {
            "Only include furniture present in the reference; do not add new objects, \
             plants or decorations."
        }
        RejectionCategory::Other => {
            "Follow the reference image strictly and avoid introducing any deviation \
             from it."
        }
    }
}

/// Base prompt plus corrective clauses from a prior rejected attempt.
pub fn compose(step: Step, clauses: &[String], space: Option<&str>) -> String {
    let mut prompt = String::from(base_prompt(step));
    if let Some(space) = space {
        prompt.push_str(&format!(" The space to render is: {space}."));
    }
    for clause in clauses {
        prompt.push(' ');
        prompt.push_str(clause);
    }
    prompt
}

/// Panorama retry prompt: the previous attempt's judge feedback is quoted
/// verbatim so the model sees exactly what failed.
pub fn panorama_retry(base: &str, feedback: &[String]) -> String {
    let mut prompt = String::from(base);
    if !feedback.is_empty() {
        prompt.push_str(" The previous attempt was rejected for these reasons: ");
        prompt.push_str(&feedback.join("; "));
        prompt.push_str(". Correct every one of them.");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_generation_step_has_a_prompt() {
        for step in Step::all() {
            if step != Step::Analysis {
                assert!(!base_prompt(step).is_empty(), "step {}", step.name());
            }
        }
    }

    #[test]
    fn test_compose_appends_clauses_and_space() {
        let clauses = vec![corrective_clause(RejectionCategory::BedSizing).to_string()];
        let prompt = compose(Step::SpaceRenders, &clauses, Some("master bedroom"));
        assert!(prompt.contains("master bedroom"));
        assert!(prompt.contains("realistic dimensions"));
    }

    #[test]
    fn test_panorama_retry_quotes_feedback_verbatim() {
        let feedback = vec!["visible seam at the left edge".to_string()];
        let prompt = panorama_retry(base_prompt(Step::Panorama), &feedback);
        assert!(prompt.contains("visible seam at the left edge"));
    }

    #[test]
    fn test_panorama_retry_without_feedback_is_base() {
        let base = base_prompt(Step::Panorama);
        assert_eq!(panorama_retry(base, &[]), base);
    }
}

use cardsmith_contracts::scenario::Scenario;

/// Inputs for the image prompt beyond the scenario itself.
#[derive(Debug, Clone, Default)]
pub struct PromptSubjects<'a> {
    pub sender_name: &'a str,
    pub recipient_name: &'a str,
    /// Appearance notes, when portrait description is enabled.
    pub sender_description: Option<&'a str>,
    pub recipient_description: Option<&'a str>,
}

pub fn build_image_prompt(
    scenario: Scenario,
    aspect_ratio: &str,
    subjects: &PromptSubjects<'_>,
) -> String {
    let mut lines = vec![
        format!(
            "Create a warm, festive Christmas card illustration in {aspect_ratio} landscape format."
        ),
        format!(
            "Scene: the two people from the reference photos are {}.",
            scenario.description()
        ),
        format!(
            "The first reference photo is {}; the second reference photo is {}.",
            subjects.sender_name.trim(),
            subjects.recipient_name.trim()
        ),
    ];
    for (name, description) in [
        (subjects.sender_name, subjects.sender_description),
        (subjects.recipient_name, subjects.recipient_description),
    ] {
        if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
            lines.push(format!("{} looks like this: {description}", name.trim()));
        }
    }
    lines.push("Requirements:".to_string());
    lines.push(format!("- Output aspect ratio {aspect_ratio}."));
    lines.push(
        "- Preserve both people's likeness exactly: face shape, skin tone, hair and age."
            .to_string(),
    );
    lines.push("- Use one consistent art style for the whole image.".to_string());
    lines.push("- Show only these two people; no extra characters.".to_string());
    lines.push("- Do not render any text or lettering.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use cardsmith_contracts::scenario::Scenario;

    use super::{build_image_prompt, PromptSubjects};

    #[test]
    fn prompt_embeds_scenario_ratio_and_constraints() {
        let prompt = build_image_prompt(
            Scenario::IceSkating,
            "3:2",
            &PromptSubjects {
                sender_name: "Dana",
                recipient_name: "Lee",
                ..PromptSubjects::default()
            },
        );
        assert!(prompt.contains(Scenario::IceSkating.description()));
        assert!(prompt.contains("3:2 landscape"));
        assert!(prompt.contains("first reference photo is Dana"));
        assert!(prompt.contains("likeness"));
        assert!(prompt.contains("consistent art style"));
        assert!(prompt.contains("no extra characters"));
        assert!(!prompt.contains("looks like this"));
    }

    #[test]
    fn descriptions_are_appended_when_present() {
        let prompt = build_image_prompt(
            Scenario::BakingCookies,
            "1:1",
            &PromptSubjects {
                sender_name: "Dana",
                recipient_name: "Lee",
                sender_description: Some("short grey hair, round glasses"),
                recipient_description: Some("  "),
            },
        );
        assert!(prompt.contains("Dana looks like this: short grey hair, round glasses"));
        assert!(!prompt.contains("Lee looks like this"));
    }
}

//! Versioned persona templates.
//!
//! The advisor prompt went through many near-identical revisions; they
//! are configuration, not code paths. Each revision is an embedded
//! record selected by id at deployment time, with the newest version as
//! the default. Template text is opaque here apart from the
//! substitution markers consumed by the prompt assembler.

/// Substitution markers every template is expected to carry.
pub const KNOWLEDGE_MARKER: &str = "{{knowledge}}";
pub const FILES_MARKER: &str = "{{files}}";
pub const HISTORY_MARKER: &str = "{{history}}";
pub const MESSAGE_MARKER: &str = "{{message}}";

#[derive(Debug, Clone, Copy)]
pub struct PersonaTemplate {
    pub id: &'static str,
    pub version: u32,
    pub template: &'static str,
}

pub const TEMPLATES: &[PersonaTemplate] = &[
    PersonaTemplate {
        id: "advisor-v10",
        version: 10,
        template: include_str!("../../assets/personas/advisor_v10.md"),
    },
    PersonaTemplate {
        id: "advisor-v11",
        version: 11,
        template: include_str!("../../assets/personas/advisor_v11.md"),
    },
];

pub fn find(id: &str) -> Option<&'static PersonaTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}

pub fn latest() -> &'static PersonaTemplate {
    TEMPLATES
        .iter()
        .max_by_key(|t| t.version)
        .expect("at least one persona template is embedded")
}

/// Resolve the configured persona id, or the newest template when none
/// is configured.
pub fn resolve(id: Option<&str>) -> Result<&'static PersonaTemplate, String> {
    match id {
        None => Ok(latest()),
        Some(id) => find(id).ok_or_else(|| {
            let available: Vec<&str> = TEMPLATES.iter().map(|t| t.id).collect();
            format!(
                "Persona '{}' not found. Available personas: {}",
                id,
                available.join(", ")
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_is_the_highest_version() {
        assert_eq!(latest().id, "advisor-v11");
    }

    #[test]
    fn resolve_defaults_to_latest() {
        assert_eq!(resolve(None).unwrap().id, "advisor-v11");
        assert_eq!(resolve(Some("advisor-v10")).unwrap().version, 10);
        assert!(resolve(Some("advisor-v99")).is_err());
    }

    #[test]
    fn every_template_carries_the_substitution_markers() {
        for t in TEMPLATES {
            for marker in [KNOWLEDGE_MARKER, FILES_MARKER, HISTORY_MARKER, MESSAGE_MARKER] {
                assert!(
                    t.template.contains(marker),
                    "{} is missing {}",
                    t.id,
                    marker
                );
            }
        }
    }
}

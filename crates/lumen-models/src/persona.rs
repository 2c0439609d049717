//! Persona definitions.
//!
//! A persona selects the reference voice and portrait, the language-model
//! delivery instructions, and the default motion style in one tag.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of supported personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Mkbhd,
    Ijustine,
}

impl Persona {
    pub const ALL: &'static [Persona] = &[Persona::Mkbhd, Persona::Ijustine];

    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Mkbhd => "mkbhd",
            Persona::Ijustine => "ijustine",
        }
    }

    /// Asset names and generation defaults for this persona.
    pub fn profile(&self) -> PersonaProfile {
        match self {
            Persona::Mkbhd => PersonaProfile {
                persona: *self,
                reference_audio: "mkbhd.wav",
                reference_image: "mkbhd.jpg",
                default_style: "calm_tech",
                default_temperature: 0.6,
                style_hint: "Write in a smooth, measured tech-reviewer voice. \
                    Prefer longer segments with deliberate pacing. Use pauses of \
                    0.4 to 0.5 seconds between thoughts. Emphasise only the one \
                    or two words that truly carry each point.",
            },
            Persona::Ijustine => PersonaProfile {
                persona: *self,
                reference_audio: "ijustine.wav",
                reference_image: "ijustine.jpg",
                default_style: "energetic",
                default_temperature: 0.9,
                style_hint: "Write in an upbeat, excited creator voice. Keep \
                    segments short and punchy with pauses of 0.2 to 0.3 seconds. \
                    Emphasise frequently, especially product names and reactions.",
            },
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Persona {
    type Err = PersonaParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mkbhd" => Ok(Persona::Mkbhd),
            "ijustine" => Ok(Persona::Ijustine),
            _ => Err(PersonaParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown persona: {0}")]
pub struct PersonaParseError(String);

/// Resolved persona assets and generation defaults. Asset names are joined
/// with the configured assets directory by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaProfile {
    pub persona: Persona,
    pub reference_audio: &'static str,
    pub reference_image: &'static str,
    pub default_style: &'static str,
    pub default_temperature: f64,
    pub style_hint: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::StyleProfile;

    #[test]
    fn test_persona_parse() {
        assert_eq!("mkbhd".parse::<Persona>().unwrap(), Persona::Mkbhd);
        assert_eq!("iJustine".parse::<Persona>().unwrap(), Persona::Ijustine);
        assert!("casey".parse::<Persona>().is_err());
    }

    #[test]
    fn test_persona_display_round_trip() {
        for persona in Persona::ALL {
            assert_eq!(persona.to_string().parse::<Persona>().unwrap(), *persona);
        }
    }

    #[test]
    fn test_default_styles_resolve_to_presets() {
        for persona in Persona::ALL {
            let profile = persona.profile();
            assert!(StyleProfile::preset(profile.default_style).is_some());
        }
    }

    #[test]
    fn test_serde_uses_snake_case_tag() {
        assert_eq!(serde_json::to_string(&Persona::Mkbhd).unwrap(), "\"mkbhd\"");
    }
}

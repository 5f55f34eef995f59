use crate::validation::{
    ValidationError, sanitize_url, validate_linkedin_url, validate_pitch_text,
    validate_portfolio_url,
};
use serde::{Deserialize, Serialize};

/// Which field of a package an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Portfolio,
    Linkedin,
    Pitch,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Field::Portfolio => "portfolio",
            Field::Linkedin => "linkedin",
            Field::Pitch => "pitch",
        })
    }
}

/// The portfolio, LinkedIn profile and pitch shared between a sender and a viewer.
///
/// Only constructible through [`PitchPackage::new`], so every instance holds
/// sanitized, validated URLs and a pitch long enough to narrate. There are no
/// setters: the viewer reads a package, it never changes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PitchPackage {
    portfolio_url: String,
    linkedin_url: String,
    pitch_text: String,
}

impl PitchPackage {
    /// Validates and canonicalizes the three inputs.
    ///
    /// Every field is checked independently so the composer can report all
    /// problems at once.
    pub fn new(
        portfolio_url: &str,
        linkedin_url: &str,
        pitch_text: &str,
    ) -> Result<Self, Vec<(Field, ValidationError)>> {
        let mut problems = Vec::new();

        let portfolio = match validate_portfolio_url(portfolio_url) {
            Ok(()) => canonical(portfolio_url),
            Err(e) => Err(e),
        };
        let linkedin = match validate_linkedin_url(linkedin_url) {
            Ok(()) => canonical(linkedin_url),
            Err(e) => Err(e),
        };

        if let Err(e) = &portfolio {
            problems.push((Field::Portfolio, e.clone()));
        }
        if let Err(e) = &linkedin {
            problems.push((Field::Linkedin, e.clone()));
        }
        if let Err(e) = validate_pitch_text(pitch_text) {
            problems.push((Field::Pitch, e));
        }

        match (portfolio, linkedin) {
            (Ok(portfolio_url), Ok(linkedin_url)) if problems.is_empty() => Ok(Self {
                portfolio_url,
                linkedin_url,
                pitch_text: pitch_text.trim().to_string(),
            }),
            _ => Err(problems),
        }
    }

    pub fn portfolio_url(&self) -> &str {
        &self.portfolio_url
    }

    pub fn linkedin_url(&self) -> &str {
        &self.linkedin_url
    }

    pub fn pitch_text(&self) -> &str {
        &self.pitch_text
    }
}

fn canonical(input: &str) -> Result<String, ValidationError> {
    let sanitized = sanitize_url(input);
    if sanitized.is_empty() {
        Err(ValidationError::UnparseableUrl)
    } else {
        Ok(sanitized)
    }
}

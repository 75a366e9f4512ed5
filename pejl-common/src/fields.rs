//! Field taxonomy for the friction survey
//!
//! The four dimensions are a structural invariant of the scoring model, not
//! configurable data. The Danish codes (MENING, TRYGHED, KAN, BESVAER) are
//! the internal/storage taxonomy; display names are a separate lookup so the
//! presentation layer can swap them without touching the enumeration.

use serde::{Deserialize, Serialize};

/// The four friction dimensions
///
/// Display order is fixed (MENING, TRYGHED, KAN, BESVAER) and never derived
/// from scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Meaning: sense of purpose in the work
    Mening,

    /// Safety: psychological safety within the unit
    Tryghed,

    /// Ability: confidence in one's own competence
    Kan,

    /// Friction: operational effort and obstruction
    Besvaer,
}

impl Field {
    /// All dimensions in fixed display order
    pub const ALL: [Field; 4] = [Field::Mening, Field::Tryghed, Field::Kan, Field::Besvaer];

    /// Storage code used in the `questions.field` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Mening => "MENING",
            Field::Tryghed => "TRYGHED",
            Field::Kan => "KAN",
            Field::Besvaer => "BESVAER",
        }
    }

    /// Parse a storage code
    pub fn parse(s: &str) -> Option<Field> {
        match s {
            "MENING" => Some(Field::Mening),
            "TRYGHED" => Some(Field::Tryghed),
            "KAN" => Some(Field::Kan),
            "BESVAER" => Some(Field::Besvaer),
            _ => None,
        }
    }

    /// Human-readable name for reports and the admin UI
    ///
    /// Kept separate from the storage codes: presentation can localize this
    /// lookup while the taxonomy stays closed.
    pub fn display_name(&self) -> &'static str {
        match self {
            Field::Mening => "Meaning",
            Field::Tryghed => "Safety",
            Field::Kan => "Ability",
            Field::Besvaer => "Friction",
        }
    }
}

/// Who is answering: the rater group a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondentCategory {
    /// A member of the unit rating their own experience
    Employee,

    /// The unit leader rating the team
    LeaderAssess,

    /// The unit leader rating themselves
    LeaderSelf,
}

impl RespondentCategory {
    pub const ALL: [RespondentCategory; 3] = [
        RespondentCategory::Employee,
        RespondentCategory::LeaderAssess,
        RespondentCategory::LeaderSelf,
    ];

    /// Storage code used in `tokens.respondent_category` and
    /// `responses.respondent_category`
    pub fn as_str(&self) -> &'static str {
        match self {
            RespondentCategory::Employee => "employee",
            RespondentCategory::LeaderAssess => "leader_assess",
            RespondentCategory::LeaderSelf => "leader_self",
        }
    }

    pub fn parse(s: &str) -> Option<RespondentCategory> {
        match s {
            "employee" => Some(RespondentCategory::Employee),
            "leader_assess" => Some(RespondentCategory::LeaderAssess),
            "leader_self" => Some(RespondentCategory::LeaderSelf),
            _ => None,
        }
    }
}

/// Assessment lifecycle states
///
/// `draft -> scheduled -> sent`, with `scheduled -> cancelled`. `sent` and
/// `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Draft,
    Scheduled,
    Sent,
    Cancelled,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Draft => "draft",
            AssessmentStatus::Scheduled => "scheduled",
            AssessmentStatus::Sent => "sent",
            AssessmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<AssessmentStatus> {
        match s {
            "draft" => Some(AssessmentStatus::Draft),
            "scheduled" => Some(AssessmentStatus::Scheduled),
            "sent" => Some(AssessmentStatus::Sent),
            "cancelled" => Some(AssessmentStatus::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_codes_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::parse(field.as_str()), Some(field));
        }
        assert_eq!(Field::parse("BESVÆR"), None);
    }

    #[test]
    fn display_order_is_fixed() {
        let names: Vec<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
        assert_eq!(names, vec!["MENING", "TRYGHED", "KAN", "BESVAER"]);
    }

    #[test]
    fn respondent_category_codes_round_trip() {
        for cat in RespondentCategory::ALL {
            assert_eq!(RespondentCategory::parse(cat.as_str()), Some(cat));
        }
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            AssessmentStatus::Draft,
            AssessmentStatus::Scheduled,
            AssessmentStatus::Sent,
            AssessmentStatus::Cancelled,
        ] {
            assert_eq!(AssessmentStatus::parse(status.as_str()), Some(status));
        }
    }
}

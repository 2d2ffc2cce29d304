//! Knowledge domains
//!
//! Every question is routed to one or more of these domains, and each domain
//! owns at most one document collection (the collection name is the domain name).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Fixed set of knowledge domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    #[serde(alias = "faculty")]
    FacultyInfo,
    Staff,
    Research,
    Publications,
    Labs,
    ProgramsCourses,
    Recruitments,
    Magazine,
    #[serde(alias = "institutional")]
    NiiInfo,
}

impl Domain {
    /// All domains in tie-break priority order: person-centric first,
    /// institutional last.
    pub const ALL: [Domain; 9] = [
        Domain::FacultyInfo,
        Domain::Staff,
        Domain::Research,
        Domain::Publications,
        Domain::Labs,
        Domain::ProgramsCourses,
        Domain::Recruitments,
        Domain::Magazine,
        Domain::NiiInfo,
    ];

    /// Domain used when a question carries no routing signal at all
    pub const DEFAULT: Domain = Domain::NiiInfo;

    /// Stable identifier, also the collection name
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::FacultyInfo => "faculty_info",
            Domain::Staff => "staff",
            Domain::Research => "research",
            Domain::Publications => "publications",
            Domain::Labs => "labs",
            Domain::ProgramsCourses => "programs_courses",
            Domain::Recruitments => "recruitments",
            Domain::Magazine => "magazine",
            Domain::NiiInfo => "nii_info",
        }
    }

    /// Tie-break rank, lower wins
    pub fn priority(&self) -> usize {
        Domain::ALL
            .iter()
            .position(|d| d == self)
            .unwrap_or(Domain::ALL.len())
    }

    /// Whether questions in this domain are usually about a specific person
    pub fn is_person_centric(&self) -> bool {
        matches!(
            self,
            Domain::FacultyInfo
                | Domain::Staff
                | Domain::Research
                | Domain::Publications
                | Domain::Labs
        )
    }

    /// Human-readable label used in clarifying questions
    pub fn label(&self) -> &'static str {
        match self {
            Domain::FacultyInfo => "faculty profiles",
            Domain::Staff => "staff and contact details",
            Domain::Research => "research areas",
            Domain::Publications => "publications",
            Domain::Labs => "labs and lab members",
            Domain::ProgramsCourses => "programs and courses",
            Domain::Recruitments => "recruitments and openings",
            Domain::Magazine => "the institute magazine",
            Domain::NiiInfo => "general institute information",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faculty_info" | "faculty" => Ok(Domain::FacultyInfo),
            "staff" => Ok(Domain::Staff),
            "research" => Ok(Domain::Research),
            "publications" => Ok(Domain::Publications),
            "labs" => Ok(Domain::Labs),
            "programs_courses" => Ok(Domain::ProgramsCourses),
            "recruitments" => Ok(Domain::Recruitments),
            "magazine" => Ok(Domain::Magazine),
            "nii_info" | "institutional" => Ok(Domain::NiiInfo),
            other => Err(AppError::Validation {
                message: format!("Unknown domain '{}'", other),
                field: Some("domain".to_string()),
            }),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::entities::ProjectClassId;

/// How convenor hints feed into the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HintSettings {
    pub use_hints: bool,
    /// turn `Require` into `StrongEncourage` instead of a hard constraint
    pub require_to_encourage: bool,
    /// turn `Forbid` into `StrongDiscourage` instead of removing the choice
    pub forbid_to_discourage: bool,
    pub encourage_bias: f64,
    pub discourage_bias: f64,
    pub strong_encourage_bias: f64,
    pub strong_discourage_bias: f64,
}

impl Default for HintSettings {
    fn default() -> Self {
        Self {
            use_hints: true,
            require_to_encourage: false,
            forbid_to_discourage: false,
            encourage_bias: 2.0,
            discourage_bias: 0.5,
            strong_encourage_bias: 5.0,
            strong_discourage_bias: 0.2,
        }
    }
}

/// The tunable knobs stored on a matching attempt.
///
/// Every bias and penalty is used by absolute value, a negative number does not
/// flip its meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingParams {
    pub year: i32,
    pub project_classes: Vec<ProjectClassId>,
    pub include_only_submitted: bool,
    pub ignore_per_faculty_limits: bool,
    pub ignore_programme_prefs: bool,
    /// attempt-wide CATS limits, applied to everybody
    pub supervising_limit: Option<u32>,
    pub marking_limit: Option<u32>,
    pub max_marking_multiplicity: u32,
    pub max_different_group_projects: Option<u32>,
    pub max_different_all_projects: Option<u32>,
    pub programme_bias: f64,
    pub bookmark_bias: f64,
    pub levelling_bias: f64,
    pub intra_group_tension: f64,
    pub supervising_pressure: f64,
    pub marking_pressure: f64,
    pub cats_violation_penalty: f64,
    pub no_assignment_penalty: f64,
    pub hints: HintSettings,
}

impl Default for MatchingParams {
    fn default() -> Self {
        Self {
            year: 0,
            project_classes: Vec::new(),
            include_only_submitted: false,
            ignore_per_faculty_limits: false,
            ignore_programme_prefs: false,
            supervising_limit: None,
            marking_limit: None,
            max_marking_multiplicity: 1,
            max_different_group_projects: None,
            max_different_all_projects: None,
            programme_bias: 1.5,
            bookmark_bias: 0.8,
            levelling_bias: 1.0,
            intra_group_tension: 2.0,
            supervising_pressure: 1.0,
            marking_pressure: 1.0,
            cats_violation_penalty: 1000.0,
            no_assignment_penalty: 5.0,
            hints: HintSettings::default(),
        }
    }
}

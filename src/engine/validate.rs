use serde::Serialize;
use std::collections::HashSet;

use crate::challenge::{Catalog, Category, Challenge};
use crate::engine::rules::{MarkupRule, ScriptRule};

#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    /// Not fatal: e.g. test names graded by the fallback.
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn push_error(&mut self, code: &'static str, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationIssue {
            code,
            message: message.into(),
        });
    }

    pub fn push_warning(&mut self, code: &'static str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            code,
            message: message.into(),
        });
    }

    pub fn is_valid(&self) -> bool {
        self.valid && self.errors.is_empty()
    }
}

pub fn validate_catalog(catalog: &Catalog) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if catalog.is_empty() {
        result.push_error("CATALOG_EMPTY", "Catalog contains no challenges");
        return result;
    }

    let mut ids = HashSet::new();
    for challenge in catalog.all() {
        if !ids.insert(challenge.id.as_str()) {
            result.push_error(
                "CHALLENGE_DUPLICATE_ID",
                format!("Duplicate challenge id: {}", challenge.id),
            );
        }
        validate_challenge(challenge, &mut result);
    }

    result
}

/* ---------------- challenge ---------------- */

fn validate_challenge(challenge: &Challenge, result: &mut ValidationResult) {
    let id = &challenge.id;

    if id.trim().is_empty() {
        result.push_error("CHALLENGE_ID_EMPTY", format!("Challenge '{}' has an empty id", challenge.title));
    }

    if challenge.test_cases.is_empty() {
        result.push_error(
            "CHALLENGE_NO_TESTS",
            format!("Challenge {} has no test cases", id),
        );
    }

    if challenge.points == 0 {
        result.push_warning(
            "CHALLENGE_ZERO_POINTS",
            format!("Challenge {} awards no points", id),
        );
    }

    let mut names = HashSet::new();
    for tc in &challenge.test_cases {
        if !names.insert(tc.name.trim()) {
            result.push_error(
                "TEST_DUPLICATE_NAME",
                format!("Challenge {} repeats test '{}'", id, tc.name),
            );
        }

        let graded_by_fallback = match challenge.category {
            Category::HtmlCss => matches!(MarkupRule::resolve(&tc.name), MarkupRule::Unknown(_)),
            Category::JavaScript => matches!(ScriptRule::resolve(&tc.name), ScriptRule::Unknown(_)),
        };
        if graded_by_fallback {
            result.push_warning(
                "TEST_NO_RULE",
                format!(
                    "Challenge {}: test '{}' has no {} rule and is graded by the fallback",
                    id, tc.name, challenge.category
                ),
            );
        }
    }
}

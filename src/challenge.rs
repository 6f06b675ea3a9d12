// src/challenge.rs

//! Challenge data model and the catalog that serves it.
//!
//! A challenge is immutable once loaded. The catalog is either the
//! built-in set below or a directory of YAML / JSON files, one challenge
//! per file, discovered recursively.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::read_to_string;

/// Which rule family grades a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "HTML & CSS")]
    HtmlCss,
    #[serde(rename = "JavaScript")]
    JavaScript,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::HtmlCss => f.write_str("HTML & CSS"),
            Category::JavaScript => f.write_str("JavaScript"),
        }
    }
}

/// A named check with a human description.
///
/// `name` selects the rule that grades it (see `engine::rules`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub points: u32,

    /// Countdown length in seconds.
    #[serde(default)]
    pub time_limit: u64,

    /// Markdown / HTML instructions shown next to the editor.
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

fn default_difficulty() -> String {
    "Beginner".to_string()
}

/// The set of challenges the tool can grade.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    challenges: Vec<Challenge>,
}

impl Catalog {
    pub fn new(challenges: Vec<Challenge>) -> Self {
        Self { challenges }
    }

    /// Load every `.yaml`, `.yml` and `.json` file under `dir`.
    ///
    /// Files are read in path order so listings are stable.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("Catalog directory does not exist: {}", dir.display());
        }

        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry.with_context(|| format!("Failed to walk {:?}", dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_lowercase();
            if matches!(ext.as_str(), "yaml" | "yml" | "json") {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        let mut challenges = Vec::with_capacity(paths.len());
        for path in paths {
            challenges.push(load_challenge(&path)?);
        }

        tracing::debug!(dir = %dir.display(), count = challenges.len(), "catalog loaded");
        Ok(Self { challenges })
    }

    /// Catalog directory if configured, built-in challenges otherwise.
    pub fn resolve(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(d) => Self::load_dir(d),
            None => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.id == id)
    }

    pub fn all(&self) -> &[Challenge] {
        &self.challenges
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }

    /// Challenges shipped with the binary.
    pub fn builtin() -> Self {
        Self::new(vec![
            Challenge {
                id: "landing-page".into(),
                title: "Build a Landing Page".into(),
                description: "Lay out a page with semantic landmarks and responsive styling.".into(),
                category: Category::HtmlCss,
                difficulty: "Beginner".into(),
                points: 200,
                time_limit: 1800,
                instructions: "Create a page with a `<header>` containing a `<nav>` of at least \
                               three links, a `<main>` with a heading, a paragraph and an image, \
                               and a `<footer>`. Style it and make it responsive."
                    .into(),
                starter_code: "<!DOCTYPE html>\n<html>\n<head>\n  <title>My Page</title>\n</head>\n<body>\n\n</body>\n</html>\n".into(),
                test_cases: cases(&[
                    ("Header exists", "The page has a <header> element"),
                    ("Navigation menu", "A <nav> with at least 3 links"),
                    ("Main content", "<main> with a heading, paragraph and image"),
                    ("Footer exists", "The page has a <footer> element"),
                    ("CSS styling", "The page is styled"),
                    ("Responsive design", "Viewport meta tag plus media queries or relative units"),
                ]),
            },
            Challenge {
                id: "array-sum".into(),
                title: "Sum an Array".into(),
                description: "Return the sum of every number in an array.".into(),
                category: Category::JavaScript,
                difficulty: "Beginner".into(),
                points: 100,
                time_limit: 600,
                instructions: "Write `function solution(arr)` returning the sum of `arr`.".into(),
                starter_code: "function solution(arr) {\n  // your code here\n}\n".into(),
                test_cases: cases(&[("Sum correct", "solution([1,2,3]) returns 6")]),
            },
            Challenge {
                id: "reverse-string".into(),
                title: "Reverse a String".into(),
                description: "Return the input string reversed.".into(),
                category: Category::JavaScript,
                difficulty: "Beginner".into(),
                points: 100,
                time_limit: 600,
                instructions: "Write `function solution(str)` returning `str` reversed.".into(),
                starter_code: "function solution(str) {\n  // your code here\n}\n".into(),
                test_cases: cases(&[("Reverse correct", "solution(\"hello\") returns \"olleh\"")]),
            },
            Challenge {
                id: "even-odd".into(),
                title: "Even or Odd".into(),
                description: "Classify a number as even or odd.".into(),
                category: Category::JavaScript,
                difficulty: "Beginner".into(),
                points: 100,
                time_limit: 600,
                instructions: "Write `function solution(n)` returning `\"even\"` or `\"odd\"`.".into(),
                starter_code: "function solution(n) {\n  // your code here\n}\n".into(),
                test_cases: cases(&[("Even odd correct", "4 is even and 5 is odd")]),
            },
            Challenge {
                id: "array-max".into(),
                title: "Largest Number".into(),
                description: "Return the largest number in an array.".into(),
                category: Category::JavaScript,
                difficulty: "Beginner".into(),
                points: 100,
                time_limit: 600,
                instructions: "Write `function solution(arr)` returning the maximum of `arr`.".into(),
                starter_code: "function solution(arr) {\n  // your code here\n}\n".into(),
                test_cases: cases(&[("Max correct", "solution([1,9,3]) returns 9")]),
            },
            Challenge {
                id: "count-vowels".into(),
                title: "Count the Vowels".into(),
                description: "Count the vowels in a string.".into(),
                category: Category::JavaScript,
                difficulty: "Intermediate".into(),
                points: 150,
                time_limit: 900,
                instructions: "Write `function solution(str)` returning the number of vowels.".into(),
                starter_code: "function solution(str) {\n  // your code here\n}\n".into(),
                test_cases: cases(&[("Vowel count correct", "solution(\"hello\") returns 2")]),
            },
            Challenge {
                id: "greeting-button".into(),
                title: "Greeting Button".into(),
                description: "Wire a button to greet whoever typed their name.".into(),
                category: Category::JavaScript,
                difficulty: "Beginner".into(),
                points: 150,
                time_limit: 900,
                instructions: "Add an `<input>` and a `<button>`; clicking the button shows an \
                               `alert` with a greeting."
                    .into(),
                starter_code: "<input id=\"name\" />\n\n<script>\n  // your code here\n</script>\n".into(),
                test_cases: cases(&[
                    ("Input exists", "There is a text input"),
                    ("Button exists", "There is a button"),
                    ("Alert on click", "Clicking the button shows an alert"),
                    ("Greeting wording", "The greeting reads naturally"),
                ]),
            },
        ])
    }
}

fn cases(items: &[(&str, &str)]) -> Vec<TestCase> {
    items
        .iter()
        .map(|(name, description)| TestCase {
            name: (*name).to_string(),
            description: (*description).to_string(),
        })
        .collect()
}

/// Parse a single challenge file (YAML or JSON, chosen by extension).
pub fn load_challenge(path: &Path) -> Result<Challenge> {
    let raw = read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&raw)
            .with_context(|| format!("Challenge file is not valid JSON: {}", path.display()))
    } else {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Challenge file is not valid YAML: {}", path.display()))
    }
}

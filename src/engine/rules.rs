// src/engine/rules.rs

//! Typed rule table.
//!
//! Test-case names are resolved once into these enums; every grading
//! site matches on them exhaustively.

use serde_json::{json, Value};

/// Rules for the HTML & CSS family. Names match exactly (after trimming).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupRule {
    HeaderExists,
    MainExists,
    FooterExists,
    SemanticHtml,
    NavigationMenu,
    MainContent,
    CssStyling,
    ResponsiveDesign,
    Unknown(String),
}

impl MarkupRule {
    pub fn resolve(name: &str) -> Self {
        match name.trim() {
            "Header exists" => MarkupRule::HeaderExists,
            "Main exists" => MarkupRule::MainExists,
            "Footer exists" => MarkupRule::FooterExists,
            "Semantic HTML" => MarkupRule::SemanticHtml,
            "Navigation menu" => MarkupRule::NavigationMenu,
            "Main content" => MarkupRule::MainContent,
            "CSS styling" => MarkupRule::CssStyling,
            "Responsive design" => MarkupRule::ResponsiveDesign,
            other => MarkupRule::Unknown(other.to_string()),
        }
    }
}

/// Text-only checks for the JavaScript family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    InputExists,
    InputsExist,
    ButtonExists,
    AlertOnClick,
}

/// Checks that call the submitted `solution` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionRule {
    SumCorrect,
    ReverseCorrect,
    EvenOddCorrect,
    MaxCorrect,
    VowelCountCorrect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRule {
    Heuristic(Heuristic),
    Assertion(AssertionRule),
    Unknown(String),
}

impl ScriptRule {
    /// Heuristics match by substring, assertions by exact name.
    pub fn resolve(name: &str) -> Self {
        const HEURISTICS: [(&str, Heuristic); 4] = [
            ("Inputs exist", Heuristic::InputsExist),
            ("Input exists", Heuristic::InputExists),
            ("Button exists", Heuristic::ButtonExists),
            ("Alert on click", Heuristic::AlertOnClick),
        ];

        if let Some((_, h)) = HEURISTICS.iter().find(|(key, _)| name.contains(key)) {
            return ScriptRule::Heuristic(*h);
        }

        match name.trim() {
            "Sum correct" => ScriptRule::Assertion(AssertionRule::SumCorrect),
            "Reverse correct" => ScriptRule::Assertion(AssertionRule::ReverseCorrect),
            "Even odd correct" => ScriptRule::Assertion(AssertionRule::EvenOddCorrect),
            "Max correct" => ScriptRule::Assertion(AssertionRule::MaxCorrect),
            "Vowel count correct" => ScriptRule::Assertion(AssertionRule::VowelCountCorrect),
            other => ScriptRule::Unknown(other.to_string()),
        }
    }
}

/// A primitive value as JavaScript sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Number(f64),
    String(String),
    Bool(bool),
    /// Anything non-primitive; carries its `typeof`.
    Other(String),
}

impl JsValue {
    /// `===` for the primitives the assertions use.
    pub fn strict_eq(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Number(a), JsValue::Number(b)) => a == b,
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Bool(a), JsValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for JsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsValue::Number(n) => write!(f, "{}", n),
            JsValue::String(s) => write!(f, "{}", Value::String(s.clone())),
            JsValue::Bool(b) => write!(f, "{}", b),
            JsValue::Other(kind) => write!(f, "<{}>", kind),
        }
    }
}

/// One `solution(...)` call with its expected result.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub args: Vec<Value>,
    pub expected: JsValue,
}

impl Assertion {
    fn new(args: Vec<Value>, expected: JsValue) -> Self {
        Self { args, expected }
    }

    /// The call as JavaScript source, e.g. `solution([1,2,3])`.
    pub fn call_text(&self) -> String {
        let args: Vec<String> = self.args.iter().map(Value::to_string).collect();
        format!("solution({})", args.join(","))
    }

    pub fn failure_message(&self) -> String {
        format!("Expected {} to be {}", self.call_text(), self.expected)
    }
}

impl AssertionRule {
    /// Assertions in evaluation order; the first failure decides the result.
    pub fn assertions(self) -> Vec<Assertion> {
        match self {
            AssertionRule::SumCorrect => {
                vec![Assertion::new(vec![json!([1, 2, 3])], JsValue::Number(6.0))]
            }
            AssertionRule::ReverseCorrect => vec![Assertion::new(
                vec![json!("hello")],
                JsValue::String("olleh".into()),
            )],
            AssertionRule::EvenOddCorrect => vec![
                Assertion::new(vec![json!(4)], JsValue::String("even".into())),
                Assertion::new(vec![json!(5)], JsValue::String("odd".into())),
            ],
            AssertionRule::MaxCorrect => {
                vec![Assertion::new(vec![json!([1, 9, 3])], JsValue::Number(9.0))]
            }
            AssertionRule::VowelCountCorrect => {
                vec![Assertion::new(vec![json!("hello")], JsValue::Number(2.0))]
            }
        }
    }
}

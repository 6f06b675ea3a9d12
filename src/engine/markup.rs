// src/engine/markup.rs

//! HTML & CSS rule family.
//!
//! Submissions are parsed into a DOM and inspected structurally. A parse
//! failure short-circuits the battery: every test reports the same error.

use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;

use crate::challenge::TestCase;
use crate::config::FallbackPolicy;
use crate::engine::rules::MarkupRule;
use crate::engine::TestResult;

const SEMANTIC_TAGS: [&str; 7] = ["header", "nav", "main", "article", "section", "aside", "footer"];
const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];
const MIN_NAV_LINKS: usize = 3;

/// Grade `source` against `test_cases`, one result per case, in order.
pub fn grade_markup(
    source: &str,
    test_cases: &[TestCase],
    fallback: FallbackPolicy,
    max_depth: usize,
) -> Vec<TestResult> {
    let doc = match parse(source, max_depth) {
        Ok(doc) => doc,
        Err(reason) => {
            tracing::debug!(%reason, "markup parse failed");
            let message = format!("Error parsing HTML: {}", reason);
            return test_cases
                .iter()
                .map(|_| TestResult::fail(message.clone()))
                .collect();
        }
    };

    test_cases
        .iter()
        .map(|tc| evaluate(&doc, &MarkupRule::resolve(&tc.name), fallback))
        .collect()
}

fn parse(source: &str, max_depth: usize) -> Result<Html, String> {
    let doc = std::panic::catch_unwind(|| Html::parse_document(source))
        .map_err(|_| "parser aborted".to_string())?;

    let depth = tree_depth(&doc);
    if depth > max_depth {
        return Err(format!(
            "document nests {} levels deep (limit {})",
            depth, max_depth
        ));
    }

    Ok(doc)
}

fn tree_depth(doc: &Html) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(doc.tree.root(), 0usize)];
    while let Some((node, depth)) = stack.pop() {
        deepest = deepest.max(depth);
        for child in node.children() {
            stack.push((child, depth + 1));
        }
    }
    deepest
}

fn evaluate(doc: &Html, rule: &MarkupRule, fallback: FallbackPolicy) -> TestResult {
    match rule {
        MarkupRule::HeaderExists => landmark(doc, "header"),
        MarkupRule::MainExists => landmark(doc, "main"),
        MarkupRule::FooterExists => landmark(doc, "footer"),
        MarkupRule::SemanticHtml => semantic_html(doc),
        MarkupRule::NavigationMenu => navigation_menu(doc),
        MarkupRule::MainContent => main_content(doc),
        MarkupRule::CssStyling => css_styling(doc),
        MarkupRule::ResponsiveDesign => responsive_design(doc),
        MarkupRule::Unknown(name) => match fallback {
            FallbackPolicy::Lenient => TestResult::pass(),
            FallbackPolicy::Strict => {
                tracing::debug!(test = %name, "no markup rule for test");
                TestResult::fail("Test not implemented")
            }
        },
    }
}

/* ---------------- predicates ---------------- */

fn landmark(doc: &Html, tag: &str) -> TestResult {
    if find(doc, tag).is_some() {
        TestResult::pass()
    } else {
        TestResult::fail(format!("No <{}> element found", tag))
    }
}

fn semantic_html(doc: &Html) -> TestResult {
    if elements(doc.root_element()).any(|el| SEMANTIC_TAGS.contains(&el.value().name())) {
        TestResult::pass()
    } else {
        TestResult::fail(format!(
            "No semantic HTML elements found ({})",
            SEMANTIC_TAGS.join(", ")
        ))
    }
}

fn navigation_menu(doc: &Html) -> TestResult {
    let Some(nav) = find(doc, "nav") else {
        return TestResult::fail("No <nav> element found");
    };

    let links = elements(nav).filter(|el| el.value().name() == "a").count();
    if links < MIN_NAV_LINKS {
        return TestResult::fail(format!(
            "Navigation menu should have at least {} links, found {}",
            MIN_NAV_LINKS, links
        ));
    }

    TestResult::pass()
}

fn main_content(doc: &Html) -> TestResult {
    let Some(main) = find(doc, "main") else {
        return TestResult::fail("No <main> element found");
    };

    let has = |pred: &dyn Fn(&str) -> bool| elements(main).any(|el| pred(el.value().name()));

    if !has(&|name: &str| HEADING_TAGS.contains(&name)) {
        return TestResult::fail("Main content should include a heading (h1-h6)");
    }
    if !has(&|name: &str| name == "p") {
        return TestResult::fail("Main content should include a paragraph");
    }
    if !has(&|name: &str| name == "img") {
        return TestResult::fail("Main content should include an image");
    }

    TestResult::pass()
}

fn css_styling(doc: &Html) -> TestResult {
    let inline = elements(doc.root_element()).any(|el| el.value().attr("style").is_some());

    let styles = style_blocks(doc);
    let has_rules = styles.iter().any(|css| !strip_comments(css).trim().is_empty());
    let linked = elements(doc.root_element()).any(|el| is_stylesheet_link(&el));

    if inline || has_rules || linked {
        return TestResult::pass();
    }

    if !styles.is_empty() {
        return TestResult::fail("Style element exists but no CSS rules defined");
    }

    TestResult::fail("No CSS styles found")
}

fn responsive_design(doc: &Html) -> TestResult {
    let viewport = elements(doc.root_element()).any(|el| {
        el.value().name() == "meta"
            && el
                .value()
                .attr("name")
                .map(|n| n.trim().eq_ignore_ascii_case("viewport"))
                .unwrap_or(false)
    });

    if !viewport {
        return TestResult::fail("Missing viewport meta tag");
    }

    let responsive = style_blocks(doc).iter().any(|css| {
        let css = strip_comments(css);
        css.contains("@media") || relative_unit_re().is_match(&css)
    });

    if !responsive {
        return TestResult::fail("No media queries or relative units found");
    }

    TestResult::pass()
}

/* ---------------- helpers ---------------- */

fn elements(root: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    root.descendants().filter_map(ElementRef::wrap)
}

fn find<'a>(doc: &'a Html, tag: &str) -> Option<ElementRef<'a>> {
    elements(doc.root_element()).find(|el| el.value().name() == tag)
}

fn style_blocks(doc: &Html) -> Vec<String> {
    elements(doc.root_element())
        .filter(|el| el.value().name() == "style")
        .map(|el| el.text().collect::<String>())
        .collect()
}

fn is_stylesheet_link(el: &ElementRef<'_>) -> bool {
    el.value().name() == "link"
        && el
            .value()
            .attr("rel")
            .map(|rel| {
                rel.split_ascii_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("stylesheet"))
            })
            .unwrap_or(false)
}

fn strip_comments(css: &str) -> String {
    static COMMENT: OnceLock<Regex> = OnceLock::new();
    let re = COMMENT.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment regex"));
    re.replace_all(css, "").into_owned()
}

fn relative_unit_re() -> &'static Regex {
    static UNITS: OnceLock<Regex> = OnceLock::new();
    UNITS.get_or_init(|| {
        Regex::new(r"(?i)\d(?:\.\d+)?\s*(?:rem|em|%|vw|vh|fr)").expect("valid unit regex")
    })
}

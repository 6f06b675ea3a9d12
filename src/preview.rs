// src/preview.rs

//! Sandboxed preview of a submission.
//!
//! The submission is embedded as `srcdoc` of an iframe that may run scripts
//! and open modal dialogs, but has no same-origin access (no cookies, no
//! storage, no host DOM). Served over HTTP, the host page itself also
//! carries a CSP `sandbox` directive.

use regex::Regex;
use std::sync::OnceLock;

use crate::challenge::Category;

/// Sandbox tokens shared by the iframe attribute and the CSP header.
pub const SANDBOX_FLAGS: &str = "allow-scripts allow-modals";

pub fn content_security_policy() -> String {
    format!("sandbox {}", SANDBOX_FLAGS)
}

/// HTML & CSS submissions always get a preview; JavaScript ones only when
/// they contain markup.
pub fn needs_preview(category: Category, source: &str) -> bool {
    match category {
        Category::HtmlCss => true,
        Category::JavaScript => markup_re().is_match(source),
    }
}

fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)<(?:!doctype|html|head|body|div|span|p|a|button|input|form|label|select|textarea|h[1-6]|ul|ol|li|img|script|style|section|main|header|footer|nav|table)\b",
        )
        .expect("valid markup regex")
    })
}

/// Host page wrapping `source` in a sandboxed frame.
pub fn render_preview(source: &str, title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Preview: {title}</title>
<style>html, body {{ margin: 0; height: 100%; }} iframe {{ border: 0; width: 100%; height: 100%; }}</style>
</head>
<body>
<iframe sandbox="{flags}" referrerpolicy="no-referrer" srcdoc="{doc}"></iframe>
</body>
</html>
"#,
        title = escape_html(title),
        flags = SANDBOX_FLAGS,
        doc = escape_html(source),
    )
}

/// Escape text for an HTML attribute value or text node.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 8);
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

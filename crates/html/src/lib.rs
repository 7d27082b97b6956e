//! # ctfrag-html
//!
//! Turns raw write-up HTML (a blog post, a GitHub page, an embedded CTFtime
//! block) into readable Markdown-flavoured text.

use regex::Regex;
use scraper::{Html, Selector};

/// Elements that never carry write-up content.
pub const DEFAULT_STRIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "form", "link", "meta",
];

const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    ".post-content",
    ".entry-content",
    ".markdown-body",
    "#content",
    ".content",
    ".well",
];

const BOILERPLATE_SELECTORS: &[&str] = &[
    "nav", "header", "footer", "aside", ".navbar", ".sidebar", ".menu", ".comments",
    "#comments", ".share", ".advertisement", ".ads",
];

const VOID_TAGS: &[&str] = &["link", "meta", "img", "br", "hr", "input"];

/// Removes the given tags (with their content) from raw HTML.
///
/// `None` strips [`DEFAULT_STRIP_TAGS`]; an empty slice returns the input unchanged.
pub fn clean_html(html: &str, tags: Option<&[&str]>) -> String {
    let tags = tags.unwrap_or(DEFAULT_STRIP_TAGS);
    let mut cleaned = html.to_string();
    for tag in tags {
        let pattern = if VOID_TAGS.contains(tag) {
            format!(r"(?is)<{tag}\b[^>]*/?>")
        } else {
            format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>|<{tag}\b[^>]*/>")
        };
        if let Ok(re) = Regex::new(&pattern) {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
    }
    cleaned
}

fn strip_boilerplate(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut result = html.to_string();
    for selector_str in BOILERPLATE_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in fragment.select(&selector) {
                result = result.replace(&element.html(), "");
            }
        }
    }
    result
}

/// Picks the element most likely to hold the article body.
///
/// The first matching main-content selector wins; otherwise the `<body>` with
/// navigation, headers, footers and sidebars removed.
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector_str in MAIN_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(main) = document.select(&selector).next() {
                let text_len = main.text().map(str::trim).map(str::len).sum::<usize>();
                if text_len > 0 {
                    return strip_boilerplate(&main.html());
                }
            }
        }
    }

    if let Ok(body_selector) = Selector::parse("body") {
        if let Some(body) = document.select(&body_selector).next() {
            return strip_boilerplate(&body.html());
        }
    }

    document.html()
}

/// Normalises Markdown: trims trailing whitespace and collapses runs of blank lines.
pub fn clean_markdown_content(markdown: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in markdown.lines().map(str::trim_end) {
        if line.trim().is_empty() && out.last().is_some_and(|prev| prev.is_empty()) {
            continue;
        }
        out.push(if line.trim().is_empty() { "" } else { line });
    }
    out.join("\n").trim().to_string()
}

/// The readable text of a write-up page: boilerplate removed, converted to Markdown.
///
/// No title heading is added, so the length of the result reflects the article
/// body only.
pub fn extract_text(html: &str) -> String {
    let cleaned = clean_html(html, None);
    let main = clean_html(&extract_main_content(&cleaned), Some(&["title"]));
    clean_markdown_content(&html2md::parse_html(&main))
}

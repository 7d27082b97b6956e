//! # HTML Crate Integration Tests
//!
//! Cleaning, main-content selection and Markdown conversion of write-up pages.

use ctfrag_html::{clean_html, extract_main_content, extract_text};

const BLOG_POST: &str = r#"
<html>
    <head>
        <title>pwn 101 writeup</title>
        <style>body { color: red; }</style>
        <script>alert("hello");</script>
        <link rel="stylesheet" href="style.css">
    </head>
    <body>
        <nav><a href="/">Home</a> <a href="/about">About</a></nav>
        <header>My Security Blog</header>
        <article>
            <p>The binary reads 64 bytes into a 32 byte stack buffer.</p>
            <p>Overwriting the return address with the win function prints the flag.</p>
        </article>
        <footer>Copyright 2024</footer>
    </body>
</html>
"#;

#[test]
fn test_clean_html() {
    let cleaned_default = clean_html(BLOG_POST, None);
    assert!(!cleaned_default.contains("<style>"));
    assert!(!cleaned_default.contains("<script>"));
    assert!(!cleaned_default.contains("<link"));
    assert!(cleaned_default.contains("<article>"));

    let cleaned_custom = clean_html(BLOG_POST, Some(&["article"]));
    assert!(cleaned_custom.contains("<style>"));
    assert!(!cleaned_custom.contains("stack buffer"));
}

#[test]
fn test_extract_main_content_prefers_article() {
    let main = extract_main_content(BLOG_POST);
    assert!(main.contains("stack buffer"));
    assert!(!main.contains("My Security Blog"));
    assert!(!main.contains("Copyright 2024"));
}

#[test]
fn test_extract_main_content_falls_back_to_body() {
    let html = "<html><body><nav>menu</nav><p>Only body text here.</p></body></html>";
    let main = extract_main_content(html);
    assert!(main.contains("Only body text here."));
    assert!(!main.contains("menu"));
}

#[test]
fn test_extract_text_drops_boilerplate() {
    let text = extract_text(BLOG_POST);
    assert!(text.contains("The binary reads 64 bytes into a 32 byte stack buffer."));
    assert!(!text.contains("alert"));
    assert!(!text.contains("Home"));
    assert!(!text.contains("pwn 101 writeup"), "no title heading is added");
}

#[test]
fn test_embedded_ctftime_block() {
    let html = r#"<div class="well"><p>Use <code>sqlmap</code> on the login form.</p></div>"#;
    let text = extract_text(html);
    assert!(text.contains("sqlmap"));
    assert!(text.contains("login form"));
}

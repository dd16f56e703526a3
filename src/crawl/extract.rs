use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use tracing::{debug, warn};

/// Extract plain text from a downloaded artifact, routing on extension.
/// Extraction is best-effort: every failure mode degrades to an empty
/// string and the caller decides whether to drop the page.
pub fn parse_any_to_text(file_path: &Path) -> String {
    let is_pdf = file_path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        return parse_pdf_to_text(file_path, 10);
    }

    match std::fs::read_to_string(file_path) {
        Ok(html) => extract_html_text(&html),
        Err(e) => {
            warn!("failed to read {}: {}", file_path.display(), e);
            String::new()
        }
    }
}

/// PDF → text via lopdf, page by page, capped at `max_pages`. When the
/// page-wise pass yields nothing, fall back to pdf-extract's whole-document
/// pass, which handles layouts lopdf's text operator walk misses. An empty
/// result is returned as-is; rendered-page OCR is out of scope here.
pub fn parse_pdf_to_text(pdf_path: &Path, max_pages: usize) -> String {
    let pagewise = match lopdf::Document::load(pdf_path) {
        Ok(doc) => {
            let mut parts: Vec<String> = Vec::new();
            let page_count = doc.get_pages().len();
            for page_no in 1..=page_count.min(max_pages) as u32 {
                match doc.extract_text(&[page_no]) {
                    Ok(text) => {
                        let text = text.trim();
                        if !text.is_empty() {
                            parts.push(text.to_string());
                        }
                    }
                    Err(e) => debug!("pdf page {} of {}: {}", page_no, pdf_path.display(), e),
                }
            }
            parts.join("\n")
        }
        Err(e) => {
            warn!("failed to open PDF {}: {}", pdf_path.display(), e);
            String::new()
        }
    };

    if !pagewise.trim().is_empty() {
        return pagewise;
    }

    match std::fs::read(pdf_path)
        .ok()
        .and_then(|bytes| pdf_extract::extract_text_from_mem(&bytes).ok())
    {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => String::new(),
    }
}

/// HTML → text, three layers, first non-empty output wins:
/// 1. readability article extraction,
/// 2. main-content selectors with script/style stripped,
/// 3. raw whole-document strip-to-text.
pub fn extract_html_text(html: &str) -> String {
    if let Some(text) = readability_text(html) {
        return text;
    }

    let doc = Html::parse_document(html);

    if let Some(text) = main_content_text(&doc) {
        return text;
    }

    strip_to_text(&doc)
}

fn readability_text(html: &str) -> Option<String> {
    let base = url::Url::parse("https://localhost/").ok()?;
    match readability::extractor::extract(&mut html.as_bytes(), &base) {
        Ok(product) => {
            let text = product.text.trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(normalize_whitespace(&text))
            }
        }
        Err(e) => {
            debug!("readability extraction failed: {}", e);
            None
        }
    }
}

fn main_content_text(doc: &Html) -> Option<String> {
    for css in ["article", "main", "[role=main]", "#content", ".content"] {
        let Ok(sel) = Selector::parse(css) else {
            continue;
        };
        if let Some(element) = doc.select(&sel).next() {
            let mut parts = Vec::new();
            collect_text(&element, &mut parts);
            let text = normalize_whitespace(&parts.join(" "));
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn strip_to_text(doc: &Html) -> String {
    let mut parts = Vec::new();
    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            collect_text(&body, &mut parts);
            return normalize_whitespace(&parts.join(" "));
        }
    }
    normalize_whitespace(&doc.root_element().text().collect::<Vec<_>>().join(" "))
}

/// Recursive text collection skipping non-content subtrees.
fn collect_text(element: &ElementRef<'_>, parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if matches!(
                child_element.value().name(),
                "script" | "style" | "noscript" | "svg" | "template"
            ) {
                continue;
            }
            collect_text(&child_element, parts);
        } else if let Some(text_node) = child.value().as_text() {
            let t = text_node.text.trim();
            if !t.is_empty() {
                parts.push(t.to_string());
            }
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

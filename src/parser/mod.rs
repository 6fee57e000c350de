//! HTML parsing: titles, visible text, links, file links, keywords and PGP
//! markers. Pure; no I/O.

use scraper::{node::Node, Html, Selector};
use url::Url;

use crate::{
    analysis::keywords,
    models::scan::{FileLink, PageLink},
};

/// Maximum anchors harvested from one page.
const MAX_LINKS: usize = 200;

/// Extensions (without the dot) that mark a link as a downloadable file.
const DOWNLOADABLE_EXTENSIONS: &[&str] = &[
    // Archives
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz",
    // Executables
    "exe", "dll", "so", "app", "bin", "msi",
    // Documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "rtf", "odt",
    // Images
    "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "tiff", "ico", "psd",
    // Video / audio
    "mp4", "avi", "mov", "mkv", "flv", "mp3", "wav", "flac", "aac", "ogg",
    // Code
    "py", "js", "java", "cpp", "c", "go", "rs", "sh", "bat", "ps1",
    // Other
    "iso", "img", "dmg", "apk", "deb", "rpm",
];

const PGP_BEGIN_MARKER: &str = "-----BEGIN PGP";

/// Everything extracted from one page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Page title, if present and non-empty.
    pub title: Option<String>,
    /// Visible text, block-separated and whitespace-collapsed.
    pub text: String,
    /// Harvested anchors, capped at 200.
    pub links: Vec<PageLink>,
    /// Anchors whose URL path ends in a downloadable extension.
    pub file_links: Vec<FileLink>,
    /// Canonical threat keywords found in the text.
    pub keywords: Vec<String>,
    /// Whether a PGP block marker is present.
    pub pgp_detected: bool,
}

/// Parses an HTML document.
///
/// Text is extracted block-wise with separators inserted between elements
/// before whitespace collapsing, so tokens from adjacent blocks never join.
/// Link URLs are appended to the text so indicators appearing only in hrefs
/// are still extracted.
pub fn parse_page(html: &str, base_url: Option<&Url>) -> ParsedPage {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").expect("valid selector");
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let body_selector = Selector::parse("body").expect("valid selector");
    let mut text_parts: Vec<String> = Vec::new();
    if let Some(body) = document.select(&body_selector).next() {
        for node_ref in body.descendants() {
            if let Node::Text(text_node) = node_ref.value() {
                let in_excluded = node_ref.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                        .unwrap_or(false)
                });
                if !in_excluded {
                    let trimmed = text_node.trim();
                    if !trimmed.is_empty() {
                        text_parts.push(trimmed.to_string());
                    }
                }
            }
        }
    }

    let links = collect_links(&document, base_url);
    let file_links = detect_file_links(&links);

    // Indicators hidden in hrefs are only visible to the analyser if the
    // URLs are part of the text.
    for link in &links {
        text_parts.push(link.url.clone());
    }

    let text = normalize_whitespace(&text_parts.join(" "));
    let keywords = keywords::extract(&text);
    let pgp_detected = text.contains(PGP_BEGIN_MARKER);

    ParsedPage { title, text, links, file_links, keywords, pgp_detected }
}

fn collect_links(document: &Html, base_url: Option<&Url>) -> Vec<PageLink> {
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");
    document
        .select(&anchor_selector)
        .take(MAX_LINKS)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let url = match base_url {
                Some(base) => {
                    base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string())
                }
                None => href.to_string(),
            };
            let anchor_text = {
                let text = el.text().collect::<String>().trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            };
            Some(PageLink { url, anchor_text })
        })
        .collect()
}

/// Selects the links whose URL path ends in a downloadable extension.
pub fn detect_file_links(links: &[PageLink]) -> Vec<FileLink> {
    links
        .iter()
        .filter_map(|link| {
            let lowered = link.url.to_lowercase();
            let path = lowered.split(['?', '#']).next().unwrap_or("");
            DOWNLOADABLE_EXTENSIONS
                .iter()
                .find(|ext| path.ends_with(&format!(".{ext}")))
                .map(|ext| FileLink { url: link.url.clone(), extension: ext.to_string() })
        })
        .collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// src/utils/html_debug.rs
use std::fs;
use std::path::Path;

use regex::Regex;

use crate::utils::error::AppError;

/// Patterns highlighted in an annotated section dump.
pub const SECTION_PATTERNS: &[(&str, &str)] = &[
    (r"(?is)<table\b.*?</table>", "table"),
    (r"(?i)issuer\s+purchases\s+of\s+equity\s+securities", "heading"),
    (
        r"(?i)\(\s*(?:in|dollars\s+in|amounts\s+in)\s+(?:thousands|millions|billions)[^()]*\)",
        "unit",
    ),
    (r"(?i)\bexcept\s+(?:per\s+share|share)[^.;)]*", "unit"),
];

/// Saves a HTML snippet to a file with debug highlights.
/// Overlapping highlights keep the earliest-starting one.
pub fn save_debug_html<P: AsRef<Path>>(
    html: &str,
    path: P,
    highlights: &[(usize, usize, &str)],
) -> Result<(), AppError> {
    let path = path.as_ref();

    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");
    debug_html.push_str(".highlight-table { outline: 2px solid #FFA500; display: block; }\n");
    debug_html.push_str(".highlight-heading { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-unit { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| (h.0, std::cmp::Reverse(h.1)));

    let mut last_pos = 0;
    for (start, end, highlight_type) in sorted_highlights {
        if start < last_pos || end > html.len() {
            continue;
        }
        debug_html.push_str(&html[last_pos..start]);

        let css_class = match highlight_type {
            "table" => "highlight-table",
            "heading" => "highlight-heading",
            "unit" => "highlight-unit",
            _ => "highlight-custom",
        };
        let tag = if highlight_type == "table" { "div" } else { "span" };

        debug_html.push_str(&format!(
            "<{} class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            tag, css_class, start, end, highlight_type
        ));
        debug_html.push_str(&html[start..end]);
        debug_html.push_str(&format!("</{}>", tag));

        last_pos = end;
    }
    debug_html.push_str(&html[last_pos..]);
    debug_html.push_str("\n</body>\n</html>");

    fs::write(path, debug_html)?;

    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

/// Creates a debug version of an HTML document with matches of each regex
/// pattern highlighted.
pub fn create_debug_html<P: AsRef<Path>>(
    html: &str,
    path: P,
    patterns: &[(&str, &str)],
) -> Result<(), AppError> {
    let mut highlights = Vec::new();

    for (pattern, highlight_type) in patterns {
        let re = Regex::new(pattern).map_err(|e| {
            AppError::Config(format!("Invalid regex pattern '{}': {}", pattern, e))
        })?;

        for mat in re.find_iter(html) {
            highlights.push((mat.start(), mat.end(), *highlight_type));
        }
    }
    tracing::debug!("{} debug highlights", highlights.len());

    save_debug_html(html, path, &highlights)
}

/// Writes the raw section and an annotated copy into `debug_dir`.
pub fn dump_section(section_html: &str, debug_dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(debug_dir)?;
    fs::write(debug_dir.join("raw_section.html"), section_html)?;
    create_debug_html(
        section_html,
        debug_dir.join("section_annotated.html"),
        SECTION_PATTERNS,
    )
}

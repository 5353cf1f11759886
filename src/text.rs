use std::path::Path;
use std::process::Command;

use crate::error::{EngineError, Result};

/// Splits extracted text on form-feed page separators, discarding the empty
/// trailing page `pdftotext` leaves behind.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\u{000C}').map(str::to_string).collect();
    if pages
        .last()
        .map(|page| page.trim().is_empty())
        .unwrap_or(false)
    {
        pages.pop();
    }
    pages
}

/// Page count reported by `pdfinfo`.
pub fn get_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .map_err(|err| EngineError::PdfInfoFailed(err.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exit {}", output.status.code().unwrap_or(-1))
        } else {
            stderr
        };
        return Err(EngineError::PdfInfoFailed(message));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            return rest
                .trim()
                .parse::<usize>()
                .map_err(|_| EngineError::PdfInfoFailed("invalid page count in pdfinfo".into()));
        }
    }
    Err(EngineError::PdfInfoFailed(
        "page count not found in pdfinfo".into(),
    ))
}

/// Runs `pdftotext -layout` so column spacing survives as runs of spaces.
pub fn extract_fulltext(pdf_path: &Path, text_path: &Path) -> Result<()> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg(text_path)
        .output()
        .map_err(|err| EngineError::PdfToTextFailed(err.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exit {}", output.status.code().unwrap_or(-1))
        } else {
            stderr
        };
        return Err(EngineError::PdfToTextFailed(message));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_drops_trailing_empty_page() {
        let text = "page one\u{000C}page two\u{000C}";
        let pages = split_pages(text);
        assert_eq!(pages, vec!["page one", "page two"]);
    }

    #[test]
    fn test_split_pages_keeps_trailing_content() {
        let text = "page one\u{000C}page two";
        assert_eq!(split_pages(text).len(), 2);
    }

    #[test]
    fn test_split_pages_single_page() {
        assert_eq!(split_pages("only page"), vec!["only page"]);
    }
}

//! Document sources: a remote URL or a local file path.

use std::fmt;
use std::path::{Path, PathBuf};

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Url(String),
    File(PathBuf),
}

impl DocumentSource {
    /// Classify a command-line argument. `http://` and `https://` prefixes
    /// (case-insensitive) are URLs, everything else is a path.
    pub fn parse(arg: &str) -> Self {
        let lower = arg.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            DocumentSource::Url(arg.to_string())
        } else {
            DocumentSource::File(PathBuf::from(arg))
        }
    }

    /// Last path segment, used for the status bar and download names.
    pub fn display_name(&self) -> String {
        match self {
            DocumentSource::Url(url) => {
                let path = url
                    .split(['?', '#'])
                    .next()
                    .unwrap_or(url)
                    .trim_end_matches('/');
                let after_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
                match after_scheme.rsplit_once('/') {
                    Some((_, last)) if !last.is_empty() => last.to_string(),
                    _ => after_scheme.to_string(),
                }
            }
            DocumentSource::File(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string(),
        }
    }

    /// Target handed to the platform opener (browser or PDF app).
    pub fn external_target(&self) -> &str {
        match self {
            DocumentSource::Url(url) => url,
            DocumentSource::File(path) => path.to_str().unwrap_or_default(),
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            DocumentSource::File(path) => Some(path),
            DocumentSource::Url(_) => None,
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Url(url) => f.write_str(url),
            DocumentSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A request to view a document: the source plus an optional title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    pub source: DocumentSource,
    pub title: Option<String>,
}

impl ViewRequest {
    pub fn new(source: DocumentSource, title: Option<String>) -> Self {
        Self { source, title }
    }

    pub fn title(&self) -> String {
        match &self.title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => self.source.display_name(),
        }
    }

    /// File name for saving the original bytes.
    ///
    /// Uses the title when one was given, replacing characters that are not
    /// safe in file names, and makes sure the name ends in `.pdf`.
    pub fn download_file_name(&self) -> String {
        let base = match &self.title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => self.source.display_name(),
        };
        let mut name: String = base
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        if name.is_empty() {
            name.push_str("document");
        }
        if !name.to_ascii_lowercase().ends_with(".pdf") {
            name.push_str(".pdf");
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url() {
        assert_eq!(
            DocumentSource::parse("https://example.invalid/cert.pdf"),
            DocumentSource::Url("https://example.invalid/cert.pdf".into())
        );
        assert!(matches!(
            DocumentSource::parse("HTTP://example.invalid/a.pdf"),
            DocumentSource::Url(_)
        ));
    }

    #[test]
    fn parse_path() {
        assert_eq!(
            DocumentSource::parse("docs/cert.pdf"),
            DocumentSource::File(PathBuf::from("docs/cert.pdf"))
        );
    }

    #[test]
    fn url_display_name_strips_query() {
        let s = DocumentSource::parse("https://example.invalid/files/cert.pdf?dl=1#page=2");
        assert_eq!(s.display_name(), "cert.pdf");
    }

    #[test]
    fn url_display_name_without_path() {
        let s = DocumentSource::parse("https://example.invalid/");
        assert_eq!(s.display_name(), "example.invalid");
    }

    #[test]
    fn title_falls_back_to_display_name() {
        let r = ViewRequest::new(DocumentSource::parse("a/b/report.pdf"), None);
        assert_eq!(r.title(), "report.pdf");
        let r = ViewRequest::new(DocumentSource::parse("a/b/report.pdf"), Some("  ".into()));
        assert_eq!(r.title(), "report.pdf");
    }

    #[test]
    fn download_name_from_title() {
        let r = ViewRequest::new(
            DocumentSource::parse("https://example.invalid/x"),
            Some("AWS: Cloud Practitioner".into()),
        );
        assert_eq!(r.download_file_name(), "AWS_ Cloud Practitioner.pdf");
    }

    #[test]
    fn download_name_keeps_pdf_extension() {
        let r = ViewRequest::new(DocumentSource::parse("https://example.invalid/cert.PDF"), None);
        assert_eq!(r.download_file_name(), "cert.PDF");
    }
}

//! On-disk document corpus
//!
//! Filenames like `apple-10k-2023.pdf` name the company they describe. The
//! directory is scanned once and kept as a read-only snapshot so company
//! extraction never touches the filesystem.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "htm", "html"];

lazy_static! {
    static ref YEAR_PATTERN: Regex = Regex::new(r"20\d{2}").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusDocument {
    pub file_name: String,
    /// Lowercased leading `-` segment of the base name
    pub company: String,
    pub year: Option<String>,
}

impl CorpusDocument {
    /// Returns `None` for unsupported extensions.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let path = Path::new(file_name);
        let extension = path.extension()?.to_str()?.to_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return None;
        }

        let base = path.file_stem()?.to_str()?;
        let company = base.split('-').next().unwrap_or(base).to_lowercase();
        if company.is_empty() {
            return None;
        }

        let year = YEAR_PATTERN.find(base).map(|m| m.as_str().to_string());

        Some(Self {
            file_name: file_name.to_string(),
            company,
            year,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentCorpus {
    root: Option<PathBuf>,
    documents: Vec<CorpusDocument>,
}

impl DocumentCorpus {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: Vec<CorpusDocument>) -> Self {
        Self {
            root: None,
            documents,
        }
    }

    /// Snapshot `dir`. A missing or unreadable directory yields an empty corpus.
    pub fn scan(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Document corpus unavailable");
                return Self {
                    root: Some(dir.to_path_buf()),
                    documents: Vec::new(),
                };
            }
        };

        let mut documents: Vec<CorpusDocument> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name();
                CorpusDocument::from_file_name(name.to_str()?)
            })
            .collect();

        documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        debug!(
            dir = %dir.display(),
            document_count = documents.len(),
            "Document corpus scanned"
        );

        Self {
            root: Some(dir.to_path_buf()),
            documents,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn documents(&self) -> &[CorpusDocument] {
        &self.documents
    }

    /// Distinct company identifiers, in filename order
    pub fn company_identifiers(&self) -> Vec<String> {
        let mut companies: Vec<String> = Vec::new();
        for doc in &self.documents {
            if !companies.contains(&doc.company) {
                companies.push(doc.company.clone());
            }
        }
        companies
    }

    pub fn documents_for(&self, company: &str) -> impl Iterator<Item = &CorpusDocument> + '_ {
        let company = company.to_lowercase();
        self.documents.iter().filter(move |doc| doc.company == company)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_company_from_file_name() {
        let doc = CorpusDocument::from_file_name("Apple-10K-2023.PDF").unwrap();
        assert_eq!(doc.company, "apple");
        assert_eq!(doc.year.as_deref(), Some("2023"));

        let doc = CorpusDocument::from_file_name("berkshire.htm").unwrap();
        assert_eq!(doc.company, "berkshire");
        assert_eq!(doc.year, None);

        assert!(CorpusDocument::from_file_name("notes.txt").is_none());
        assert!(CorpusDocument::from_file_name("README").is_none());
    }

    #[test]
    fn test_scan_filters_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["nvidia-annual-2024.pdf", "nvidia-q1.html", "costco.htm", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(dir.path().join("archive.pdf")).unwrap();

        let corpus = DocumentCorpus::scan(dir.path());

        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.company_identifiers(), vec!["costco", "nvidia"]);
        assert_eq!(corpus.documents_for("NVIDIA").count(), 2);
    }

    #[test]
    fn test_missing_directory_is_empty_not_error() {
        let corpus = DocumentCorpus::scan("/no/such/raw_data");
        assert!(corpus.is_empty());
        assert!(corpus.company_identifiers().is_empty());
    }
}

//! Source documents: PDF directory loading and the built-in seed corpus.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Origin identifier (file path or `builtin:<topic>`).
    pub source: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

const SEED_CORPUS: [(&str, &str); 5] = [
    (
        "diabetes",
        "Diabetes is a chronic disease that affects how your body turns food into energy.",
    ),
    (
        "hypertension",
        "Hypertension, or high blood pressure, is when your blood pressure is consistently too high.",
    ),
    (
        "asthma",
        "Asthma is a condition that affects the airways in the lungs, making it difficult to breathe.",
    ),
    (
        "heart-disease",
        "Heart disease refers to several types of heart conditions that can affect heart function.",
    ),
    (
        "obesity",
        "Obesity is a complex disease involving an excessive amount of body fat.",
    ),
];

/// Five short reference entries used when no PDF corpus is available.
pub fn seed_documents() -> Vec<Document> {
    SEED_CORPUS
        .iter()
        .map(|(topic, text)| {
            Document::new(format!("builtin:{}", topic), *text)
                .with_metadata(json!({ "kind": "seed", "topic": topic }))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<Document>,
    /// Files that could not be read, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Extracts text from every `*.pdf` directly inside `dir`, sorted by file name.
///
/// Unreadable or text-less files are skipped rather than failing the batch.
/// Sources are canonical paths, so segment ids do not depend on how `dir` was
/// spelled.
pub async fn load_pdf_directory(dir: &Path) -> anyhow::Result<LoadedDocuments> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || load_pdf_directory_blocking(&dir))
        .await
        .context("PDF loader task panicked")?
}

fn load_pdf_directory_blocking(dir: &Path) -> anyhow::Result<LoadedDocuments> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve PDF directory {}", dir.display()))?;
    let entries = std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to read PDF directory {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_pdf(path))
        .collect();
    paths.sort();

    let mut loaded = LoadedDocuments::default();
    for path in paths {
        // The extractor panics on some malformed files instead of erroring.
        match std::panic::catch_unwind(|| pdf_extract::extract_text(&path)) {
            Ok(Ok(raw)) => {
                let text = normalize_whitespace(&raw);
                if text.is_empty() {
                    tracing::warn!("No extractable text in {}", path.display());
                    loaded
                        .skipped
                        .push((path, "no extractable text".to_string()));
                    continue;
                }
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                loaded.documents.push(
                    Document::new(path.to_string_lossy(), text)
                        .with_metadata(json!({ "kind": "pdf", "file_name": file_name })),
                );
            }
            Ok(Err(err)) => {
                tracing::warn!("Failed to extract text from {}: {}", path.display(), err);
                loaded.skipped.push((path, err.to_string()));
            }
            Err(_) => {
                tracing::warn!("PDF parser aborted on {}", path.display());
                loaded
                    .skipped
                    .push((path, "PDF parser aborted".to_string()));
            }
        }
    }

    tracing::info!(
        "Loaded {} PDF document(s) from {} ({} skipped)",
        loaded.documents.len(),
        dir.display(),
        loaded.skipped.len()
    );
    Ok(loaded)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Collapses runs of spaces/tabs and more than one blank line; PDF extraction
/// produces a lot of both.
pub fn normalize_whitespace(raw: &str) -> String {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();
    let inline = INLINE.get_or_init(|| Regex::new(r"[ \t\x{00A0}]+").expect("valid regex"));
    let blank_lines =
        BLANK_LINES.get_or_init(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("valid regex"));

    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = inline.replace_all(&unified, " ");
    let collapsed = blank_lines.replace_all(&collapsed, "\n\n");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_corpus_has_five_distinct_sources() {
        let docs = seed_documents();
        assert_eq!(docs.len(), 5);
        assert!(docs[0].text.starts_with("Diabetes is a chronic disease"));
        let mut sources: Vec<_> = docs.iter().map(|d| d.source.clone()).collect();
        sources.dedup();
        assert_eq!(sources.len(), 5);
    }

    #[test]
    fn normalize_whitespace_collapses_runs() {
        let raw = "  Heart\t\tdisease   refers\r\n\r\n\r\n  to several\n\n\n\ntypes  ";
        assert_eq!(
            normalize_whitespace(raw),
            "Heart disease refers\n\nto several\n\ntypes"
        );
    }

    #[test]
    fn pdf_detection_is_case_insensitive() {
        assert!(is_pdf(Path::new("Data/Medical_book.PDF")));
        assert!(is_pdf(Path::new("a.pdf")));
        assert!(!is_pdf(Path::new("notes.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[tokio::test]
    async fn loading_skips_non_pdf_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a pdf").unwrap();
        std::fs::write(dir.path().join("broken.pdf"), "definitely not a pdf").unwrap();

        let loaded = load_pdf_directory(dir.path()).await.unwrap();
        assert!(loaded.documents.is_empty());
        assert_eq!(loaded.skipped.len(), 1);
        assert!(loaded.skipped[0].0.ends_with("broken.pdf"));
    }

    #[tokio::test]
    async fn equivalent_directory_spellings_yield_same_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("broken.pdf"), "definitely not a pdf").unwrap();

        let direct = load_pdf_directory(dir.path()).await.unwrap();
        let indirect = load_pdf_directory(&dir.path().join("sub").join(".."))
            .await
            .unwrap();

        assert_eq!(direct.skipped.len(), 1);
        assert_eq!(direct.skipped[0].0, indirect.skipped[0].0);
        assert!(direct.skipped[0].0.is_absolute());
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(load_pdf_directory(&missing).await.is_err());
    }
}

use super::kb::{CorpusEntry, EntryMetadata};
use super::{embed_long_text, Embedder, OcrEngine, RetrievalFamily};
use crate::crawl::extract::parse_pdf_to_text;
use crate::util::truncate_chars;
use std::path::Path;
use tracing::{debug, info, warn};

/// Scan a directory for txt, pdf, and image files, extract their text, and
/// embed each into a local [`CorpusEntry`].
///
/// All text goes through the single text embedder so dimensions stay
/// uniform. Image files are OCR'd when an engine is provided; without OCR
/// (or when OCR finds nothing) the file is skipped rather than embedded in
/// an incompatible image space.
pub fn load_corpus_from_dir(
    corpus_dir: &Path,
    embedder: &dyn Embedder,
    family: RetrievalFamily,
    ocr: Option<&dyn OcrEngine>,
) -> Vec<CorpusEntry> {
    let mut corpus = Vec::new();
    let Ok(read_dir) = std::fs::read_dir(corpus_dir) else {
        warn!("corpus dir {} not readable", corpus_dir.display());
        return corpus;
    };

    let mut paths: Vec<_> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let text = match ext.as_str() {
            "txt" | "md" => match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("failed to read {}: {}", path.display(), e);
                    continue;
                }
            },
            "pdf" => parse_pdf_to_text(&path, 10),
            "png" | "jpg" | "jpeg" => match ocr {
                Some(engine) => match engine.recognize(&path) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("OCR failed for {}: {}", path.display(), e);
                        continue;
                    }
                },
                None => {
                    debug!("skipping image without OCR: {}", path.display());
                    continue;
                }
            },
            _ => continue,
        };

        if text.trim().is_empty() {
            debug!("no recoverable text in {}", path.display());
            continue;
        }

        let embedding = match embed_long_text(embedder, &text, family) {
            Ok(Some(e)) => e,
            Ok(None) => continue,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let snippet = format!("{}...", truncate_chars(&text, 100).replace('\n', " "));
        corpus.push(CorpusEntry {
            embedding,
            metadata: EntryMetadata::local(path.to_string_lossy().to_string(), snippet),
        });
    }

    info!(
        "loaded {} local documents from {}",
        corpus.len(),
        corpus_dir.display()
    );
    corpus
}

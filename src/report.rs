use crate::embed::kb::CorpusEntry;
use crate::types::{DomainPage, WebResult};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write the aggregated markdown report (`<query_id>_output.md`) plus the
/// bare final answer (`final_report.md`). Returns the aggregated path.
pub fn aggregate_results(
    output_dir: &Path,
    query_id: &str,
    enhanced_query: &str,
    web_results: &[WebResult],
    local_results: &[CorpusEntry],
    grouped_web_results: &BTreeMap<String, Vec<DomainPage>>,
    final_answer: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let mut md = String::new();
    let _ = writeln!(md, "# Aggregated Results for Query ID: {}\n", query_id);

    let _ = writeln!(md, "## Enhanced Query");
    let _ = writeln!(md, "{}\n", enhanced_query);

    let _ = writeln!(md, "## Web Search Results");
    if web_results.is_empty() {
        let _ = writeln!(md, "_No web results found_\n");
    } else {
        for item in web_results {
            let _ = writeln!(md, "- **URL:** {}", item.url);
            let _ = writeln!(md, "  - **Snippet:** {}\n", item.snippet);
        }
    }

    if !grouped_web_results.is_empty() {
        let _ = writeln!(md, "## Grouped Web Results by Domain");
        for (domain, items) in grouped_web_results {
            let _ = writeln!(md, "### Domain: {}", domain);
            for item in items {
                let _ = writeln!(md, "- **URL:** {}", item.url);
                let _ = writeln!(md, "  - **File Path:** {}", item.file_path);
                let _ = writeln!(md, "  - **Content Type:** {}", item.content_type);
            }
            let _ = writeln!(md);
        }
    }

    let _ = writeln!(md, "## Local Retrieval Results");
    for doc in local_results {
        let _ = writeln!(md, "- **File:** {}", doc.metadata.file_path);
        let _ = writeln!(md, "  - **Snippet:** {}\n", doc.metadata.snippet);
    }

    let _ = writeln!(md, "## Final Aggregated Answer (RAG)");
    let _ = writeln!(md, "{}\n", final_answer.trim());

    let output_path = output_dir.join(format!("{}_output.md", query_id));
    std::fs::write(&output_path, &md)
        .with_context(|| format!("writing {}", output_path.display()))?;

    let final_path = output_dir.join("final_report.md");
    std::fs::write(&final_path, format!("{}\n", final_answer.trim()))
        .with_context(|| format!("writing {}", final_path.display()))?;

    info!("aggregated report written to {}", output_path.display());
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::kb::EntryMetadata;

    #[test]
    fn report_contains_all_sections() {
        let dir = std::env::temp_dir().join(format!("sagecrawl-report-{}", uuid::Uuid::new_v4()));

        let web = vec![WebResult {
            url: "https://example.com/a".into(),
            snippet: "a snippet".into(),
            title: "A".into(),
            source_engine: "searxng".into(),
        }];
        let local = vec![CorpusEntry {
            embedding: vec![1.0],
            metadata: EntryMetadata::local("docs/x.txt".into(), "local snippet".into()),
        }];
        let mut grouped = BTreeMap::new();
        grouped.insert(
            "example.com".to_string(),
            vec![DomainPage {
                url: "https://example.com/a".into(),
                file_path: "out/abc.html".into(),
                content_type: "text/html".into(),
                title: "A".into(),
                source_engine: "searxng".into(),
            }],
        );

        let path =
            aggregate_results(&dir, "deadbeef", "the query", &web, &local, &grouped, "The answer.")
                .unwrap();
        let md = std::fs::read_to_string(&path).unwrap();
        assert!(md.contains("# Aggregated Results for Query ID: deadbeef"));
        assert!(md.contains("## Enhanced Query"));
        assert!(md.contains("https://example.com/a"));
        assert!(md.contains("### Domain: example.com"));
        assert!(md.contains("docs/x.txt"));
        assert!(md.contains("The answer."));

        let final_md = std::fs::read_to_string(dir.join("final_report.md")).unwrap();
        assert_eq!(final_md, "The answer.\n");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_web_results_render_placeholder() {
        let dir = std::env::temp_dir().join(format!("sagecrawl-report-{}", uuid::Uuid::new_v4()));
        let path = aggregate_results(&dir, "cafe0001", "q", &[], &[], &BTreeMap::new(), "ok")
            .unwrap();
        let md = std::fs::read_to_string(&path).unwrap();
        assert!(md.contains("_No web results found_"));
        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Extraction records and the enriched corpus they form, with JSON
//! persistence.

use crate::index::IndexDocument;
use crate::schema::Modality;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Structured description of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Name of the schema the backend selected
    pub schema: String,
    pub modality: Modality,
    pub fields: BTreeMap<String, String>,
    pub image_path: PathBuf,
}

impl ExtractionRecord {
    /// Text form used as the retrieval unit
    pub fn to_text(&self) -> String {
        let mut text = format!("[{}] {}\n", self.modality, self.image_path.display());
        for (name, value) in &self.fields {
            text.push_str(name);
            text.push_str(": ");
            text.push_str(value);
            text.push('\n');
        }
        text
    }

    pub fn to_index_document(&self, id: usize) -> IndexDocument {
        let mut metadata = BTreeMap::new();
        metadata.insert("schema".to_string(), self.schema.clone());
        metadata.insert("modality".to_string(), self.modality.tag().to_string());
        metadata.insert(
            "image_path".to_string(),
            self.image_path.display().to_string(),
        );
        IndexDocument {
            id: format!("img-{id}"),
            text: self.to_text(),
            metadata,
        }
    }
}

/// Records that survived enrichment, in input image order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedCorpus {
    pub records: Vec<ExtractionRecord>,
}

impl EnrichedCorpus {
    pub fn new(records: Vec<ExtractionRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionRecord> {
        self.records.iter()
    }

    pub fn to_index_documents(&self) -> Vec<IndexDocument> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| r.to_index_document(i))
            .collect()
    }

    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        tokio::fs::write(path, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ExtractionRecord {
        ExtractionRecord {
            schema: "get_research_graph_info".to_string(),
            modality: Modality::Graph,
            fields: BTreeMap::from([
                ("title".to_string(), "Loss curve".to_string()),
                ("trend".to_string(), "decreasing".to_string()),
            ]),
            image_path: PathBuf::from("images/p3_1.png"),
        }
    }

    #[test]
    fn test_text_form() {
        let text = record().to_text();
        assert!(text.starts_with("[graph] images/p3_1.png\n"));
        assert!(text.contains("title: Loss curve\n"));
        assert!(text.contains("trend: decreasing\n"));
    }

    #[test]
    fn test_index_document_metadata() {
        let doc = record().to_index_document(7);
        assert_eq!(doc.id, "img-7");
        assert_eq!(doc.metadata["modality"], "graph");
        assert_eq!(doc.metadata["schema"], "get_research_graph_info");
        assert_eq!(doc.metadata["image_path"], "images/p3_1.png");
    }

    #[tokio::test]
    async fn test_corpus_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("corpus.json");
        let corpus = EnrichedCorpus::new(vec![record()]);

        corpus.save(&path).await.unwrap();
        assert_eq!(EnrichedCorpus::load(&path).await.unwrap(), corpus);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        tokio::fs::write(&path, "{\"records\": 3}").await.unwrap();

        let err = EnrichedCorpus::load(&path).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
    }
}

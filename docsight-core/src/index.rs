//! Question answering over an enriched corpus.
//!
//! Embedding is delegated to an [`Embedder`]; the index ranks documents by
//! cosine similarity and hands the top `k` to the reasoning backend for
//! answer synthesis.

use crate::error::IndexError;
use async_trait::async_trait;
use llm::{ChatMessage, ChatModel, ChatPayload, ChatRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Retrieval unit handed to an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait CorpusIndex: Send + Sync {
    /// Add documents; later calls extend the index.
    async fn index(&mut self, documents: Vec<IndexDocument>) -> Result<(), IndexError>;

    async fn query(&self, question: &str) -> Result<String, IndexError>;
}

/// External embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, IndexError> {
        self.embed_texts(&[query])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Embedding("empty embedding result".to_string()))
    }
}

pub const DEFAULT_TOP_K: usize = 8;

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Prompt layout for [`LlmCorpusIndex`].
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    /// Placeholders: {id}, {metadata}, {content}
    pub document_template: String,
    /// Placeholder: {documents}
    pub wrapper_template: String,
    /// Placeholder: {question}
    pub instructions_template: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            document_template: r#"<image_record id="{id}" {metadata}>
{content}
</image_record>"#
                .to_string(),
            wrapper_template: r#"<image_records>
{documents}
</image_records>"#
                .to_string(),
            instructions_template: r#"

The records above describe the figures of a document. Answer the question using only these records. Cite the image path of every record you rely on. If the records do not contain the answer, say so.

Question: {question}"#
                .to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn format_document(&self, document: &IndexDocument) -> String {
        let metadata = document
            .metadata
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('"', "'")))
            .collect::<Vec<_>>()
            .join(" ");
        self.document_template
            .replace("{id}", &document.id)
            .replace("{metadata}", &metadata)
            .replace("{content}", document.text.trim_end())
    }

    pub fn format_prompt(&self, documents: &[&IndexDocument], question: &str) -> String {
        let formatted: Vec<String> = documents.iter().map(|d| self.format_document(d)).collect();
        let wrapped = self
            .wrapper_template
            .replace("{documents}", &formatted.join("\n\n"));
        let instructions = self.instructions_template.replace("{question}", question);
        format!("{}{}", wrapped, instructions)
    }
}

/// Retrieves the documents closest to a question and asks the reasoning
/// backend to answer from them.
///
/// Without an embedder the first `top_k` documents are used as they are.
pub struct LlmCorpusIndex {
    model: Arc<dyn ChatModel + Send + Sync>,
    embedder: Option<Arc<dyn Embedder>>,
    templates: PromptTemplates,
    documents: Vec<IndexDocument>,
    /// Parallel to `documents` when an embedder is set
    embeddings: Vec<Vec<f32>>,
    top_k: usize,
    max_tokens: u32,
}

impl LlmCorpusIndex {
    pub fn new(model: Arc<dyn ChatModel + Send + Sync>) -> Self {
        Self {
            model,
            embedder: None,
            templates: PromptTemplates::default(),
            documents: Vec::new(),
            embeddings: Vec::new(),
            top_k: DEFAULT_TOP_K,
            max_tokens: 2048,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents to show the backend for `question`, best first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<&IndexDocument>, IndexError> {
        let Some(embedder) = &self.embedder else {
            return Ok(self.documents.iter().take(self.top_k).collect());
        };

        let query = embedder.embed_query(question).await?;
        let mut scored: Vec<(f32, &IndexDocument)> = self
            .embeddings
            .iter()
            .zip(&self.documents)
            .map(|(embedding, document)| (cosine_similarity(&query, embedding), document))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, document)| document)
            .collect())
    }
}

#[async_trait]
impl CorpusIndex for LlmCorpusIndex {
    async fn index(&mut self, documents: Vec<IndexDocument>) -> Result<(), IndexError> {
        if let Some(embedder) = &self.embedder {
            let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
            let embeddings = embedder.embed_texts(&texts).await?;
            if embeddings.len() != documents.len() {
                return Err(IndexError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    documents.len(),
                    embeddings.len()
                )));
            }
            self.embeddings.extend(embeddings);
        }
        debug!(added = documents.len(), total = self.documents.len() + documents.len(), "Indexing documents");
        self.documents.extend(documents);
        Ok(())
    }

    async fn query(&self, question: &str) -> Result<String, IndexError> {
        if self.documents.is_empty() {
            return Err(IndexError::Empty);
        }

        let documents = self.retrieve(question).await?;
        if documents.len() < self.documents.len() {
            debug!(kept = documents.len(), total = self.documents.len(), "Narrowed documents for query");
        }
        let prompt = self.templates.format_prompt(&documents, question);
        let message = ChatMessage::user(ChatPayload::text(prompt));
        let request = ChatRequest::new([&message]).max_tokens(self.max_tokens);

        debug!(documents = documents.len(), model = self.model.name(), "Querying corpus");
        let response = self.model.chat(&request).await?;
        Ok(response.get_text())
    }
}

use async_trait::async_trait;
use docsight_core::{
    CorpusIndex, DispatcherConfig, DocumentParser, EnrichedCorpus, Enricher, ExtractionDispatcher,
    JsonFileParser, LlmCorpusIndex, Modality, ParseCache, RetryPolicy, SchemaRegistry, SkipReason,
};
use llm::{
    ChatMessage, ChatModel, ChatPayload, ChatRequest, ChatResponse, LlmError, StopReason, ToolCall,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Picks a schema from the page markdown it is shown: "Figure" pages get a
/// graph, "Architecture" pages a diagram, anything else plain prose.
/// Text-only requests are treated as corpus questions.
struct FakeClaude {
    questions: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatModel for FakeClaude {
    fn name(&self) -> &str {
        "fake-claude"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let message = &request.messages()[0];
        let text = message.get_text();

        if message.payload.get_images().is_empty() {
            self.questions.lock().unwrap().push(text);
            return Ok(ChatResponse::new(
                ChatMessage::assistant(ChatPayload::text("Accuracy rises with scale.")),
                Some(StopReason::EndTurn),
            ));
        }

        let call = if text.contains("Figure") {
            ToolCall {
                id: "toolu_graph".to_string(),
                name: "get_research_graph_info".to_string(),
                arguments: json!({
                    "title": "Accuracy vs. model size",
                    "legend": "one line per benchmark",
                    "description": "Accuracy grows with parameters",
                    "keywords": ["scaling", "accuracy"],
                    "trend": "increasing",
                    "x-axis": "parameters (B)",
                    "y-axis": "accuracy (%)"
                }),
            }
        } else if text.contains("Architecture") {
            ToolCall {
                id: "toolu_diagram".to_string(),
                name: "get_research_diagram_info".to_string(),
                arguments: json!({
                    "title": "Retriever and generator",
                    "legend": "arrows show data flow",
                    "description": "A retriever feeds passages to a generator",
                    "keywords": "rag, retriever, generator"
                }),
            }
        } else {
            return Ok(ChatResponse::new(
                ChatMessage::assistant(ChatPayload::text("This is a logo.")),
                Some(StopReason::EndTurn),
            ));
        };

        Ok(ChatResponse::new(
            ChatMessage::assistant(ChatPayload::tool_call(call)),
            Some(StopReason::ToolUse),
        ))
    }
}

fn write_document(dir: &TempDir) -> std::path::PathBuf {
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("p1_logo.png"), PNG).unwrap();
    std::fs::write(images.join("p2_arch.jpg"), JPEG).unwrap();
    std::fs::write(images.join("p3_plot.png"), PNG).unwrap();
    std::fs::write(images.join("p9_orphan.png"), PNG).unwrap();

    let parsed = json!({
        "pages": [
            {"page": 1, "md": "# A Survey of Retrieval"},
            {"page": 2, "md": "## Architecture\nThe retriever feeds the generator."},
            {"page": 3, "md": "## Results\nFigure 4 reports accuracy."}
        ],
        "images": [
            {"path": "images/p1_logo.png", "page_number": 1},
            {"path": "images/p2_arch.jpg", "page_number": 2},
            {"path": "images/p3_plot.png", "page": 3},
            {"path": "images/p9_orphan.png", "page": 9},
            {"path": "images/missing.png", "page": 3}
        ]
    });
    let path = dir.path().join("survey.json");
    std::fs::write(&path, serde_json::to_string_pretty(&parsed).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_parse_enrich_persist_query() {
    let dir = TempDir::new().unwrap();
    let source = write_document(&dir);

    let cache = ParseCache::new(dir.path().join("cache"));
    let document = cache
        .get_or_parse(&JsonFileParser, &source)
        .await
        .unwrap();
    assert_eq!(document, JsonFileParser.parse(&source).await.unwrap());
    let pages = document.page_context().unwrap();

    let model = Arc::new(FakeClaude {
        questions: Mutex::new(Vec::new()),
    });
    let config = DispatcherConfig {
        retry: RetryPolicy::none(),
        ..DispatcherConfig::default()
    };
    let dispatcher = ExtractionDispatcher::new(
        model.clone(),
        Arc::new(SchemaRegistry::research().unwrap()),
        config,
    );
    let enricher = Enricher::new(Arc::new(dispatcher), 3);

    let report = enricher
        .run(&document.images, &pages, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 5);
    assert_eq!(report.produced(), 2);
    assert_eq!(report.skipped(), 3);

    let modalities: Vec<Modality> = report.corpus.iter().map(|r| r.modality).collect();
    assert_eq!(modalities, vec![Modality::Diagram, Modality::Graph]);
    assert!(report.corpus.records[0].image_path.ends_with("images/p2_arch.jpg"));
    assert_eq!(report.corpus.records[1].fields["keywords"], "scaling, accuracy");

    let skipped: Vec<usize> = report.skips.iter().map(|s| s.index).collect();
    assert_eq!(skipped, vec![0, 3, 4]);
    assert!(matches!(report.skips[0].reason, SkipReason::Extraction(_)));
    assert!(matches!(report.skips[1].reason, SkipReason::OutOfRange(_)));
    assert!(matches!(report.skips[2].reason, SkipReason::Codec(_)));

    let corpus_path = dir.path().join("out").join("corpus.json");
    report.corpus.save(&corpus_path).await.unwrap();
    let corpus = EnrichedCorpus::load(&corpus_path).await.unwrap();
    assert_eq!(corpus, report.corpus);

    let mut index = LlmCorpusIndex::new(model.clone());
    index.index(corpus.to_index_documents()).await.unwrap();
    let answer = index.query("How does accuracy scale?").await.unwrap();
    assert_eq!(answer, "Accuracy rises with scale.");

    let questions = model.questions.lock().unwrap();
    assert_eq!(questions.len(), 1);
    assert!(questions[0].contains("trend: increasing"));
    assert!(questions[0].contains("p2_arch.jpg"));
}

#[tokio::test]
async fn test_cancelled_before_start_returns_empty_partial() {
    let dir = TempDir::new().unwrap();
    let source = write_document(&dir);
    let document = JsonFileParser.parse(&source).await.unwrap();
    let pages = document.page_context().unwrap();

    let dispatcher = ExtractionDispatcher::new(
        Arc::new(FakeClaude {
            questions: Mutex::new(Vec::new()),
        }),
        Arc::new(SchemaRegistry::research().unwrap()),
        DispatcherConfig {
            retry: RetryPolicy::new(1, Duration::ZERO, Duration::ZERO),
            ..DispatcherConfig::default()
        },
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Enricher::new(Arc::new(dispatcher), 2)
        .run(&document.images, &pages, cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.attempted, 0);
    assert!(report.corpus.is_empty());
}

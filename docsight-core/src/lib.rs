//! Image enrichment for parsed multimodal documents.
//!
//! Every image of a parsed document is sent, together with the markdown of
//! the page it came from, to a vision model that must describe it through
//! one of the schemas in a [`SchemaRegistry`]. The resulting
//! [`EnrichedCorpus`] feeds a [`CorpusIndex`] for question answering.

pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod parsed;
pub mod record;
pub mod retry;
pub mod schema;

pub use codec::{EncodedImage, encode};
pub use context::{ImageReference, PageContext, context_for};
pub use dispatcher::{DispatcherConfig, ExtractionDispatcher};
pub use error::{
    BackendError, CodecError, DocumentError, ExtractionError, IndexError, OutOfRangeError,
    RunError, SchemaError, SkipReason,
};
pub use index::{
    CorpusIndex, DEFAULT_TOP_K, Embedder, IndexDocument, LlmCorpusIndex, PromptTemplates,
};
pub use orchestrator::{DEFAULT_CONCURRENCY, Enricher, EnrichmentReport, Skip};
pub use parsed::{
    DocumentParser, JsonFileParser, ParseCache, ParsedDocument, ParsedPage, SourceFingerprint,
};
pub use record::{EnrichedCorpus, ExtractionRecord};
pub use retry::RetryPolicy;
pub use schema::{ExtractionSchema, FieldSpec, Modality, SchemaRegistry};

//! Parsed documents as produced by the external parsing service, and a
//! cache that keeps them on disk between runs.

use crate::context::{ImageReference, PageContext};
use crate::error::DocumentError;
use async_trait::async_trait;
use config::PathManager;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPage {
    /// One-based page number
    pub page: u32,
    #[serde(alias = "markdown")]
    pub md: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub pages: Vec<ParsedPage>,
    #[serde(default)]
    pub images: Vec<ImageReference>,
}

impl ParsedDocument {
    /// Page markdown in page order. Pages may arrive in any order but must
    /// cover 1..=n without gaps.
    pub fn page_context(&self) -> Result<PageContext, DocumentError> {
        let mut pages: Vec<&ParsedPage> = self.pages.iter().collect();
        pages.sort_by_key(|p| p.page);

        for (expected, page) in (1u32..).zip(&pages) {
            if page.page != expected {
                return Err(DocumentError::NonContiguousPages {
                    expected,
                    found: page.page,
                });
            }
        }

        Ok(PageContext::new(
            pages.into_iter().map(|p| p.md.clone()).collect(),
        ))
    }

    /// Make relative image paths relative to `base` instead of the working directory
    pub fn resolve_image_paths(&mut self, base: &Path) {
        for image in &mut self.images {
            if image.path.is_relative() {
                image.path = base.join(&image.path);
            }
        }
    }
}

/// Source of parsed documents.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, source: &Path) -> Result<ParsedDocument, DocumentError>;
}

/// Reads parser output already saved as JSON. Image paths are resolved
/// against the JSON file's directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileParser;

#[async_trait]
impl DocumentParser for JsonFileParser {
    async fn parse(&self, source: &Path) -> Result<ParsedDocument, DocumentError> {
        let content = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| DocumentError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
        let mut document: ParsedDocument =
            serde_json::from_str(&content).map_err(|e| DocumentError::Json {
                path: source.to_path_buf(),
                source: e,
            })?;
        if let Some(base) = source.parent() {
            document.resolve_image_paths(base);
        }
        Ok(document)
    }
}

/// Parsed documents stored as JSON.
///
/// Entries are keyed by the canonical path of the source and remember a
/// SHA-256 of its content, so two sources with the same file name never share
/// an entry and an edited source is parsed again.
#[derive(Debug, Clone)]
pub struct ParseCache {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    source: PathBuf,
    content_hash: String,
    document: ParsedDocument,
}

/// Identity of a source file at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFingerprint {
    /// Canonical path
    pub path: PathBuf,
    /// SHA-256 of the file content, hex encoded
    pub content_hash: String,
}

impl SourceFingerprint {
    pub async fn of(source: &Path) -> Result<Self, DocumentError> {
        let io_err = |e| DocumentError::Io {
            path: source.to_path_buf(),
            source: e,
        };
        let path = tokio::fs::canonicalize(source).await.map_err(io_err)?;
        let bytes = tokio::fs::read(&path).await.map_err(io_err)?;
        Ok(Self {
            path,
            content_hash: compute_hash(&bytes),
        })
    }
}

fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

impl ParseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache under the application cache directory
    pub fn default_location() -> Option<Self> {
        PathManager::parse_cache_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry file for a canonical source path: readable stem plus a path hash
    pub fn path_for(&self, canonical_source: &Path) -> PathBuf {
        let stem: String = canonical_source
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let path_hash = compute_hash(canonical_source.to_string_lossy().as_bytes());
        self.dir.join(format!("{}-{}.json", stem, &path_hash[..16]))
    }

    /// Cached document for this exact source content, if any. Unreadable or
    /// stale entries count as misses.
    pub async fn get(
        &self,
        fingerprint: &SourceFingerprint,
    ) -> Result<Option<ParsedDocument>, DocumentError> {
        let path = self.path_for(&fingerprint.path);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DocumentError::Io { path, source: e }),
        };

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                return Ok(None);
            }
        };
        if entry.source != fingerprint.path || entry.content_hash != fingerprint.content_hash {
            debug!(source = %fingerprint.path.display(), "Cache entry is stale");
            return Ok(None);
        }
        Ok(Some(entry.document))
    }

    pub async fn put(
        &self,
        fingerprint: &SourceFingerprint,
        document: &ParsedDocument,
    ) -> Result<(), DocumentError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| DocumentError::Io { path, source }
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        let path = self.path_for(&fingerprint.path);
        let temp_path = path.with_extension("json.tmp");
        let entry = CacheEntry {
            source: fingerprint.path.clone(),
            content_hash: fingerprint.content_hash.clone(),
            document: document.clone(),
        };
        let content = serde_json::to_string_pretty(&entry).map_err(|e| DocumentError::Json {
            path: path.clone(),
            source: e,
        })?;

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(io_err(&temp_path))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(io_err(&path))?;
        debug!(source = %fingerprint.path.display(), path = %path.display(), "Cached parsed document");
        Ok(())
    }

    /// Return the cached document for `source`, parsing it on a miss.
    pub async fn get_or_parse(
        &self,
        parser: &dyn DocumentParser,
        source: &Path,
    ) -> Result<ParsedDocument, DocumentError> {
        let fingerprint = SourceFingerprint::of(source).await?;
        if let Some(document) = self.get(&fingerprint).await? {
            debug!(source = %fingerprint.path.display(), "Parse cache hit");
            return Ok(document);
        }

        info!(source = %source.display(), "Parsing document");
        let document = parser.parse(source).await?;
        self.put(&fingerprint, &document).await?;
        Ok(document)
    }
}

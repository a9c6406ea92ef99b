//! Enrichment runs: every image of a document through context lookup,
//! encoding and extraction, with bounded concurrency.

use crate::codec;
use crate::context::{ImageReference, PageContext, context_for};
use crate::dispatcher::ExtractionDispatcher;
use crate::error::{ExtractionError, RunError, SkipReason};
use crate::record::{EnrichedCorpus, ExtractionRecord};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// An image that produced no record.
#[derive(Debug)]
pub struct Skip {
    /// Position of the image in the run input
    pub index: usize,
    pub image_path: PathBuf,
    pub reason: SkipReason,
}

/// Outcome of one enrichment run.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub corpus: EnrichedCorpus,
    /// In input order, like the corpus
    pub skips: Vec<Skip>,
    /// Images whose processing finished, successfully or not
    pub attempted: usize,
    /// Images handed to the run
    pub total: usize,
    pub cancelled: bool,
}

impl EnrichmentReport {
    pub fn produced(&self) -> usize {
        self.corpus.len()
    }

    pub fn skipped(&self) -> usize {
        self.skips.len()
    }

    /// Every image was attempted and the run was not cut short
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.attempted == self.total
    }
}

pub struct Enricher {
    dispatcher: Arc<ExtractionDispatcher>,
    concurrency: usize,
}

impl Enricher {
    pub fn new(dispatcher: Arc<ExtractionDispatcher>, concurrency: usize) -> Self {
        Self {
            dispatcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich `images` against `pages`.
    ///
    /// Per-image failures are collected as skips. A fatal backend error aborts
    /// the run; the error carries the records finished before it. When
    /// `cancel` fires, in-flight extractions are dropped and the records
    /// finished so far are returned.
    pub async fn run(
        &self,
        images: &[ImageReference],
        pages: &PageContext,
        cancel: CancellationToken,
    ) -> Result<EnrichmentReport, RunError> {
        info!(
            images = images.len(),
            pages = pages.len(),
            concurrency = self.concurrency,
            "Starting enrichment run"
        );

        let mut slots: Vec<Option<Result<ExtractionRecord, SkipReason>>> =
            std::iter::repeat_with(|| None).take(images.len()).collect();

        let dispatcher = self.dispatcher.as_ref();
        let mut outcomes = futures::stream::iter(images.iter().enumerate())
            .map(|(index, image)| async move {
                (index, enrich_one(dispatcher, image, pages).await)
            })
            .buffer_unordered(self.concurrency);

        let mut cancelled = false;
        let mut fatal = None;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = outcomes.next() => next,
            };

            match next {
                Some((index, Err(SkipReason::Extraction(ExtractionError::Backend(source)))))
                    if source.is_fatal() =>
                {
                    fatal = Some((index, source));
                    break;
                }
                Some((index, Err(reason))) => {
                    warn!(index, image = %images[index].path.display(), reason = %reason, "Skipping image");
                    slots[index] = Some(Err(reason));
                }
                Some((index, Ok(record))) => {
                    debug!(index, schema = %record.schema, "Image enriched");
                    slots[index] = Some(Ok(record));
                }
                None => break,
            }
        }
        drop(outcomes);

        let report = collect(images, slots, cancelled);
        if let Some((index, source)) = fatal {
            let image_path = images[index].path.clone();
            error!(
                image = %image_path.display(),
                error = %source,
                produced = report.produced(),
                "Aborting run"
            );
            return Err(RunError::Fatal {
                image_path,
                source,
                report: Box::new(report),
            });
        }

        info!(
            attempted = report.attempted,
            produced = report.produced(),
            skipped = report.skipped(),
            cancelled = report.cancelled,
            "Enrichment run finished"
        );
        Ok(report)
    }
}

/// Fold per-index outcomes into a report, in input order.
fn collect(
    images: &[ImageReference],
    slots: Vec<Option<Result<ExtractionRecord, SkipReason>>>,
    cancelled: bool,
) -> EnrichmentReport {
    let mut report = EnrichmentReport {
        total: images.len(),
        cancelled,
        ..EnrichmentReport::default()
    };
    let mut records = Vec::new();
    for (index, slot) in slots.into_iter().enumerate() {
        let Some(outcome) = slot else { continue };
        report.attempted += 1;
        match outcome {
            Ok(record) => records.push(record),
            Err(reason) => report.skips.push(Skip {
                index,
                image_path: images[index].path.clone(),
                reason,
            }),
        }
    }
    report.corpus = EnrichedCorpus::new(records);
    report
}

async fn enrich_one(
    dispatcher: &ExtractionDispatcher,
    image: &ImageReference,
    pages: &PageContext,
) -> Result<ExtractionRecord, SkipReason> {
    let context = context_for(image, pages)?;
    let encoded = codec::encode(&image.path).await?;
    debug!(
        image = %image.path.display(),
        page = image.page_number,
        mime_type = %encoded.mime_type,
        "Dispatching extraction"
    );
    Ok(dispatcher.extract(context, &encoded).await?)
}

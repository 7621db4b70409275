//! Entity analysis handlers

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use nera_core::{Document, Entity, EntityLabel, TextStats};
use nera_enrich::EnrichmentOptions;
use nera_parser::{FileType, InputSet};
use nera_pipeline::{BatchResult, CancellationToken, EntryOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

// ============================================================================
// Request / Response Types
// ============================================================================

/// Per-request enrichment switches; absent fields use the server defaults
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EnrichmentFlags {
    /// Score document sentiment
    pub include_sentiment: Option<bool>,
    /// Detect document language
    pub include_language: Option<bool>,
    /// Link entities to the knowledge graph
    pub link_entities: Option<bool>,
}

impl EnrichmentFlags {
    fn resolve(&self, defaults: EnrichmentOptions) -> EnrichmentOptions {
        EnrichmentOptions {
            language: self.include_language.unwrap_or(defaults.language),
            sentiment: self.include_sentiment.unwrap_or(defaults.sentiment),
            linking: self.link_entities.unwrap_or(defaults.linking),
        }
    }
}

/// Single text analysis request
#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Text to analyze
    #[schema(example = "Apple Inc. was founded by Steve Jobs.")]
    pub text: String,

    #[serde(flatten)]
    pub flags: EnrichmentFlags,
}

/// Batch analysis request
#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Texts to analyze, in order
    pub texts: Vec<String>,

    #[serde(flatten)]
    pub flags: EnrichmentFlags,
}

/// Upload query parameters
#[derive(Debug, Deserialize, IntoParams)]
pub struct UploadQuery {
    /// Original file name; the extension selects the accepted types
    #[param(example = "notes.txt")]
    pub filename: String,

    pub include_sentiment: Option<bool>,
    pub include_language: Option<bool>,
    pub link_entities: Option<bool>,
}

impl UploadQuery {
    fn flags(&self) -> EnrichmentFlags {
        EnrichmentFlags {
            include_sentiment: self.include_sentiment,
            include_language: self.include_language,
            link_entities: self.link_entities,
        }
    }
}

/// Extracted entity
#[derive(Debug, Serialize, ToSchema)]
pub struct EntityResponse {
    #[schema(example = "Apple Inc.")]
    pub text: String,
    #[schema(example = "ORG")]
    pub label: String,
    /// Label description
    #[schema(example = "Companies, agencies, institutions, etc.")]
    pub description: String,
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    #[schema(example = 0.9)]
    pub confidence: f32,
    /// Knowledge graph id, when linked
    #[schema(example = "Q312")]
    pub linked_id: Option<String>,
    /// Knowledge graph description of the linked item
    #[schema(example = "American technology company")]
    pub linked_description: Option<String>,
}

impl From<&Entity> for EntityResponse {
    fn from(entity: &Entity) -> Self {
        Self {
            text: entity.text.clone(),
            label: entity.label.clone(),
            description: entity.description().to_string(),
            start: entity.start,
            end: entity.end,
            confidence: entity.confidence,
            linked_id: entity.linked_id.clone(),
            linked_description: entity.linked_description.clone(),
        }
    }
}

/// Text statistics
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub character_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    pub avg_word_length: f64,
    pub entity_count: usize,
    pub unique_entities: usize,
}

impl From<&TextStats> for StatsResponse {
    fn from(stats: &TextStats) -> Self {
        Self {
            character_count: stats.character_count,
            word_count: stats.word_count,
            sentence_count: stats.sentence_count,
            avg_word_length: stats.avg_word_length,
            entity_count: stats.entity_count,
            unique_entities: stats.unique_entities,
        }
    }
}

/// Analysed document
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentResponse {
    #[schema(example = "text-000001")]
    pub source_id: String,
    pub text: String,
    /// ISO 639-1 code; null when unknown or not requested
    #[schema(example = "en")]
    pub language: Option<String>,
    /// Polarity in [-1, 1]; null when unknown or not requested
    pub sentiment: Option<f64>,
    /// Subjectivity in [0, 1]; null when unknown or not requested
    pub subjectivity: Option<f64>,
    pub entities: Vec<EntityResponse>,
    pub stats: StatsResponse,
}

impl From<&Document> for DocumentResponse {
    fn from(document: &Document) -> Self {
        Self {
            source_id: document.source_id.clone(),
            text: document.text.clone(),
            language: document.language.clone(),
            sentiment: document.sentiment,
            subjectivity: document.subjectivity,
            entities: document.entities.iter().map(EntityResponse::from).collect(),
            stats: StatsResponse::from(&document.stats),
        }
    }
}

/// Single analysis response
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub document: DocumentResponse,

    /// Processing time in milliseconds
    #[schema(example = 12)]
    pub processing_time_ms: u64,
}

/// Per-item failure
#[derive(Debug, Serialize, ToSchema)]
pub struct FailureResponse {
    /// validation, extraction, io or cancelled
    #[schema(example = "validation")]
    pub kind: String,
    #[schema(example = "empty input")]
    pub reason: String,
}

/// One batch item result
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemResponse {
    /// Position in the request
    pub batch_index: usize,
    pub source_id: String,
    /// success or failure
    #[schema(example = "success")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureResponse>,
}

/// Aggregate statistics over a batch
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchStatisticsResponse {
    pub total_texts: usize,
    pub successful: usize,
    pub failed: usize,
    /// Texts dropped by the batch limits
    pub truncated: usize,
    pub total_entities: usize,
    pub total_words: usize,
    pub entity_distribution: BTreeMap<String, usize>,
    pub language_distribution: BTreeMap<String, usize>,
    pub mean_confidence: Option<f64>,
    pub mean_sentiment: Option<f64>,
    pub mean_subjectivity: Option<f64>,
}

/// Batch analysis response
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResponse>,
    pub batch_statistics: BatchStatisticsResponse,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl From<&BatchResult> for BatchResponse {
    fn from(batch: &BatchResult) -> Self {
        let results = batch
            .entries
            .iter()
            .map(|entry| match &entry.outcome {
                EntryOutcome::Success(document) => BatchItemResponse {
                    batch_index: entry.index,
                    source_id: entry.source_id.clone(),
                    status: "success".to_string(),
                    document: Some(DocumentResponse::from(document)),
                    error: None,
                },
                EntryOutcome::Failure(failure) => BatchItemResponse {
                    batch_index: entry.index,
                    source_id: entry.source_id.clone(),
                    status: "failure".to_string(),
                    document: None,
                    error: Some(FailureResponse {
                        kind: failure_kind_name(failure.kind).to_string(),
                        reason: failure.reason.clone(),
                    }),
                },
            })
            .collect();

        let stats = &batch.stats;
        Self {
            results,
            batch_statistics: BatchStatisticsResponse {
                total_texts: stats.total,
                successful: stats.successes,
                failed: stats.failures,
                truncated: stats.truncated,
                total_entities: stats.total_entities,
                total_words: stats.total_words,
                entity_distribution: stats.label_counts.clone(),
                language_distribution: stats.language_counts.clone(),
                mean_confidence: stats.mean_confidence(),
                mean_sentiment: stats.mean_sentiment(),
                mean_subjectivity: stats.mean_subjectivity(),
            },
            processing_time_ms: 0,
        }
    }
}

fn failure_kind_name(kind: nera_core::FailureKind) -> &'static str {
    use nera_core::FailureKind;

    match kind {
        FailureKind::Validation => "validation",
        FailureKind::Extraction => "extraction",
        FailureKind::Io => "io",
        FailureKind::Cancelled => "cancelled",
    }
}

/// Entity label and its description
#[derive(Debug, Serialize, ToSchema)]
pub struct EntityTypeInfo {
    #[schema(example = "PERSON")]
    pub label: String,
    #[schema(example = "People, including fictional")]
    pub description: String,
}

/// Known entity labels
#[derive(Debug, Serialize, ToSchema)]
pub struct EntityTypesResponse {
    pub entity_types: Vec<EntityTypeInfo>,
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Analyze a single text
#[utoipa::path(
    post,
    path = "/api/v1/analyze",
    tag = "analysis",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis successful", body = AnalyzeResponse),
        (status = 400, description = "Empty or invalid text", body = crate::error::ApiError),
        (status = 503, description = "Server is shutting down", body = crate::error::ApiError),
        (status = 500, description = "Internal error", body = crate::error::ApiError)
    )
)]
pub async fn analyze_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    state.ensure_ready()?;
    let start = Instant::now();

    let options = req.flags.resolve(state.service.default_options());
    let document = state
        .service
        .analyze_with("text-000001", &req.text, options)
        .await?;

    Ok(Json(AnalyzeResponse {
        document: DocumentResponse::from(&document),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Analyze several texts as one batch
#[utoipa::path(
    post,
    path = "/api/v1/batch",
    tag = "analysis",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Batch processed; items may individually fail", body = BatchResponse),
        (status = 400, description = "Empty or oversized batch", body = crate::error::ApiError),
        (status = 503, description = "Server is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn analyze_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    state.ensure_ready()?;
    let start = Instant::now();

    if req.texts.is_empty() {
        return Err(AppError::BadRequest("texts cannot be empty".to_string()));
    }
    let limit = state.config.server.max_batch_texts;
    if req.texts.len() > limit {
        return Err(AppError::BadRequest(format!(
            "batch of {} texts exceeds the limit of {limit}",
            req.texts.len()
        )));
    }

    let options = req.flags.resolve(state.service.default_options());
    let count = req.texts.len();
    let batch = state
        .service
        .run_batch_with(InputSet::from_texts(req.texts), options, CancellationToken::new())
        .await?;

    let mut response = BatchResponse::from(&batch);
    response.processing_time_ms = start.elapsed().as_millis() as u64;
    info!(
        "Batch of {} texts: {} succeeded in {}ms",
        count, response.batch_statistics.successful, response.processing_time_ms
    );

    Ok(Json(response))
}

/// Analyze an uploaded text file
#[utoipa::path(
    post,
    path = "/api/v1/upload",
    tag = "analysis",
    params(UploadQuery),
    request_body(content = String, description = "Raw file content", content_type = "text/plain"),
    responses(
        (status = 200, description = "Analysis successful", body = AnalyzeResponse),
        (status = 400, description = "Empty file", body = crate::error::ApiError),
        (status = 415, description = "Unsupported file type", body = crate::error::ApiError),
        (status = 503, description = "Server is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    state.ensure_ready()?;
    let start = Instant::now();

    let file_type = FileType::from_path(Path::new(&query.filename));
    if !file_type.is_text() {
        return Err(AppError::UnsupportedMediaType(format!(
            "unsupported file type for {}; accepted: .txt, .md, .csv",
            query.filename
        )));
    }

    let options = query.flags().resolve(state.service.default_options());
    let document = state
        .service
        .analyze_bytes(&query.filename, body.to_vec(), options)
        .await?;

    Ok(Json(AnalyzeResponse {
        document: DocumentResponse::from(&document),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// List the known entity labels
#[utoipa::path(
    get,
    path = "/api/v1/entities/types",
    tag = "analysis",
    responses(
        (status = 200, description = "Known entity labels", body = EntityTypesResponse)
    )
)]
pub async fn entity_types(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();

    let entity_types: Vec<EntityTypeInfo> = EntityLabel::ALL
        .iter()
        .map(|label| EntityTypeInfo {
            label: label.as_str().to_string(),
            description: label.description().to_string(),
        })
        .collect();

    Json(EntityTypesResponse {
        total: entity_types.len(),
        entity_types,
    })
}

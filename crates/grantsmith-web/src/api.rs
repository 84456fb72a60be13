//! REST API endpoint handlers.
//!
//! Handlers stay thin: they adapt HTTP to the pipeline in
//! [`grantsmith::draft`] and the stores, and map [`DraftError`] variants to
//! status codes. Extraction failures come back as 422 with diagnostics,
//! provider rate limits as 429, other provider failures as 502.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use grantsmith::draft::{DraftError, Drafter, EditOutcome, GenerateRequest};
use grantsmith::model::{Document, Partner, generate_document_id, now_rfc3339};
use grantsmith::outline::resolve_outline;
use grantsmith::rank::{Ranked, rank};
use grantsmith::store::{ObjectEntry, load_template};
use grantsmith::{Attachment, budget::enforce_budget, model::SectionNode};

use crate::AppState;

// ── Error mapping ──────────────────────────────────────────────────

/// Wrapper mapping pipeline errors onto HTTP responses.
pub struct ApiError(DraftError);

impl From<DraftError> for ApiError {
    fn from(e: DraftError) -> Self {
        ApiError(e)
    }
}

impl From<String> for ApiError {
    fn from(e: String) -> Self {
        ApiError(DraftError::Persistence(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DraftError::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DraftError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            DraftError::Provider(_) => StatusCode::BAD_GATEWAY,
            DraftError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DraftError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

// ── Proposal endpoints ─────────────────────────────────────────────

/// POST /api/proposals/generate — Draft a new proposal via the provider.
pub async fn generate_proposal(
    State(app): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let template = resolve_request_template(&app, request.template_id.as_deref())?;
    let attachment = match &request.attachment {
        Some(reference) => app
            .objects
            .download(&reference.bucket, &reference.path)?
            .map(|(bytes, mime_type)| Attachment {
                filename: reference.path.clone(),
                mime_type,
                bytes,
            }),
        None => None,
    };

    let drafter = Drafter::new(&app.client, &app.store, app.drafter.clone());
    let doc = drafter
        .generate(
            &request,
            &app.partners,
            &app.knowledge,
            template.as_deref(),
            attachment,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /api/proposals — All stored proposals, newest first.
pub async fn list_proposals(
    State(app): State<AppState>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(app.store.scan_by_prefix("")?))
}

/// POST /api/proposals — Store a caller-supplied proposal.
///
/// Assigns an id when absent and re-establishes the budget invariants
/// against the document's own target before saving.
pub async fn create_proposal(
    State(app): State<AppState>,
    Json(mut doc): Json<Document>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    if doc.id.is_empty() {
        doc.id = generate_document_id();
    }
    if doc.created_at.is_empty() {
        doc.created_at = now_rfc3339();
    }
    doc.updated_at = now_rfc3339();
    let target = doc.target_budget;
    if target > 0 {
        enforce_budget(&mut doc, target);
    }
    app.store.save(&doc)?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /api/proposals/{id}
pub async fn get_proposal(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    let doc = app
        .store
        .load(&id)?
        .ok_or(DraftError::NotFound(id))?;
    Ok(Json(doc))
}

/// PUT /api/proposals/{id} — Full overwrite.
///
/// Last write wins: the supplied document replaces the stored one entirely,
/// including fields the caller did not mean to touch. The creation
/// timestamp survives from the stored copy.
pub async fn update_proposal(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(mut doc): Json<Document>,
) -> Result<Json<Document>, ApiError> {
    let existing = app
        .store
        .load(&id)?
        .ok_or_else(|| DraftError::NotFound(id.clone()))?;

    doc.id = id;
    doc.created_at = existing.created_at;
    doc.updated_at = now_rfc3339();
    let target = doc.target_budget;
    if target > 0 {
        enforce_budget(&mut doc, target);
    }
    app.store.save(&doc)?;
    Ok(Json(doc))
}

/// DELETE /api/proposals/{id}
pub async fn delete_proposal(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app.store.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for POST /api/proposals/{id}/ai-edit.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiEditRequest {
    pub instruction: String,
    #[serde(default)]
    pub section: Option<String>,
}

/// POST /api/proposals/{id}/ai-edit — Apply an edit instruction.
pub async fn ai_edit(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AiEditRequest>,
) -> Result<Json<EditOutcome>, ApiError> {
    let drafter = Drafter::new(&app.client, &app.store, app.drafter.clone());
    let outcome = drafter
        .ai_edit(&id, &body.instruction, body.section.as_deref())
        .await?;
    Ok(Json(outcome))
}

// ── Outline endpoint ───────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineQuery {
    #[serde(default)]
    pub template_id: Option<String>,
}

/// One outline entry annotated with whether content exists for it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineStatus {
    pub key: String,
    pub label: String,
    pub depth: usize,
    pub has_content: bool,
}

/// GET /api/proposals/{id}/outline — The resolved outline, with a content
/// flag per entry so the frontend can offer to generate what's missing.
pub async fn get_outline(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OutlineQuery>,
) -> Result<Json<Vec<OutlineStatus>>, ApiError> {
    let doc = app
        .store
        .load(&id)?
        .ok_or(DraftError::NotFound(id))?;
    let template = resolve_request_template(&app, query.template_id.as_deref())?;

    let outline = resolve_outline(template.as_deref(), &doc.sections);
    let statuses = outline
        .into_iter()
        .map(|entry| OutlineStatus {
            has_content: doc.sections.contains_key(&entry.key),
            key: entry.key,
            label: entry.label,
            depth: entry.depth,
        })
        .collect();
    Ok(Json(statuses))
}

// ── Partner ranking ────────────────────────────────────────────────

/// Request body for POST /api/partners/rank.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRequest {
    pub context: String,
    /// Restrict ranking to these ids; empty ranks the whole registry.
    #[serde(default)]
    pub partner_ids: Vec<String>,
}

/// POST /api/partners/rank — Score registry partners against a context.
pub async fn rank_partners(
    State(app): State<AppState>,
    Json(body): Json<RankRequest>,
) -> Json<Vec<Ranked<Partner>>> {
    let candidates: Vec<Partner> = app
        .partners
        .iter()
        .filter(|p| body.partner_ids.is_empty() || body.partner_ids.contains(&p.id))
        .cloned()
        .collect();
    Json(rank(&body.context, candidates))
}

// ── Attachments ────────────────────────────────────────────────────

/// POST /api/attachments/{bucket}/{path} — Upload raw bytes. The request's
/// Content-Type header is stored alongside the object.
pub async fn upload_attachment(
    State(app): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    app.objects.upload(&bucket, &path, &body, content_type)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/attachments/{bucket}/{path} — Download bytes with the stored
/// content type.
pub async fn download_attachment(
    State(app): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    match app.objects.download(&bucket, &path)? {
        Some((bytes, content_type)) => {
            Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
        }
        None => Err(DraftError::NotFound(format!("{bucket}/{path}")).into()),
    }
}

/// GET /api/attachments/{bucket} — List a bucket's objects.
pub async fn list_attachments(
    State(app): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<Vec<ObjectEntry>>, ApiError> {
    Ok(Json(app.objects.list(&bucket)?))
}

// ── Helpers ────────────────────────────────────────────────────────

/// Load a section template by id from the configured templates directory.
/// An unknown id falls back to the default outline rather than failing —
/// template inconsistency is never fatal.
fn resolve_request_template(
    app: &AppState,
    template_id: Option<&str>,
) -> Result<Option<Vec<SectionNode>>, ApiError> {
    match (template_id, &app.templates_dir) {
        (Some(id), Some(dir)) => Ok(load_template(dir, id)?),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_edit_request_deserializes() {
        let json = r#"{"instruction":"tighten the summary","section":"impact"}"#;
        let req: AiEditRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.instruction, "tighten the summary");
        assert_eq!(req.section.as_deref(), Some("impact"));

        let bare: AiEditRequest =
            serde_json::from_str(r#"{"instruction":"shorter"}"#).unwrap();
        assert!(bare.section.is_none());
    }

    #[test]
    fn rank_request_defaults_to_whole_registry() {
        let req: RankRequest = serde_json::from_str(r#"{"context":"AI farming"}"#).unwrap();
        assert!(req.partner_ids.is_empty());
    }

    #[test]
    fn outline_status_serializes_camel_case() {
        let status = OutlineStatus {
            key: "impact".into(),
            label: "Impact".into(),
            depth: 0,
            has_content: true,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["hasContent"], true);
    }
}

//! The drafting pipeline: prompt → provider → extract → normalize →
//! enforce → persist.
//!
//! A generation request assembles a prompt (optionally enriched with
//! grounding fragments picked by the [`rank`](crate::rank) module), calls
//! the provider, and pushes the raw reply through the
//! [`extract`](crate::extract) chain and the
//! [`budget`](crate::budget) enforcer before saving. Edits re-run the same
//! extract → normalize → enforce chain on a partial update merged over the
//! stored document.
//!
//! Each call runs synchronously end to end; the provider call is the only
//! unbounded external I/O. Extraction and persistence failures abort with
//! diagnostics. Budget enforcement and outline resolution never fail.

pub mod prompt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::retry::{RetryConfig, is_rate_limit_error};
use crate::budget::enforce_budget;
use crate::extract::normalize::normalize_value;
use crate::extract::{ExtractFailure, extract_value};
use crate::model::{
    Document, KnowledgeChunk, Partner, SectionNode, generate_document_id, now_rfc3339,
};
use crate::outline::resolve_outline;
use crate::rank::top_matches;
use crate::store::DocumentStore;
use crate::{
    Attachment, ChatRequest, DEFAULT_MODEL, DRAFT_MAX_TOKENS, EDIT_MAX_TOKENS, GenerationClient,
    Message, ResponseFormat,
};

// ── Error taxonomy ─────────────────────────────────────────────────

/// The pipeline's failure modes, kept distinct so callers can react
/// appropriately (back off on rate limits, surface extraction diagnostics,
/// treat persistence as a server fault).
#[derive(Debug, Error)]
pub enum DraftError {
    /// Provider text could not be parsed or repaired. Carries the original
    /// text length and the last parse diagnostic; never coerced into a
    /// partial document.
    #[error("could not recover a document from {text_len} chars of model output: {reason}")]
    Extraction { text_len: usize, reason: String },

    /// The provider refused with a rate limit; callers should back off.
    #[error("generation provider rate limited")]
    RateLimited,

    /// Any other provider failure (quota, timeout, safety block).
    #[error("generation provider failure: {0}")]
    Provider(String),

    /// Store unreachable or write rejected.
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("proposal {0} not found")]
    NotFound(String),
}

impl From<ExtractFailure> for DraftError {
    fn from(failure: ExtractFailure) -> Self {
        DraftError::Extraction {
            text_len: failure.text_len,
            reason: failure.last_error,
        }
    }
}

/// Classify a provider-client error string into the taxonomy.
fn provider_error(error: String) -> DraftError {
    if is_rate_limit_error(&error) {
        DraftError::RateLimited
    } else {
        DraftError::Provider(error)
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Caller constraints on the proposal. The target budget is authoritative —
/// the enforcer makes the document match it exactly, it is never derived
/// from generated numbers.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    pub target_budget: i64,
    pub duration_months: Option<u32>,
    pub programme: Option<String>,
}

/// A stored attachment to feed to the provider alongside the prompt.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentRef {
    pub bucket: String,
    pub path: String,
}

/// A full generation request.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    pub idea: String,
    pub constraints: Constraints,
    /// Partner ids to include. Empty selects the whole registry.
    pub partner_ids: Vec<String>,
    pub template_id: Option<String>,
    pub attachment: Option<AttachmentRef>,
}

/// Result of an AI edit: the updated document plus the section the edit
/// landed on, when that is unambiguous.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    pub document: Document,
    pub edited_section: Option<String>,
}

// ── Drafter ────────────────────────────────────────────────────────

/// Configuration for the drafting pipeline.
#[derive(Debug, Clone)]
pub struct DrafterConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub retry: RetryConfig,
    /// How many top-ranked knowledge fragments to inject as grounding.
    pub grounding_fragments: usize,
}

impl Default for DrafterConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DRAFT_MAX_TOKENS,
            temperature: 0.7,
            retry: RetryConfig::default(),
            grounding_fragments: 4,
        }
    }
}

/// The drafting pipeline over a provider client and a document store.
pub struct Drafter<'a> {
    client: &'a GenerationClient,
    store: &'a DocumentStore,
    config: DrafterConfig,
}

impl<'a> Drafter<'a> {
    pub fn new(client: &'a GenerationClient, store: &'a DocumentStore, config: DrafterConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Generate a proposal document from scratch and persist it.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        partners: &[Partner],
        knowledge: &[KnowledgeChunk],
        template: Option<&[SectionNode]>,
        attachment: Option<Attachment>,
    ) -> Result<Document, DraftError> {
        // 1. Select consortium partners.
        let selected: Vec<&Partner> = partners
            .iter()
            .filter(|p| request.partner_ids.is_empty() || request.partner_ids.contains(&p.id))
            .collect();

        // 2. Pick grounding fragments by relevance to the idea.
        let context = format!(
            "{} {}",
            request.idea,
            request.constraints.programme.as_deref().unwrap_or("")
        );
        let chunk_refs: Vec<&KnowledgeChunk> = knowledge.iter().collect();
        let grounding = top_matches(&context, chunk_refs, self.config.grounding_fragments);
        if !grounding.is_empty() {
            debug!(
                "grounding with {} fragment(s): {:?}",
                grounding.len(),
                grounding.iter().map(|g| g.item.id.as_str()).collect::<Vec<_>>()
            );
        }

        // 3. The outline drives which sections the model is asked for.
        let expected = resolve_outline(template, &IndexMap::new());

        // 4. Assemble and send the request.
        let user = prompt::generation_user_prompt(request, &selected, &grounding, &expected);
        let user_message = match attachment {
            Some(ref att) => Message::user_with_attachment(user, att),
            None => Message::user(user),
        };
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message::system(prompt::generation_system_prompt()),
                user_message,
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: Some(ResponseFormat::json_object()),
            ..Default::default()
        };
        let completion = self
            .client
            .chat_with_retry(&body, &self.config.retry)
            .await
            .map_err(provider_error)?;
        let text = completion
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DraftError::Provider("generation returned no content".into()))?;

        // 5. Recover, canonicalize, and decode the document.
        let mut value = extract_value(&text)?;
        normalize_value(&mut value);
        let mut doc = decode_document(value, text.len())?;

        // 6. Assign identity, then establish the budget invariants.
        doc.id = generate_document_id();
        doc.created_at = now_rfc3339();
        doc.updated_at = doc.created_at.clone();
        doc.target_budget = request.constraints.target_budget;
        if doc.title.trim().is_empty() {
            doc.title = request.idea.chars().take(80).collect();
        }
        if doc.partners.is_empty() {
            doc.partners = selected
                .iter()
                .enumerate()
                .map(|(i, p)| p.to_ref(if i == 0 { "coordinator" } else { "partner" }))
                .collect();
        }
        enforce_budget(&mut doc, request.constraints.target_budget);

        // 7. Persist.
        self.store.save(&doc).map_err(DraftError::Persistence)?;
        info!("generated proposal {} ({} sections)", doc.id, doc.sections.len());
        Ok(doc)
    }

    /// Apply a free-text edit instruction to a stored document, optionally
    /// scoped to one section.
    ///
    /// The provider is asked for a partial update (changed fields only),
    /// which runs through the same extract → normalize chain, merges over
    /// the stored document, and is re-enforced against the stored target
    /// budget. A document with no recorded target (0) skips enforcement —
    /// zeroing a legacy document's budget would be a corruption, not a
    /// correction.
    pub async fn ai_edit(
        &self,
        id: &str,
        instruction: &str,
        section: Option<&str>,
    ) -> Result<EditOutcome, DraftError> {
        // 1. Load the current document.
        let doc = self
            .store
            .load(id)
            .map_err(DraftError::Persistence)?
            .ok_or_else(|| DraftError::NotFound(id.to_string()))?;

        // 2. Ask for a partial update.
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message::system(prompt::edit_system_prompt()),
                Message::user(prompt::edit_user_prompt(&doc, instruction, section)),
            ],
            max_tokens: EDIT_MAX_TOKENS,
            temperature: 0.3,
            response_format: Some(ResponseFormat::json_object()),
            ..Default::default()
        };
        let completion = self
            .client
            .chat_with_retry(&body, &self.config.retry)
            .await
            .map_err(provider_error)?;
        let text = completion
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DraftError::Provider("edit returned no content".into()))?;

        // 3. Same recovery chain as generation.
        let mut patch = extract_value(&text)?;
        normalize_value(&mut patch);

        // 4. Merge the partial update over the stored document.
        let mut updated = merge_document(&doc, &patch).map_err(|reason| DraftError::Extraction {
            text_len: text.len(),
            reason,
        })?;
        let edited_section = match section {
            Some(key) => Some(key.to_string()),
            None => changed_section(&doc.sections, &updated.sections),
        };

        // 5. Re-establish invariants and persist.
        updated.updated_at = now_rfc3339();
        let target = updated.target_budget;
        if target > 0 {
            enforce_budget(&mut updated, target);
        }
        self.store.save(&updated).map_err(DraftError::Persistence)?;
        info!(
            "edited proposal {} (section: {})",
            updated.id,
            edited_section.as_deref().unwrap_or("unscoped")
        );
        Ok(EditOutcome {
            document: updated,
            edited_section,
        })
    }
}

// ── Merge helpers ──────────────────────────────────────────────────

/// Decode a normalized value into a typed document. Well-formed JSON of
/// the wrong shape is still an extraction failure — the pipeline never
/// passes a half-decoded document downstream.
fn decode_document(value: Value, text_len: usize) -> Result<Document, DraftError> {
    serde_json::from_value(value).map_err(|e| DraftError::Extraction {
        text_len,
        reason: format!("document shape mismatch: {e}"),
    })
}

/// Merge a partial update over the current document. Top-level fields in
/// the patch overwrite; the `sections` object merges per key. Identity
/// fields always come from the stored document, whatever the model echoed
/// back.
fn merge_document(current: &Document, patch: &Value) -> Result<Document, String> {
    let Value::Object(patch_map) = patch else {
        return Err("edit reply is not a JSON object".to_string());
    };

    let mut base =
        serde_json::to_value(current).map_err(|e| format!("failed to serialize document: {e}"))?;
    let Value::Object(base_map) = &mut base else {
        return Err("document did not serialize to an object".to_string());
    };

    for (key, value) in patch_map {
        if key == "sections"
            && let (Some(Value::Object(base_sections)), Value::Object(patch_sections)) =
                (base_map.get_mut("sections"), value)
        {
            for (section_key, content) in patch_sections {
                base_sections.insert(section_key.clone(), content.clone());
            }
            continue;
        }
        base_map.insert(key.clone(), value.clone());
    }

    // Identity is never editable.
    base_map.insert("id".into(), Value::String(current.id.clone()));
    base_map.insert("createdAt".into(), Value::String(current.created_at.clone()));
    base_map.insert(
        "targetBudget".into(),
        Value::Number(current.target_budget.into()),
    );

    serde_json::from_value(base).map_err(|e| format!("merged document shape mismatch: {e}"))
}

/// The single section an edit changed, when unambiguous.
fn changed_section(
    before: &IndexMap<String, String>,
    after: &IndexMap<String, String>,
) -> Option<String> {
    let mut changed: Vec<&String> = after
        .iter()
        .filter(|(key, content)| before.get(*key) != Some(*content))
        .map(|(key, _)| key)
        .collect();
    match changed.len() {
        1 => Some(changed.remove(0).clone()),
        _ => None,
    }
}

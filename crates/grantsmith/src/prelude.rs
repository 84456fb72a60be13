//! Convenience re-exports for common `grantsmith` types.
//!
//! Meant to be glob-imported when building on the engine:
//!
//! ```ignore
//! use grantsmith::prelude::*;
//! ```

// ── Provider client ─────────────────────────────────────────────────
pub use crate::{
    Attachment, ChatRequest, GenerationClient, Message, ResponseFormat, json_schema_for,
};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::draft::{
    AttachmentRef, Constraints, DraftError, Drafter, DrafterConfig, EditOutcome, GenerateRequest,
};

// ── Core algorithms ─────────────────────────────────────────────────
pub use crate::budget::enforce_budget;
pub use crate::extract::{ExtractFailure, extract_value, normalize::normalize_value};
pub use crate::outline::{OutlineEntry, missing_sections, resolve_outline};
pub use crate::rank::{Rankable, Ranked, rank, top_matches};

// ── Model & persistence ─────────────────────────────────────────────
pub use crate::api::retry::RetryConfig;
pub use crate::model::{
    BudgetItem, Document, KnowledgeChunk, Partner, PartnerRef, SectionNode, WorkPackage,
};
pub use crate::store::{DocumentStore, ObjectStore, load_template};

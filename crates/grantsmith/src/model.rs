//! The proposal data model.
//!
//! All document types serialize in camelCase — the wire format shared with
//! the browser frontend and, more importantly, the shape the generation
//! provider is prompted to produce. [`Document::sections`] is an
//! [`IndexMap`] so the order sections were generated in survives
//! round-tripping; the outline resolver's append rule depends on it.
//!
//! These are value objects: a [`Document`] owns its budget items, work
//! packages and risks outright, and [`SectionNode`] templates are immutable
//! descriptors — resolution never mutates them.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// A grant proposal document. Created by a generation call, mutated by
/// edits, persisted whole. Last write wins — there is no version counter,
/// so concurrent edits to the same id race and the later save overwrites
/// the earlier one in full.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Free-text abstract of the proposal.
    pub summary: String,
    /// Section key → HTML-ish rich text, in generation order.
    pub sections: IndexMap<String, String>,
    pub work_packages: Vec<WorkPackage>,
    pub budget: Vec<BudgetItem>,
    pub partners: Vec<PartnerRef>,
    pub risks: Vec<Risk>,
    /// The caller-supplied total the budget must sum to exactly. Persisted
    /// so edits can re-run enforcement without restating it.
    pub target_budget: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// One line of the proposal budget.
///
/// Invariants, established by [`enforce_budget`](crate::budget::enforce_budget):
/// `cost == Σ breakdown[].total` when the breakdown is non-empty,
/// `cost == Σ partner_allocations[].amount` when allocations are non-empty,
/// and `Σ cost` over all items equals the document's target budget.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BudgetItem {
    pub label: String,
    /// Cost in integer currency units.
    pub cost: i64,
    pub description: String,
    pub breakdown: Vec<BreakdownEntry>,
    pub partner_allocations: Vec<PartnerAllocation>,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakdownEntry {
    pub sub_item: String,
    pub quantity: i64,
    pub unit_cost: i64,
    pub total: i64,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PartnerAllocation {
    pub partner: String,
    pub amount: i64,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkPackage {
    pub name: String,
    pub description: String,
    /// Free-form duration, e.g. "M1–M12".
    pub duration: String,
    pub activities: Vec<Activity>,
    pub deliverables: Vec<String>,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Activity {
    pub name: String,
    pub description: String,
    pub lead_partner: String,
    /// Estimated cost in integer currency units; 0 when budget is not
    /// tracked at activity granularity.
    pub estimated_budget: i64,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Risk {
    pub description: String,
    pub likelihood: String,
    pub mitigation: String,
}

/// A partner organization as referenced from a document.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PartnerRef {
    pub id: String,
    pub name: String,
    pub role: String,
}

// ── Ranker candidates ──────────────────────────────────────────────

/// A partner organization in the registry, as a ranking candidate.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Partner {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub description: String,
    pub experience: String,
}

impl Partner {
    pub fn to_ref(&self, role: impl Into<String>) -> PartnerRef {
        PartnerRef {
            id: self.id.clone(),
            name: self.name.clone(),
            role: role.into(),
        }
    }
}

/// An indexed knowledge fragment used for retrieval grounding.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeChunk {
    pub id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub content: String,
}

// ── Section templates ──────────────────────────────────────────────

/// One node of a section template. Immutable descriptor — flattening a
/// template never mutates the input tree, so a shared default template can
/// be resolved from concurrent requests without contamination.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionNode {
    /// Stable lookup key. Derived from the label when absent.
    pub key: Option<String>,
    pub label: String,
    pub subsections: Vec<SectionNode>,
}

impl SectionNode {
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            key: None,
            label: label.into(),
            subsections: Vec::new(),
        }
    }

    pub fn with_children(label: impl Into<String>, subsections: Vec<SectionNode>) -> Self {
        Self {
            key: None,
            label: label.into(),
            subsections,
        }
    }
}

// ── Ids and timestamps ─────────────────────────────────────────────

/// Generate a unique document id.
pub fn generate_document_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter handles sub-nanosecond calls.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("prop-{ts:x}-{count:04x}")
}

/// Current timestamp in RFC 3339, second precision.
pub fn now_rfc3339() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_wire_format_is_camel_case() {
        let doc = Document {
            id: "prop-1".into(),
            target_budget: 1000,
            work_packages: vec![WorkPackage::default()],
            ..Default::default()
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("targetBudget").is_some());
        assert!(json.get("workPackages").is_some());
        assert!(json.get("target_budget").is_none());
    }

    #[test]
    fn partial_document_decodes_with_defaults() {
        let json = r#"{"title":"X","summary":"short"}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.title, "X");
        assert!(doc.budget.is_empty());
        assert!(doc.sections.is_empty());
    }

    #[test]
    fn sections_preserve_insertion_order() {
        let json = r#"{"sections":{"zeta":"z","alpha":"a","midpoint":"m"}}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        let keys: Vec<&String> = doc.sections.keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "midpoint"]);
    }

    #[test]
    fn document_ids_are_unique() {
        let a = generate_document_id();
        let b = generate_document_id();
        assert_ne!(a, b);
        assert!(a.starts_with("prop-"));
    }

    #[test]
    fn partner_to_ref_carries_identity() {
        let partner = Partner {
            id: "p-1".into(),
            name: "Acme Research".into(),
            ..Default::default()
        };
        let r = partner.to_ref("coordinator");
        assert_eq!(r.id, "p-1");
        assert_eq!(r.name, "Acme Research");
        assert_eq!(r.role, "coordinator");
    }
}

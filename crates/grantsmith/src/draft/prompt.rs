//! Prompt assembly for generation and edit calls.
//!
//! The system prompt fixes the JSON contract — including the generated
//! schema of [`Document`] — and the user prompt carries the idea,
//! constraints, consortium profiles, the expected section outline, and any
//! grounding fragments selected by the relevance ranker.

use crate::json_schema_for;
use crate::model::{Document, KnowledgeChunk, Partner};
use crate::outline::OutlineEntry;
use crate::rank::Ranked;

use super::{Constraints, GenerateRequest};

/// System prompt for full-proposal drafting.
pub fn generation_system_prompt() -> String {
    let schema = serde_json::to_string_pretty(&json_schema_for::<Document>())
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are an experienced grant writer drafting a structured funding proposal.\n\
         Respond with a single JSON object and nothing else — no markdown fences, \
         no commentary before or after.\n\n\
         The object must follow this JSON Schema:\n\n{schema}\n\n\
         Rules:\n\
         - Section content is rich text using simple HTML tags (<p>, <ul>, <li>, <strong>).\n\
         - All costs are integer amounts in euros.\n\
         - Each budget item's breakdown totals must sum to the item cost, and the \
           item costs must sum to the target budget.\n\
         - Leave the id and timestamp fields empty; they are assigned on save."
    )
}

/// User prompt for full-proposal drafting.
pub fn generation_user_prompt(
    request: &GenerateRequest,
    partners: &[&Partner],
    grounding: &[Ranked<&KnowledgeChunk>],
    outline: &[OutlineEntry],
) -> String {
    let mut prompt = format!("Draft a complete grant proposal.\n\nProject idea:\n{}\n", request.idea);

    prompt.push_str(&constraints_block(&request.constraints));

    if !partners.is_empty() {
        prompt.push_str("\nConsortium partners:\n");
        for partner in partners {
            prompt.push_str(&format!(
                "- {} — {}. Experience: {}\n",
                partner.name, partner.description, partner.experience
            ));
        }
    }

    if !outline.is_empty() {
        prompt.push_str(
            "\nGenerate these sections, using exactly these keys in the \"sections\" object:\n",
        );
        for entry in outline {
            let indent = "  ".repeat(entry.depth);
            prompt.push_str(&format!("{indent}- {} ({})\n", entry.key, entry.label));
        }
    }

    if !grounding.is_empty() {
        prompt.push_str(
            "\nReference material — ground factual claims in these notes where relevant:\n",
        );
        for fragment in grounding {
            prompt.push_str(&format!(
                "\n### {}\n{}\n",
                fragment.item.title, fragment.item.content
            ));
        }
    }

    prompt
}

/// System prompt for scoped edits.
pub fn edit_system_prompt() -> String {
    "You are revising an existing grant proposal. Respond with a single JSON \
     object containing ONLY the fields you changed — unchanged fields must be \
     omitted. Changed sections go under a \"sections\" object keyed by section \
     key. No markdown fences, no commentary."
        .to_string()
}

/// User prompt for an edit instruction against the current document.
pub fn edit_user_prompt(doc: &Document, instruction: &str, section: Option<&str>) -> String {
    let doc_json =
        serde_json::to_string_pretty(doc).unwrap_or_else(|_| "{}".to_string());
    let scope = match section {
        Some(key) => format!(
            "Apply the instruction to the \"{key}\" section only, and return \
             {{\"sections\": {{\"{key}\": \"<new content>\"}}}}.\n\n"
        ),
        None => String::new(),
    };
    format!(
        "Current proposal:\n\n{doc_json}\n\n{scope}Instruction:\n{instruction}\n"
    )
}

fn constraints_block(constraints: &Constraints) -> String {
    let mut block = format!(
        "\nConstraints:\n- Target budget: EUR {}\n",
        constraints.target_budget
    );
    if let Some(months) = constraints.duration_months {
        block.push_str(&format!("- Duration: {months} months\n"));
    }
    if let Some(ref programme) = constraints.programme {
        block.push_str(&format!("- Funding programme: {programme}\n"));
    }
    block
}

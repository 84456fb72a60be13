//! Canonicalization of field-name variants in parsed generator output.
//!
//! Models drift between runs: a cost field comes back as `totalCost`, keys
//! arrive in snake_case where the schema says camelCase. Rather than ad hoc
//! presence checks at call sites, every accepted alias is listed once in
//! [`FIELD_SYNONYMS`] and applied by a single recursive walk.
//!
//! The rule: when both an alias and its canonical field are present, the
//! canonical field wins; when only the alias is present, its value is copied
//! to the canonical field *without deleting the alias*, so records written
//! by older versions still round-trip unchanged.
//!
//! Section-map keys are the one exception: a camelCase section key is
//! renamed to its snake_case form instead of copied — duplicating a
//! section's narrative under two keys would render it twice and show up in
//! the resolved outline as a phantom extra section.

use serde_json::Value;

/// Accepted alias → canonical field name.
pub const FIELD_SYNONYMS: &[(&str, &str)] = &[
    // snake_case spellings of the canonical camelCase schema
    ("work_packages", "workPackages"),
    ("partner_allocations", "partnerAllocations"),
    ("sub_item", "subItem"),
    ("unit_cost", "unitCost"),
    ("estimated_budget", "estimatedBudget"),
    ("lead_partner", "leadPartner"),
    ("target_budget", "targetBudget"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
    // cost-like fields the generator likes to invent
    ("total_cost", "cost"),
    ("totalCost", "cost"),
    ("estimated_cost", "cost"),
    ("estimatedCost", "cost"),
    ("price", "unitCost"),
];

/// Canonicalize field names in place, recursively.
pub fn normalize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (alias, canonical) in FIELD_SYNONYMS {
                if !map.contains_key(*canonical)
                    && let Some(aliased) = map.get(*alias).cloned()
                {
                    map.insert((*canonical).to_string(), aliased);
                }
            }
            if let Some(Value::Object(sections)) = map.get_mut("sections") {
                normalize_section_keys(sections);
            }
            for child in map.values_mut() {
                normalize_value(child);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                normalize_value(child);
            }
        }
        _ => {}
    }
}

/// Rename camelCase section keys to their snake_case canonical form,
/// preserving the map's insertion order. An existing snake_case entry wins
/// over its camelCase alias.
fn normalize_section_keys(sections: &mut serde_json::Map<String, Value>) {
    let renames: Vec<(String, String)> = sections
        .keys()
        .filter_map(|key| {
            let canonical = camel_to_snake(key);
            (canonical != *key && !sections.contains_key(&canonical))
                .then(|| (key.clone(), canonical))
        })
        .collect();

    if renames.is_empty() {
        return;
    }

    // Rebuild to keep insertion order; serde_json's map has no rename.
    let original = std::mem::take(sections);
    for (key, content) in original {
        match renames.iter().find(|(alias, _)| *alias == key) {
            Some((_, canonical)) => {
                sections.insert(canonical.clone(), content);
            }
            None => {
                sections.insert(key, content);
            }
        }
    }
}

/// `workPackage1` → `work_package1`. ASCII-oriented, like the key derivation
/// in [`outline`](crate::outline).
pub fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

//! Integration tests for the grantsmith-web server.
//!
//! These tests start a real axum server on a random port and exercise the
//! REST endpoints. The provider-backed generation path is not driven here —
//! everything else (CRUD, outline, ranking, attachments) runs against the
//! real stores in a temp directory.

use grantsmith::GenerationClient;
use grantsmith::draft::DrafterConfig;
use grantsmith::model::{Partner, generate_document_id};
use grantsmith_web::{build_state, spawn_web};
use serde_json::json;

/// Helper: spawn a test server on port 0 (random available port), backed by
/// a temp data dir. The TempDir guard must outlive the test.
async fn spawn_test_server(partners: Vec<Partner>) -> (tempfile::TempDir, String) {
    let data_dir = tempfile::tempdir().unwrap();
    let client = GenerationClient::new("test-key-unused").unwrap();
    let state = build_state(
        client,
        data_dir.path(),
        partners,
        Vec::new(),
        None,
        DrafterConfig::default(),
    )
    .unwrap();

    let addr = spawn_web(state, ([127, 0, 0, 1], 0).into()).await;
    (data_dir, format!("http://{addr}"))
}

fn sample_partners() -> Vec<Partner> {
    vec![
        Partner {
            id: "p-agri".into(),
            name: "AgriSense Labs".into(),
            keywords: vec!["agriculture".into(), "sensors".into()],
            description: "Field sensor networks for precision agriculture".into(),
            experience: "Three Horizon projects on irrigation".into(),
        },
        Partner {
            id: "p-rail".into(),
            name: "RailWorks".into(),
            keywords: vec!["railway".into()],
            description: "Rolling stock maintenance".into(),
            experience: "National rail contracts".into(),
        },
    ]
}

// ── Proposal CRUD ────────────────────────────────────────────────────

#[tokio::test]
async fn create_get_list_roundtrip() {
    let (_guard, base) = spawn_test_server(vec![]).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{base}/api/proposals"))
        .json(&json!({
            "title": "Smart irrigation",
            "summary": "Water less, grow more.",
            "sections": {"objectives": "<p>…</p>"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("prop-"));
    assert!(!created["createdAt"].as_str().unwrap().is_empty());

    let fetched: serde_json::Value = reqwest::get(format!("{base}/api/proposals/{id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["title"], "Smart irrigation");
    assert_eq!(fetched["sections"]["objectives"], "<p>…</p>");

    let listed: serde_json::Value = reqwest::get(format!("{base}/api/proposals"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_enforces_budget_against_target() {
    let (_guard, base) = spawn_test_server(vec![]).await;
    let http = reqwest::Client::new();

    // 180000 of drafted costs against a 250000 target.
    let resp = http
        .post(format!("{base}/api/proposals"))
        .json(&json!({
            "title": "Budgeted",
            "targetBudget": 250000,
            "budget": [
                {"label": "Staff", "cost": 100000},
                {"label": "Equipment", "cost": 80000}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let doc: serde_json::Value = resp.json().await.unwrap();

    let costs: Vec<i64> = doc["budget"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["cost"].as_i64().unwrap())
        .collect();
    assert_eq!(costs, [138889, 111111]);
    assert_eq!(costs.iter().sum::<i64>(), 250000);
}

#[tokio::test]
async fn put_overwrites_in_full_and_keeps_created_at() {
    let (_guard, base) = spawn_test_server(vec![]).await;
    let http = reqwest::Client::new();

    let created: serde_json::Value = http
        .post(format!("{base}/api/proposals"))
        .json(&json!({"title": "First", "summary": "original"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();
    let created_at = created["createdAt"].as_str().unwrap().to_string();

    // Full overwrite: the omitted summary is gone afterwards.
    let updated: serde_json::Value = http
        .put(format!("{base}/api/proposals/{id}"))
        .json(&json!({"title": "Second"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["title"], "Second");
    assert_eq!(updated["summary"], "");
    assert_eq!(updated["createdAt"], created_at.as_str());
}

#[tokio::test]
async fn delete_then_404() {
    let (_guard, base) = spawn_test_server(vec![]).await;
    let http = reqwest::Client::new();

    let created: serde_json::Value = http
        .post(format!("{base}/api/proposals"))
        .json(&json!({"title": "Doomed"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let resp = http
        .delete(format!("{base}/api/proposals/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = reqwest::get(format!("{base}/api/proposals/{id}")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn missing_proposal_returns_404() {
    let (_guard, base) = spawn_test_server(vec![]).await;
    let missing = generate_document_id();
    let resp = reqwest::get(format!("{base}/api/proposals/{missing}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // ai-edit on a missing id fails before any provider call.
    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{base}/api/proposals/{missing}/ai-edit"))
        .json(&json!({"instruction": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ── Outline ──────────────────────────────────────────────────────────

#[tokio::test]
async fn outline_flags_content_and_appends_extras() {
    let (_guard, base) = spawn_test_server(vec![]).await;
    let http = reqwest::Client::new();

    let created: serde_json::Value = http
        .post(format!("{base}/api/proposals"))
        .json(&json!({
            "title": "Outlined",
            "sections": {
                "objectives": "<p>present</p>",
                "gender_dimension": "<p>extra, not in the default outline</p>"
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let outline: serde_json::Value = reqwest::get(format!("{base}/api/proposals/{id}/outline"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = outline.as_array().unwrap();

    let objectives = entries
        .iter()
        .find(|e| e["key"] == "objectives")
        .expect("default outline entry");
    assert_eq!(objectives["hasContent"], true);

    let summary = entries
        .iter()
        .find(|e| e["key"] == "executive_summary")
        .expect("default outline entry");
    assert_eq!(summary["hasContent"], false);

    // The orphaned content key is appended at depth 0 with a derived label.
    let extra = entries.last().unwrap();
    assert_eq!(extra["key"], "gender_dimension");
    assert_eq!(extra["label"], "Gender Dimension");
    assert_eq!(extra["depth"], 0);
    assert_eq!(extra["hasContent"], true);
}

// ── Partner ranking ──────────────────────────────────────────────────

#[tokio::test]
async fn rank_orders_partners_by_relevance() {
    let (_guard, base) = spawn_test_server(sample_partners()).await;
    let http = reqwest::Client::new();

    let ranked: serde_json::Value = http
        .post(format!("{base}/api/partners/rank"))
        .json(&json!({"context": "deploying sensors for precision agriculture irrigation"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = ranked.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "p-agri");
    let top = entries[0]["relevanceScore"].as_i64().unwrap();
    let second = entries[1]["relevanceScore"].as_i64().unwrap();
    assert!(top >= 20, "two keyword hits expected, got {top}");
    assert!(top >= second);
    assert!(!entries[0]["matchReasons"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rank_respects_partner_id_filter() {
    let (_guard, base) = spawn_test_server(sample_partners()).await;
    let http = reqwest::Client::new();

    let ranked: serde_json::Value = http
        .post(format!("{base}/api/partners/rank"))
        .json(&json!({"context": "anything", "partnerIds": ["p-rail"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = ranked.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], "p-rail");
}

// ── Attachments ──────────────────────────────────────────────────────

#[tokio::test]
async fn attachment_upload_list_download_roundtrip() {
    let (_guard, base) = spawn_test_server(vec![]).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{base}/api/attachments/calls/h2020.pdf"))
        .header("content-type", "application/pdf")
        .body(&b"%PDF-1.4 fake"[..])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let listed: serde_json::Value = reqwest::get(format!("{base}/api/attachments/calls"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = listed.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["path"], "h2020.pdf");
    assert_eq!(entries[0]["contentType"], "application/pdf");

    let resp = reqwest::get(format!("{base}/api/attachments/calls/h2020.pdf"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/pdf"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"%PDF-1.4 fake");

    let resp = reqwest::get(format!("{base}/api/attachments/calls/absent.pdf"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

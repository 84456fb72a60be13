//! Draft, inspect, and edit grant proposals from the command line.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Generate a proposal
//! grantsmith generate "AI-assisted irrigation for smallholder farms" \
//!   --target-budget 250000 --duration-months 24 \
//!   --partners-file partners.json --knowledge-file kb.json
//!
//! # Inspect it
//! grantsmith list
//! grantsmith show prop-18f3a2-0001
//! grantsmith outline prop-18f3a2-0001
//!
//! # Revise one section
//! grantsmith edit prop-18f3a2-0001 "Make the impact section more concrete" \
//!   --section impact
//! ```

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use grantsmith::draft::{Constraints, Drafter, DrafterConfig, GenerateRequest};
use grantsmith::model::{KnowledgeChunk, Partner};
use grantsmith::outline::{missing_sections, resolve_outline};
use grantsmith::store::{DocumentStore, load_template};
use grantsmith::{DEFAULT_MODEL, GenerationClient};

/// Draft, inspect, and edit grant proposals.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "grantsmith")]
struct Cli {
    /// Directory holding persisted proposals
    #[arg(long, default_value = ".grantsmith/proposals")]
    store_dir: PathBuf,

    /// Model to use for generation and edits
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new proposal from an idea
    Generate {
        /// One-paragraph project idea
        idea: String,

        /// Exact total the budget must sum to (integer currency units)
        #[arg(long)]
        target_budget: i64,

        /// Project duration in months
        #[arg(long)]
        duration_months: Option<u32>,

        /// Funding programme name
        #[arg(long)]
        programme: Option<String>,

        /// Partner id to include (repeatable; all partners when omitted)
        #[arg(long = "partner")]
        partner_ids: Vec<String>,

        /// JSON file holding the partner registry
        #[arg(long)]
        partners_file: Option<PathBuf>,

        /// JSON file holding knowledge fragments for grounding
        #[arg(long)]
        knowledge_file: Option<PathBuf>,

        /// Section template id, resolved against --templates-dir
        #[arg(long)]
        template_id: Option<String>,

        /// Directory holding section template files
        #[arg(long, default_value = ".grantsmith/templates")]
        templates_dir: PathBuf,

        /// Local file to attach to the generation call (e.g. the funding
        /// call PDF)
        #[arg(long)]
        attachment: Option<PathBuf>,

        /// MIME type of the attachment
        #[arg(long, default_value = "application/pdf")]
        attachment_mime: String,
    },

    /// Print a stored proposal as JSON
    Show { id: String },

    /// List stored proposals
    List,

    /// Delete a stored proposal
    Delete { id: String },

    /// Apply a free-text edit instruction to a stored proposal
    Edit {
        id: String,

        /// What to change
        instruction: String,

        /// Restrict the edit to one section key
        #[arg(long)]
        section: Option<String>,
    },

    /// Show the resolved section outline and what is still missing
    Outline { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let store = DocumentStore::new(&cli.store_dir)
        .map_err(|e| format!("failed to open store at {}: {e}", cli.store_dir.display()))?;

    match cli.command {
        Command::Generate {
            idea,
            target_budget,
            duration_months,
            programme,
            partner_ids,
            partners_file,
            knowledge_file,
            template_id,
            templates_dir,
            attachment,
            attachment_mime,
        } => {
            let client = client_from_env()?;
            let partners: Vec<Partner> = match partners_file {
                Some(path) => read_json_file(&path)?,
                None => Vec::new(),
            };
            let knowledge: Vec<KnowledgeChunk> = match knowledge_file {
                Some(path) => read_json_file(&path)?,
                None => Vec::new(),
            };
            let template = match template_id.as_deref() {
                Some(id) => load_template(&templates_dir, id)?
                    .ok_or_else(|| format!("template {id:?} not found"))
                    .map(Some)?,
                None => None,
            };
            let attached = match attachment {
                Some(path) => {
                    let bytes = std::fs::read(&path)
                        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "attachment".to_string());
                    Some(grantsmith::Attachment {
                        filename,
                        mime_type: attachment_mime,
                        bytes,
                    })
                }
                None => None,
            };

            let request = GenerateRequest {
                idea,
                constraints: Constraints {
                    target_budget,
                    duration_months,
                    programme,
                },
                partner_ids,
                template_id,
                attachment: None,
            };
            let config = DrafterConfig {
                model: cli.model,
                ..Default::default()
            };
            let doc = Drafter::new(&client, &store, config)
                .generate(&request, &partners, &knowledge, template.as_deref(), attached)
                .await
                .map_err(|e| e.to_string())?;

            println!("{}", pretty(&doc)?);
            eprintln!("saved as {}", doc.id);
        }

        Command::Show { id } => {
            let doc = store
                .load(&id)?
                .ok_or_else(|| format!("proposal {id} not found"))?;
            println!("{}", pretty(&doc)?);
        }

        Command::List => {
            for doc in store.scan_by_prefix("")? {
                println!("{}  {}  {}", doc.id, doc.updated_at, doc.title);
            }
        }

        Command::Delete { id } => {
            store.delete(&id)?;
            eprintln!("deleted {id}");
        }

        Command::Edit {
            id,
            instruction,
            section,
        } => {
            let client = client_from_env()?;
            let config = DrafterConfig {
                model: cli.model,
                ..Default::default()
            };
            let outcome = Drafter::new(&client, &store, config)
                .ai_edit(&id, &instruction, section.as_deref())
                .await
                .map_err(|e| e.to_string())?;

            println!("{}", pretty(&outcome.document)?);
            match outcome.edited_section {
                Some(key) => eprintln!("edited section: {key}"),
                None => eprintln!("edited multiple sections"),
            }
        }

        Command::Outline { id } => {
            let doc = store
                .load(&id)?
                .ok_or_else(|| format!("proposal {id} not found"))?;
            let outline = resolve_outline(None, &doc.sections);
            let missing = missing_sections(&outline, &doc.sections);
            for entry in &outline {
                let marker = if doc.sections.contains_key(&entry.key) {
                    "✓"
                } else {
                    "·"
                };
                let indent = "  ".repeat(entry.depth);
                println!("{marker} {indent}{} ({})", entry.label, entry.key);
            }
            eprintln!("{} of {} sections missing", missing.len(), outline.len());
        }
    }

    Ok(())
}

fn client_from_env() -> Result<GenerationClient, String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key".to_string())?;
    GenerationClient::new(api_key)
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&json).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

fn pretty<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize output: {e}"))
}

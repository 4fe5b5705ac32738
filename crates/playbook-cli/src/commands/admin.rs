//! Offline administration: playbooks and API keys straight against the store.

use chrono::Utc;

use playbook_config::PlaybookConfig;
use playbook_core::{PlaybookError, Result, Visibility};
use playbook_mcp::ApiKeyAuthorizer;
use playbook_store::Database;

use super::{KeyAction, PlaybookAction};

fn open(config: &PlaybookConfig) -> Result<Database> {
    Database::open(&config.store.db_path)
}

pub(super) fn cmd_playbook(config: &PlaybookConfig, action: PlaybookAction) -> Result<()> {
    let db = open(config)?;
    match action {
        PlaybookAction::Create {
            name,
            description,
            guide,
            private,
        } => {
            let guide = guide.map(std::fs::read_to_string).transpose()?;
            let visibility = if private {
                Visibility::Private
            } else {
                Visibility::Public
            };
            let playbook = db.create_playbook(
                &name,
                description.as_deref(),
                guide.as_deref(),
                visibility,
                Utc::now(),
            )?;
            println!("Created playbook '{}' ({})", playbook.name, playbook.visibility);
            println!("   guid: {}", playbook.id);
            println!("   endpoint: /mcp/{}", playbook.id);
        }
        PlaybookAction::List { json } => {
            let playbooks = db.list_playbooks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&playbooks)?);
            } else if playbooks.is_empty() {
                println!("No playbooks. Create one with `playbook-mcp playbook create <name>`.");
            } else {
                for p in playbooks {
                    println!("{}  {:<8} {}", p.id, p.visibility.as_str(), p.name);
                }
            }
        }
    }
    Ok(())
}

pub(super) fn cmd_key(config: &PlaybookConfig, action: KeyAction) -> Result<()> {
    let db = open(config)?;
    match action {
        KeyAction::Create {
            playbook_id,
            name,
            permissions,
        } => {
            let issued = ApiKeyAuthorizer::new(db).issue(&playbook_id, &name, &permissions)?;
            let scopes = if issued.record.permissions.is_empty() {
                "(read only)".to_string()
            } else {
                issued.record.permissions.join(", ")
            };
            println!("Issued key '{}' ({})", issued.record.name, issued.record.id);
            println!("   scopes: {scopes}");
            println!();
            println!("   {}", issued.secret);
            println!();
            println!("Store it now; it cannot be shown again.");
        }
        KeyAction::List { playbook_id, json } => {
            let keys = db.list_api_keys(&playbook_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                for k in keys {
                    let state = if k.revoked { "revoked" } else { "active" };
                    let used = k
                        .last_used_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into());
                    println!(
                        "{}  {:<8} {:<16} [{}] last used {used}",
                        k.id,
                        state,
                        k.name,
                        k.permissions.join(",")
                    );
                }
            }
        }
        KeyAction::Revoke { key_id } => {
            if !db.revoke_api_key(&key_id)? {
                return Err(PlaybookError::not_found("API key", key_id));
            }
            println!("Revoked key {key_id}");
        }
    }
    Ok(())
}

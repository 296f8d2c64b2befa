use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use super::types::Document;
use crate::domain::validate_user_host;
use crate::error::{OrchError, Result};

/// Load an orchestration document from a YAML file
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist or cannot be read
/// - The YAML content is invalid or cannot be parsed
/// - The document fails validation (see [`parse_document`])
pub fn load_document(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(OrchError::ConfigNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let document = parse_document(&content)?;

    debug!(
        path = %path.display(),
        commands = document.exec.len(),
        "Document loaded"
    );

    Ok(document)
}

/// Parse and validate an orchestration document
///
/// # Errors
///
/// Returns an error if the YAML is invalid, an alias line is malformed, the
/// command list is empty, an entry has an empty `login` or `cmd`, or a login
/// is neither a defined alias nor a `user@host`.
pub fn parse_document(content: &str) -> Result<Document> {
    let document: Document = serde_saphyr::from_str(content)?;
    validate_document(&document)?;
    Ok(document)
}

/// Validate the document
fn validate_document(document: &Document) -> Result<()> {
    let aliases: HashSet<String> = document
        .alias_definitions()?
        .into_iter()
        .map(|def| def.alias)
        .collect();

    if document.exec.is_empty() {
        return Err(OrchError::ConfigInvalid {
            field: "exec".to_string(),
            reason: "At least one command must be defined".to_string(),
        });
    }

    for (index, entry) in document.exec.iter().enumerate() {
        if entry.login.trim().is_empty() {
            return Err(OrchError::ConfigInvalid {
                field: format!("exec[{index}].login"),
                reason: "Login cannot be empty".to_string(),
            });
        }

        if entry.cmd.trim().is_empty() {
            return Err(OrchError::ConfigInvalid {
                field: format!("exec[{index}].cmd"),
                reason: format!("Command for '{}' cannot be empty", entry.login),
            });
        }

        if !aliases.contains(&entry.login) && validate_user_host(&entry.login).is_none() {
            return Err(OrchError::InvalidLogin {
                login: entry.login.clone(),
            });
        }
    }

    if document.settings.port == 0 {
        return Err(OrchError::ConfigInvalid {
            field: "settings.port".to_string(),
            reason: "Port cannot be 0".to_string(),
        });
    }

    Ok(())
}

//! Rule registry storage as a single JSON document

use crate::error::AutomationError;
use crate::model::Rule;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Where an unparseable rules file is moved so a fresh save cannot clobber it
pub fn quarantine_path(path: &Path) -> PathBuf {
    path.with_extension("json.corrupt")
}

/// Read the stored registry.
///
/// `None` means there is no usable store: the file is missing, unreadable, or
/// does not parse (in which case it is first renamed to [`quarantine_path`]).
/// A stored empty list is `Some(vec![])`.
pub async fn load_rules(path: &Path) -> Option<Vec<Rule>> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No rules file at {:?}", path);
            return None;
        }
        Err(e) => {
            tracing::warn!("Cannot read rules file {:?}: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str::<Vec<Rule>>(&contents) {
        Ok(rules) => {
            tracing::info!("Loaded {} rules from {:?}", rules.len(), path);
            Some(rules)
        }
        Err(e) => {
            let moved_to = quarantine_path(path);
            tracing::warn!(
                "Rules file {:?} is not valid JSON ({}), moving it to {:?}",
                path,
                e,
                moved_to
            );
            if let Err(e) = fs::rename(path, &moved_to).await {
                tracing::warn!("Could not move corrupt rules file: {}", e);
            }
            None
        }
    }
}

/// Replace the stored registry with `rules`
pub async fn save_rules(path: &Path, rules: &[Rule]) -> Result<(), AutomationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(rules)?;

    // Readers only ever see a complete file
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await?;
    fs::rename(&tmp_path, path).await?;

    tracing::debug!("Wrote {} rules to {:?}", rules.len(), path);
    Ok(())
}

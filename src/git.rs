//! Current git branch, used to pick a theme when none is given.

use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

use crate::error::{Result, SyncError};

/// Name of the checked-out branch, or `None` when there is no usable git
/// checkout (git missing, not a repository, no commits yet).
pub async fn current_branch(dir: &Path) -> Result<Option<String>> {
    let output = match Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("git not found");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lower = stderr.to_lowercase();
        if lower.contains("not a git repository") {
            warn!("directory is not a git repository");
            return Ok(None);
        }
        if lower.contains("unknown revision") || lower.contains("ambiguous argument") {
            warn!("could not determine git branch");
            return Ok(None);
        }
        return Err(SyncError::Config(format!(
            "git rev-parse failed: {}",
            stderr.trim()
        )));
    }

    Ok(parse_branch(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_branch(stdout: &str) -> Option<String> {
    let branch: String = stdout.chars().filter(|c| !c.is_whitespace()).collect();
    (!branch.is_empty() && branch != "HEAD").then_some(branch)
}

//! Git subprocess wrapper for `reschedule --git` (spec §4.K, §9 Design
//! Notes: kept out of `duro-core`, which names no subprocess dependency).

use std::path::Path;

/// The checkout's current HEAD commit hash, or `None` if `repo` isn't a
/// git checkout (or `git` isn't on `PATH`).
pub fn head_commit(repo: &Path) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if sha.is_empty() {
        None
    } else {
        Some(sha)
    }
}

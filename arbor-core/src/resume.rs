//! Session resume: a prioritized markdown digest of recent activity

use crate::capsule::{estimate_tokens, generate_capsule};
use crate::model::{now_epoch, Observation};
use crate::observations::ObservationStore;
use crate::store::Store;
use std::collections::HashSet;
use std::path::Path;

/// Build a prioritized markdown catch-up document from recent activity.
///
/// Sections fill in fixed priority order, each added only when its full
/// token cost fits the remaining budget:
///   1. Decisions & Notes (claude/user observations)
///   2. Recent Commits (git observations)
///   3. Recently Modified Files (capsules where they fit, bullets otherwise)
///   4. Files Touched (deduplicated hook observations)
///
/// The first section is added even when it overflows, truncated to the
/// budget, so the output is never empty when data exists.
pub fn generate_resume(store: &Store, budget: usize, hours: u64) -> crate::Result<String> {
    let since = now_epoch() - (hours as f64) * 3600.0;
    let obs_store = ObservationStore::new(store);
    let mut sections: Vec<String> = Vec::new();
    let mut used = 0usize;

    fn add(
        sections: &mut Vec<String>,
        used: &mut usize,
        budget: usize,
        section: String,
        force_first: bool,
    ) -> bool {
        let cost = estimate_tokens(&section);
        if *used + cost > budget {
            if force_first && sections.is_empty() {
                // Truncate by code points; a byte index could split a
                // multi-byte character
                let max_chars = budget * 4;
                let truncated: String = section.chars().take(max_chars).collect();
                sections.push(truncated);
                *used = budget;
                return true;
            }
            return false;
        }
        sections.push(section);
        *used += cost;
        true
    }

    // ── 1. High-priority observations (claude / user) ─────────────
    let mut high: Vec<Observation> = obs_store.list_since(since, Some("claude"), None)?;
    high.extend(obs_store.list_since(since, Some("user"), None)?);
    high.sort_by(|a, b| {
        b.created_at
            .partial_cmp(&a.created_at)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut seen_ids: HashSet<i64> = HashSet::new();
    let unique_high: Vec<&Observation> = high
        .iter()
        .filter(|o| o.id.map_or(true, |id| seen_ids.insert(id)))
        .collect();

    if !unique_high.is_empty() {
        let mut lines = vec!["## Decisions & Notes\n".to_string()];
        for obs in &unique_high {
            let tags = if obs.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", obs.tags.join(", "))
            };
            lines.push(format!("- {}{tags}", obs.content));
        }
        lines.push(String::new());
        add(&mut sections, &mut used, budget, lines.join("\n"), true);
    }

    // ── 2. Git commit observations ────────────────────────────────
    let git_obs = obs_store.list_since(since, Some("git"), None)?;
    if !git_obs.is_empty() {
        let mut lines = vec!["## Recent Commits\n".to_string()];
        for obs in &git_obs {
            lines.push(format!("- {}", obs.content));
        }
        lines.push(String::new());
        add(&mut sections, &mut used, budget, lines.join("\n"), false);
    }

    // ── 3. Capsules for recently-modified files ───────────────────
    let recent_files = store.list_recently_indexed_files(since, None)?;
    if !recent_files.is_empty() {
        let mut lines = vec!["## Recently Modified Files\n".to_string()];
        for file in &recent_files {
            if used >= budget {
                break;
            }
            // The module node id for a file is its basename stem
            let stem = Path::new(&file.file_path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match generate_capsule(store, &stem, 1)? {
                Some(capsule) if estimate_tokens(&capsule) + used <= budget => {
                    lines.push(capsule);
                }
                _ => lines.push(format!("- `{}`", file.file_path)),
            }
        }
        lines.push(String::new());
        add(&mut sections, &mut used, budget, lines.join("\n"), false);
    }

    // ── 4. Hook observations (file edits, deduplicated) ───────────
    let hook_obs = obs_store.list_since(since, Some("hook"), None)?;
    if !hook_obs.is_empty() {
        let deduped = ObservationStore::deduplicate_hook_observations(hook_obs);
        let mut lines = vec!["## Files Touched\n".to_string()];
        for obs in &deduped {
            lines.push(format!("- {}", obs.content));
        }
        lines.push(String::new());
        add(&mut sections, &mut used, budget, lines.join("\n"), false);
    }

    if sections.is_empty() {
        return Ok("No recent activity found.\n".to_string());
    }

    let mut content = format!("# Session Resume\n\n{}", sections.join("\n"));
    content.push_str(&format!(
        "\n---\n*Budget used: ~{used} of {budget} tokens*\n"
    ));
    Ok(content)
}

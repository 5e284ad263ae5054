//! Environment and project diagnostic reports.
//!
//! Pure, synchronous rendering with no state machine behind it: a runtime
//! information block with the backend-relevant environment subset (secret
//! values redacted), and a depth-2 project tree listing.

use std::path::{Path, PathBuf};

struct TreeEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

fn read_sorted_entries(dir: &Path) -> std::io::Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        entries.push(TreeEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: path.is_dir(),
            path,
        });
    }
    // Directories first, then files; both alphabetically, case-insensitive.
    entries.sort_by_key(|entry| (!entry.is_dir, entry.name.to_lowercase()));
    Ok(entries)
}

fn display_name(entry: &TreeEntry) -> String {
    if entry.is_dir {
        format!("{}/", entry.name)
    } else {
        entry.name.clone()
    }
}

/// Render a tree-like listing of `root` up to depth 2: the root line with a
/// trailing slash, its immediate children, and for child directories their
/// immediate children as well. Unreadable directories are reported inline.
pub(crate) fn render_project_tree(root: &Path) -> String {
    let entries = match read_sorted_entries(root) {
        Ok(entries) => entries,
        Err(error) => {
            return format!("Error reading directory {}: {error}", root.display());
        }
    };
    let root_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut lines = vec![format!("{root_name}/")];
    let total = entries.len();

    for (index, entry) in entries.iter().enumerate() {
        let is_last_top = index + 1 == total;
        let connector = if is_last_top { "└── " } else { "├── " };
        lines.push(format!("{connector}{}", display_name(entry)));

        if !entry.is_dir {
            continue;
        }
        let child_prefix = if is_last_top { "    " } else { "│   " };
        match read_sorted_entries(&entry.path) {
            Ok(children) => {
                let child_total = children.len();
                for (child_index, child) in children.iter().enumerate() {
                    let child_connector = if child_index + 1 == child_total {
                        "└── "
                    } else {
                        "├── "
                    };
                    lines.push(format!(
                        "{child_prefix}{child_connector}{}",
                        display_name(child)
                    ));
                }
            }
            Err(error) => {
                lines.push(format!(
                    "{child_prefix}[Error reading directory {}: {error}]",
                    entry.name
                ));
            }
        }
    }

    lines.join("\n")
}

fn is_secret_env_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    upper.contains("KEY") || upper.contains("TOKEN") || upper.contains("SECRET")
}

/// Render runtime information plus the OPENAI_*/AMC_* environment subset,
/// with secret-bearing values redacted.
pub(crate) fn render_environment_report() -> String {
    let mut lines = vec!["=== Client Runtime Information ===".to_string()];
    lines.push(format!("Version: {}", env!("CARGO_PKG_VERSION")));
    match std::env::current_exe() {
        Ok(exe) => lines.push(format!("Executable: {}", exe.display())),
        Err(error) => lines.push(format!("Executable: <unavailable: {error}>")),
    }
    lines.push(format!(
        "Platform: {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    match std::env::current_dir() {
        Ok(dir) => lines.push(format!("Current Working Directory: {}", dir.display())),
        Err(error) => lines.push(format!("Current Working Directory: <unavailable: {error}>")),
    }

    lines.push(String::new());
    lines.push("=== Backend Environment Variables (subset) ===".to_string());
    let mut subset: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| key.starts_with("OPENAI_") || key.starts_with("AMC_"))
        .collect();
    subset.sort_by(|left, right| left.0.cmp(&right.0));
    if subset.is_empty() {
        lines.push("(none)".to_string());
    } else {
        for (key, value) in subset {
            if is_secret_env_key(&key) {
                lines.push(format!("{key}=<redacted>"));
            } else {
                lines.push(format!("{key}={value}"));
            }
        }
    }

    lines.join("\n")
}

pub(crate) fn render_doctor_report(project_root: &Path) -> String {
    format!(
        "{}\n\n=== Project Tree (depth 2) ===\n{}\n",
        render_environment_report(),
        render_project_tree(project_root)
    )
}

//! Mount table inspection (`/proc/mounts` format).

use std::path::Path;

/// Whether `mount_point` appears as the target of any entry in `table`.
///
/// The second whitespace-separated field of each line is the mount target,
/// with spaces and tabs encoded as octal escapes.
pub fn lists(table: &str, mount_point: &Path) -> bool {
    let rendered = mount_point.display().to_string();
    let wanted = normalize(&rendered);
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|target| normalize(&unescape(target)) == wanted)
}

/// Read `table_path` and check it. An unreadable table counts as "not mounted".
pub async fn is_mounted(table_path: &Path, mount_point: &Path) -> bool {
    match tokio::fs::read_to_string(table_path).await {
        Ok(content) => lists(&content, mount_point),
        Err(err) => {
            tracing::debug!(table = %table_path.display(), error = %err, "mount table unreadable");
            false
        }
    }
}

pub fn is_mounted_blocking(table_path: &Path, mount_point: &Path) -> bool {
    std::fs::read_to_string(table_path)
        .map(|content| lists(&content, mount_point))
        .unwrap_or(false)
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn unescape(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

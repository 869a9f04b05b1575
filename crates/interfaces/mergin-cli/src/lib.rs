pub mod commands;

use anyhow::bail;

/// Extract `(namespace, name)` from a project full name or a project URL;
/// the last two path segments count.
pub fn split_project_name(source: &str) -> anyhow::Result<(String, String)> {
    let mut segments = source.trim_end_matches('/').rsplit('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(name), Some(namespace)) => Ok((namespace.to_string(), name.to_string())),
        _ => bail!("expected <namespace>/<name>, got '{source}'"),
    }
}

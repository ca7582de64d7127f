//! Archive entry naming.

use std::collections::HashSet;
use std::path::Path;

/// Reduces an origin file name to a safe archive entry name.
///
/// Directory components are stripped and control characters removed.
/// Returns `None` when nothing usable is left.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Assigns a unique entry name to every item, in submission order.
///
/// Each candidate is `(message_id, origin file name)`. Absent or unusable
/// names become `item_{message_id}`; a name already taken (compared
/// case-insensitively) becomes `{stem}_{message_id}.{ext}`.
pub fn assign_entry_names<'a, I>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = (i64, Option<&'a str>)>,
{
    let mut taken = HashSet::new();
    let mut names = Vec::new();

    for (message_id, file_name) in candidates {
        let base = file_name
            .and_then(sanitize_file_name)
            .unwrap_or_else(|| format!("item_{}", message_id));

        let mut name = base.clone();
        let mut attempt = 0u32;
        while taken.contains(&name.to_lowercase()) {
            attempt += 1;
            let suffix = if attempt == 1 {
                message_id.to_string()
            } else {
                format!("{}_{}", message_id, attempt)
            };
            name = with_suffix(&base, &suffix);
        }

        taken.insert(name.to_lowercase());
        names.push(name);
    }

    names
}

fn with_suffix(name: &str, suffix: &str) -> String {
    let path = Path::new(name);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{}_{}.{}", stem, suffix, ext),
        _ => format!("{}_{}", name, suffix),
    }
}

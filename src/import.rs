use std::path::Path;

use anyhow::Context as _;

/// A user-supplied excerpt file, read in full. The default title is the
/// filename with its extension stripped (`habits.txt` -> `habits`); it is
/// `None` when stripping leaves nothing usable.
#[derive(Debug, Clone)]
pub struct ImportedExcerpt {
    pub default_title: Option<String>,
    pub text: String,
}

pub fn read_excerpt(path: &Path) -> anyhow::Result<ImportedExcerpt> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read excerpt file: {}", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("excerpt file is empty: {}", path.display());
    }

    let default_title = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(derive_title);

    Ok(ImportedExcerpt {
        default_title,
        text,
    })
}

/// Strip the final extension from a filename. Only the last dot-segment is
/// removed, so `notes.draft.md` keeps its inner dot.
pub fn derive_title(file_name: &str) -> Option<String> {
    let title = match file_name.rfind('.') {
        Some(index) if index + 1 < file_name.len() => &file_name[..index],
        _ => file_name,
    };
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_owned())
    }
}

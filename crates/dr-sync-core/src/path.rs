//! Path helpers shared by reconciliation and the local collaborators.

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// Resolve a path glob to the concrete directory it is rooted at.
///
/// The directory is the part before the first glob metacharacter, cut back to
/// the last `/`. It carries no trailing separator, except for the root `/`.
/// Returns `None` for globs that have no directory component.
pub fn base_dir(glob: &str) -> Option<String> {
    let head = match glob.find(GLOB_CHARS) {
        Some(idx) => &glob[..idx],
        None => glob,
    };
    let last = head.rfind('/')?;
    let dir = head[..last].trim_end_matches('/');
    if dir.is_empty() {
        return Some("/".to_string());
    }
    Some(dir.to_string())
}

/// Make sure a replica destination ends with a path separator.
pub fn normalize_dest(dest: &str) -> String {
    if dest.ends_with('/') {
        dest.to_string()
    } else {
        format!("{}/", dest)
    }
}

/// Path of `path` relative to `dir`, if `path` lies strictly below it.
pub fn relative_to<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    let dir = dir.trim_end_matches('/');
    let rest = path.strip_prefix(dir)?.strip_prefix('/')?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Map a primary path under `src_dir` onto the replica rooted at `dest`.
pub fn replica_path(src_dir: &str, dest: &str, path: &str) -> Option<String> {
    let rest = relative_to(src_dir, path)?;
    Some(format!("{}{}", normalize_dest(dest), rest))
}

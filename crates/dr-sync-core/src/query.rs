//! Selection statement rewriting.
//!
//! A sync rule must not reselect files whose append diffs are still waiting
//! in the journal. The rule's final selection statement is extended with a
//! `UNION` of the pending-diff sources below the rule's directories; the
//! consumer treats that union as the set of paths not to resubmit.

use std::fmt;

use crate::model::{FileDiffState, FileDiffType};

/// Table holding the diff journal.
pub const DIFF_TABLE: &str = "file_diff";

/// Escape character for LIKE patterns.
const LIKE_ESCAPE: char = '\\';

/// Disjunction of "source path lies below directory" conditions.
///
/// Each directory is matched on a separator boundary, so `/data/a` covers
/// `/data/a/f1` but not `/data/ab/f1`. LIKE wildcards in directory names
/// match literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionPredicate {
    dirs: Vec<String>,
}

impl ExclusionPredicate {
    /// Build a predicate over `dirs`. Returns `None` when there are none.
    pub fn new<I, S>(dirs: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dirs: Vec<String> = dirs.into_iter().map(Into::into).collect();
        if dirs.is_empty() {
            None
        } else {
            Some(Self { dirs })
        }
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }
}

impl fmt::Display for ExclusionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, dir) in self.dirs.iter().enumerate() {
            if i > 0 {
                f.write_str(" OR ")?;
            }
            let (pattern, escaped) = like_prefix(dir);
            write!(f, "src LIKE '{}%'", quote(&pattern))?;
            if escaped {
                write!(f, " ESCAPE '{}'", LIKE_ESCAPE)?;
            }
        }
        Ok(())
    }
}

/// Query for pending append-like diffs matching a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDiffQuery {
    predicate: ExclusionPredicate,
}

impl PendingDiffQuery {
    pub fn new(predicate: ExclusionPredicate) -> Self {
        Self { predicate }
    }
}

impl fmt::Display for PendingDiffQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [first, second] = FileDiffType::append_like();
        write!(
            f,
            "SELECT src FROM {} WHERE state = {} AND diff_type IN ({},{}) AND ({})",
            DIFF_TABLE,
            FileDiffState::Pending.code(),
            first.code(),
            second.code(),
            self.predicate
        )
    }
}

/// Build the exclusion predicate for a set of source directories.
pub fn exclusion_clause<I, S>(source_dirs: I) -> Option<ExclusionPredicate>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ExclusionPredicate::new(source_dirs)
}

/// Replace the statement's trailing terminator with a union of pending diffs.
pub fn rewrite(statement: &str, predicate: &ExclusionPredicate) -> String {
    let trimmed = statement.trim_end();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    format!(
        "{} UNION {};",
        body,
        PendingDiffQuery::new(predicate.clone())
    )
}

/// Rewrite the last statement of `statements` in place.
///
/// # Returns
/// Whether there was a statement to rewrite
pub fn rewrite_last(statements: &mut [String], predicate: &ExclusionPredicate) -> bool {
    match statements.last_mut() {
        Some(last) => {
            *last = rewrite(last, predicate);
            true
        }
        None => false,
    }
}

fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// LIKE prefix for everything below `dir`, and whether it needed escaping.
fn like_prefix(dir: &str) -> (String, bool) {
    let mut pattern = String::with_capacity(dir.len() + 1);
    let mut escaped = false;
    for c in dir.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
            escaped = true;
        }
        pattern.push(c);
    }
    if !pattern.ends_with('/') {
        pattern.push('/');
    }
    (pattern, escaped)
}

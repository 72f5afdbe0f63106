use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::workspace::FileSystem;
use tracing::debug;

use crate::registry::{CONTENT_PARAM, Tool, ToolError, ToolInput, ToolOutput, ToolResult};

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, PartialEq, Eq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Hunk {
    old_start: usize,
    lines: Vec<HunkLine>,
}

impl Hunk {
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HunkLine::Context(text) | HunkLine::Remove(text) => Some(text.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            HunkLine::Context(text) | HunkLine::Add(text) => Some(text.as_str()),
            HunkLine::Remove(_) => None,
        })
    }

    fn count(&self, pick: fn(&HunkLine) -> bool) -> usize {
        self.lines.iter().filter(|line| pick(line)).count()
    }
}

/// One file section of a unified diff. `None` paths come from `/dev/null`
/// headers or from a diff without headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FilePatch {
    has_headers: bool,
    old_path: Option<String>,
    new_path: Option<String>,
    hunks: Vec<Hunk>,
}

impl FilePatch {
    fn creates(&self) -> bool {
        self.has_headers && self.old_path.is_none()
    }

    fn deletes(&self) -> bool {
        self.has_headers && self.new_path.is_none()
    }
}

fn header_path(raw: &str) -> Option<String> {
    let path = raw.split('\t').next().unwrap_or_default().trim();
    if path == DEV_NULL {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}

/// Parses `@@ -12,3 +12,4 @@` into `(old_start, old_len, new_len)`.
fn hunk_header(line: &str) -> Option<(usize, usize, usize)> {
    let ranges = line.strip_prefix("@@ ")?.split(" @@").next()?;
    let (old, new) = ranges.split_once(' ')?;
    let range = |part: &str, sign: char| -> Option<(usize, usize)> {
        let part = part.strip_prefix(sign)?;
        match part.split_once(',') {
            Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
            None => Some((part.parse().ok()?, 1)),
        }
    };
    let (old_start, old_len) = range(old, '-')?;
    let (_, new_len) = range(new, '+')?;
    Some((old_start, old_len, new_len))
}

fn parse_patch(diff: &str) -> Result<Vec<FilePatch>, String> {
    let mut files: Vec<FilePatch> = Vec::new();
    let mut lines = diff.lines().peekable();

    while let Some(line) = lines.next() {
        if let Some(old) = line.strip_prefix("--- ") {
            let Some(new) = lines.next().and_then(|next| next.strip_prefix("+++ ")) else {
                return Err(format!("`{line}` is not followed by a `+++` header"));
            };
            files.push(FilePatch {
                has_headers: true,
                old_path: header_path(old),
                new_path: header_path(new),
                hunks: Vec::new(),
            });
            continue;
        }

        if !line.starts_with("@@") {
            continue;
        }
        let (old_start, mut old_left, mut new_left) =
            hunk_header(line).ok_or_else(|| format!("malformed hunk header `{line}`"))?;

        let mut hunk = Hunk {
            old_start,
            lines: Vec::new(),
        };
        while old_left > 0 || new_left > 0 {
            let Some(body) = lines.next() else {
                return Err(format!("hunk `{line}` ends early"));
            };
            let mut chars = body.chars();
            let kind = chars.next();
            let text = chars.as_str();
            match kind {
                Some(' ') | None => {
                    hunk.lines.push(HunkLine::Context(text.to_string()));
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                }
                Some('-') => {
                    hunk.lines.push(HunkLine::Remove(text.to_string()));
                    old_left = old_left.saturating_sub(1);
                }
                Some('+') => {
                    hunk.lines.push(HunkLine::Add(text.to_string()));
                    new_left = new_left.saturating_sub(1);
                }
                Some('\\') => {}
                _ => return Err(format!("unexpected line `{body}` inside hunk `{line}`")),
            }
        }
        while lines.peek().is_some_and(|next| next.starts_with('\\')) {
            lines.next();
        }

        if files.is_empty() {
            files.push(FilePatch::default());
        }
        if let Some(file) = files.last_mut() {
            file.hunks.push(hunk);
        }
    }

    files.retain(|file| !file.hunks.is_empty() || file.creates());
    if files.is_empty() {
        return Err("no hunks found in the diff".into());
    }
    Ok(files)
}

/// Applies `hunks` in order. A hunk is placed at its stated line when the old
/// lines match there, otherwise at the closest match after the previous hunk.
fn apply_hunks(original: &str, hunks: &[Hunk]) -> Result<String, String> {
    let source: Vec<&str> = original.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(source.len());
    let mut cursor = 0;

    for (index, hunk) in hunks.iter().enumerate() {
        let old = hunk.old_lines();
        let fits = |at: usize| source.get(at..at + old.len()).is_some_and(|window| window == old);

        let expected = hunk.old_start.saturating_sub(1).max(cursor);
        let last = source.len().saturating_sub(old.len());
        let found = (0..=expected.max(last))
            .flat_map(|offset| [expected.checked_add(offset), expected.checked_sub(offset)])
            .flatten()
            .find(|&at| at >= cursor && at <= last && fits(at))
            .ok_or_else(|| {
                format!(
                    "hunk {} does not apply at line {}",
                    index + 1,
                    hunk.old_start
                )
            })?;

        out.extend_from_slice(&source[cursor..found]);
        out.extend(hunk.new_lines());
        cursor = found + old.len();
    }
    out.extend_from_slice(&source[cursor.min(source.len())..]);

    let mut patched = out.join("\n");
    if !patched.is_empty() && (original.is_empty() || original.ends_with('\n')) {
        patched.push('\n');
    }
    Ok(patched)
}

/// `patch`: applies a unified diff from the command body to workspace files.
pub struct PatchTool {
    fs: Arc<dyn FileSystem>,
}

impl PatchTool {
    /// Creates the tool over the supplied filesystem.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for PatchTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let diff = input.param(CONTENT_PARAM).unwrap_or_default();
        if diff.trim().is_empty() {
            return Err(ToolError::execution(
                "patch needs a unified diff in the following code block",
            ));
        }
        let files = parse_patch(diff).map_err(ToolError::execution)?;

        let explicit = input.param("path").map(str::trim).filter(|p| !p.is_empty());
        if explicit.is_some() && files.len() > 1 {
            return Err(ToolError::execution(
                "a path can only be given for a single-file diff",
            ));
        }

        // Every file is patched in memory first so a failing hunk writes nothing.
        let mut pending = Vec::with_capacity(files.len());
        for file in &files {
            if file.deletes() {
                return Err(ToolError::execution("patch cannot delete files"));
            }
            let path = explicit
                .or(file.new_path.as_deref())
                .or(file.old_path.as_deref())
                .ok_or_else(|| ToolError::execution("diff names no file; use /patch:<path>"))?;
            let absolute = input.context().resolve_path(path)?;

            let original = if file.creates() && !self.fs.exists(&absolute).await {
                String::new()
            } else {
                self.fs.read_to_string(&absolute).await.map_err(|err| {
                    ToolError::execution(format!("could not read file `{path}`: {err}"))
                })?
            };
            let patched = apply_hunks(&original, &file.hunks)
                .map_err(|reason| ToolError::execution(format!("{path}: {reason}")))?;
            pending.push((path, absolute, patched, file));
        }

        let mut summary = String::new();
        for (path, absolute, patched, file) in pending {
            self.fs.write(&absolute, &patched).await?;
            let tally = |pick: fn(&HunkLine) -> bool| -> usize {
                file.hunks.iter().map(|hunk| hunk.count(pick)).sum()
            };
            let added = tally(|line| matches!(line, HunkLine::Add(_)));
            let removed = tally(|line| matches!(line, HunkLine::Remove(_)));
            debug!(path, hunks = file.hunks.len(), added, removed, "patched workspace file");
            if !summary.is_empty() {
                summary.push('\n');
            }
            let _ = write!(summary, "Patched {path} (+{added} -{removed})");
        }
        Ok(ToolOutput::text(summary))
    }
}

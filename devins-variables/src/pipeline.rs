//! User-defined variables computed by a pattern→action pipeline.
//!
//! A definition names a source and a `|`-separated list of actions:
//!
//! ```text
//! /src/.*\.rs/ { cat | grep("fn (\w+)") | sort | uniq | head(5) }
//! "hello world" { sed("world", "there") }
//! ```
//!
//! A `/regex/` source yields the workspace-relative paths matching the regex,
//! one per line; a quoted source yields the literal text.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::WorkspaceError;
use devins_primitives::workspace::{FileSystem, walk_files};
use regex::Regex;

use crate::error::{ResolveError, ResolveResult};
use crate::resolver::{ResolveContext, VariableResolver};

const MAX_WALKED_FILES: usize = 5_000;

/// Where a pipeline's initial value comes from.
#[derive(Debug, Clone)]
pub enum PipelineSource {
    /// Workspace files whose relative path matches the regex.
    Files(Regex),
    /// Literal text.
    Literal(String),
}

/// A single pipeline stage.
#[derive(Debug, Clone)]
pub enum PipelineAction {
    /// Emits every match of every pattern (first capture group when present).
    Grep(Vec<Regex>),
    /// Replaces matches line by line; `$1` style references are supported.
    Sed {
        /// Pattern to replace.
        pattern: Regex,
        /// Replacement text.
        replacement: String,
    },
    /// Sorts lines.
    Sort,
    /// Removes duplicate lines, keeping first occurrences.
    Uniq,
    /// Keeps the first `n` lines.
    Head(usize),
    /// Keeps the last `n` lines.
    Tail(usize),
    /// Replaces the value with the given lines, or passes it through when empty.
    Print(Vec<String>),
    /// Reads the listed files, or the files named by the input lines when empty.
    Cat(Vec<String>),
    /// Prefixes each line with its 1-based number.
    LineNo,
}

impl PipelineAction {
    fn from_call(name: &str, args: Vec<String>) -> ResolveResult<Self> {
        let action = match name {
            "grep" => {
                if args.is_empty() {
                    return Err(ResolveError::pipeline("grep needs at least one pattern"));
                }
                let patterns = args
                    .iter()
                    .map(|p| Regex::new(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::Grep(patterns)
            }
            "sed" => {
                let [pattern, replacement] = <[String; 2]>::try_from(args)
                    .map_err(|_| ResolveError::pipeline("sed needs a pattern and a replacement"))?;
                Self::Sed {
                    pattern: Regex::new(&pattern)?,
                    replacement,
                }
            }
            "sort" => Self::Sort,
            "uniq" => Self::Uniq,
            "lineNo" => Self::LineNo,
            "head" => Self::Head(single_count(name, &args)?),
            "tail" => Self::Tail(single_count(name, &args)?),
            "print" => Self::Print(args),
            "cat" => Self::Cat(args),
            other => {
                return Err(ResolveError::pipeline(format!("unknown action `{other}`")));
            }
        };
        Ok(action)
    }

    async fn apply(
        &self,
        input: String,
        fs: &dyn FileSystem,
        ctx: &ResolveContext,
    ) -> ResolveResult<String> {
        let output = match self {
            Self::Grep(patterns) => {
                let mut matches = Vec::new();
                for pattern in patterns {
                    for captures in pattern.captures_iter(&input) {
                        let hit = captures.get(1).or_else(|| captures.get(0));
                        if let Some(hit) = hit {
                            matches.push(hit.as_str().to_string());
                        }
                    }
                }
                matches.join("\n")
            }
            Self::Sed {
                pattern,
                replacement,
            } => input
                .split('\n')
                .map(|line| pattern.replace_all(line, replacement.as_str()).into_owned())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Sort => {
                let mut lines: Vec<&str> = input.split('\n').collect();
                lines.sort_unstable();
                lines.join("\n")
            }
            Self::Uniq => {
                let mut seen = std::collections::HashSet::new();
                input
                    .split('\n')
                    .filter(|line| seen.insert(*line))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Self::Head(n) => input.split('\n').take(*n).collect::<Vec<_>>().join("\n"),
            Self::Tail(n) => {
                let lines: Vec<&str> = input.split('\n').collect();
                lines[lines.len().saturating_sub(*n)..].join("\n")
            }
            Self::Print(texts) if texts.is_empty() => input,
            Self::Print(texts) => texts.join("\n"),
            Self::Cat(paths) => {
                let targets: Vec<&str> = if paths.is_empty() {
                    input.lines().filter(|l| !l.trim().is_empty()).collect()
                } else {
                    paths.iter().map(String::as_str).collect()
                };
                let mut contents = Vec::with_capacity(targets.len());
                for target in targets {
                    let path = ctx.execution().resolve_path(target)?;
                    contents.push(fs.read_to_string(&path).await?);
                }
                contents.join("\n")
            }
            Self::LineNo => input
                .split('\n')
                .enumerate()
                .map(|(i, line)| format!("{}: {line}", i + 1))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        Ok(output)
    }
}

fn single_count(name: &str, args: &[String]) -> ResolveResult<usize> {
    match args {
        [n] => n
            .trim()
            .parse()
            .map_err(|_| ResolveError::pipeline(format!("{name} expects a line count, got `{n}`"))),
        _ => Err(ResolveError::pipeline(format!("{name} expects exactly one argument"))),
    }
}

/// A parsed pipeline definition.
#[derive(Debug, Clone)]
pub struct Pipeline {
    source: PipelineSource,
    actions: Vec<PipelineAction>,
}

impl Pipeline {
    /// Parses a definition such as `/pattern/ { grep("x") | sort }`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidPipeline`] for malformed text and
    /// [`ResolveError::Pattern`] for invalid regular expressions.
    pub fn parse(expr: &str) -> ResolveResult<Self> {
        let text = expr.trim();
        let (source, rest) = parse_source(text)?;

        let rest = rest.trim();
        let body = rest
            .strip_prefix('{')
            .and_then(|r| r.strip_suffix('}'))
            .ok_or_else(|| ResolveError::pipeline("expected `{ action | ... }` after the source"))?;

        let mut actions = Vec::new();
        for stage in split_top_level(body, '|') {
            let stage = stage.trim();
            if stage.is_empty() {
                continue;
            }
            let (name, args) = parse_call(stage)?;
            actions.push(PipelineAction::from_call(name, args)?);
        }

        Ok(Self { source, actions })
    }

    /// Returns the source.
    #[must_use]
    pub fn source(&self) -> &PipelineSource {
        &self.source
    }

    /// Returns the actions in execution order.
    #[must_use]
    pub fn actions(&self) -> &[PipelineAction] {
        &self.actions
    }

    /// Evaluates the pipeline.
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures and a missing workspace for file sources.
    pub async fn run(&self, fs: &dyn FileSystem, ctx: &ResolveContext) -> ResolveResult<String> {
        let mut value = match &self.source {
            PipelineSource::Literal(text) => text.clone(),
            PipelineSource::Files(pattern) => {
                let root = ctx.workspace_root().ok_or(WorkspaceError::NoWorkspace)?;
                walk_files(fs, root, Path::new(""), MAX_WALKED_FILES)
                    .await?
                    .into_iter()
                    .filter(|path| pattern.is_match(path))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        for action in &self.actions {
            value = action.apply(value, fs, ctx).await?;
        }
        Ok(value)
    }
}

impl FromStr for Pipeline {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_source(text: &str) -> ResolveResult<(PipelineSource, &str)> {
    match text.chars().next() {
        // The regex may itself contain `/`, so it closes at the `/` that precedes the body.
        Some('/') => {
            let end = text
                .char_indices()
                .skip(1)
                .filter(|&(_, c)| c == '/')
                .map(|(idx, _)| idx)
                .find(|&idx| text[idx + 1..].trim_start().starts_with('{'))
                .ok_or_else(|| ResolveError::pipeline("regex source is missing its closing `/`"))?;
            let pattern = Regex::new(&text[1..end])?;
            Ok((PipelineSource::Files(pattern), &text[end + 1..]))
        }
        Some('"') => {
            let mut escaped = false;
            let mut end = None;
            for (idx, c) in text.char_indices().skip(1) {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    end = Some(idx);
                    break;
                }
            }
            let end =
                end.ok_or_else(|| ResolveError::pipeline("literal source is missing its closing quote"))?;
            let literal = unescape(&text[1..end]);
            Ok((PipelineSource::Literal(literal), &text[end + 1..]))
        }
        _ => Err(ResolveError::pipeline(
            "source must be a `/regex/` or a quoted string",
        )),
    }
}

fn parse_call(stage: &str) -> ResolveResult<(&str, Vec<String>)> {
    let Some(open) = stage.find('(') else {
        return Ok((stage, Vec::new()));
    };
    let name = stage[..open].trim();
    let inner = stage[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| ResolveError::pipeline(format!("`{stage}` is missing `)`")))?;

    let args = split_top_level(inner, ',')
        .into_iter()
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(|arg| match arg.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
            Some(quoted) => unescape(quoted),
            None => arg.to_string(),
        })
        .collect();
    Ok((name, args))
}

/// Splits on `sep` outside of double quotes and parentheses.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            c if c == sep && !in_quote && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Resolves `\"`, `\\`, `\n` and `\t`; any other escape is kept for the regex engine.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let replacement = match chars.peek() {
                Some('"') => Some('"'),
                Some('\\') => Some('\\'),
                Some('n') => Some('\n'),
                Some('t') => Some('\t'),
                _ => None,
            };
            if let Some(replacement) = replacement {
                out.push(replacement);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Resolves variables bound to pipeline definitions.
pub struct PipelineResolver {
    fs: Arc<dyn FileSystem>,
    definitions: BTreeMap<String, Pipeline>,
}

impl PipelineResolver {
    /// Creates a resolver with no definitions.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            definitions: BTreeMap::new(),
        }
    }

    /// Parses and adds a definition.
    ///
    /// # Errors
    ///
    /// Returns the parse error for a malformed definition.
    pub fn with_definition(mut self, name: impl Into<String>, expr: &str) -> ResolveResult<Self> {
        self.define(name, Pipeline::parse(expr)?);
        Ok(self)
    }

    /// Adds or replaces a parsed definition.
    pub fn define(&mut self, name: impl Into<String>, pipeline: Pipeline) {
        self.definitions.insert(name.into(), pipeline);
    }

    /// Returns the defined variable names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl VariableResolver for PipelineResolver {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn claims(&self, variable: &str) -> bool {
        self.definitions.contains_key(variable)
    }

    async fn resolve(&self, variable: &str, ctx: &ResolveContext) -> ResolveResult<String> {
        let pipeline = self
            .definitions
            .get(variable)
            .ok_or_else(|| ResolveError::Unavailable {
                name: variable.to_string(),
                reason: "no pipeline defined",
            })?;
        pipeline.run(self.fs.as_ref(), ctx).await
    }
}

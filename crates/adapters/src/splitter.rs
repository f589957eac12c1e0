//! Chunk splitters: syntax-aware (tree-sitter) and size-based.

use codeatlas_ports::{BoxFuture, CodeChunk, SplitOptions, SplitterPort};
use codeatlas_domain::{Language, LineSpan};
use codeatlas_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use tree_sitter::{Node, Parser, Tree};

/// Size-based sliding-window splitter, also the fallback for unknown
/// extensions and unparsable files.
#[derive(Debug, Clone, Copy)]
pub struct SizeSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SizeSplitter {
    /// Create a splitter with explicit window sizing (characters).
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk size must be greater than zero",
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk overlap must be smaller than chunk size",
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    fn split_sync(self, code: &str, language: Language) -> Result<Vec<CodeChunk>> {
        if code.is_empty() {
            return Ok(Vec::new());
        }
        let lines = collect_lines(code);
        let total_lines = line_count(lines.len())?;
        let ranges = size_split_range(&lines, 1, total_lines, self.chunk_size, self.chunk_overlap);
        build_chunks(&lines, &ranges, language)
    }
}

impl SplitterPort for SizeSplitter {
    fn split(
        &self,
        ctx: &RequestContext,
        code: Box<str>,
        language: Language,
        _options: SplitOptions,
    ) -> BoxFuture<'_, Result<Vec<CodeChunk>>> {
        let splitter = *self;
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("splitter.size")?;
            splitter.split_sync(code.as_ref(), language)
        })
    }
}

/// Tree-sitter splitter emitting one chunk per splittable syntax node, with
/// residual top-level text handled by the size splitter.
#[derive(Debug, Clone, Copy)]
pub struct AstSplitter {
    fallback: SizeSplitter,
}

impl AstSplitter {
    /// Create a splitter; window sizing applies to residual text and to
    /// oversized nodes.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Ok(Self {
            fallback: SizeSplitter::new(chunk_size, chunk_overlap)?,
        })
    }

    fn split_sync(
        self,
        code: &str,
        language: Language,
        options: &SplitOptions,
    ) -> Result<Vec<CodeChunk>> {
        if code.is_empty() {
            return Ok(Vec::new());
        }

        let Some(tree) = parse_tree(code, language, options.file_path.as_deref()) else {
            if language != Language::Text {
                tracing::warn!(
                    language = %language,
                    file = options.file_path.as_deref().unwrap_or("<unknown>"),
                    "parse failed, falling back to size splitting"
                );
            }
            return self.fallback.split_sync(code, language);
        };

        let lines = collect_lines(code);
        let total_lines = line_count(lines.len())?;
        let spans = splittable_spans(&tree, language, total_lines);
        if spans.is_empty() {
            return self.fallback.split_sync(code, language);
        }

        let mut ranges = Vec::new();
        let mut cursor_line = 1u32;
        for span in spans {
            if span.start > cursor_line {
                // Residual top-level text between recognized nodes.
                ranges.extend(size_split_range(
                    &lines,
                    cursor_line,
                    span.start - 1,
                    self.fallback.chunk_size,
                    0,
                ));
            }
            if range_char_len(&lines, span.start, span.end) > self.fallback.chunk_size {
                ranges.extend(size_split_range(
                    &lines,
                    span.start,
                    span.end,
                    self.fallback.chunk_size,
                    self.fallback.chunk_overlap,
                ));
            } else {
                ranges.push(span);
            }
            cursor_line = span.end.saturating_add(1);
        }
        if cursor_line <= total_lines {
            ranges.extend(size_split_range(
                &lines,
                cursor_line,
                total_lines,
                self.fallback.chunk_size,
                0,
            ));
        }

        build_chunks(&lines, &ranges, language)
    }
}

impl SplitterPort for AstSplitter {
    fn split(
        &self,
        ctx: &RequestContext,
        code: Box<str>,
        language: Language,
        options: SplitOptions,
    ) -> BoxFuture<'_, Result<Vec<CodeChunk>>> {
        let splitter = *self;
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("splitter.ast")?;
            splitter.split_sync(code.as_ref(), language, &options)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpanRange {
    start: u32,
    end: u32,
}

fn parse_tree(code: &str, language: Language, file_path: Option<&str>) -> Option<Tree> {
    let ts_language = tree_sitter_language(language, file_path)?;
    let mut parser = Parser::new();
    if parser.set_language(&ts_language).is_err() {
        return None;
    }
    parser.parse(code, None)
}

fn tree_sitter_language(
    language: Language,
    file_path: Option<&str>,
) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => {
            if is_tsx(file_path) {
                Some(tree_sitter_typescript::LANGUAGE_TSX.into())
            } else {
                Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            }
        },
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::C => Some(tree_sitter_c::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        Language::Text => None,
    }
}

fn is_tsx(file_path: Option<&str>) -> bool {
    file_path
        .and_then(|path| path.rsplit_once('.'))
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("tsx"))
}

/// Node kinds worth a chunk of their own, per language.
fn splittable_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Rust => &[
            "function_item",
            "struct_item",
            "enum_item",
            "impl_item",
            "trait_item",
            "mod_item",
            "macro_definition",
        ],
        Language::Go => &[
            "function_declaration",
            "method_declaration",
            "type_declaration",
        ],
        Language::Java => &[
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "method_declaration",
        ],
        Language::JavaScript => &[
            "function_declaration",
            "class_declaration",
            "method_definition",
            "export_statement",
            "lexical_declaration",
        ],
        Language::TypeScript => &[
            "function_declaration",
            "class_declaration",
            "method_definition",
            "interface_declaration",
            "type_alias_declaration",
            "enum_declaration",
            "export_statement",
            "lexical_declaration",
        ],
        Language::Python => &[
            "function_definition",
            "class_definition",
            "decorated_definition",
        ],
        Language::C => &[
            "function_definition",
            "struct_specifier",
            "enum_specifier",
            "union_specifier",
        ],
        Language::Cpp => &[
            "function_definition",
            "class_specifier",
            "struct_specifier",
            "namespace_definition",
            "template_declaration",
        ],
        Language::Text => &[],
    }
}

/// Collect line spans of splittable nodes, outermost first; matched nodes
/// are not descended into, so a method inside a collected class does not
/// produce a second chunk.
fn splittable_spans(tree: &Tree, language: Language, total_lines: u32) -> Vec<SpanRange> {
    let kinds = splittable_kinds(language);
    if kinds.is_empty() || total_lines == 0 {
        return Vec::new();
    }

    let mut spans = Vec::new();
    collect_spans(tree.root_node(), kinds, total_lines, &mut spans);
    spans.sort_by_key(|span| (span.start, span.end));

    // Drop spans swallowed by an earlier, larger one.
    let mut merged: Vec<SpanRange> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last() {
            Some(last) if span.start <= last.end => {},
            _ => merged.push(span),
        }
    }
    merged
}

fn collect_spans(node: Node<'_>, kinds: &[&str], total_lines: u32, spans: &mut Vec<SpanRange>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if kinds.contains(&child.kind()) {
            if let Some(span) = span_from_node(child, total_lines) {
                spans.push(span);
            }
            continue;
        }
        collect_spans(child, kinds, total_lines, spans);
    }
}

fn span_from_node(node: Node<'_>, total_lines: u32) -> Option<SpanRange> {
    if total_lines == 0 {
        return None;
    }
    let start = to_u32(node.start_position().row).saturating_add(1);
    let mut end = to_u32(node.end_position().row).saturating_add(1);
    if node.end_position().column == 0 && end > start {
        end = end.saturating_sub(1);
    }

    let start = start.clamp(1, total_lines);
    let end = end.clamp(start, total_lines);
    Some(SpanRange { start, end })
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn collect_lines(code: &str) -> Vec<&str> {
    code.split_inclusive('\n').collect()
}

fn line_count(lines: usize) -> Result<u32> {
    u32::try_from(lines).map_err(|_| {
        ErrorEnvelope::invariant(ErrorCode::internal(), "line count overflow")
    })
}

fn range_char_len(lines: &[&str], start: u32, end: u32) -> usize {
    let start_idx = start.saturating_sub(1) as usize;
    let end_idx = (end as usize).min(lines.len());
    lines
        .get(start_idx..end_idx)
        .map(|slice| slice.iter().map(|line| line.chars().count()).sum())
        .unwrap_or(0)
}

/// Split `[start, end]` into windows of at most `chunk_size` characters,
/// never inside a line, with `overlap` characters of trailing carryover.
fn size_split_range(
    lines: &[&str],
    start: u32,
    end: u32,
    chunk_size: usize,
    overlap: usize,
) -> Vec<SpanRange> {
    if start > end || lines.is_empty() {
        return Vec::new();
    }
    let end = end.min(to_u32(lines.len()));

    let mut ranges = Vec::new();
    let mut window_start = start;
    let mut window_len = 0usize;
    let mut line = start;

    while line <= end {
        let len = lines
            .get(line.saturating_sub(1) as usize)
            .map(|text| text.chars().count())
            .unwrap_or(0);

        if window_len > 0 && window_len + len > chunk_size {
            let window_end = line - 1;
            ranges.push(SpanRange {
                start: window_start,
                end: window_end,
            });

            // Carry trailing lines back into the next window, staying under
            // the overlap budget and always making forward progress.
            let mut carry_start = line;
            let mut carry_len = 0usize;
            while carry_start > window_start.saturating_add(1) {
                let candidate = carry_start - 1;
                let candidate_len = lines
                    .get(candidate.saturating_sub(1) as usize)
                    .map(|text| text.chars().count())
                    .unwrap_or(0);
                if carry_len + candidate_len > overlap {
                    break;
                }
                carry_len += candidate_len;
                carry_start = candidate;
            }
            window_start = carry_start;
            window_len = carry_len;
        }

        window_len += len;
        line += 1;
    }

    if window_start <= end {
        ranges.push(SpanRange {
            start: window_start,
            end,
        });
    }
    ranges
}

/// Materialize chunks, trimming leading/trailing blank lines when at least
/// one non-blank line remains.
fn build_chunks(lines: &[&str], ranges: &[SpanRange], language: Language) -> Result<Vec<CodeChunk>> {
    let mut chunks = Vec::with_capacity(ranges.len());
    for range in ranges {
        let Some((start, end)) = trim_blank_edges(lines, range.start, range.end) else {
            // Nothing but blank lines; not worth an embedding.
            continue;
        };

        let content = content_for(lines, start, end)?;
        let span = LineSpan::new(start, end).map_err(ErrorEnvelope::from)?;
        chunks.push(CodeChunk {
            content,
            span,
            language,
        });
    }
    Ok(chunks)
}

fn trim_blank_edges(lines: &[&str], start: u32, end: u32) -> Option<(u32, u32)> {
    let mut trimmed_start = start;
    let mut trimmed_end = end;

    while trimmed_start <= trimmed_end && line_is_blank(lines, trimmed_start) {
        trimmed_start += 1;
    }
    if trimmed_start > trimmed_end {
        return None;
    }
    while trimmed_end > trimmed_start && line_is_blank(lines, trimmed_end) {
        trimmed_end -= 1;
    }
    Some((trimmed_start, trimmed_end))
}

fn line_is_blank(lines: &[&str], line: u32) -> bool {
    lines
        .get(line.saturating_sub(1) as usize)
        .is_none_or(|text| text.trim().is_empty())
}

fn content_for(lines: &[&str], start: u32, end: u32) -> Result<Box<str>> {
    let start_idx = start.saturating_sub(1) as usize;
    let end_idx = end as usize;
    let slice = lines.get(start_idx..end_idx.min(lines.len())).ok_or_else(|| {
        ErrorEnvelope::invariant(ErrorCode::internal(), "chunk span out of bounds")
    })?;

    let mut out = String::new();
    for line in slice {
        out.push_str(line);
    }
    Ok(out.into_boxed_str())
}

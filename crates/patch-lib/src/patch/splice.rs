//! In-place edits of YAML source text
//!
//! Nodes are located through the parser's event markers and only the values
//! that differ are rewritten. Every byte outside those values, comments and
//! quoting included, is copied through from the input.

use crate::error::PipelineError;
use serde_yaml::{Mapping, Value};
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::Marker;

/// Source node and the byte offset it starts at
#[derive(Debug)]
enum Node {
    Scalar { value: String, start: usize },
    Sequence { start: usize, flow: bool, items: Vec<Node> },
    Mapping { start: usize, flow: bool, entries: Vec<(Node, Node)> },
    Alias,
}

impl Node {
    fn start(&self) -> Option<usize> {
        match self {
            Node::Scalar { start, .. } | Node::Sequence { start, .. } | Node::Mapping { start, .. } => {
                Some(*start)
            }
            Node::Alias => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Node::Scalar { value, .. } if matches!(value.as_str(), "" | "~" | "null" | "Null" | "NULL"))
    }
}

enum Frame {
    Sequence { start: usize, flow: bool, items: Vec<Node> },
    Mapping { start: usize, flow: bool, children: Vec<Node> },
}

struct TreeBuilder<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
    stack: Vec<Frame>,
    documents: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn new(text: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            text,
            line_starts,
            stack: Vec::new(),
            documents: Vec::new(),
        }
    }

    /// Byte offset of a marker; line is 1-based, column counts chars
    fn offset(&self, mark: &Marker) -> usize {
        let Some(&line_start) = self.line_starts.get(mark.line().saturating_sub(1)) else {
            return self.text.len();
        };
        line_start
            + self.text[line_start..]
                .chars()
                .take(mark.col())
                .map(char::len_utf8)
                .sum::<usize>()
    }

    fn push(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping { children, .. }) => children.push(node),
            None => self.documents.push(node),
        }
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        let start = self.offset(&mark);
        let text = self.text;
        let opens = |c: char| text[start..].starts_with(c);
        match event {
            Event::Scalar(value, ..) => self.push(Node::Scalar { value, start }),
            Event::Alias(_) => self.push(Node::Alias),
            Event::SequenceStart(..) => {
                let flow = opens('[');
                self.stack.push(Frame::Sequence {
                    start,
                    flow,
                    items: Vec::new(),
                });
            }
            Event::MappingStart(..) => {
                let flow = opens('{');
                self.stack.push(Frame::Mapping {
                    start,
                    flow,
                    children: Vec::new(),
                });
            }
            Event::SequenceEnd | Event::MappingEnd => {
                let node = match self.stack.pop() {
                    Some(Frame::Sequence { start, flow, items }) => {
                        Node::Sequence { start, flow, items }
                    }
                    Some(Frame::Mapping {
                        start,
                        flow,
                        children,
                    }) => {
                        let mut children = children.into_iter();
                        let mut entries = Vec::new();
                        while let (Some(key), Some(value)) = (children.next(), children.next()) {
                            entries.push((key, value));
                        }
                        Node::Mapping {
                            start,
                            flow,
                            entries,
                        }
                    }
                    None => return,
                };
                self.push(node);
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

impl Edit {
    fn insert(at: usize, text: String) -> Self {
        Self {
            start: at,
            end: at,
            text,
        }
    }
}

/// Rewrite the `index`-th non-empty document of `text` from `original` to
/// `merged`, leaving all other bytes as they are
pub(super) fn splice_document(
    text: &str,
    index: usize,
    original: &Value,
    merged: &Value,
) -> Result<String, PipelineError> {
    let mut builder = TreeBuilder::new(text);
    Parser::new_from_str(text)
        .load(&mut builder, true)
        .map_err(|e| PipelineError::ManifestParse(e.to_string()))?;

    let root = builder
        .documents
        .iter()
        .filter(|document| !document.is_null())
        .nth(index)
        .ok_or_else(|| unsupported("the workload document"))?;

    let splicer = Splicer { text };
    let mut edits = Vec::new();
    splicer.node(root, original, merged, &mut edits)?;
    apply_edits(text, edits)
}

fn apply_edits(text: &str, mut edits: Vec<Edit>) -> Result<String, PipelineError> {
    edits.sort_by_key(|edit| edit.start);
    if edits.windows(2).any(|pair| pair[0].end > pair[1].start) {
        return Err(unsupported("overlapping values"));
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&text[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

fn unsupported(what: &str) -> PipelineError {
    PipelineError::PatchApply(format!("cannot update {what} without reformatting the manifest"))
}

struct Splicer<'a> {
    text: &'a str,
}

impl Splicer<'_> {
    fn node(
        &self,
        node: &Node,
        original: &Value,
        merged: &Value,
        edits: &mut Vec<Edit>,
    ) -> Result<(), PipelineError> {
        if original == merged {
            return Ok(());
        }

        match (node, merged) {
            (
                Node::Mapping {
                    start, flow: true, ..
                }
                | Node::Sequence {
                    start, flow: true, ..
                },
                _,
            ) => {
                edits.push(self.replace_flow(*start, merged)?);
                Ok(())
            }
            (Node::Mapping { entries, .. }, Value::Mapping(wanted)) => {
                self.mapping(entries, original.as_mapping(), wanted, edits)
            }
            (Node::Sequence { items, .. }, Value::Sequence(wanted)) => {
                let current = original.as_sequence().map_or(&[][..], Vec::as_slice);
                if items.len() != wanted.len() || current.len() != wanted.len() {
                    return Err(unsupported("a sequence whose length changed"));
                }
                for ((item, before), after) in items.iter().zip(current).zip(wanted) {
                    self.node(item, before, after, edits)?;
                }
                Ok(())
            }
            (Node::Scalar { start, .. }, wanted) if is_scalar(wanted) => {
                edits.push(self.replace_scalar(*start, wanted)?);
                Ok(())
            }
            _ => Err(unsupported("a value whose type changed")),
        }
    }

    fn mapping(
        &self,
        entries: &[(Node, Node)],
        original: Option<&Mapping>,
        wanted: &Mapping,
        edits: &mut Vec<Edit>,
    ) -> Result<(), PipelineError> {
        let mut missing = Vec::new();
        for (key, after) in wanted {
            let before = original.and_then(|m| m.get(key));
            if before == Some(after) {
                continue;
            }

            let found = key.as_str().and_then(|key| {
                entries
                    .iter()
                    .find(|(node, _)| matches!(node, Node::Scalar { value, .. } if value == key))
            });
            match (found, before) {
                (Some((key_node, _)), Some(Value::Null)) => {
                    edits.push(self.fill_null(key_node, after)?);
                }
                (Some((_, value_node)), Some(before)) => {
                    self.node(value_node, before, after, edits)?;
                }
                (None, None) => missing.push((key, after)),
                _ => return Err(unsupported("a key the parsers disagree on")),
            }
        }

        if !missing.is_empty() {
            edits.push(self.insert_entries(entries, &missing)?);
        }
        Ok(())
    }

    /// Give a value to `key:` whose value is empty or null
    fn fill_null(&self, key: &Node, value: &Value) -> Result<Edit, PipelineError> {
        let Some(key_start) = key.start() else {
            return Err(unsupported("an aliased key"));
        };
        let key_end = self.scalar_end(key_start)?;
        let colon = key_end
            + self.text[key_end..]
                .find(|c: char| c != ' ' && c != '\t')
                .filter(|&i| self.text[key_end + i..].starts_with(':'))
                .ok_or_else(|| unsupported("a key without an inline value"))?;

        let line_end = self.line_end(colon);
        let rest = &self.text[colon + 1..line_end];
        let (content, comment) = match find_comment(rest) {
            Some(i) => (&rest[..i], Some(&rest[i..])),
            None => (rest, None),
        };
        if !matches!(content.trim(), "" | "~" | "null" | "Null" | "NULL") {
            return Err(unsupported("a null written over several lines"));
        }

        let comment = comment.map(|c| format!(" {c}")).unwrap_or_default();
        let text = match value {
            Value::Mapping(mapping) if !mapping.is_empty() => {
                let block = render_entries(mapping.iter(), self.column(key_start) + 2)?;
                format!("{comment}\n{}", block.trim_end_matches('\n'))
            }
            other => format!(" {}{comment}", render_inline(other)?),
        };
        Ok(Edit {
            start: colon + 1,
            end: line_end,
            text,
        })
    }

    /// Add new keys to a block mapping at the indentation of its existing keys
    fn insert_entries(
        &self,
        entries: &[(Node, Node)],
        missing: &[(&Value, &Value)],
    ) -> Result<Edit, PipelineError> {
        let first = entries
            .first()
            .and_then(|(key, _)| key.start())
            .ok_or_else(|| unsupported("an empty block mapping"))?;
        let indent = self.column(first);
        let block = render_entries(missing.iter().copied(), indent)?;

        let after = entries
            .iter()
            .rev()
            .find_map(|(key, value)| self.line_after_entry(key, value));

        Ok(match after {
            Some(at) if at == self.text.len() && !self.text.ends_with('\n') => {
                Edit::insert(at, format!("\n{block}"))
            }
            Some(at) => Edit::insert(at, block),
            None => Edit::insert(
                first,
                format!("{}{}", block.trim_start(), " ".repeat(indent)),
            ),
        })
    }

    /// Start of the line following an entry, when the entry ends with a
    /// single-line scalar
    fn line_after_entry(&self, key: &Node, value: &Node) -> Option<usize> {
        match value {
            Node::Mapping {
                flow: false,
                entries,
                ..
            } => {
                let (last_key, last_value) = entries.last()?;
                self.line_after_entry(last_key, last_value)
            }
            _ => self.line_after_scalar(key, value),
        }
    }

    fn line_after_scalar(&self, key: &Node, value: &Node) -> Option<usize> {
        let (Node::Scalar { start: key_start, .. }, Node::Scalar { start, .. }) = (key, value) else {
            return None;
        };
        if start < key_start || self.text[*key_start..*start].contains('\n') {
            return None;
        }
        let end = self.scalar_end(*start).ok()?;
        if end <= *start {
            return None;
        }
        let line_end = self.line_end(end);
        let rest = self.text[end..line_end].trim();
        if !rest.is_empty() && !rest.starts_with('#') {
            return None;
        }
        Some((line_end + 1).min(self.text.len()))
    }

    /// Replace a scalar in the quoting style it was written in
    fn replace_scalar(&self, start: usize, value: &Value) -> Result<Edit, PipelineError> {
        let end = self.scalar_end(start)?;
        let text = match (self.text.as_bytes().get(start), value) {
            (Some(b'"'), Value::String(s)) => double_quoted(s)?,
            (Some(b'\''), Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
            (_, other) => render_inline(other)?,
        };
        Ok(Edit { start, end, text })
    }

    fn replace_flow(&self, start: usize, value: &Value) -> Result<Edit, PipelineError> {
        let end = self.flow_end(start)?;
        let text = serde_json::to_string(value)
            .map_err(|e| PipelineError::PatchApply(format!("cannot render flow value: {e}")))?;
        Ok(Edit { start, end, text })
    }

    /// Byte offset just past the scalar starting at `start`
    fn scalar_end(&self, start: usize) -> Result<usize, PipelineError> {
        let bytes = self.text.as_bytes();
        match bytes.get(start) {
            Some(b'"') => {
                let mut i = start + 1;
                while let Some(&b) = bytes.get(i) {
                    match b {
                        b'\\' => i += 2,
                        b'"' => return Ok(i + 1),
                        _ => i += 1,
                    }
                }
                Err(unsupported("an unterminated double-quoted scalar"))
            }
            Some(b'\'') => {
                let mut i = start + 1;
                while let Some(&b) = bytes.get(i) {
                    match (b, bytes.get(i + 1)) {
                        (b'\'', Some(b'\'')) => i += 2,
                        (b'\'', _) => return Ok(i + 1),
                        _ => i += 1,
                    }
                }
                Err(unsupported("an unterminated single-quoted scalar"))
            }
            Some(b'|') | Some(b'>') => Err(unsupported("a block scalar")),
            _ => {
                let line = &self.text[start..self.line_end(start)];
                let content = find_comment(line).map_or(line, |i| &line[..i]).trim_end();
                // A key ends at its `:` indicator
                let bytes = content.as_bytes();
                let end = (0..bytes.len())
                    .find(|&i| {
                        bytes[i] == b':' && bytes.get(i + 1).map_or(true, |b| matches!(b, b' ' | b'\t'))
                    })
                    .unwrap_or(bytes.len());
                Ok(start + content[..end].trim_end().len())
            }
        }
    }

    /// Byte offset just past the flow collection opening at `start`
    fn flow_end(&self, start: usize) -> Result<usize, PipelineError> {
        let bytes = self.text.as_bytes();
        let mut depth = 0usize;
        let mut i = start;
        while let Some(&b) = bytes.get(i) {
            match b {
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(i + 1);
                    }
                }
                b'"' | b'\'' => {
                    i = self.scalar_end(i)?;
                    continue;
                }
                b'#' if i > 0 && matches!(bytes[i - 1], b' ' | b'\t' | b'\n') => {
                    i = self.line_end(i);
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        Err(unsupported("an unterminated flow collection"))
    }

    fn line_end(&self, from: usize) -> usize {
        self.text[from..].find('\n').map_or(self.text.len(), |i| from + i)
    }

    fn column(&self, offset: usize) -> usize {
        let line_start = self.text[..offset].rfind('\n').map_or(0, |i| i + 1);
        self.text[line_start..offset].chars().count()
    }
}

/// Offset of a `#` that starts a comment
fn find_comment(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    bytes
        .iter()
        .enumerate()
        .find(|&(i, &b)| b == b'#' && (i == 0 || matches!(bytes[i - 1], b' ' | b'\t')))
        .map(|(i, _)| i)
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn render_entries<'v>(
    entries: impl IntoIterator<Item = (&'v Value, &'v Value)>,
    indent: usize,
) -> Result<String, PipelineError> {
    let pad = " ".repeat(indent);
    let mut out = String::new();
    for (key, value) in entries {
        let key = render_inline(key)?;
        match value {
            Value::Mapping(mapping) if !mapping.is_empty() => {
                out.push_str(&format!("{pad}{key}:\n"));
                out.push_str(&render_entries(mapping.iter(), indent + 2)?);
            }
            other => out.push_str(&format!("{pad}{key}: {}\n", render_inline(other)?)),
        }
    }
    Ok(out)
}

/// Single-line rendering: plain when that reads back as the same value
fn render_inline(value: &Value) -> Result<String, PipelineError> {
    match value {
        Value::String(s) if reads_back_plain(s) => Ok(s.clone()),
        Value::String(s) => double_quoted(s),
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => serde_json::to_string(other)
            .map_err(|e| PipelineError::PatchApply(format!("cannot render value: {e}"))),
    }
}

fn reads_back_plain(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | '+'))
        && !s.starts_with(['-', '.'])
        && matches!(serde_yaml::from_str::<Value>(s), Ok(Value::String(ref read)) if read == s)
}

fn double_quoted(s: &str) -> Result<String, PipelineError> {
    serde_json::to_string(s)
        .map_err(|e| PipelineError::PatchApply(format!("cannot render value: {e}")))
}

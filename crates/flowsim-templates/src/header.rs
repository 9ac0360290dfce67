//! Template Header Extraction
//!
//! Line-oriented scan of raw template text that pulls out what a listing
//! needs (metadata and the RNG block) without deserializing the whole
//! document. Raw templates routinely carry `${...}` placeholders in
//! numeric or sequence positions, so a strict parse is not possible until
//! parameters are substituted; this pass never looks at values it does not
//! need and treats everything as plain text.
//!
//! The scan also records which `const` node `values:` fields are a single
//! `${param}` placeholder, so the compiler can check the substituted
//! length against the grid.
//!
//! [`declared_parameters`] reads the `parameters:` section on its own; the
//! compiler needs the declarations before the rest of the text is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::definition::TemplateParameter;
use crate::error::TemplateError;
use crate::substitution::sole_placeholder;

/// Listing-level view of a template
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TemplateHeader {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng: Option<RngHeader>,
    /// Node id -> parameter whose placeholder is the node's entire `values`
    #[serde(skip)]
    pub parameter_bindings: BTreeMap<String, String>,
}

/// RNG block as written, possibly still a placeholder
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RngHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Metadata,
    Rng,
    Nodes,
    Other,
}

/// Multi-line `|` / `>` scalar being collected
struct BlockScalar {
    key: String,
    folded: bool,
    parent_indent: usize,
    lines: Vec<String>,
}

/// The `- ` item currently open under `nodes:`
#[derive(Default)]
struct NodeItem {
    key_indent: usize,
    id: Option<String>,
    values_param: Option<String>,
}

#[derive(Default)]
struct HeaderScanner {
    header: TemplateHeader,
    section: Option<Section>,
    child_indent: Option<usize>,
    in_tags: bool,
    block: Option<BlockScalar>,
    node: Option<NodeItem>,
}

/// Extract the header of a raw, possibly unsubstituted, template
pub fn parse_header(text: &str) -> Result<TemplateHeader, TemplateError> {
    let mut scanner = HeaderScanner::default();
    for raw in text.lines() {
        scanner.line(raw);
    }
    scanner.finish()
}

/// Parameter declarations of a raw template
///
/// Only the top-level `parameters:` section is parsed, so placeholders
/// elsewhere in the document do not matter. A template without the section
/// declares nothing.
pub fn declared_parameters(text: &str) -> Result<Vec<TemplateParameter>, TemplateError> {
    #[derive(Deserialize)]
    struct Section {
        #[serde(default)]
        parameters: Vec<TemplateParameter>,
    }

    let mut block = String::new();
    let mut inside = false;
    for raw in text.lines() {
        let indent = raw.len() - raw.trim_start().len();
        let content = strip_comment(raw).trim();
        if indent == 0 && !content.is_empty() && !content.starts_with('-') {
            if inside {
                break;
            }
            inside = split_key_value(content).is_some_and(|(key, _)| key == "parameters");
        }
        if inside {
            block.push_str(raw);
            block.push('\n');
        }
    }

    if block.is_empty() {
        return Ok(Vec::new());
    }
    let section: Section = serde_yaml::from_str(&block).map_err(|e| TemplateError::Parse {
        context: "parameters".to_string(),
        message: e.to_string(),
    })?;
    Ok(section.parameters)
}

impl HeaderScanner {
    fn line(&mut self, raw: &str) {
        let indent = raw.len() - raw.trim_start().len();

        if let Some(block) = self.block.as_mut() {
            if raw.trim().is_empty() {
                block.lines.push(String::new());
                return;
            }
            if indent > block.parent_indent {
                block.lines.push(raw.trim().to_string());
                return;
            }
            self.close_block();
        }

        let line = strip_comment(raw);
        let content = line.trim();
        if content.is_empty() || content.starts_with("---") {
            return;
        }

        // Sequences may sit at the same indent as their parent key
        let top_level_item = indent == 0 && content.starts_with('-');
        if indent == 0 && !top_level_item {
            self.enter_section(content);
            return;
        }

        match self.section {
            Some(Section::Metadata) => self.metadata_line(indent, content),
            Some(Section::Rng) => self.rng_line(indent, content),
            Some(Section::Nodes) => self.node_line(indent, content),
            _ => {}
        }
    }

    fn enter_section(&mut self, content: &str) {
        self.close_node();
        self.child_indent = None;
        self.in_tags = false;

        let Some((key, value)) = split_key_value(content) else {
            self.section = Some(Section::Other);
            return;
        };
        let section = match key {
            "metadata" => Section::Metadata,
            "rng" => Section::Rng,
            "nodes" => Section::Nodes,
            _ => Section::Other,
        };
        self.section = Some(section);

        // `rng: { kind: pcg32, seed: 42 }`
        if let Some(pairs) = flow_mapping(value) {
            for (k, v) in pairs {
                match section {
                    Section::Metadata => self.metadata_field(k, v, 0),
                    Section::Rng => self.rng_field(k, v),
                    _ => {}
                }
            }
        }
    }

    fn metadata_line(&mut self, indent: usize, content: &str) {
        let child = *self.child_indent.get_or_insert(indent);

        if self.in_tags && indent >= child {
            if let Some(tag) = content.strip_prefix('-') {
                self.header.tags.push(unquote(tag.trim()));
                return;
            }
        }
        self.in_tags = false;

        if indent != child {
            return;
        }
        if let Some((key, value)) = split_key_value(content) {
            self.metadata_field(key, value, indent);
        }
    }

    fn metadata_field(&mut self, key: &str, value: &str, indent: usize) {
        if let Some(folded) = block_indicator(value) {
            if matches!(key, "title" | "description" | "version" | "id") {
                self.block = Some(BlockScalar {
                    key: key.to_string(),
                    folded,
                    parent_indent: indent,
                    lines: Vec::new(),
                });
            }
            return;
        }

        let value = unquote(value);
        match key {
            "id" => self.header.id = value,
            "title" => self.header.title = value,
            "description" => self.header.description = Some(value),
            "version" => self.header.version = value,
            "tags" => {
                if value.is_empty() {
                    self.in_tags = true;
                } else if let Some(items) = flow_sequence(&value) {
                    self.header.tags.extend(items);
                } else {
                    self.header.tags.push(value);
                }
            }
            _ => {}
        }
    }

    fn close_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        let mut lines = block.lines;
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        let text = if block.folded {
            lines.join(" ")
        } else {
            lines.join("\n")
        };
        match block.key.as_str() {
            "id" => self.header.id = text,
            "title" => self.header.title = text,
            "description" => self.header.description = Some(text),
            "version" => self.header.version = text,
            _ => {}
        }
    }

    fn rng_line(&mut self, indent: usize, content: &str) {
        let child = *self.child_indent.get_or_insert(indent);
        if indent != child {
            return;
        }
        if let Some((key, value)) = split_key_value(content) {
            self.rng_field(key, value);
        }
    }

    fn rng_field(&mut self, key: &str, value: &str) {
        let rng = self.header.rng.get_or_insert_with(RngHeader::default);
        let value = unquote(value);
        match key {
            "kind" => rng.kind = Some(value),
            "seed" => rng.seed = Some(value),
            _ => {}
        }
    }

    fn node_line(&mut self, indent: usize, content: &str) {
        if let Some(rest) = content.strip_prefix('-') {
            let item_indent = self.child_indent.get_or_insert(indent);
            if indent == *item_indent {
                self.close_node();
                let gap = rest.len() - rest.trim_start().len();
                let key_indent = indent + 1 + gap;
                self.node = Some(NodeItem {
                    key_indent,
                    ..Default::default()
                });
                let rest = rest.trim();
                if !rest.is_empty() {
                    self.node_field(key_indent, rest);
                }
                return;
            }
        }
        self.node_field(indent, content);
    }

    fn node_field(&mut self, indent: usize, content: &str) {
        let Some(node) = self.node.as_mut() else {
            return;
        };
        if indent != node.key_indent {
            return;
        }
        let Some((key, value)) = split_key_value(content) else {
            return;
        };
        match key {
            "id" => node.id = Some(unquote(value)),
            "values" => node.values_param = sole_placeholder(value).map(str::to_string),
            _ => {}
        }
    }

    fn close_node(&mut self) {
        if let Some(NodeItem {
            id: Some(id),
            values_param: Some(param),
            ..
        }) = self.node.take()
        {
            self.header.parameter_bindings.insert(id, param);
        }
    }

    fn finish(mut self) -> Result<TemplateHeader, TemplateError> {
        self.close_block();
        self.close_node();
        if self.header.id.is_empty() {
            return Err(TemplateError::Parse {
                context: "header".to_string(),
                message: "metadata.id not found".to_string(),
            });
        }
        Ok(self.header)
    }
}

/// Drop a trailing `# comment` that is not inside quotes
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_is_space = true;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev_is_space => return &line[..i],
            None => {}
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

/// Split `key: value` at the first mapping colon outside quotes
fn split_key_value(content: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    let mut chars = content.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ':' => {
                let at_break = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
                if at_break {
                    let key = unquote_key(content[..i].trim());
                    return Some((key, content[i + 1..].trim()));
                }
            }
            None => {}
        }
    }
    None
}

fn unquote_key(key: &str) -> &str {
    key.strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(key)
}

/// `|`, `|-`, `>`, `>+` ... returns whether the block is folded
fn block_indicator(value: &str) -> Option<bool> {
    let mut chars = value.chars();
    let folded = match chars.next()? {
        '|' => false,
        '>' => true,
        _ => return None,
    };
    chars
        .all(|c| matches!(c, '-' | '+') || c.is_ascii_digit())
        .then_some(folded)
}

/// Plain text of a scalar, quotes removed
fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return serde_json::from_str::<String>(value)
            .unwrap_or_else(|_| value[1..value.len() - 1].to_string());
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].replace("''", "'");
    }
    value.to_string()
}

/// `[a, "b c"]` as plain strings
fn flow_sequence(value: &str) -> Option<Vec<String>> {
    let inner = value.trim().strip_prefix('[')?.strip_suffix(']')?;
    Some(
        split_flow(inner)
            .into_iter()
            .map(unquote)
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

/// `{ a: 1, b: x }` as key/value pairs
fn flow_mapping(value: &str) -> Option<Vec<(&str, &str)>> {
    let inner = value.trim().strip_prefix('{')?.strip_suffix('}')?;
    Some(
        split_flow(inner)
            .into_iter()
            .filter_map(split_key_value)
            .collect(),
    )
}

/// Split on commas outside quotes, brackets and `${...}`
fn split_flow(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(inner[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

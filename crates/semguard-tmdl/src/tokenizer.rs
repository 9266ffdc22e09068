//! Indentation-aware block tokenizer for TMDL text
//!
//! Turns the text of one file into a lazy stream of [`Block`]s in
//! document order (parents before children). Depth comes from leading
//! indentation; multi-line expressions are captured verbatim.
//!
//! The tokenizer never fails. Input it cannot make sense of is reported
//! as a [`Keyword::Malformed`] block and scanning resumes at the next
//! top-level keyword.

/// Block keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Model,
    Table,
    Column,
    Measure,
    Partition,
    Hierarchy,
    Level,
    Relationship,
    Role,
    TablePermission,
    CalculationGroup,
    CalculationItem,
    Annotation,
    Culture,
    Expression,
    DataSource,
    Perspective,
    Database,
    Ref,

    /// Property lines resuming a parent block after one of its children
    Continuation,

    /// Input that could not be tokenized
    Malformed,
}

impl Keyword {
    /// Map a header token to its keyword
    pub fn from_token(token: &str) -> Option<Self> {
        let keyword = match token {
            "model" => Self::Model,
            "table" => Self::Table,
            "column" => Self::Column,
            "measure" => Self::Measure,
            "partition" => Self::Partition,
            "hierarchy" => Self::Hierarchy,
            "level" => Self::Level,
            "relationship" => Self::Relationship,
            "role" => Self::Role,
            "tablePermission" => Self::TablePermission,
            "calculationGroup" => Self::CalculationGroup,
            "calculationItem" => Self::CalculationItem,
            "annotation" => Self::Annotation,
            "culture" | "cultureInfo" => Self::Culture,
            "expression" => Self::Expression,
            "dataSource" => Self::DataSource,
            "perspective" => Self::Perspective,
            "database" => Self::Database,
            "ref" => Self::Ref,
            _ => return None,
        };
        Some(keyword)
    }

    /// Keywords allowed at depth 0
    pub fn is_top_level(&self) -> bool {
        matches!(
            self,
            Self::Model
                | Self::Table
                | Self::Relationship
                | Self::Role
                | Self::Culture
                | Self::Expression
                | Self::DataSource
                | Self::Perspective
                | Self::Database
                | Self::Ref
                | Self::Annotation
        )
    }

    /// Keywords whose `=` starts a DAX/M expression
    fn captures_expression(&self) -> bool {
        matches!(
            self,
            Self::Measure
                | Self::Column
                | Self::CalculationItem
                | Self::TablePermission
                | Self::Expression
        )
    }

    /// Keywords that take no identifier
    fn is_anonymous(&self) -> bool {
        matches!(self, Self::CalculationGroup)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Table => "table",
            Self::Column => "column",
            Self::Measure => "measure",
            Self::Partition => "partition",
            Self::Hierarchy => "hierarchy",
            Self::Level => "level",
            Self::Relationship => "relationship",
            Self::Role => "role",
            Self::TablePermission => "tablePermission",
            Self::CalculationGroup => "calculationGroup",
            Self::CalculationItem => "calculationItem",
            Self::Annotation => "annotation",
            Self::Culture => "culture",
            Self::Expression => "expression",
            Self::DataSource => "dataSource",
            Self::Perspective => "perspective",
            Self::Database => "database",
            Self::Ref => "ref",
            Self::Continuation => "continuation",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// First tokens that close a multi-line expression when they appear one
/// level below the line holding the start marker.
const RESERVED: &[&str] = &[
    "description",
    "displayFolder",
    "formatString",
    "lineageTag",
    "annotation",
    "column",
    "measure",
    "partition",
    "table",
    "isHidden",
    "dataType",
    "dataCategory",
    "sourceColumn",
    "sourceLineageTag",
    "summarizeBy",
    "sortByColumn",
    "isDataTypeInferred",
    "isNameInferred",
    "isAvailableInMdx",
    "isKey",
    "isNullable",
    "mode",
    "source",
    "queryGroup",
    "hierarchy",
    "calculationItem",
    "changedProperty",
    "extendedProperty",
    "formatStringDefinition",
    "detailRowsDefinition",
    "kpi",
    "state",
    "ordinal",
    "encodingHint",
    "isDefaultLabel",
    "isDefaultImage",
    "variation",
    "alternateOf",
    "relatedColumnDetails",
    "keepUniqueRows",
    "isPrivate",
    "displayOrdinal",
];

const FENCE: &str = "```";

/// Spaces that make up one indentation level
const SPACES_PER_LEVEL: usize = 4;

/// A problem noticed while tokenizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexIssueKind {
    /// Leading indentation mixes tabs and spaces
    MixedIndentation,

    /// The block could not be tokenized
    Malformed(String),
}

/// A tokenizer issue tied to a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexIssue {
    /// Line number (1-indexed)
    pub line: usize,
    pub kind: LexIssueKind,
}

/// A property line of a block body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyLine {
    /// Property name (`dataType`, `isHidden`, ...)
    pub key: String,

    /// Raw value, `None` for bare flags
    pub value: Option<String>,

    /// Line number (1-indexed)
    pub line: usize,

    /// Value spans several lines
    pub multiline: bool,
}

/// One block of TMDL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub keyword: Keyword,

    /// Object name with quotes stripped
    pub identifier: Option<String>,

    /// Indentation depth of the header line
    pub depth: usize,

    /// Header line number (1-indexed)
    pub start_line: usize,

    /// Text after `=` on the header line
    pub header_value: Option<String>,

    /// Full expression (inline part plus continuation lines), verbatim
    pub expression: Option<String>,

    /// Property lines
    pub body_lines: Vec<BodyLine>,

    /// `///` lines directly above the header
    pub doc_comments: Vec<String>,

    pub issues: Vec<LexIssue>,
}

impl Block {
    fn new(keyword: Keyword, depth: usize, start_line: usize) -> Self {
        Self {
            keyword,
            identifier: None,
            depth,
            start_line,
            header_value: None,
            expression: None,
            body_lines: Vec::new(),
            doc_comments: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn malformed(depth: usize, start_line: usize, identifier: Option<String>, reason: impl Into<String>) -> Self {
        let mut block = Self::new(Keyword::Malformed, depth, start_line);
        block.identifier = identifier;
        block.issues.push(LexIssue {
            line: start_line,
            kind: LexIssueKind::Malformed(reason.into()),
        });
        block
    }

    /// Last value of a property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.body_lines
            .iter()
            .rev()
            .find(|p| p.key == key)
            .and_then(|p| p.value.as_deref())
    }

    /// Whether a property (or bare flag) is present
    pub fn has_property(&self, key: &str) -> bool {
        self.body_lines.iter().any(|p| p.key == key)
    }

    /// Doc comments joined into one description
    pub fn doc_text(&self) -> Option<String> {
        if self.doc_comments.is_empty() {
            None
        } else {
            Some(self.doc_comments.join("\n"))
        }
    }

    /// Reason this block is malformed, if it is
    pub fn malformed_reason(&self) -> Option<&str> {
        self.issues.iter().find_map(|issue| match &issue.kind {
            LexIssueKind::Malformed(reason) => Some(reason.as_str()),
            LexIssueKind::MixedIndentation => None,
        })
    }
}

/// A pre-split source line
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    depth: usize,
    mixed: bool,

    /// Line without its trailing `\r`
    raw: &'a str,

    /// Line without indentation or trailing whitespace
    content: &'a str,
}

impl<'a> Line<'a> {
    fn new(index: usize, raw: &'a str) -> Self {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);

        let mut tabs = 0;
        let mut spaces = 0;
        for c in raw.chars() {
            match c {
                '\t' => tabs += 1,
                ' ' => spaces += 1,
                _ => break,
            }
        }

        Self {
            number: index + 1,
            depth: tabs + spaces / SPACES_PER_LEVEL,
            mixed: tabs > 0 && spaces > 0,
            raw,
            content: raw.trim(),
        }
    }

    fn is_blank(&self) -> bool {
        self.content.is_empty()
    }

    fn is_doc_comment(&self) -> bool {
        self.content.starts_with("///")
    }

    fn is_comment(&self) -> bool {
        self.content.starts_with("//")
    }

    fn first_token(&self) -> &'a str {
        first_token(self.content)
    }

    /// Parse the line as a block header
    fn header_keyword(&self) -> Option<Keyword> {
        let token = self.first_token();
        let keyword = Keyword::from_token(token)?;
        let rest = &self.content[token.len()..];

        // `culture: en-US` is a property, not a block
        if rest.starts_with(':') {
            return None;
        }

        let rest = rest.trim_start();
        if keyword.is_anonymous() {
            return rest.is_empty().then_some(keyword);
        }

        // `expression = ...` is a property holding an expression
        if rest.is_empty() || rest.starts_with('=') {
            return None;
        }

        Some(keyword)
    }

    /// Whether this line closes an expression whose start marker sits at
    /// `marker_depth`
    fn ends_expression(&self, marker_depth: usize) -> bool {
        if self.depth <= marker_depth {
            return true;
        }
        self.depth == marker_depth + 1
            && (RESERVED.contains(&self.first_token())
                || self.header_keyword().is_some()
                || looks_like_property(self.content))
    }

    fn is_top_level_header(&self) -> bool {
        self.depth == 0
            && self
                .header_keyword()
                .is_some_and(|keyword| keyword.is_top_level())
    }
}

/// Leading token of a line: text up to whitespace, `:` or `=`
fn first_token(content: &str) -> &str {
    let end = content
        .find(|c: char| c.is_whitespace() || c == ':' || c == '=')
        .unwrap_or(content.len());
    &content[..end]
}

/// `key: value` or a bare `isSomething` flag. DAX never starts a line with
/// an identifier directly followed by `:`.
fn looks_like_property(content: &str) -> bool {
    let token = first_token(content);
    let is_identifier = token.starts_with(|c: char| c.is_ascii_lowercase())
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !is_identifier {
        return false;
    }

    let rest = &content[token.len()..];
    if rest.starts_with(':') {
        return true;
    }

    rest.is_empty()
        && token
            .strip_prefix("is")
            .is_some_and(|tail| tail.starts_with(|c: char| c.is_ascii_uppercase()))
}

/// Strip matching single or double quotes
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Lazy block tokenizer over the text of one file.
///
/// Cloning the tokenizer (or creating a new one from the same text)
/// restarts the stream.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
    pending_docs: Vec<String>,
}

impl<'a> Tokenizer<'a> {
    /// Create a tokenizer for one file's text
    pub fn new(text: &'a str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let lines = text
            .split('\n')
            .enumerate()
            .map(|(index, raw)| Line::new(index, raw))
            .collect();

        Self {
            lines,
            pos: 0,
            pending_docs: Vec::new(),
        }
    }

    /// Index of the next top-level header at or after `from`
    fn recovery_point(&self, from: usize) -> usize {
        (from..self.lines.len())
            .find(|&i| self.lines[i].is_top_level_header())
            .unwrap_or(self.lines.len())
    }

    /// Emit a malformed block and resume at the next top-level keyword
    fn recover(&mut self, line: Line<'a>, identifier: Option<String>, reason: String) -> Block {
        self.pending_docs.clear();
        self.pos = self.recovery_point(line.number);
        Block::malformed(line.depth, line.number, identifier, reason)
    }

    fn parse_block(&mut self, keyword: Keyword, line: Line<'a>) -> Block {
        let mut block = Block::new(keyword, line.depth, line.number);
        block.doc_comments = std::mem::take(&mut self.pending_docs);
        if line.mixed {
            block.issues.push(mixed_issue(line.number));
        }

        let rest = line.content[line.first_token().len()..].trim_start();
        let after = if keyword.is_anonymous() {
            ""
        } else {
            match split_identifier(rest) {
                Ok((identifier, after)) => {
                    block.identifier = Some(identifier.to_string());
                    after
                }
                Err(reason) => return self.recover(line, None, reason),
            }
        };

        self.pos = line.number;

        if let Some(value) = after.strip_prefix('=') {
            let inline = value.trim();
            block.header_value = Some(inline.to_string());

            if keyword.captures_expression() {
                match self.capture_value(line.depth, inline) {
                    Ok(expression) if !expression.trim().is_empty() => {
                        block.expression = Some(expression);
                    }
                    Ok(_) => {
                        let reason = format!(
                            "{} '{}' has an expression start marker but no expression",
                            keyword,
                            block.identifier.as_deref().unwrap_or_default()
                        );
                        return self.recover(line, block.identifier, reason);
                    }
                    Err(reason) => return self.recover(line, block.identifier, reason),
                }
            }
        }

        if let Err(reason) = self.read_body(&mut block) {
            return self.recover(line, block.identifier, reason);
        }

        block
    }

    /// Consume property lines belonging to `block`
    fn read_body(&mut self, block: &mut Block) -> Result<(), String> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];

            if line.is_blank() || (line.is_comment() && !line.is_doc_comment()) {
                self.pos += 1;
                continue;
            }

            if line.is_doc_comment()
                || line.depth <= block.depth
                || line.header_keyword().is_some()
            {
                break;
            }

            if line.mixed {
                block.issues.push(mixed_issue(line.number));
            }

            self.pos += 1;
            block.body_lines.push(self.parse_property(line)?);
        }

        Ok(())
    }

    fn parse_property(&mut self, line: Line<'a>) -> Result<BodyLine, String> {
        let key = line.first_token();
        let rest = line.content[key.len()..].trim_start();

        let mut property = BodyLine {
            key: key.to_string(),
            value: None,
            line: line.number,
            multiline: false,
        };

        if let Some(value) = rest.strip_prefix(':') {
            let value = value.trim();
            if !value.is_empty() {
                property.value = Some(value.to_string());
            }
        } else if let Some(value) = rest.strip_prefix('=') {
            let inline = value.trim();
            if inline.is_empty() || inline.starts_with(FENCE) {
                property.value = Some(self.capture_value(line.depth, inline)?);
                property.multiline = true;
            } else {
                property.value = Some(inline.to_string());
            }
        } else if !rest.is_empty() {
            property.value = Some(rest.to_string());
        }

        Ok(property)
    }

    /// Capture the value following a start marker on a line at `marker_depth`.
    ///
    /// `inline` is the text after `=` on the marker line.
    fn capture_value(&mut self, marker_depth: usize, inline: &str) -> Result<String, String> {
        if let Some(opening) = inline.strip_prefix(FENCE) {
            return self.capture_fenced(opening);
        }

        let mut parts: Vec<&str> = Vec::new();
        if !inline.is_empty() {
            parts.push(inline);
        }

        // Comments at property level belong to the block, not the expression
        let mut kept: Vec<usize> = Vec::new();
        let mut end = self.pos;
        for i in self.pos..self.lines.len() {
            let line = self.lines[i];
            if line.is_blank() {
                kept.push(i);
                continue;
            }
            if line.ends_expression(marker_depth) {
                break;
            }
            if line.depth == marker_depth + 1 && line.is_comment() {
                continue;
            }
            kept.push(i);
            end = i + 1;
        }

        parts.extend(
            kept.iter()
                .filter(|&&i| i < end)
                .map(|&i| self.lines[i].raw),
        );
        self.pos = end;
        Ok(parts.join("\n"))
    }

    /// Capture lines up to a closing fence
    fn capture_fenced(&mut self, opening: &str) -> Result<String, String> {
        let start_line = self.pos;
        let mut parts: Vec<&str> = Vec::new();
        if !opening.trim().is_empty() {
            parts.push(opening.trim());
        }

        for i in self.pos..self.lines.len() {
            let line = self.lines[i];
            if line.content.starts_with(FENCE) {
                parts.extend(self.lines[self.pos..i].iter().map(|l| l.raw));
                self.pos = i + 1;
                return Ok(parts.join("\n"));
            }
        }

        Err(format!(
            "expression fence opened on line {} is never closed",
            start_line
        ))
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];

            if line.is_blank() {
                self.pos += 1;
                continue;
            }

            if line.is_doc_comment() {
                let text = line.content.trim_start_matches('/').trim();
                self.pending_docs.push(text.to_string());
                self.pos += 1;
                continue;
            }

            if line.is_comment() {
                self.pos += 1;
                continue;
            }

            if let Some(keyword) = line.header_keyword() {
                if line.depth == 0 && !keyword.is_top_level() {
                    let reason = format!("'{}' is not allowed at the top level", keyword);
                    return Some(self.recover(line, None, reason));
                }
                return Some(self.parse_block(keyword, line));
            }

            if line.depth == 0 {
                let reason = format!("unrecognized line '{}'", line.content);
                return Some(self.recover(line, None, reason));
            }

            // Property lines whose parent already emitted a child block
            self.pending_docs.clear();
            let mut block = Block::new(Keyword::Continuation, line.depth - 1, line.number);
            if let Err(reason) = self.read_body(&mut block) {
                return Some(self.recover(line, None, reason));
            }
            return Some(block);
        }

        None
    }
}

/// Split a header remainder into identifier and the text after it
fn split_identifier(rest: &str) -> Result<(&str, &str), String> {
    let mut chars = rest.chars();
    match chars.next() {
        Some(quote @ ('\'' | '"')) => {
            let inner = &rest[1..];
            match inner.find(quote) {
                Some(close) => Ok((&inner[..close], inner[close + 1..].trim_start())),
                None => Err(format!("unterminated quoted identifier {}", rest)),
            }
        }
        _ => {
            let end = rest.find('=').unwrap_or(rest.len());
            Ok((rest[..end].trim(), &rest[end..]))
        }
    }
}

fn mixed_issue(line: usize) -> LexIssue {
    LexIssue {
        line,
        kind: LexIssueKind::MixedIndentation,
    }
}

/// Tokenize a whole file
pub fn tokenize(text: &str) -> Vec<Block> {
    Tokenizer::new(text).collect()
}

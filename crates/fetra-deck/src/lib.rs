//! Card tokeniser for fixed-column solver decks.
//!
//! Nastran-family decks are made of *cards*: logical records identified by a
//! keyword, spanning one or more physical lines through continuations. Fields
//! come in three regimes: small (8 columns), large (16 columns, keyword
//! suffixed with `*`) and free (comma separated). This crate turns raw deck
//! text into a stream of typed fields and carries the translation-mode error
//! policy used by every dialect parser built on top of it.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Width of one small-format field.
pub const SMALL_FIELD_WIDTH: usize = 8;
/// Width of one large-format field.
pub const LARGE_FIELD_WIDTH: usize = 16;

/// How parsing diagnostics are handled, set once from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Any diagnostic is fatal.
    Strict,
    /// Diagnostics degrade the model to mesh-only and skip the command.
    MeshAtLeast,
    /// Diagnostics become warnings and the command is skipped.
    #[default]
    BestEffort,
}

/// A fatal deck diagnostic, with enough context to point at the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub keyword: String,
    pub message: String,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.keyword.is_empty() {
            write!(f, "{}:{}: {}", self.file, self.line, self.message)
        } else {
            write!(
                f,
                "{}:{} [{}]: {}",
                self.file, self.line, self.keyword, self.message
            )
        }
    }
}

impl std::error::Error for ParseError {}

/// Outcome of a failed field read.
///
/// `Skip` is the recovery sentinel consumed by the per-keyword dispatcher:
/// the offending command is dropped and parsing resumes at the next keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Skip the current command. `mesh_only` is set under [`ErrorPolicy::MeshAtLeast`].
    Skip { mesh_only: bool },
    /// Abort the whole translation.
    Fatal(ParseError),
}

impl Display for ParseFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::Skip { mesh_only } => {
                write!(f, "command skipped (mesh_only: {mesh_only})")
            }
            ParseFailure::Fatal(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ParseFailure {}

pub type FieldResult<T> = Result<T, ParseFailure>;

/// Lookahead classification of the next symbol in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    /// The next symbol starts a new logical card.
    Keyword,
    /// More fields remain on the current logical card.
    Field,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Executive,
    Bulk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardFormat {
    Small,
    Large,
    Free,
}

/// Streaming tokeniser over one deck file.
///
/// The executive section is read free-form (whitespace and `=` separated);
/// after [`Tokenizer::bulk_section`] is called, cards are assembled with
/// fixed-column rules and continuations before fields are handed out.
#[derive(Debug)]
pub struct Tokenizer {
    lines: Vec<String>,
    cursor: usize,
    section: Section,
    policy: ErrorPolicy,
    file_name: String,
    current_keyword: String,
    card_line: usize,
    fields: Vec<String>,
    field_pos: usize,
}

impl Tokenizer {
    pub fn from_file(path: impl AsRef<Path>, policy: ErrorPolicy) -> io::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        Ok(Self::from_str(&raw, &path.display().to_string(), policy))
    }

    pub fn from_str(raw: &str, file_name: &str, policy: ErrorPolicy) -> Self {
        Tokenizer {
            lines: raw.lines().map(str::to_string).collect(),
            cursor: 0,
            section: Section::Executive,
            policy,
            file_name: file_name.to_string(),
            current_keyword: String::new(),
            card_line: 0,
            fields: Vec::new(),
            field_pos: 0,
        }
    }

    /// Switch from the executive grammar to bulk-section card assembly.
    pub fn bulk_section(&mut self) {
        self.section = Section::Bulk;
        self.fields.clear();
        self.field_pos = 0;
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Line the current logical card started on (1-based).
    pub fn line_number(&self) -> usize {
        self.card_line
    }

    pub fn current_keyword(&self) -> &str {
        &self.current_keyword
    }

    pub fn set_current_keyword(&mut self, keyword: &str) {
        self.current_keyword = keyword.to_string();
    }

    /// Classify the next symbol without consuming it.
    pub fn next_symbol_type(&mut self) -> SymbolType {
        if self.field_pos < self.fields.len() {
            return SymbolType::Field;
        }
        if self.peek_card_line().is_some() {
            SymbolType::Keyword
        } else {
            SymbolType::Eof
        }
    }

    /// Load the next logical card and return its keyword.
    ///
    /// Any unread fields of the previous card are dropped.
    pub fn next_keyword(&mut self) -> FieldResult<String> {
        self.fields.clear();
        self.field_pos = 0;
        match self.section {
            Section::Executive => self.read_executive_card(),
            Section::Bulk => self.read_bulk_card(),
        }?;
        Ok(self.current_keyword.clone())
    }

    /// Required string field; an empty field is an error under the policy.
    pub fn next_string(&mut self) -> FieldResult<String> {
        match self.take_field() {
            Some(f) if !f.is_empty() => Ok(f),
            _ => Err(self.handle_parsing_error("expected a non-empty field")),
        }
    }

    /// Optional string field with a default for empty/missing.
    pub fn next_string_or(&mut self, default: &str) -> String {
        match self.take_field() {
            Some(f) if !f.is_empty() => f,
            _ => default.to_string(),
        }
    }

    /// Required integer field.
    pub fn next_int(&mut self) -> FieldResult<i32> {
        match self.take_field() {
            Some(f) if !f.is_empty() => f
                .parse::<i32>()
                .map_err(|_| self.handle_parsing_error(format!("expected an integer, got '{f}'"))),
            _ => Err(self.handle_parsing_error("expected an integer, got an empty field")),
        }
    }

    /// Optional integer field with a default for empty/missing.
    pub fn next_int_or(&mut self, default: i32) -> FieldResult<i32> {
        match self.take_field() {
            Some(f) if !f.is_empty() => f
                .parse::<i32>()
                .map_err(|_| self.handle_parsing_error(format!("expected an integer, got '{f}'"))),
            _ => Ok(default),
        }
    }

    /// Required real field. Accepts the glued-exponent deck form `1.23+4`.
    pub fn next_double(&mut self) -> FieldResult<f64> {
        match self.take_field() {
            Some(f) if !f.is_empty() => parse_deck_double(&f)
                .ok_or_else(|| self.handle_parsing_error(format!("expected a real, got '{f}'"))),
            _ => Err(self.handle_parsing_error("expected a real, got an empty field")),
        }
    }

    /// Optional real field with a default for empty/missing.
    pub fn next_double_or(&mut self, default: f64) -> FieldResult<f64> {
        match self.take_field() {
            Some(f) if !f.is_empty() => parse_deck_double(&f)
                .ok_or_else(|| self.handle_parsing_error(format!("expected a real, got '{f}'"))),
            _ => Ok(default),
        }
    }

    pub fn is_next_int(&self) -> bool {
        match self.peek_field() {
            Some(f) => !f.is_empty() && f.parse::<i32>().is_ok(),
            None => false,
        }
    }

    pub fn is_next_double(&self) -> bool {
        match self.peek_field() {
            Some(f) => !f.is_empty() && parse_deck_double(f).is_some(),
            None => false,
        }
    }

    /// True when the next field is empty or the card is exhausted.
    pub fn is_next_empty(&self) -> bool {
        match self.peek_field() {
            Some(f) => f.is_empty(),
            None => true,
        }
    }

    /// True when every remaining field of the current card is empty.
    pub fn is_empty_until_next_keyword(&self) -> bool {
        self.fields[self.field_pos..].iter().all(String::is_empty)
    }

    /// Number of fields left on the current card.
    pub fn remaining_fields(&self) -> usize {
        self.fields.len() - self.field_pos
    }

    /// Advance past empty fields within the current card.
    pub fn skip_to_not_empty(&mut self) {
        while matches!(self.peek_field(), Some(f) if f.is_empty()) {
            self.field_pos += 1;
        }
    }

    /// Drop the remaining fields of the current card.
    pub fn skip_card(&mut self) {
        self.field_pos = self.fields.len();
    }

    /// Build the policy-appropriate failure for a malformed command.
    ///
    /// Strict mode yields a fatal error; the other modes log and yield the
    /// skip sentinel the dispatcher recovers from.
    pub fn handle_parsing_error(&self, message: impl Into<String>) -> ParseFailure {
        let message = message.into();
        match self.policy {
            ErrorPolicy::Strict => ParseFailure::Fatal(ParseError {
                file: self.file_name.clone(),
                line: self.card_line,
                keyword: self.current_keyword.clone(),
                message,
            }),
            ErrorPolicy::MeshAtLeast => {
                log::warn!(
                    "{}:{} [{}]: {} (keeping mesh only)",
                    self.file_name,
                    self.card_line,
                    self.current_keyword,
                    message
                );
                ParseFailure::Skip { mesh_only: true }
            }
            ErrorPolicy::BestEffort => {
                log::warn!(
                    "{}:{} [{}]: {} (command skipped)",
                    self.file_name,
                    self.card_line,
                    self.current_keyword,
                    message
                );
                ParseFailure::Skip { mesh_only: false }
            }
        }
    }

    /// Log a non-fatal diagnostic with card context.
    pub fn handle_parsing_warning(&self, message: impl Display) {
        log::warn!(
            "{}:{} [{}]: {}",
            self.file_name,
            self.card_line,
            self.current_keyword,
            message
        );
    }

    fn take_field(&mut self) -> Option<String> {
        if self.field_pos < self.fields.len() {
            let f = self.fields[self.field_pos].clone();
            self.field_pos += 1;
            Some(f)
        } else {
            None
        }
    }

    fn peek_field(&self) -> Option<&str> {
        self.fields.get(self.field_pos).map(String::as_str)
    }

    /// Index of the next line that starts a card, skipping comments and blanks.
    fn peek_card_line(&self) -> Option<usize> {
        let mut i = self.cursor;
        while i < self.lines.len() {
            let trimmed = self.lines[i].trim();
            if trimmed.is_empty() || trimmed.starts_with('$') {
                i += 1;
                continue;
            }
            return Some(i);
        }
        None
    }

    fn read_executive_card(&mut self) -> FieldResult<()> {
        let i = match self.peek_card_line() {
            Some(i) => i,
            None => {
                return Err(self.handle_parsing_error("unexpected end of executive section"));
            }
        };
        let line = self.lines[i].clone();
        self.cursor = i + 1;
        self.card_line = i + 1;

        let mut tokens = line
            .split(|c: char| c.is_whitespace() || c == '=')
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self.current_keyword = tokens.next().unwrap_or_default();
        self.fields = tokens.collect();
        self.field_pos = 0;
        Ok(())
    }

    fn read_bulk_card(&mut self) -> FieldResult<()> {
        let i = match self.peek_card_line() {
            Some(i) => i,
            None => return Err(self.handle_parsing_error("unexpected end of bulk section")),
        };
        let line = self.lines[i].clone();
        self.cursor = i + 1;
        self.card_line = i + 1;

        let (keyword, format) = card_keyword(&line);
        self.current_keyword = keyword;
        self.fields.clear();
        self.field_pos = 0;

        // INCLUDE takes the rest of the line as a single path field.
        if self.current_keyword == "INCLUDE" {
            let rest = match format {
                CardFormat::Free => line.splitn(2, ',').nth(1).unwrap_or(""),
                _ => &line[line.len().min(SMALL_FIELD_WIDTH)..],
            };
            self.fields.push(rest.trim().to_string());
            return Ok(());
        }

        let mut tag = self.push_data_fields(&line, format);
        // A non-empty column-10 tag continues the card on the next line whose
        // column-1 field carries the same tag.
        loop {
            let pending = match tag.take() {
                Some(t) => t,
                None => break,
            };
            let j = match self.peek_card_line() {
                Some(j) => j,
                None => break,
            };
            let next = self.lines[j].clone();
            let (lead, next_format) = continuation_lead(&next);
            if pending.is_empty() {
                // Free-field trailing comma: continue unconditionally.
                self.cursor = j + 1;
                for f in next.split(',') {
                    self.fields.push(f.trim().to_string());
                }
                if next.trim_end().ends_with(',') {
                    self.fields.pop();
                    tag = Some(String::new());
                }
                continue;
            }
            match lead {
                Some(l) if l == pending => {
                    self.cursor = j + 1;
                    tag = self.push_data_fields(&next, next_format);
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Append the data fields of one physical line; return its continuation tag.
    fn push_data_fields(&mut self, line: &str, format: CardFormat) -> Option<String> {
        match format {
            CardFormat::Free => {
                for f in line.split(',').skip(1) {
                    self.fields.push(f.trim().to_string());
                }
                if line.trim_end().ends_with(',') {
                    // Trailing separator: the last pushed field is the
                    // continuation marker, not data.
                    self.fields.pop();
                    Some(String::new())
                } else {
                    None
                }
            }
            CardFormat::Small => {
                for k in 0..8 {
                    self.fields.push(column_field(line, 8 + 8 * k, 8));
                }
                let tag = strip_continuation(&column_field(line, 72, 8));
                if tag.is_empty() { None } else { Some(tag) }
            }
            CardFormat::Large => {
                for k in 0..4 {
                    self.fields.push(column_field(line, 8 + 16 * k, 16));
                }
                let tag = strip_continuation(&column_field(line, 72, 8));
                if tag.is_empty() { None } else { Some(tag) }
            }
        }
    }
}

fn card_keyword(line: &str) -> (String, CardFormat) {
    if line.contains(',') {
        let keyword = line.split(',').next().unwrap_or("").trim();
        return (keyword.trim_end_matches('*').to_string(), CardFormat::Free);
    }
    let field = column_field(line, 0, SMALL_FIELD_WIDTH);
    if field.ends_with('*') {
        (field.trim_end_matches('*').to_string(), CardFormat::Large)
    } else {
        (field, CardFormat::Small)
    }
}

/// Column-1 tag of a possible continuation line, stripped of its `+`/`*` marker.
fn continuation_lead(line: &str) -> (Option<String>, CardFormat) {
    if line.contains(',') {
        let first = line.split(',').next().unwrap_or("").trim();
        if first.starts_with('+') || first.starts_with('*') {
            return (Some(strip_continuation(first)), CardFormat::Free);
        }
        return (None, CardFormat::Free);
    }
    let field = column_field(line, 0, SMALL_FIELD_WIDTH);
    let format = if field.starts_with('*') {
        CardFormat::Large
    } else {
        CardFormat::Small
    };
    if field.starts_with('+') || field.starts_with('*') {
        (Some(strip_continuation(&field)), format)
    } else {
        (None, format)
    }
}

fn strip_continuation(tag: &str) -> String {
    tag.trim_start_matches(['+', '*']).trim().to_string()
}

fn column_field(line: &str, start: usize, width: usize) -> String {
    if start >= line.len() {
        return String::new();
    }
    let end = (start + width).min(line.len());
    line[start..end].trim().to_string()
}

/// Parse a deck real, accepting the glued-exponent forms `1.23+4` / `-1.23-4`
/// and the Fortran `D` exponent letter.
pub fn parse_deck_double(field: &str) -> Option<f64> {
    let s = field.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len() + 1);
    for (i, ch) in s.char_indices() {
        match ch {
            'd' | 'D' => out.push('e'),
            '+' | '-' if i > 0 => {
                let prev = bytes[i - 1] as char;
                if prev.is_ascii_digit() || prev == '.' {
                    out.push('e');
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.parse::<f64>().ok()
}

/// Resolve an INCLUDE target against the including file's directory.
///
/// The path may be bare or single/double quoted.
pub fn resolve_include_path(base_dir: &Path, include: &str) -> PathBuf {
    let cleaned = include.trim().trim_matches('"').trim_matches('\'');
    let raw_path = Path::new(cleaned);
    let joined = if raw_path.is_absolute() {
        raw_path.to_path_buf()
    } else {
        base_dir.join(raw_path)
    };
    fs::canonicalize(&joined).unwrap_or(joined)
}

/// Active-include bookkeeping shared by dialect parsers to reject cycles.
#[derive(Debug, Default)]
pub struct IncludeStack {
    stack: Vec<PathBuf>,
    active: HashSet<PathBuf>,
}

impl IncludeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a file; fails with the full include chain on a cycle.
    pub fn push(&mut self, path: &Path) -> Result<(), String> {
        let normalized = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.active.contains(&normalized) {
            let mut chain: Vec<String> = self
                .stack
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(normalized.display().to_string());
            return Err(format!("include cycle detected: {}", chain.join(" -> ")));
        }
        self.stack.push(normalized.clone());
        self.active.insert(normalized);
        Ok(())
    }

    pub fn pop(&mut self) {
        if let Some(path) = self.stack.pop() {
            self.active.remove(&path);
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(raw: &str) -> Tokenizer {
        let mut tok = Tokenizer::from_str(raw, "test.bdf", ErrorPolicy::Strict);
        tok.bulk_section();
        tok
    }

    #[test]
    fn small_fields_are_eight_columns() {
        let mut tok = bulk("GRID           4       0     1.0     2.0     3.0\n");
        assert_eq!(tok.next_keyword().expect("keyword"), "GRID");
        assert_eq!(tok.next_int().expect("id"), 4);
        assert_eq!(tok.next_int().expect("cp"), 0);
        assert_eq!(tok.next_double().expect("x"), 1.0);
        assert_eq!(tok.next_double().expect("y"), 2.0);
        assert_eq!(tok.next_double().expect("z"), 3.0);
        assert!(tok.is_next_empty());
    }

    #[test]
    fn large_fields_are_sixteen_columns() {
        let raw = "GRID*                  4               0             1.5\n";
        let mut tok = bulk(raw);
        assert_eq!(tok.next_keyword().expect("keyword"), "GRID");
        assert_eq!(tok.next_int().expect("id"), 4);
        assert_eq!(tok.next_int().expect("cp"), 0);
        assert_eq!(tok.next_double().expect("x"), 1.5);
    }

    #[test]
    fn free_fields_split_on_commas() {
        let mut tok = bulk("GRID,4,,1.0,2.0,3.0\n");
        assert_eq!(tok.next_keyword().expect("keyword"), "GRID");
        assert_eq!(tok.next_int().expect("id"), 4);
        assert!(tok.is_next_empty());
        assert_eq!(tok.next_int_or(0).expect("cp"), 0);
        assert_eq!(tok.next_double().expect("x"), 1.0);
    }

    #[test]
    fn glued_exponents_parse() {
        assert_eq!(parse_deck_double("1.23+4"), Some(1.23e4));
        assert_eq!(parse_deck_double("-1.23-4"), Some(-1.23e-4));
        assert_eq!(parse_deck_double("2.5D3"), Some(2.5e3));
        assert_eq!(parse_deck_double("1.23e+4"), Some(1.23e4));
        assert_eq!(parse_deck_double(""), None);
        assert_eq!(parse_deck_double("abc"), None);
    }

    #[test]
    fn empty_field_is_distinct_from_zero() {
        let mut tok = bulk("SPC            1       2        \n");
        tok.next_keyword().expect("keyword");
        assert_eq!(tok.next_int().expect("sid"), 1);
        assert_eq!(tok.next_int().expect("g"), 2);
        assert!(tok.is_next_empty());
        assert!(!tok.is_next_int());
        assert_eq!(tok.next_int_or(7).expect("default applies"), 7);
    }

    /// Lay out a small-format line: keyword, up to 8 data fields, col-10 tag.
    fn small_line(keyword: &str, fields: &[&str], tag: &str) -> String {
        let mut line = format!("{keyword:<8}");
        for f in fields {
            line.push_str(&format!("{f:>8}"));
        }
        while line.len() < 72 {
            line.push(' ');
        }
        line.push_str(tag);
        line.push('\n');
        line
    }

    #[test]
    fn matching_continuation_tags_make_one_card() {
        let mut raw = small_line(
            "RBE2",
            &["1", "100", "123456", "101", "102", "103", "104", "105"],
            "+RB1",
        );
        raw.push_str(&small_line("+RB1", &["106", "107"], ""));
        raw.push_str(&small_line("GRID", &["9"], ""));

        let mut tok = bulk(&raw);
        assert_eq!(tok.next_keyword().expect("keyword"), "RBE2");
        let mut values = Vec::new();
        while tok.is_next_int() {
            values.push(tok.next_int().expect("int field"));
        }
        assert_eq!(values, vec![1, 100, 123456, 101, 102, 103, 104, 105, 106, 107]);
        tok.skip_card();
        assert_eq!(tok.next_keyword().expect("next card"), "GRID");
    }

    #[test]
    fn mismatched_continuation_tags_make_two_cards() {
        let mut raw = small_line(
            "RBE2",
            &["1", "100", "123456", "101", "102", "103", "104", "105"],
            "+RB1",
        );
        raw.push_str(&small_line("+ZZZ", &["106", "107"], ""));

        let mut tok = bulk(&raw);
        assert_eq!(tok.next_keyword().expect("keyword"), "RBE2");
        let mut values = Vec::new();
        while tok.is_next_int() {
            values.push(tok.next_int().expect("int field"));
        }
        assert_eq!(values, vec![1, 100, 123456, 101, 102, 103, 104, 105]);
        tok.skip_card();
        // The orphan continuation shows up as its own card.
        assert_eq!(tok.next_symbol_type(), SymbolType::Keyword);
    }

    #[test]
    fn free_field_trailing_comma_continues() {
        let raw = "FORCE,2,5,,1.0,\n0.0,0.0,1.0\n";
        let mut tok = bulk(raw);
        tok.next_keyword().expect("keyword");
        assert_eq!(tok.next_int().expect("sid"), 2);
        assert_eq!(tok.next_int().expect("g"), 5);
        assert_eq!(tok.next_int_or(0).expect("cid"), 0);
        assert_eq!(tok.next_double().expect("f"), 1.0);
        assert_eq!(tok.next_double().expect("n1"), 0.0);
        assert_eq!(tok.next_double().expect("n2"), 0.0);
        assert_eq!(tok.next_double().expect("n3"), 1.0);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let raw = "$ a comment\n\nGRID           1\n";
        let mut tok = bulk(raw);
        assert_eq!(tok.next_keyword().expect("keyword"), "GRID");
        assert_eq!(tok.line_number(), 3);
    }

    #[test]
    fn executive_section_splits_on_equals() {
        let raw = "SOL 101\nCEND\nSPC = 3\nBEGIN BULK\n";
        let mut tok = Tokenizer::from_str(raw, "test.bdf", ErrorPolicy::Strict);
        assert_eq!(tok.next_keyword().expect("sol"), "SOL");
        assert_eq!(tok.next_string().expect("101"), "101");
        assert_eq!(tok.next_keyword().expect("cend"), "CEND");
        assert_eq!(tok.next_keyword().expect("spc"), "SPC");
        assert_eq!(tok.next_string().expect("3"), "3");
        assert_eq!(tok.next_keyword().expect("begin"), "BEGIN");
        assert_eq!(tok.next_string().expect("bulk"), "BULK");
    }

    #[test]
    fn include_takes_rest_of_line() {
        let mut tok = bulk("INCLUDE 'sub/mesh.bdf'\n");
        assert_eq!(tok.next_keyword().expect("keyword"), "INCLUDE");
        assert_eq!(tok.next_string().expect("path"), "'sub/mesh.bdf'");
    }

    #[test]
    fn strict_policy_is_fatal_best_effort_skips() {
        let mut tok = bulk("GRID         bad\n");
        tok.next_keyword().expect("keyword");
        match tok.next_int() {
            Err(ParseFailure::Fatal(err)) => {
                assert_eq!(err.line, 1);
                assert_eq!(err.keyword, "GRID");
            }
            other => panic!("expected fatal error, got {other:?}"),
        }

        let mut tok = Tokenizer::from_str("GRID         bad\n", "t.bdf", ErrorPolicy::BestEffort);
        tok.bulk_section();
        tok.next_keyword().expect("keyword");
        assert_eq!(tok.next_int(), Err(ParseFailure::Skip { mesh_only: false }));

        let mut tok = Tokenizer::from_str("GRID         bad\n", "t.bdf", ErrorPolicy::MeshAtLeast);
        tok.bulk_section();
        tok.next_keyword().expect("keyword");
        assert_eq!(tok.next_int(), Err(ParseFailure::Skip { mesh_only: true }));
    }

    #[test]
    fn include_stack_detects_cycles() {
        let mut stack = IncludeStack::new();
        stack.push(Path::new("/tmp/a.bdf")).expect("first push");
        stack.push(Path::new("/tmp/b.bdf")).expect("second push");
        let err = stack
            .push(Path::new("/tmp/a.bdf"))
            .expect_err("cycle should fail");
        assert!(err.contains("include cycle"), "unexpected message: {err}");
        stack.pop();
        stack.push(Path::new("/tmp/c.bdf")).expect("reuse after pop");
    }

    #[test]
    fn resolve_include_strips_quotes() {
        let base = Path::new("/decks");
        assert_eq!(
            resolve_include_path(base, "'mesh.bdf'"),
            PathBuf::from("/decks/mesh.bdf")
        );
        assert_eq!(
            resolve_include_path(base, "\"/abs/mesh.bdf\""),
            PathBuf::from("/abs/mesh.bdf")
        );
    }
}

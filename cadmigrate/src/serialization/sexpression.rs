//! Document tree for the S-expression file format.
//!
//! Every list starts with a name (its tag), followed by tokens, quoted strings, nested
//! lists and explicit line breaks:
//!
//! ```text
//! (librepcb_symbol 2a4f5c1e-0b7d-4f9a-8c3e-6d1b2a3c4d5e
//!  (name "Resistor")
//!  (pin 7c1a9e2b-3d4f-4a5b-8c6d-7e8f9a0b1c2d (name "1") (position -5.08 0.0))
//! )
//! ```
//!
//! Line breaks are part of the tree, so a file parsed and written again keeps its layout.

use std::fmt;

use thiserror::Error;

use super::convert::{FromSExpression, ToSExpression};

/// Location in the source text (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unexpected end of input at {0}")]
    UnexpectedEof(Position),
    #[error("Unterminated list \"{name}\" opened at {position}")]
    UnterminatedList { name: String, position: Position },
    #[error("Unterminated string starting at {0}")]
    UnterminatedString(Position),
    #[error("Invalid atom \"{atom}\" at {position}")]
    InvalidAtom { atom: String, position: Position },
    #[error("List without name at {0}")]
    MissingListName(Position),
    #[error("Unexpected character '{ch}' at {position}")]
    UnexpectedCharacter { ch: char, position: Position },
    #[error("Unexpected content after the root list at {0}")]
    TrailingContent(Position),
}

/// Structural problems of a syntactically valid document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Missing required child \"{path}\" in \"{parent}\"")]
    MissingChild { path: String, parent: String },
    #[error("Expected a list, found \"{0}\"")]
    NotAList(String),
    #[error("Expected a value, found list \"{0}\"")]
    NotAValue(String),
    #[error("Invalid {expected} \"{value}\": {reason}")]
    InvalidValue {
        expected: &'static str,
        value: String,
        reason: String,
    },
    #[error("Key \"{key}\" defined multiple times in \"{tag}\" entries")]
    DuplicateKey { tag: String, key: String },
    #[error("No default {0} defined")]
    MissingDefault(String),
    #[error("Invalid {kind}: {reason}")]
    InvalidVariant { kind: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpression {
    List {
        name: String,
        children: Vec<SExpression>,
    },
    /// Unquoted atom: numbers, UUIDs, keywords.
    Token(String),
    /// Quoted atom.
    String(String),
    LineBreak,
}

impl SExpression {
    pub fn list(name: impl Into<String>) -> Self {
        SExpression::List {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn token(value: impl Into<String>) -> Self {
        SExpression::Token(value.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        SExpression::String(value.into())
    }

    pub fn line_break() -> Self {
        SExpression::LineBreak
    }

    /// Builder-style append, used to assemble small lists in one expression.
    /// Atoms are returned unchanged.
    pub fn with_child(mut self, child: SExpression) -> Self {
        if let SExpression::List { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Builder-style `(name value)` append.
    pub fn with_value(self, name: &str, value: impl ToSExpression) -> Self {
        self.with_child(SExpression::list(name).with_child(value.to_sexpression()))
    }

    pub fn parse(text: &str) -> Result<SExpression, ParseError> {
        SExpressionParser::new(text).parse()
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SExpression::List { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, SExpression::List { .. })
    }

    pub fn is_line_break(&self) -> bool {
        matches!(self, SExpression::LineBreak)
    }

    /// Value of a token or string atom.
    pub fn value(&self) -> Result<&str, SchemaError> {
        match self {
            SExpression::Token(value) | SExpression::String(value) => Ok(value),
            SExpression::List { name, .. } => Err(SchemaError::NotAValue(name.clone())),
            SExpression::LineBreak => Err(SchemaError::NotAValue("\\n".to_string())),
        }
    }

    /// All children including line breaks. Atoms have none.
    pub fn children(&self) -> &[SExpression] {
        match self {
            SExpression::List { children, .. } => children,
            _ => &[],
        }
    }

    /// Children with the given tag, in source order.
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a SExpression> + Clone + 'a {
        self.children()
            .iter()
            .filter(move |child| child.name() == Some(name))
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut SExpression> + 'a {
        let children: &mut [SExpression] = match self {
            SExpression::List { children, .. } => children,
            _ => &mut [],
        };
        children
            .iter_mut()
            .filter(move |child| child.name() == Some(name))
    }

    /// Resolve a path like `footprint/pad/@0`, where `@N` is the N-th child that is not
    /// a line break and any other segment selects the first child list with that tag.
    pub fn get_child(&self, path: &str) -> Result<&SExpression, SchemaError> {
        self.try_get_child(path)
            .ok_or_else(|| self.missing_child(path))
    }

    pub fn try_get_child(&self, path: &str) -> Option<&SExpression> {
        path.split('/')
            .try_fold(self, |node, segment| node.child_by_segment(segment))
    }

    pub fn get_child_mut(&mut self, path: &str) -> Result<&mut SExpression, SchemaError> {
        let error = self.missing_child(path);
        self.try_get_child_mut(path).ok_or(error)
    }

    pub fn try_get_child_mut(&mut self, path: &str) -> Option<&mut SExpression> {
        path.split('/')
            .try_fold(self, |node, segment| node.child_by_segment_mut(segment))
    }

    /// Deserialize the node found at `path`.
    pub fn deserialize<T: FromSExpression>(&self, path: &str) -> Result<T, SchemaError> {
        T::from_sexpression(self.get_child(path)?)
    }

    pub fn append_child(&mut self, child: SExpression) -> Result<&mut SExpression, SchemaError> {
        let children = self.list_mut()?;
        let index = children.len();
        children.push(child);
        Ok(&mut children[index])
    }

    pub fn append_list(&mut self, name: &str) -> Result<&mut SExpression, SchemaError> {
        self.append_child(SExpression::list(name))
    }

    /// Append `(name value)`.
    pub fn append_value(
        &mut self,
        name: &str,
        value: impl ToSExpression,
    ) -> Result<&mut SExpression, SchemaError> {
        self.append_child(SExpression::list(name).with_child(value.to_sexpression()))
    }

    /// Append a line break unless the last child already is one.
    pub fn ensure_line_break(&mut self) -> Result<(), SchemaError> {
        let children = self.list_mut()?;
        if !children.last().is_some_and(SExpression::is_line_break) {
            children.push(SExpression::LineBreak);
        }
        Ok(())
    }

    /// Append `child` to the last line, in front of a closing line break.
    pub fn append_inline(&mut self, child: SExpression) -> Result<(), SchemaError> {
        let children = self.list_mut()?;
        match children.last() {
            Some(SExpression::LineBreak) => {
                let index = children.len() - 1;
                children.insert(index, child);
            }
            _ => children.push(child),
        }
        Ok(())
    }

    /// Insert `child` right after the first child tagged `anchor`, keeping the anchor's
    /// line layout. Appends on a new line if there is no such anchor.
    pub fn insert_after(&mut self, anchor: &str, child: SExpression) -> Result<(), SchemaError> {
        let children = self.list_mut()?;
        match children.iter().position(|c| c.name() == Some(anchor)) {
            Some(index) => {
                if children.get(index + 1).is_some_and(SExpression::is_line_break) {
                    children.insert(index + 2, child);
                    children.insert(index + 3, SExpression::LineBreak);
                } else {
                    children.insert(index + 1, child);
                }
            }
            None => {
                let multi_line = children.iter().any(SExpression::is_line_break);
                children.push(child);
                if multi_line {
                    children.push(SExpression::LineBreak);
                }
            }
        }
        Ok(())
    }

    /// Remove all children tagged `name` together with line breaks they leave orphaned.
    /// Returns the number of removed children.
    pub fn remove_children_named(&mut self, name: &str) -> usize {
        let SExpression::List { children, .. } = self else {
            return 0;
        };
        let mut removed = 0;
        let mut index = 0;
        while index < children.len() {
            if children[index].name() == Some(name) {
                remove_with_line_break(children, index);
                removed += 1;
            } else {
                index += 1;
            }
        }
        removed
    }

    /// Replace all children tagged `name` by `nodes`, placed where the first one was.
    pub fn replace_children_named(
        &mut self,
        name: &str,
        nodes: Vec<SExpression>,
    ) -> Result<(), SchemaError> {
        let first = self.children().iter().position(|c| c.name() == Some(name));
        self.remove_children_named(name);
        match first {
            Some(index) => {
                let children = self.list_mut()?;
                let index = index.min(children.len());
                children.splice(index..index, nodes);
            }
            None => {
                self.ensure_line_break()?;
                self.list_mut()?.extend(nodes);
            }
        }
        Ok(())
    }

    /// Rename every child list tagged `from` to `to`. Returns the number of renamed lists.
    pub fn rename_children(&mut self, from: &str, to: &str) -> usize {
        let mut renamed = 0;
        for child in self.children_named_mut(from) {
            child.set_name(to);
            renamed += 1;
        }
        renamed
    }

    /// Rename a list. Atoms are left untouched.
    pub fn set_name(&mut self, new_name: &str) {
        if let SExpression::List { name, .. } = self {
            *name = new_name.to_string();
        }
    }

    /// Replace the value of an atom, keeping its kind.
    pub fn set_value(&mut self, new_value: &str) -> Result<(), SchemaError> {
        match self {
            SExpression::Token(value) | SExpression::String(value) => {
                *value = new_value.to_string();
                Ok(())
            }
            other => Err(SchemaError::NotAValue(other.describe())),
        }
    }

    /// Serialize as file content, terminated by a newline.
    pub fn to_file_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        self.write_to(&mut out, 0);
        out.push('\n');
        out.into_bytes()
    }

    fn list_mut(&mut self) -> Result<&mut Vec<SExpression>, SchemaError> {
        match self {
            SExpression::List { children, .. } => Ok(children),
            other => Err(SchemaError::NotAList(other.describe())),
        }
    }

    fn describe(&self) -> String {
        match self {
            SExpression::List { name, .. } => name.clone(),
            SExpression::Token(value) | SExpression::String(value) => value.clone(),
            SExpression::LineBreak => "\\n".to_string(),
        }
    }

    fn missing_child(&self, path: &str) -> SchemaError {
        SchemaError::MissingChild {
            path: path.to_string(),
            parent: self.describe(),
        }
    }

    fn child_by_segment(&self, segment: &str) -> Option<&SExpression> {
        let children = self.children();
        match segment.strip_prefix('@') {
            Some(index) => {
                let index: usize = index.parse().ok()?;
                children.iter().filter(|c| !c.is_line_break()).nth(index)
            }
            None => children.iter().find(|c| c.name() == Some(segment)),
        }
    }

    fn child_by_segment_mut(&mut self, segment: &str) -> Option<&mut SExpression> {
        let SExpression::List { children, .. } = self else {
            return None;
        };
        match segment.strip_prefix('@') {
            Some(index) => {
                let index: usize = index.parse().ok()?;
                children.iter_mut().filter(|c| !c.is_line_break()).nth(index)
            }
            None => children.iter_mut().find(|c| c.name() == Some(segment)),
        }
    }

    fn write_to(&self, out: &mut String, depth: usize) {
        match self {
            SExpression::Token(value) => out.push_str(value),
            SExpression::String(value) => write_escaped(out, value),
            SExpression::LineBreak => out.push('\n'),
            SExpression::List { name, children } => {
                out.push('(');
                out.push_str(name);
                let mut line_start = false;
                for (index, child) in children.iter().enumerate() {
                    if child.is_line_break() {
                        out.push('\n');
                        match children.get(index + 1) {
                            None => push_indent(out, depth),
                            Some(next) if !next.is_line_break() => push_indent(out, depth + 1),
                            Some(_) => {}
                        }
                        line_start = true;
                    } else {
                        if !line_start {
                            out.push(' ');
                        }
                        child.write_to(out, depth + 1);
                        line_start = false;
                    }
                }
                out.push(')');
            }
        }
    }
}

fn remove_with_line_break(children: &mut Vec<SExpression>, index: usize) {
    children.remove(index);
    let after_break = index == 0 || children[index - 1].is_line_break();
    if after_break && children.get(index).is_some_and(SExpression::is_line_break) {
        children.remove(index);
    }
}

fn push_indent(out: &mut String, depth: usize) {
    out.extend(std::iter::repeat(' ').take(depth));
}

fn write_escaped(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

impl fmt::Display for SExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out, 0);
        f.write_str(&out)
    }
}

pub struct SExpressionParser {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl SExpressionParser {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Parse exactly one root list, surrounded by optional whitespace.
    pub fn parse(&mut self) -> Result<SExpression, ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof(self.position()));
        }
        if self.peek() != '(' {
            return Err(ParseError::UnexpectedCharacter {
                ch: self.peek(),
                position: self.position(),
            });
        }
        let root = self.parse_list()?;
        self.skip_whitespace();
        if !self.is_eof() {
            return Err(ParseError::TrailingContent(self.position()));
        }
        Ok(root)
    }

    fn parse_list(&mut self) -> Result<SExpression, ParseError> {
        let start = self.position();
        self.expect_char('(')?;
        self.skip_whitespace();

        if self.is_eof() || matches!(self.peek(), '(' | ')' | '"') {
            return Err(ParseError::MissingListName(self.position()));
        }
        let name = self.parse_token()?;
        let mut children = Vec::new();

        loop {
            self.skip_spaces();

            if self.is_eof() {
                return Err(ParseError::UnterminatedList {
                    name,
                    position: start,
                });
            }

            match self.peek() {
                '\n' => {
                    self.advance();
                    children.push(SExpression::LineBreak);
                }
                ')' => {
                    self.advance();
                    break;
                }
                '(' => children.push(self.parse_list()?),
                '"' => children.push(self.parse_string()?),
                _ => children.push(SExpression::Token(self.parse_token()?)),
            }
        }

        Ok(SExpression::List { name, children })
    }

    fn parse_string(&mut self) -> Result<SExpression, ParseError> {
        let start = self.position();
        self.expect_char('"')?;
        let mut s = String::new();
        let mut escaped = false;

        while !self.is_eof() {
            let ch = self.peek();
            self.advance();

            if escaped {
                match ch {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    _ => s.push(ch),
                }
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return Ok(SExpression::String(s));
            } else {
                s.push(ch);
            }
        }

        Err(ParseError::UnterminatedString(start))
    }

    fn parse_token(&mut self) -> Result<String, ParseError> {
        let start = self.position();
        let mut s = String::new();

        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_whitespace() || ch == '(' || ch == ')' {
                break;
            }
            s.push(ch);
            self.advance();
        }

        if s.is_empty() || s.contains('"') {
            Err(ParseError::InvalidAtom {
                atom: s,
                position: start,
            })
        } else {
            Ok(s)
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    /// Skip whitespace except line breaks, which are part of the tree.
    fn skip_spaces(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        if self.pos < self.input.len() {
            self.input[self.pos]
        } else {
            '\0'
        }
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.input.get(self.pos) {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof(self.position()));
        }

        let ch = self.peek();
        if ch == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedCharacter {
                ch,
                position: self.position(),
            })
        }
    }
}

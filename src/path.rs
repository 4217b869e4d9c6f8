use std::fmt;
use std::ops::Range;

use crate::errors::{PathError, Result};
use crate::filter::{self, Predicate};
use crate::parser::Parser;

/// A parsed location path: an optional leading [`Segment::Root`] followed by
/// steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Root,       // leading /
    Step(Step), // name, @name, ., .., //name
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub name: NameTest,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    SelfNode,
    Parent,
    /// `//name`: any element below the context node. Read only.
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Name(QualifiedName),
    Wildcard,
}

/// `prefix:local`. The prefix is resolved at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QualifiedName {
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
        }
    }

    /// Split `p:local` text. Does not validate characters.
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((p, l)) => Self::new(Some(p), l),
            None => Self::new(None, text),
        }
    }
}

impl Path {
    pub fn is_absolute(&self) -> bool {
        matches!(self.segments.first(), Some(Segment::Root))
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Step(step) => Some(step),
            Segment::Root => None,
        })
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps().last()
    }

    /// Reject constructs that cannot drive structure creation.
    pub fn check_writable(&self) -> Result<()> {
        for seg in &self.segments {
            match seg {
                Segment::Root => {}
                Segment::Step(step) => step.check_writable()?,
            }
        }
        Ok(())
    }
}

impl Step {
    pub fn check_writable(&self) -> Result<()> {
        match self.axis {
            Axis::Descendant => return Err(PathError::unsupported("//")),
            Axis::Child | Axis::Attribute | Axis::SelfNode | Axis::Parent => {}
        }
        for pred in &self.predicates {
            pred.check_writable()?;
        }
        Ok(())
    }

    /// Whether a candidate's name satisfies this step's name test, given the
    /// candidate's local name and namespace and the namespace the test's
    /// prefix resolved to.
    pub fn matches_name(&self, local: &str, namespace: Option<&str>, wanted_ns: Option<&str>) -> bool {
        match &self.name {
            NameTest::Wildcard => true,
            NameTest::Name(q) => q.local == local && wanted_ns == namespace,
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{p}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameTest::Name(q) => q.fmt(f),
            NameTest::Wildcard => f.write_str("*"),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.axis {
            Axis::Child => write!(f, "{}", self.name)?,
            Axis::Attribute => write!(f, "@{}", self.name)?,
            Axis::SelfNode => f.write_str(".")?,
            Axis::Parent => f.write_str("..")?,
            Axis::Descendant => write!(f, "//{}", self.name)?,
        }
        for p in &self.predicates {
            write!(f, "[{p}]")?;
        }
        Ok(())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                // `//a` is Root + Descendant(a); the step prints both slashes.
                Segment::Root => {
                    if !matches!(self.segments.get(1), Some(Segment::Step(s)) if s.axis == Axis::Descendant) {
                        f.write_str("/")?;
                    }
                }
                Segment::Step(step) => {
                    let after_root = i > 0 && self.segments[i - 1] == Segment::Root;
                    if i > 0 && !after_root && step.axis != Axis::Descendant {
                        f.write_str("/")?;
                    }
                    write!(f, "{step}")?;
                }
            }
        }
        Ok(())
    }
}

/// Per-variable `{using ...}` suffix found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePattern {
    pub name: String,
    pub pattern: String,
    pub span: Range<usize>,
}

/// Grammar state: the cursor plus what the parse collected on the side.
pub struct Grammar<'a> {
    pub p: Parser<'a>,
    pub variable_patterns: Vec<VariablePattern>,
}

impl<'a> Grammar<'a> {
    pub fn new(s: &'a str) -> Self {
        Self {
            p: Parser::new(s),
            variable_patterns: Vec::new(),
        }
    }

    /// `expr := '/'? step ('/' step)*` over the whole input.
    pub fn parse_path(&mut self) -> Result<Path> {
        self.p.skip_ws();
        if self.p.eof() {
            return Err(self.p.error("empty path expression"));
        }
        let path = self.parse_location_path(true)?;
        self.p.skip_ws();
        if !self.p.eof() {
            return Err(self.p.error("unexpected trailing input"));
        }
        Ok(path)
    }

    /// A location path. With `allow_absolute == false` (predicate operands)
    /// a leading `/` is rejected.
    pub fn parse_location_path(&mut self, allow_absolute: bool) -> Result<Path> {
        let mut segments = Vec::new();
        let start = self.p.pos();
        if self.p.peek_str("//") {
            if !allow_absolute {
                return Err(self.p.error("absolute paths are not allowed inside predicates"));
            }
            self.p.consume_str("//");
            segments.push(Segment::Root);
            segments.push(Segment::Step(self.parse_descendant_step()?));
        } else if self.p.consume_char('/') {
            if !allow_absolute {
                return Err(self.p.error_at(start, "absolute paths are not allowed inside predicates"));
            }
            segments.push(Segment::Root);
            if self.at_step_start() {
                segments.push(Segment::Step(self.parse_step()?));
            } else if !self.p.eof() {
                return Err(self.p.error("step expected after '/'"));
            }
        } else {
            segments.push(Segment::Step(self.parse_step()?));
        }

        loop {
            if self.p.consume_str("//") {
                segments.push(Segment::Step(self.parse_descendant_step()?));
            } else if self.p.consume_char('/') {
                segments.push(Segment::Step(self.parse_step()?));
            } else {
                break;
            }
        }
        Ok(Path { segments })
    }

    fn at_step_start(&self) -> bool {
        match self.p.peek_char() {
            Some(c) => c == '@' || c == '.' || c == '*' || c == '_' || c.is_alphabetic(),
            None => false,
        }
    }

    fn parse_descendant_step(&mut self) -> Result<Step> {
        if self.p.peek_char() == Some('@') || self.p.peek_char() == Some('.') {
            return Err(self.p.error("expected element name after '//'"));
        }
        let name = self.parse_name_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis: Axis::Descendant,
            name,
            predicates,
        })
    }

    /// `step := '@' name pred* | '..' pred* | '.' pred* | name pred*`
    pub fn parse_step(&mut self) -> Result<Step> {
        let (axis, name) = if self.p.consume_char('@') {
            (Axis::Attribute, self.parse_name_test()?)
        } else if self.p.consume_str("..") {
            (Axis::Parent, NameTest::Wildcard)
        } else if self.p.consume_char('.') {
            (Axis::SelfNode, NameTest::Wildcard)
        } else {
            (Axis::Child, self.parse_name_test()?)
        };
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            name,
            predicates,
        })
    }

    fn parse_name_test(&mut self) -> Result<NameTest> {
        if self.p.consume_char('*') {
            return Ok(NameTest::Wildcard);
        }
        let first = self.p.parse_identifier()?;
        if self.p.peek_char() == Some(':') && self.p.peek_second() != Some(':') {
            self.p.consume_char(':');
            let local = self.p.parse_identifier()?;
            return Ok(NameTest::Name(QualifiedName::new(Some(first), local)));
        }
        Ok(NameTest::Name(QualifiedName::new(None, first)))
    }

    fn parse_predicates(&mut self) -> Result<Vec<Predicate>> {
        let mut out = Vec::new();
        while self.p.peek_char() == Some('[') {
            out.push(filter::parse_predicate(self)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(s: &str) -> Result<Path> {
        Grammar::new(s).parse_path()
    }

    #[test]
    fn absolute_path_with_attribute() {
        let path = parse("/root/foo/@bar").unwrap();
        assert_eq!(path.segments.len(), 4);
        assert!(path.is_absolute());
        let last = path.last_step().unwrap();
        assert_eq!(last.axis, Axis::Attribute);
        assert_eq!(last.name, NameTest::Name(QualifiedName::new(None, "bar")));
    }

    #[test]
    fn prefixed_names_stay_unresolved() {
        let path = parse("/x:a/x:b").unwrap();
        let step = path.last_step().unwrap();
        assert_eq!(step.name, NameTest::Name(QualifiedName::new(Some("x"), "b")));
    }

    #[test]
    fn self_and_parent_steps() {
        let path = parse("a/../b/.").unwrap();
        let axes: Vec<Axis> = path.steps().map(|s| s.axis).collect();
        assert_eq!(axes, vec![Axis::Child, Axis::Parent, Axis::Child, Axis::SelfNode]);
    }

    #[test]
    fn descendant_is_parsed_but_not_writable() {
        let path = parse("//b").unwrap();
        assert_eq!(path.last_step().unwrap().axis, Axis::Descendant);
        assert!(matches!(
            path.check_writable(),
            Err(PathError::UnsupportedForWriting { .. })
        ));
    }

    #[test]
    fn display_round_trips_text() {
        for text in ["/a/b[@x='2']", "a/@b", "//b[2]", "/a//c", "../x[. = 'y']"] {
            let path = parse(text).unwrap();
            assert_eq!(parse(&path.to_string()).unwrap(), path, "{text}");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("/a/").is_err());
        assert!(parse("/a]").is_err());
        assert!(parse("/a/[1]").is_err());
    }
}

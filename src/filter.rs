use std::fmt::{self, Display};

use serde_json::Value;

use crate::comparison::cmp_any;
use crate::dom::{Document, NodeId};
use crate::engine::{self, Scope};
use crate::errors::{PathError, Result};
use crate::path::{Grammar, Path, VariablePattern};

/// One bracketed filter on a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `[n]`: the n-th candidate, 1-based.
    Positional(usize),
    Expr(FilterExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare { op: CmpOp, lhs: Operand, rhs: Operand },
    /// A bare operand: `[@id]`, `[child]`, `[$0]`.
    Exists(Operand),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(Path), // relative to the candidate
    Literal(Literal),
    Variable(VariableRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f32),
    Double(f64),
}

/// `$name`, optionally with its own `{using pattern}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub name: String,
    /// Set for `$0`, `$arg0`, `$param0` (any case).
    pub position: Option<usize>,
    pub format_pattern: Option<String>,
}

impl VariableRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            position: positional_index(name),
            format_pattern: None,
        }
    }
}

fn positional_index(name: &str) -> Option<usize> {
    let lower = name.to_ascii_lowercase();
    let digits = lower
        .strip_prefix("param")
        .or_else(|| lower.strip_prefix("arg"))
        .unwrap_or(&lower);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Result of testing one candidate: a plain match, or the position the
/// predicate asks for (the caller compares it with the candidate's index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOutcome {
    Matched(bool),
    Position(usize),
}

impl Literal {
    /// The text a literal compares and writes as. Decimals keep their
    /// fractional part, so `2.0` stays `2.0`.
    pub fn to_text(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => format!("{f:?}"),
            Literal::Double(d) => format!("{d:?}"),
        }
    }
}

impl Predicate {
    pub fn check_writable(&self) -> Result<()> {
        match self {
            Predicate::Positional(_) => Ok(()),
            Predicate::Expr(e) => e.check_writable(),
        }
    }
}

impl FilterExpr {
    pub fn check_writable(&self) -> Result<()> {
        match self {
            FilterExpr::Compare { op, lhs, rhs } => {
                match op {
                    CmpOp::Eq => {}
                    CmpOp::Ne | CmpOp::Lt | CmpOp::Lte | CmpOp::Gt | CmpOp::Gte => {
                        return Err(PathError::unsupported(format!("operator `{op}`")));
                    }
                }
                lhs.check_writable()?;
                rhs.check_writable()
            }
            FilterExpr::Exists(op) => op.check_writable(),
            FilterExpr::And(parts) => parts.iter().try_for_each(FilterExpr::check_writable),
            FilterExpr::Or(_) => Err(PathError::unsupported("or")),
        }
    }
}

impl Operand {
    fn check_writable(&self) -> Result<()> {
        match self {
            Operand::Path(p) => p.check_writable(),
            Operand::Literal(_) | Operand::Variable(_) => Ok(()),
        }
    }
}

// ---- grammar ------------------------------------------------------------

pub fn parse_predicate(g: &mut Grammar) -> Result<Predicate> {
    let open = g.p.pos();
    g.p.expect('[')?;
    g.p.skip_ws();
    if g.p.peek_char() == Some(']') {
        return Err(g.p.error_at(open, "empty predicate"));
    }
    if g.p.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        let before = g.p.pos();
        let n = g.p.parse_int()?;
        g.p.skip_ws();
        if g.p.consume_char(']') {
            let n = usize::try_from(n).map_err(|_| g.p.error_at(before, "bad position"))?;
            return Ok(Predicate::Positional(n));
        }
        g.p.reset(before);
    }
    let expr = parse_filter_or(g)?;
    g.p.skip_ws();
    if g.p.eof() {
        return Err(g.p.error_at(open, "unclosed predicate"));
    }
    g.p.expect(']')?;
    Ok(Predicate::Expr(expr))
}

pub fn parse_filter_or(g: &mut Grammar) -> Result<FilterExpr> {
    let mut parts = vec![parse_filter_and(g)?];
    loop {
        g.p.skip_ws();
        if g.p.consume_keyword("or") {
            parts.push(parse_filter_and(g)?);
        } else {
            break;
        }
    }
    Ok(if parts.len() == 1 { parts.remove(0) } else { FilterExpr::Or(parts) })
}

fn parse_filter_and(g: &mut Grammar) -> Result<FilterExpr> {
    let mut parts = vec![parse_filter_compare(g)?];
    loop {
        g.p.skip_ws();
        if g.p.consume_keyword("and") {
            parts.push(parse_filter_compare(g)?);
        } else {
            break;
        }
    }
    Ok(if parts.len() == 1 { parts.remove(0) } else { FilterExpr::And(parts) })
}

fn parse_filter_compare(g: &mut Grammar) -> Result<FilterExpr> {
    g.p.skip_ws();
    if g.p.consume_char('(') {
        let inner = parse_filter_or(g)?;
        g.p.skip_ws();
        g.p.expect(')')?;
        return Ok(inner);
    }
    let lhs = parse_operand(g)?;
    g.p.skip_ws();
    let op = if g.p.consume_str("!=") {
        Some(CmpOp::Ne)
    } else if g.p.consume_str("<=") {
        Some(CmpOp::Lte)
    } else if g.p.consume_str(">=") {
        Some(CmpOp::Gte)
    } else if g.p.consume_char('=') {
        Some(CmpOp::Eq)
    } else if g.p.consume_char('<') {
        Some(CmpOp::Lt)
    } else if g.p.consume_char('>') {
        Some(CmpOp::Gt)
    } else {
        None
    };
    match op {
        Some(op) => {
            g.p.skip_ws();
            let rhs = parse_operand(g)?;
            Ok(FilterExpr::Compare { op, lhs, rhs })
        }
        None => Ok(FilterExpr::Exists(lhs)),
    }
}

fn parse_operand(g: &mut Grammar) -> Result<Operand> {
    g.p.skip_ws();
    match g.p.peek_char() {
        Some('\'') | Some('"') => Ok(Operand::Literal(Literal::String(
            g.p.parse_quoted_string()?.to_string(),
        ))),
        Some('$') => parse_variable(g).map(Operand::Variable),
        Some(c) if c.is_ascii_digit() || (c == '-' && g.p.peek_second().map(|d| d.is_ascii_digit()).unwrap_or(false)) => {
            parse_number(g).map(Operand::Literal)
        }
        Some(c) if c == '@' || c == '.' || c == '*' || c == '_' || c.is_alphabetic() => {
            g.parse_location_path(false).map(Operand::Path)
        }
        Some(']') => Err(g.p.error("operand expected")),
        Some(c) => Err(g.p.error(format!("invalid operand starting with '{c}'"))),
        None => Err(g.p.error("operand expected, found end of input")),
    }
}

fn parse_number(g: &mut Grammar) -> Result<Literal> {
    let start = g.p.pos();
    let text = g.p.capture_number()?;
    let parsed = if let Some(body) = text.strip_suffix(|c: char| c == 'f' || c == 'F') {
        body.parse::<f32>().ok().map(Literal::Float)
    } else if text.contains('.') {
        text.parse::<f64>().ok().map(Literal::Double)
    } else {
        text.parse::<i64>().ok().map(Literal::Int)
    };
    parsed.ok_or_else(|| g.p.error_at(start, format!("bad number `{text}`")))
}

fn parse_variable(g: &mut Grammar) -> Result<VariableRef> {
    g.p.expect('$')?;
    let start = g.p.pos();
    while let Some(c) = g.p.peek_char() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            g.p.consume_char(c);
        } else {
            break;
        }
    }
    if g.p.pos() == start {
        return Err(g.p.error("variable name expected after '$'"));
    }
    let name = g.p.source()[start..g.p.pos()].to_string();
    let mut var = VariableRef::new(&name);

    let brace = g.p.pos();
    if g.p.consume_char('{') {
        g.p.skip_ws();
        if !g.p.consume_keyword("using") {
            return Err(g.p.error("expected `using` in variable format suffix"));
        }
        let pattern = g.p.capture_until('}')?.trim().to_string();
        g.p.expect('}')?;
        if pattern.is_empty() {
            return Err(g.p.error_at(brace, "empty format pattern"));
        }
        g.variable_patterns.push(VariablePattern {
            name: name.clone(),
            pattern: pattern.clone(),
            span: brace..g.p.pos(),
        });
        var.format_pattern = Some(pattern);
    }
    Ok(var)
}

// ---- evaluation ---------------------------------------------------------

/// Test one candidate node against a predicate.
pub(crate) fn evaluate(pred: &Predicate, doc: &Document, candidate: NodeId, scope: &Scope) -> Result<PredicateOutcome> {
    match pred {
        Predicate::Positional(n) => Ok(PredicateOutcome::Position(*n)),
        Predicate::Expr(expr) => eval_filter(expr, doc, candidate, scope),
    }
}

fn eval_filter(expr: &FilterExpr, doc: &Document, candidate: NodeId, scope: &Scope) -> Result<PredicateOutcome> {
    match expr {
        FilterExpr::Compare { op, lhs, rhs } => {
            let a = operand_texts(lhs, doc, candidate, scope)?;
            let b = operand_texts(rhs, doc, candidate, scope)?;
            Ok(PredicateOutcome::Matched(cmp_any(*op, &a, &b)))
        }
        FilterExpr::Exists(op) => exists(op, doc, candidate, scope),
        FilterExpr::And(parts) => {
            for part in parts {
                if !as_bool(eval_filter(part, doc, candidate, scope)?) {
                    return Ok(PredicateOutcome::Matched(false));
                }
            }
            Ok(PredicateOutcome::Matched(true))
        }
        FilterExpr::Or(parts) => {
            for part in parts {
                if as_bool(eval_filter(part, doc, candidate, scope)?) {
                    return Ok(PredicateOutcome::Matched(true));
                }
            }
            Ok(PredicateOutcome::Matched(false))
        }
    }
}

// Inside and/or a number means nothing positional; treat it as truthiness.
fn as_bool(outcome: PredicateOutcome) -> bool {
    match outcome {
        PredicateOutcome::Matched(b) => b,
        PredicateOutcome::Position(n) => n != 0,
    }
}

fn exists(op: &Operand, doc: &Document, candidate: NodeId, scope: &Scope) -> Result<PredicateOutcome> {
    match op {
        Operand::Path(p) => Ok(PredicateOutcome::Matched(
            !engine::eval_path(p, doc, candidate, scope)?.is_empty(),
        )),
        Operand::Literal(Literal::Int(i)) => Ok(PredicateOutcome::Position(usize::try_from(*i).unwrap_or(0))),
        Operand::Literal(Literal::String(s)) => Ok(PredicateOutcome::Matched(!s.is_empty())),
        Operand::Literal(Literal::Float(f)) => Ok(PredicateOutcome::Matched(*f != 0.0)),
        Operand::Literal(Literal::Double(d)) => Ok(PredicateOutcome::Matched(*d != 0.0)),
        Operand::Variable(var) => Ok(match resolve_variable(var, scope)? {
            Value::Number(n) => match n.as_u64() {
                Some(pos) => PredicateOutcome::Position(pos as usize),
                None => PredicateOutcome::Matched(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            },
            Value::Bool(b) => PredicateOutcome::Matched(b),
            Value::String(s) => PredicateOutcome::Matched(!s.is_empty()),
            Value::Null => PredicateOutcome::Matched(false),
            Value::Array(a) => PredicateOutcome::Matched(!a.is_empty()),
            Value::Object(o) => PredicateOutcome::Matched(!o.is_empty()),
        }),
    }
}

/// Text renderings of an operand relative to `candidate`. Paths yield one
/// entry per matched node (possibly none).
pub(crate) fn operand_texts(op: &Operand, doc: &Document, candidate: NodeId, scope: &Scope) -> Result<Vec<String>> {
    match op {
        Operand::Path(p) => Ok(engine::eval_path(p, doc, candidate, scope)?
            .into_iter()
            .map(|n| doc.text_content(n))
            .collect()),
        Operand::Literal(lit) => Ok(vec![lit.to_text()]),
        Operand::Variable(var) => {
            let value = resolve_variable(var, scope)?;
            let text = scope
                .ctx
                .services
                .renderer
                .render(&value, var.format_pattern.as_deref())?;
            Ok(vec![text])
        }
    }
}

pub(crate) fn resolve_variable(var: &VariableRef, scope: &Scope) -> Result<Value> {
    scope
        .ctx
        .services
        .variables
        .resolve(var)
        .ok_or_else(|| PathError::VariableResolution(var.name.clone()))
}

// ---- display ------------------------------------------------------------

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        })
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) if s.contains('\'') => write!(f, "\"{s}\""),
            Literal::String(s) => write!(f, "'{s}'"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{v:?}f"),
            Literal::Double(v) => write!(f, "{v:?}"),
        }
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name)?;
        if let Some(p) = &self.format_pattern {
            write!(f, "{{using {p}}}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Path(p) => p.fmt(f),
            Operand::Literal(l) => l.fmt(f),
            Operand::Variable(v) => v.fmt(f),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Compare { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            FilterExpr::Exists(op) => op.fmt(f),
            FilterExpr::And(parts) => join(f, parts, " and "),
            FilterExpr::Or(parts) => {
                f.write_str("(")?;
                join(f, parts, " or ")?;
                f.write_str(")")
            }
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, parts: &[FilterExpr], sep: &str) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        Display::fmt(part, f)?;
    }
    Ok(())
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Positional(n) => write!(f, "{n}"),
            Predicate::Expr(e) => e.fmt(f),
        }
    }
}

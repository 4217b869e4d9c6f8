// src/expression.rs
use std::collections::BTreeMap;

use crate::errors::Result;
use crate::parser::Parser;
use crate::path::{Grammar, Path};

const USING: &str = " using ";

/// A parsed, immutable path expression plus its format patterns.
///
/// Compile once and evaluate against any number of documents; the expression
/// never holds on to a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    text: String,
    stripped: String,
    path: Path,
    format_pattern: Option<String>,
    variable_patterns: BTreeMap<String, String>,
}

/// Parse `text` into a [`CompiledExpression`].
///
/// A trailing ` using <pattern>` is split off as the expression's format
/// pattern and `$var{using <pattern>}` suffixes become per-variable patterns;
/// both are removed from [`CompiledExpression::stripped_text`].
pub fn compile(text: &str) -> Result<CompiledExpression> {
    let (body, format_pattern) = split_using_suffix(text)?;
    let mut g = Grammar::new(body);
    let path = g.parse_path()?;

    let mut stripped = String::with_capacity(body.len());
    let mut last = 0;
    let mut variable_patterns = BTreeMap::new();
    for vp in &g.variable_patterns {
        stripped.push_str(&body[last..vp.span.start]);
        last = vp.span.end;
        variable_patterns.insert(vp.name.clone(), vp.pattern.clone());
    }
    stripped.push_str(&body[last..]);

    tracing::trace!(expr = text, stripped = %stripped.trim(), "compiled path expression");
    Ok(CompiledExpression {
        text: text.to_string(),
        stripped: stripped.trim().to_string(),
        path,
        format_pattern,
        variable_patterns,
    })
}

/// Find the first ` using ` outside quotes, brackets and braces.
fn split_using_suffix(text: &str) -> Result<(&str, Option<String>)> {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' | '{' | '(' => depth += 1,
                ']' | '}' | ')' => depth = depth.saturating_sub(1),
                ' ' if depth == 0 && text[i..].starts_with(USING) => {
                    let pattern = text[i + USING.len()..].trim();
                    if pattern.is_empty() {
                        return Err(Parser::new(text).error_at(i + 1, "empty format pattern after `using`"));
                    }
                    return Ok((&text[..i], Some(pattern.to_string())));
                }
                _ => {}
            },
        }
    }
    Ok((text, None))
}

impl CompiledExpression {
    /// The text as given to [`compile`].
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The text with every format-pattern suffix removed.
    pub fn stripped_text(&self) -> &str {
        &self.stripped
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_pattern(&self) -> Option<&str> {
        self.format_pattern.as_deref()
    }

    /// Pattern attached to `$name{using ...}`. Names match case-insensitively.
    pub fn variable_format_pattern(&self, name: &str) -> Option<&str> {
        let name = name.strip_prefix('$').unwrap_or(name);
        self.variable_patterns
            .get(name)
            .or_else(|| {
                self.variable_patterns
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

impl std::str::FromStr for CompiledExpression {
    type Err = crate::errors::PathError;

    fn from_str(s: &str) -> Result<Self> {
        compile(s)
    }
}

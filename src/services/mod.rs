use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use crate::errors::Result;
use crate::filter::VariableRef;

/// Scalar-to-text conversion used when writing values into the tree.
pub trait Renderer: Send + Sync {
    fn render(&self, value: &Value, format_pattern: Option<&str>) -> Result<String>;
}

/// Text-to-scalar conversion used when reading typed values out of the tree.
pub trait TypeConverter: Send + Sync {
    fn convert(&self, component: ComponentType, text: &str, format_pattern: Option<&str>) -> Result<Value>;
}

/// Supplies values for `$name` / `$0` references in predicates.
pub trait VariableResolver: Send + Sync {
    fn resolve(&self, var: &VariableRef) -> Option<Value>;
}

impl<F> VariableResolver for F
where
    F: Fn(&VariableRef) -> Option<Value> + Send + Sync,
{
    fn resolve(&self, var: &VariableRef) -> Option<Value> {
        self(var)
    }
}

/// What a view reads its nodes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Text,
    Integer,
    Float,
    Boolean,
    /// The node itself, as a standalone tree.
    Fragment,
}

/// The collaborators the engine calls into.
#[derive(Clone)]
pub struct Services {
    pub renderer: Arc<dyn Renderer>,
    pub converter: Arc<dyn TypeConverter>,
    pub variables: Arc<dyn VariableResolver>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            renderer: Arc::new(builtins::DefaultRenderer),
            converter: Arc::new(builtins::DefaultConverter),
            variables: Arc::new(Variables::default()),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Named variables plus positional arguments (`$0`, `$arg0`, `$param0`).
#[derive(Debug, Clone, Default)]
pub struct Variables {
    named: HashMap<String, Value>,
    positional: Vec<Value>,
}

impl Variables {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.named.insert(name.into(), value);
    }
}

impl VariableResolver for Variables {
    fn resolve(&self, var: &VariableRef) -> Option<Value> {
        if let Some(pos) = var.position {
            if let Some(v) = self.positional.get(pos) {
                return Some(v.clone());
            }
        }
        self.named.get(&var.name).cloned()
    }
}

pub mod builtins {
    use super::*;
    use crate::errors::PathError;

    /// Renders JSON scalars; numeric patterns like `0.00`, `#,##0.#` control
    /// grouping and fraction digits.
    pub struct DefaultRenderer;
    impl Renderer for DefaultRenderer {
        fn render(&self, value: &Value, format_pattern: Option<&str>) -> Result<String> {
            Ok(match value {
                Value::Null => String::new(),
                Value::Bool(b) => b.to_string(),
                Value::String(s) => s.clone(),
                Value::Number(n) => match (format_pattern.and_then(DecimalPattern::parse), n.as_f64()) {
                    (Some(p), Some(f)) => p.format(f),
                    _ => n.to_string(),
                },
                Value::Array(_) | Value::Object(_) => {
                    return Err(PathError::Conversion(format!("cannot render {value} as text")));
                }
            })
        }
    }

    pub struct DefaultConverter;
    impl TypeConverter for DefaultConverter {
        fn convert(&self, component: ComponentType, text: &str, format_pattern: Option<&str>) -> Result<Value> {
            let grouped = format_pattern.map(|p| p.contains(',')).unwrap_or(false);
            let numeric = || -> String {
                let t = text.trim();
                if grouped { t.replace(',', "") } else { t.to_string() }
            };
            match component {
                ComponentType::Text => Ok(Value::String(text.to_string())),
                ComponentType::Integer => numeric()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| PathError::Conversion(format!("`{text}` is not an integer"))),
                ComponentType::Float => {
                    let f = numeric()
                        .parse::<f64>()
                        .map_err(|_| PathError::Conversion(format!("`{text}` is not a number")))?;
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .ok_or_else(|| PathError::Conversion(format!("`{text}` is not a finite number")))
                }
                ComponentType::Boolean => match text.trim() {
                    "true" | "1" => Ok(Value::Bool(true)),
                    "false" | "0" => Ok(Value::Bool(false)),
                    other => Err(PathError::Conversion(format!("`{other}` is not a boolean"))),
                },
                ComponentType::Fragment => Err(PathError::Conversion("fragments are not scalar values".into())),
            }
        }
    }

    /// The subset of decimal format patterns the default renderer honours.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DecimalPattern {
        min_int: usize,
        min_frac: usize,
        max_frac: usize,
        grouping: bool,
    }

    impl DecimalPattern {
        pub fn parse(pattern: &str) -> Option<Self> {
            if pattern.is_empty() || !pattern.chars().all(|c| matches!(c, '0' | '#' | ',' | '.')) {
                return None;
            }
            let (int_part, frac_part) = match pattern.split_once('.') {
                Some((i, f)) => (i, f),
                None => (pattern, ""),
            };
            if frac_part.contains('.') || frac_part.contains(',') {
                return None;
            }
            Some(Self {
                min_int: int_part.chars().filter(|&c| c == '0').count(),
                min_frac: frac_part.chars().filter(|&c| c == '0').count(),
                max_frac: frac_part.len(),
                grouping: int_part.contains(','),
            })
        }

        pub fn format(&self, value: f64) -> String {
            let mut text = format!("{:.*}", self.max_frac, value.abs());
            if let Some(dot) = text.find('.') {
                let keep = dot + 1 + self.min_frac;
                while text.len() > keep && text.ends_with('0') {
                    text.pop();
                }
                if text.ends_with('.') {
                    text.pop();
                }
            }
            let (int_digits, frac) = match text.split_once('.') {
                Some((i, f)) => (i.to_string(), Some(f.to_string())),
                None => (text.clone(), None),
            };
            let mut int_digits = if int_digits == "0" && self.min_int == 0 && frac.is_some() {
                String::new()
            } else {
                int_digits
            };
            while int_digits.len() < self.min_int {
                int_digits.insert(0, '0');
            }
            if self.grouping {
                int_digits = group_thousands(&int_digits);
            }
            let mut out = String::new();
            if value < 0.0 && text.chars().any(|c| c.is_ascii_digit() && c != '0') {
                out.push('-');
            }
            out.push_str(&int_digits);
            if let Some(f) = frac {
                out.push('.');
                out.push_str(&f);
            }
            if out.is_empty() || out == "-" {
                out = "0".into();
            }
            out
        }
    }

    fn group_thousands(digits: &str) -> String {
        let len = digits.len();
        let mut out = String::with_capacity(len + len / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (len - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
        out
    }
}

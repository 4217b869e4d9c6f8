use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::{Renderer, Services, TypeConverter, VariableResolver, Variables};

/// Serializable knobs, e.g. loaded from a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Prefix => namespace URI; wins over the document's own declarations.
    pub namespaces: BTreeMap<String, String>,
    /// Values for `$name` references.
    pub variables: BTreeMap<String, Value>,
    /// Drop whitespace-only text around deleted nodes.
    pub trim_whitespace: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            namespaces: BTreeMap::new(),
            variables: BTreeMap::new(),
            trim_whitespace: true,
        }
    }
}

/// Everything an evaluation needs besides the expression and the tree.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) namespaces: BTreeMap<String, String>,
    pub(crate) services: Services,
    pub(crate) trim_whitespace: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::from_options(&Options::default())
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(opts: &Options) -> Self {
        let mut vars = Variables::new();
        for (name, value) in &opts.variables {
            vars.insert(name.clone(), value.clone());
        }
        Self {
            namespaces: opts.namespaces.clone(),
            services: Services {
                variables: Arc::new(vars),
                ..Services::default()
            },
            trim_whitespace: opts.trim_whitespace,
        }
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_variables(mut self, resolver: impl VariableResolver + 'static) -> Self {
        self.services.variables = Arc::new(resolver);
        self
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.services.renderer = Arc::new(renderer);
        self
    }

    pub fn with_converter(mut self, converter: impl TypeConverter + 'static) -> Self {
        self.services.converter = Arc::new(converter);
        self
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn namespace_overrides(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }
}

//! Engine-owned value model and variable introspection: scope listings with
//! filtering, and drill-down into nested containers through a pluggable
//! resolver registry.

use crate::debugger::error::Error;
use crate::debugger::runtime::{FrameRef, VarScope};
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Length sentinel meaning "unknown / not applicable".
pub const LEN_NOT_APPLICABLE: i64 = -2;

const SHORT_REPR_LIMIT: usize = 64;

/// A value extracted from the debuggee, converted by the runtime adapter into
/// the engine's own representation. Containers carry their children eagerly;
/// the adapter is expected to cut conversion at a sane depth.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Object {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
}

impl Value {
    /// Stable type tag, also the resolver registry key.
    pub fn type_tag(&self) -> &str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object { type_name, .. } => type_name,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_) | Value::Object { .. })
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            Value::Object { fields, .. } => Some(fields.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Truthiness used by breakpoint/watch conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unit => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Object { .. } => true,
        }
    }

    /// One-line rendering, truncated for protocol payloads. Containers are
    /// summarized, never fully serialized.
    pub fn short_repr(&self) -> String {
        let full = match self {
            Value::Unit => "()".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => format!("\"{s}\""),
            Value::List(items) => format!("list of len {}", items.len()),
            Value::Map(entries) => format!("map of len {}", entries.len()),
            Value::Object { type_name, fields } => {
                format!("{type_name} {{{} fields}}", fields.len())
            }
        };
        if full.chars().count() > SHORT_REPR_LIMIT {
            let truncated: String = full.chars().take(SHORT_REPR_LIMIT).collect();
            format!("{truncated}…")
        } else {
            full
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_repr())
    }
}

/// One row of a `ResponseVariables`/`ResponseVariable` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableEntry {
    pub name: String,
    pub container: bool,
    pub type_name: String,
    pub has_children: bool,
    /// Element count, or [`LEN_NOT_APPLICABLE`].
    pub length: i64,
    /// Short rendering for scalars; `None` for containers (summarized by
    /// type name and length instead).
    pub value: Option<String>,
}

impl VariableEntry {
    pub fn new(name: impl Into<String>, value: &Value) -> Self {
        VariableEntry {
            name: name.into(),
            container: value.is_container(),
            type_name: value.type_tag().to_string(),
            has_children: value.is_container() && !value.is_empty(),
            length: value.len().map(|l| l as i64).unwrap_or(LEN_NOT_APPLICABLE),
            value: if value.is_container() {
                None
            } else {
                Some(value.short_repr())
            },
        }
    }
}

/// Filters applied to a scope listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableFilter {
    /// Regex matched against binding names.
    pub name_pattern: Option<String>,
    /// Invert the name pattern match.
    pub invert: bool,
    /// Also show names hidden by the dunder convention (`__name__`).
    pub show_hidden: bool,
    /// Type tags excluded from the listing.
    pub exclude_types: Vec<String>,
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Enumerate a frame's bindings in the given scope, applying [`VariableFilter`].
pub fn list_variables(
    frame: &FrameRef,
    scope: VarScope,
    filter: &VariableFilter,
) -> Result<Vec<VariableEntry>, Error> {
    let pattern = filter
        .name_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()?;

    let mut entries = vec![];
    for name in frame.names(scope) {
        if !filter.show_hidden && is_dunder(&name) {
            continue;
        }
        if let Some(re) = &pattern {
            if re.is_match(&name) == filter.invert {
                continue;
            }
        }
        let Some(value) = frame.get_var(scope, &name) else {
            continue;
        };
        if filter.exclude_types.iter().any(|t| t == value.type_tag()) {
            continue;
        }
        entries.push(VariableEntry::new(name, &value));
    }
    Ok(entries)
}

/// Render a frame's arguments as `name=value, ...` for stack reports.
pub(crate) fn format_arguments(frame: &FrameRef) -> String {
    frame
        .code()
        .arg_names
        .iter()
        .map(|name| match frame.get_var(VarScope::Local, name) {
            Some(v) => format!("{name}={}", v.short_repr()),
            None => format!("{name}=?"),
        })
        .join(", ")
}

/// One segment of a drill-down access path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// `.field`
    Field(String),
    /// `[3]`
    Index(i64),
    /// `["key"]`
    Key(String),
}

/// Parse a dotted/indexed access path, e.g. `config.servers[0]["host"]`.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, Error> {
    let malformed = |what: &str| Error::Path(format!("{what} in `{path}`"));

    let mut segments = vec![];
    let mut chars = path.chars().peekable();
    let mut ident = String::new();
    let mut expect_ident = true;

    loop {
        match chars.peek().copied() {
            Some(c) if c.is_alphanumeric() || c == '_' => {
                chars.next();
                ident.push(c);
            }
            other => {
                if expect_ident || !ident.is_empty() {
                    if ident.is_empty() {
                        return Err(malformed("empty identifier"));
                    }
                    segments.push(PathSegment::Field(std::mem::take(&mut ident)));
                    expect_ident = false;
                }
                match other {
                    None => break,
                    Some('.') => {
                        chars.next();
                        expect_ident = true;
                    }
                    Some('[') => {
                        chars.next();
                        let mut inner = String::new();
                        let mut closed = false;
                        for c in chars.by_ref() {
                            if c == ']' {
                                closed = true;
                                break;
                            }
                            inner.push(c);
                        }
                        if !closed {
                            return Err(malformed("unterminated `[`"));
                        }
                        if inner.starts_with('"') && inner.ends_with('"') && inner.len() >= 2 {
                            segments.push(PathSegment::Key(inner[1..inner.len() - 1].to_string()));
                        } else {
                            let idx = inner
                                .parse::<i64>()
                                .map_err(|_| malformed("invalid index"))?;
                            segments.push(PathSegment::Index(idx));
                        }
                    }
                    Some(c) => return Err(malformed(&format!("unexpected `{c}`"))),
                }
            }
        }
    }

    if segments.is_empty() {
        return Err(malformed("empty path"));
    }
    Ok(segments)
}

fn segment_repr(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Field(f) => format!(".{f}"),
        PathSegment::Index(i) => format!("[{i}]"),
        PathSegment::Key(k) => format!("[\"{k}\"]"),
    }
}

/// Capability interface for drilling into a value of one type tag.
///
/// Host-registered resolvers may talk to the live runtime and fail in ways
/// the engine cannot anticipate; such failures surface as [`Error::Hook`]
/// and never abort the session.
pub trait VariableResolver: Send + Sync {
    /// Resolve one path segment against a value. `Ok(None)` means the
    /// segment does not apply to this value; `Err` is a hook failure.
    fn resolve(&self, value: &Value, segment: &PathSegment) -> anyhow::Result<Option<Value>>;
    /// Children listed in a `ResponseVariable` reply.
    fn children(&self, value: &Value) -> Vec<(String, Value)>;
}

struct ListResolver;

impl VariableResolver for ListResolver {
    fn resolve(&self, value: &Value, segment: &PathSegment) -> anyhow::Result<Option<Value>> {
        let Value::List(items) = value else {
            return Ok(None);
        };
        let PathSegment::Index(idx) = segment else {
            return Ok(None);
        };
        let idx = if *idx < 0 {
            match items.len().checked_sub(idx.unsigned_abs() as usize) {
                Some(i) => i,
                None => return Ok(None),
            }
        } else {
            *idx as usize
        };
        Ok(items.get(idx).cloned())
    }

    fn children(&self, value: &Value) -> Vec<(String, Value)> {
        let Value::List(items) = value else {
            return vec![];
        };
        items
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("[{i}]"), v.clone()))
            .collect()
    }
}

struct MapResolver;

impl VariableResolver for MapResolver {
    fn resolve(&self, value: &Value, segment: &PathSegment) -> anyhow::Result<Option<Value>> {
        let Value::Map(entries) = value else {
            return Ok(None);
        };
        let matches = |k: &Value| match segment {
            PathSegment::Key(s) => matches!(k, Value::Str(ks) if ks == s),
            PathSegment::Index(i) => matches!(k, Value::Int(ki) if ki == i),
            PathSegment::Field(s) => matches!(k, Value::Str(ks) if ks == s),
        };
        Ok(entries.iter().find(|(k, _)| matches(k)).map(|(_, v)| v.clone()))
    }

    fn children(&self, value: &Value) -> Vec<(String, Value)> {
        let Value::Map(entries) = value else {
            return vec![];
        };
        entries
            .iter()
            .map(|(k, v)| (format!("[{}]", k.short_repr()), v.clone()))
            .collect()
    }
}

struct ObjectResolver;

impl VariableResolver for ObjectResolver {
    fn resolve(&self, value: &Value, segment: &PathSegment) -> anyhow::Result<Option<Value>> {
        let Value::Object { fields, .. } = value else {
            return Ok(None);
        };
        let name = match segment {
            PathSegment::Field(f) => f,
            PathSegment::Key(k) => k,
            PathSegment::Index(_) => return Ok(None),
        };
        Ok(fields.iter().find(|(f, _)| f == name).map(|(_, v)| v.clone()))
    }

    fn children(&self, value: &Value) -> Vec<(String, Value)> {
        let Value::Object { fields, .. } = value else {
            return vec![];
        };
        fields.clone()
    }
}

/// Resolver registry keyed by stable type tag. Objects with no specialized
/// resolver registered fall back to field-wise resolution.
pub struct ResolverRegistry {
    by_tag: HashMap<String, Box<dyn VariableResolver>>,
    object_fallback: Box<dyn VariableResolver>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        let mut by_tag: HashMap<String, Box<dyn VariableResolver>> = HashMap::new();
        by_tag.insert("list".to_string(), Box::new(ListResolver));
        by_tag.insert("map".to_string(), Box::new(MapResolver));
        ResolverRegistry {
            by_tag,
            object_fallback: Box::new(ObjectResolver),
        }
    }
}

impl ResolverRegistry {
    /// Register a specialized resolver for one type tag, replacing any
    /// previous registration.
    pub fn register(&mut self, tag: impl Into<String>, resolver: Box<dyn VariableResolver>) {
        self.by_tag.insert(tag.into(), resolver);
    }

    fn lookup(&self, value: &Value) -> Option<&dyn VariableResolver> {
        if let Some(r) = self.by_tag.get(value.type_tag()) {
            return Some(r.as_ref());
        }
        if matches!(value, Value::Object { .. }) {
            return Some(self.object_fallback.as_ref());
        }
        None
    }

    pub fn children(&self, value: &Value) -> Vec<(String, Value)> {
        self.lookup(value)
            .map(|r| r.children(value))
            .unwrap_or_default()
    }

    /// Walk an access path into a frame's variable, reusing memoized prefix
    /// results from previous drill-down requests. The memo is owned by the
    /// stopped thread state and cleared on resume.
    pub fn resolve_path(
        &self,
        frame: &FrameRef,
        scope: VarScope,
        path: &str,
        memo: &mut HashMap<String, Value>,
    ) -> Result<Value, Error> {
        if let Some(hit) = memo.get(path) {
            return Ok(hit.clone());
        }

        let segments = parse_path(path)?;
        let PathSegment::Field(root_name) = &segments[0] else {
            return Err(Error::Path(format!("`{path}` must start with a name")));
        };

        let mut prefix = root_name.clone();
        let mut current = match memo.get(&prefix) {
            Some(v) => v.clone(),
            None => {
                let root = frame
                    .get_var(scope, root_name)
                    .ok_or_else(|| Error::VariableNotFound(root_name.clone()))?;
                memo.insert(prefix.clone(), root.clone());
                root
            }
        };

        for segment in &segments[1..] {
            prefix.push_str(&segment_repr(segment));
            current = match memo.get(&prefix) {
                Some(v) => v.clone(),
                None => {
                    let next = match self.lookup(&current) {
                        Some(r) => r.resolve(&current, segment).map_err(Error::Hook)?,
                        None => None,
                    }
                    .ok_or_else(|| Error::Unresolvable(segment_repr(segment)))?;
                    memo.insert(prefix.clone(), next.clone());
                    next
                }
            };
        }
        Ok(current)
    }
}

//! Command-line parameter encoding
//!
//! A parameter set describes the arguments of a command as an ordered table of
//! [`Field`] descriptors. Encoding walks the table in declaration order and
//! produces a single whitespace-separated string:
//!
//! ```text
//! Field::switch("no_pci", true)                        -> --no-pci
//! Field::new("prefix", Some("dpdk")).long("file-prefix") -> --file-prefix=dpdk
//! Field::new("lcore_list", Some(&cores)).short("l")    -> -l 0-3
//! Field::repeated("port", Some(&[0, 1][..]))           -> --port=0 --port=1
//! ```
//!
//! No quoting or escaping is performed; values containing whitespace are the
//! caller's responsibility.

pub mod eal;

use std::fmt;
use std::path::{Path, PathBuf};

/// Intermediate value of a field, before it becomes text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(u64),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

/// Conversion of a field value into a [`Value`]
pub trait ToValue {
    fn to_value(&self) -> Value;
}

macro_rules! int_to_value {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::Int(u64::from(*self))
                }
            }
        )*
    };
}

int_to_value!(u8, u16, u32, u64);

impl ToValue for usize {
    fn to_value(&self) -> Value {
        Value::Int(*self as u64)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl ToValue for Path {
    fn to_value(&self) -> Value {
        Value::Str(self.display().to_string())
    }
}

impl ToValue for PathBuf {
    fn to_value(&self) -> Value {
        self.as_path().to_value()
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

/// A value transform applied before a field is rendered
pub type Transform = fn(Value) -> Value;

/// Built-in value transforms
pub mod convert {
    use super::Value;

    /// Join a list with commas: `[1, 2]` → `1,2`
    pub fn comma_separated(value: Value) -> Value {
        match value {
            Value::List(items) => Value::Str(
                items
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            other => other,
        }
    }

    /// Wrap in parentheses: `x` → `(x)`
    pub fn bracketed(value: Value) -> Value {
        Value::Str(format!("({})", value))
    }

    /// Render integers in hexadecimal: `13` → `0xd`
    pub fn hex(value: Value) -> Value {
        match value {
            Value::Int(i) => Value::Str(format!("{:#x}", i)),
            Value::List(items) => Value::List(items.into_iter().map(hex).collect()),
            other => other,
        }
    }

    /// Render the numeric value of a flag set in decimal
    pub fn str_from_flag_value(value: Value) -> Value {
        match value {
            Value::Int(i) => Value::Str(i.to_string()),
            other => other,
        }
    }
}

/// What a field holds
enum FieldValue<'a> {
    Absent,
    /// `true` renders the switch, `false` renders the negated switch
    Switch(bool),
    Value(Value),
    Nested(&'a dyn ParamSet),
}

/// Descriptor of one field of a parameter set
pub struct Field<'a> {
    name: &'static str,
    short: Option<&'static str>,
    long: Option<&'static str>,
    repeated: bool,
    transforms: Vec<Transform>,
    value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    fn with_value(name: &'static str, value: FieldValue<'a>) -> Self {
        Self {
            name,
            short: None,
            long: None,
            repeated: false,
            transforms: Vec::new(),
            value,
        }
    }

    /// A scalar field, absent when `value` is `None`
    pub fn new<T: ToValue + ?Sized>(name: &'static str, value: Option<&T>) -> Self {
        let value = match value {
            Some(v) => FieldValue::Value(v.to_value()),
            None => FieldValue::Absent,
        };
        Self::with_value(name, value)
    }

    /// A field emitting one switch per element, in iteration order
    pub fn repeated<T: ToValue>(name: &'static str, values: Option<&[T]>) -> Self {
        let mut field = Self::new(name, values);
        field.repeated = true;
        field
    }

    /// A two-state switch: rendered when `on`, absent otherwise
    pub fn switch(name: &'static str, on: bool) -> Self {
        let value = if on {
            FieldValue::Switch(true)
        } else {
            FieldValue::Absent
        };
        Self::with_value(name, value)
    }

    /// A switch with an optional value: `Some(None)` renders the bare switch
    pub fn switch_or_value<T: ToValue>(name: &'static str, value: Option<Option<T>>) -> Self {
        let value = match value {
            Some(Some(v)) => FieldValue::Value(v.to_value()),
            Some(None) => FieldValue::Switch(true),
            None => FieldValue::Absent,
        };
        Self::with_value(name, value)
    }

    /// A three-state switch: `Some(false)` renders the `no-` form
    pub fn yes_no(name: &'static str, value: Option<bool>) -> Self {
        let value = match value {
            Some(on) => FieldValue::Switch(on),
            None => FieldValue::Absent,
        };
        Self::with_value(name, value)
    }

    /// A nested parameter set, rendered recursively and spliced in verbatim
    pub fn nested(name: &'static str, params: Option<&'a dyn ParamSet>) -> Self {
        let value = match params {
            Some(p) => FieldValue::Nested(p),
            None => FieldValue::Absent,
        };
        Self::with_value(name, value)
    }

    /// Use a short switch name (`-x value`)
    pub fn short(mut self, name: &'static str) -> Self {
        self.short = Some(name);
        self
    }

    /// Use a long switch name (`--name=value`)
    pub fn long(mut self, name: &'static str) -> Self {
        self.long = Some(name);
        self
    }

    /// Append a transform to the field's chain
    pub fn convert(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Field name as declared
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the field renders nothing
    pub fn is_absent(&self) -> bool {
        matches!(self.value, FieldValue::Absent)
    }

    fn is_short(&self) -> bool {
        self.short.is_some()
    }

    fn switch_name(&self) -> String {
        self.short
            .or(self.long)
            .unwrap_or(self.name)
            .replace('_', "-")
    }

    fn apply(&self, value: Value) -> String {
        self.transforms
            .iter()
            .fold(value, |value, transform| transform(value))
            .to_string()
    }

    fn token(&self, negated: bool, value: Option<&str>) -> String {
        let prefix = if self.is_short() { "-" } else { "--" };
        let no = if negated { "no-" } else { "" };
        let mut token = format!("{}{}{}", prefix, no, self.switch_name());
        if let Some(value) = value {
            token.push(if self.is_short() { ' ' } else { '=' });
            token.push_str(value);
        }
        token
    }

    fn render_into(&self, out: &mut Vec<String>) {
        match &self.value {
            FieldValue::Absent => {}
            FieldValue::Nested(params) => {
                let rendered = params.render();
                if !rendered.is_empty() {
                    out.push(rendered);
                }
            }
            FieldValue::Switch(on) => out.push(self.token(!on, None)),
            FieldValue::Value(Value::List(items)) if self.repeated => {
                for item in items {
                    let value = self.apply(item.clone());
                    out.push(self.token(false, Some(&value)));
                }
            }
            FieldValue::Value(value) => {
                let value = self.apply(value.clone());
                out.push(self.token(false, Some(&value)));
            }
        }
    }
}

/// A set of command-line parameters described by a field table
pub trait ParamSet {
    /// Field descriptors, in declaration order
    fn fields(&self) -> Vec<Field<'_>>;

    /// Literal text appended verbatim after all fields
    fn suffix(&self) -> Option<&str> {
        None
    }

    /// Render the set as a command-line string
    fn render(&self) -> String {
        encode(self)
    }
}

/// Encode a parameter set into a single command-line string
pub fn encode<P: ParamSet + ?Sized>(params: &P) -> String {
    let mut tokens = Vec::new();
    for field in params.fields() {
        field.render_into(&mut tokens);
    }
    if let Some(suffix) = params.suffix().filter(|s| !s.is_empty()) {
        tokens.push(suffix.to_string());
    }
    tokens.join(" ")
}

/// Parameters given as literal text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams(pub String);

impl RawParams {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

impl From<&str> for RawParams {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl ParamSet for RawParams {
    fn fields(&self) -> Vec<Field<'_>> {
        Vec::new()
    }

    fn suffix(&self) -> Option<&str> {
        Some(&self.0)
    }
}

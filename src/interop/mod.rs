//! Boundary between host values and the Rhai value model.
//!
//! Every value entering a script call, and every value a script stores in its
//! [`DataStore`], crosses through [`HostValue::into_dynamic`] /
//! [`HostValue::from_dynamic`]. Capability handles travel by reference and stay
//! opaque to scripts.

mod api;
mod capabilities;

use std::collections::BTreeMap;
use std::fmt;

use rhai::{Array, Dynamic, ImmutableString, Map, FLOAT, INT};

use crate::assets::ImageHandle;

pub use api::{register_api, BUILTIN_GLOBALS};
pub use capabilities::{DataStore, Host, InstanceId, RemovalQueue, ScriptHandle};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("values of type '{type_name}' cannot cross the host boundary")]
    Unsupported { type_name: String },
}

/// Opaque host object a script may hold and pass back but never decompose.
#[derive(Clone)]
pub enum Capability {
    Host(Host),
    Image(ImageHandle),
    Data(DataStore),
    Script(ScriptHandle),
}

impl Capability {
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::Host(_) => "Host",
            Capability::Image(_) => "Image",
            Capability::Data(_) => "Data",
            Capability::Script(_) => "Script",
        }
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Capability::Host(a), Capability::Host(b)) => a.ptr_eq(b),
            (Capability::Image(a), Capability::Image(b)) => a.ptr_eq(b),
            (Capability::Data(a), Capability::Data(b)) => a.ptr_eq(b),
            (Capability::Script(a), Capability::Script(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Image(image) => image.fmt(f),
            Capability::Script(handle) => write!(f, "Script({})", handle.name()),
            other => f.write_str(other.kind()),
        }
    }
}

/// Host-side mirror of the script values the bridge supports.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<HostValue>),
    Map(BTreeMap<String, HostValue>),
    Handle(Capability),
}

impl HostValue {
    pub fn into_dynamic(self) -> Dynamic {
        match self {
            HostValue::Unit => Dynamic::UNIT,
            HostValue::Bool(value) => Dynamic::from_bool(value),
            HostValue::Int(value) => Dynamic::from_int(value as INT),
            HostValue::Float(value) => Dynamic::from_float(value as FLOAT),
            HostValue::Str(value) => Dynamic::from(value),
            HostValue::List(items) => {
                Dynamic::from_array(items.into_iter().map(HostValue::into_dynamic).collect::<Array>())
            }
            HostValue::Map(entries) => Dynamic::from_map(
                entries.into_iter().map(|(key, value)| (key.into(), value.into_dynamic())).collect::<Map>(),
            ),
            HostValue::Handle(Capability::Host(host)) => Dynamic::from(host),
            HostValue::Handle(Capability::Image(image)) => Dynamic::from(image),
            HostValue::Handle(Capability::Data(data)) => Dynamic::from(data),
            HostValue::Handle(Capability::Script(handle)) => Dynamic::from(handle),
        }
    }

    pub fn from_dynamic(value: Dynamic) -> Result<Self, MarshalError> {
        let value = value.flatten();
        if value.is_unit() {
            return Ok(HostValue::Unit);
        }
        if let Ok(flag) = value.as_bool() {
            return Ok(HostValue::Bool(flag));
        }
        if let Ok(number) = value.as_int() {
            return Ok(HostValue::Int(number as i64));
        }
        if let Ok(number) = value.as_float() {
            return Ok(HostValue::Float(number as f64));
        }
        if let Ok(ch) = value.as_char() {
            return Ok(HostValue::Str(ch.to_string()));
        }
        if value.is::<ImmutableString>() {
            let text = value.cast::<ImmutableString>();
            return Ok(HostValue::Str(text.to_string()));
        }
        if value.is::<Array>() {
            let items = value.cast::<Array>();
            return items
                .into_iter()
                .map(HostValue::from_dynamic)
                .collect::<Result<Vec<_>, _>>()
                .map(HostValue::List);
        }
        if value.is::<Map>() {
            let entries = value.cast::<Map>();
            return entries
                .into_iter()
                .map(|(key, value)| HostValue::from_dynamic(value).map(|value| (key.to_string(), value)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(HostValue::Map);
        }
        if value.is::<ImageHandle>() {
            return Ok(HostValue::Handle(Capability::Image(value.cast::<ImageHandle>())));
        }
        if value.is::<DataStore>() {
            return Ok(HostValue::Handle(Capability::Data(value.cast::<DataStore>())));
        }
        if value.is::<ScriptHandle>() {
            return Ok(HostValue::Handle(Capability::Script(value.cast::<ScriptHandle>())));
        }
        if value.is::<Host>() {
            return Ok(HostValue::Handle(Capability::Host(value.cast::<Host>())));
        }
        Err(MarshalError::Unsupported { type_name: value.type_name().to_string() })
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Str(value)
    }
}

impl From<ImageHandle> for HostValue {
    fn from(value: ImageHandle) -> Self {
        HostValue::Handle(Capability::Image(value))
    }
}

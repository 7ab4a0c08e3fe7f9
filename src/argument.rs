//! Loosely typed task arguments and the string-keyed parameter store they are
//! coerced into.
//!
//! Workflow definitions pass whatever is convenient as task arguments:
//! strings, numbers, lists, nested records, sometimes types that don't
//! serialize cleanly at all. Coercion maps all of them onto strings and never
//! fails on a value:
//!
//! 1. Text is stored verbatim, including values that encode to a plain JSON
//!    string.
//! 2. Anything else is JSON-encoded.
//! 3. If encoding fails, the value's `Debug` form is stored instead and a
//!    warning is logged. Non-finite floats count as a failure, since JSON
//!    would turn them into `null`.
//!
//! [`ClusterInfo`] is the one exception. It is stored as-is so that the
//! execution strategy can read its fields without parsing anything back.
use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cluster::ClusterInfo;
use crate::error::{Error, ParamError};

/// Reserved parameter holding the task's instance name.
pub const INSTANCE_NAME: &str = "instance_name";
/// Reserved parameter holding the encoded owning workflow.
pub const WORKFLOW_TASK: &str = "workflow_task";

/// Key of a task argument before validation.
///
/// Only [`ArgKey::Str`] is accepted by the factory. The other variants exist
/// for argument maps assembled from dynamic sources (decoded JSON objects,
/// scripting bridges) where a key's type is only known at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgKey {
    Str(String),
    Int(i64),
    Bool(bool),
    Other(String),
}

impl ArgKey {
    fn describe(&self) -> String {
        match self {
            ArgKey::Str(key) => format!("{key:?}"),
            ArgKey::Int(key) => key.to_string(),
            ArgKey::Bool(key) => key.to_string(),
            ArgKey::Other(key) => key.clone(),
        }
    }
}

impl From<&str> for ArgKey {
    fn from(key: &str) -> Self {
        ArgKey::Str(key.to_string())
    }
}

impl From<String> for ArgKey {
    fn from(key: String) -> Self {
        ArgKey::Str(key)
    }
}

impl From<i64> for ArgKey {
    fn from(key: i64) -> Self {
        ArgKey::Int(key)
    }
}

impl From<i32> for ArgKey {
    fn from(key: i32) -> Self {
        ArgKey::Int(key.into())
    }
}

impl From<bool> for ArgKey {
    fn from(key: bool) -> Self {
        ArgKey::Bool(key)
    }
}

/// A value that can be coerced into a string parameter.
///
/// Implemented for everything that is `Serialize + Debug`; the JSON encoding
/// is tried first and `Debug` is the fallback.
pub trait Coerce: Debug + Send + Sync + 'static {
    fn to_json(&self) -> serde_json::Result<String>;

    fn type_name(&self) -> &'static str;
}

impl<T> Coerce for T
where
    T: Serialize + Debug + Send + Sync + 'static,
{
    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// A single task argument.
#[derive(Debug, Clone)]
pub enum Argument {
    /// Stored verbatim.
    Text(String),
    /// Coerced into a string.
    Value(Arc<dyn Coerce>),
    /// Passed through untouched and attached to the task.
    Cluster(Arc<ClusterInfo>),
}

impl Argument {
    pub fn text(text: impl Into<String>) -> Self {
        Argument::Text(text.into())
    }

    pub fn value<T>(value: T) -> Self
    where
        T: Serialize + Debug + Send + Sync + 'static,
    {
        Argument::Value(Arc::new(value))
    }

    pub fn cluster(info: impl Into<Arc<ClusterInfo>>) -> Self {
        Argument::Cluster(info.into())
    }
}

impl From<&str> for Argument {
    fn from(text: &str) -> Self {
        Argument::Text(text.to_string())
    }
}

impl From<String> for Argument {
    fn from(text: String) -> Self {
        Argument::Text(text)
    }
}

impl From<ClusterInfo> for Argument {
    fn from(info: ClusterInfo) -> Self {
        Argument::Cluster(Arc::new(info))
    }
}

impl From<Arc<ClusterInfo>> for Argument {
    fn from(info: Arc<ClusterInfo>) -> Self {
        Argument::Cluster(info)
    }
}

macro_rules! impl_argument_value {
    ($($T:ty),*) => {
        $(
            impl From<$T> for Argument {
                fn from(value: $T) -> Self {
                    Argument::value(value)
                }
            }
        )*
    };
}

impl_argument_value!(
    bool,
    i32,
    i64,
    u32,
    u64,
    usize,
    f64,
    Vec<String>,
    serde_json::Value
);

/// An ordered collection of task arguments.
///
/// Setting a key that is already present replaces its value in place.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    entries: Vec<(ArgKey, Argument)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<ArgKey>, value: impl Into<Argument>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<ArgKey>, value: impl Into<Argument>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArgKey, &Argument)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl<K, V> FromIterator<(K, V)> for Arguments
where
    K: Into<ArgKey>,
    V: Into<Argument>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut arguments = Arguments::new();
        for (key, value) in iter {
            arguments.set(key, value);
        }
        arguments
    }
}

/// A coerced parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Cluster(Arc<ClusterInfo>),
}

/// String-keyed parameter store a task is constructed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    map: BTreeMap<String, Param>,
}

impl Params {
    pub(crate) fn insert_text(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.map.insert(key.into(), Param::Text(text.into()));
    }

    pub(crate) fn insert_cluster(&mut self, key: impl Into<String>, info: Arc<ClusterInfo>) {
        self.map.insert(key.into(), Param::Cluster(info));
    }

    /// Returns the text stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.map.get(key)? {
            Param::Text(text) => Some(text),
            Param::Cluster(_) => None,
        }
    }

    pub fn require(&self, key: &str) -> Result<&str, ParamError> {
        match self.map.get(key) {
            Some(Param::Text(text)) => Ok(text),
            Some(Param::Cluster(_)) => Err(ParamError::NotText(key.to_string())),
            None => Err(ParamError::Missing(key.to_string())),
        }
    }

    /// Decodes a parameter back into a typed value.
    ///
    /// The stored text is read as JSON first. Text that isn't JSON is treated
    /// as a JSON string, so `decode::<String>` works for verbatim text too.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T, ParamError> {
        let text = self.require(key)?;

        serde_json::from_str(text)
            .or_else(|err| {
                serde_json::from_value(serde_json::Value::String(text.to_string()))
                    .map_err(|_| err)
            })
            .map_err(|err| ParamError::Decode {
                key: key.to_string(),
                source: err.into(),
            })
    }

    /// Parses a parameter with [`FromStr`].
    pub fn parse<T>(&self, key: &str) -> Result<T, ParamError>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.require(key)?
            .parse()
            .map_err(|err: T::Err| ParamError::Decode {
                key: key.to_string(),
                source: err.into(),
            })
    }

    pub fn cluster(&self, key: &str) -> Option<&Arc<ClusterInfo>> {
        match self.map.get(key)? {
            Param::Cluster(info) => Some(info),
            Param::Text(_) => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Coerces a single value. Never fails.
pub fn coerce(key: &str, value: &dyn Coerce) -> String {
    let err = match value.to_json() {
        Ok(json) if json.starts_with('"') => {
            return serde_json::from_str::<String>(&json).unwrap_or(json);
        }
        Ok(json) if json == "null" && is_non_finite(value) => {
            "non-finite float has no JSON encoding".to_string()
        }
        Ok(json) => return json,
        Err(err) => err.to_string(),
    };

    tracing::warn!(
        key,
        type_name = value.type_name(),
        "Argument couldn't be encoded as JSON, storing its debug form instead: {err}"
    );

    let text = format!("{value:?}");
    if text.is_empty() {
        value.type_name().to_string()
    } else {
        text
    }
}

/// `inf`, `-inf` and `NaN` are what `Debug` prints for floats JSON can't hold.
fn is_non_finite(value: &dyn Coerce) -> bool {
    format!("{value:?}")
        .parse::<f64>()
        .is_ok_and(|float| !float.is_finite())
}

/// Validates and coerces a full argument set.
///
/// Keys are checked before any value is touched, so an invalid key leaves
/// nothing half-built. Returns the store together with the last
/// [`ClusterInfo`] seen, if any.
pub(crate) fn coerce_arguments(
    arguments: Arguments,
) -> Result<(Params, Option<Arc<ClusterInfo>>), Error> {
    let entries = arguments
        .entries
        .into_iter()
        .map(|(key, value)| match key {
            ArgKey::Str(key) => Ok((key, value)),
            other => Err(Error::InvalidKey(other.describe())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut params = Params::default();
    let mut cluster = None;

    for (key, value) in entries {
        match value {
            Argument::Text(text) => params.insert_text(key, text),
            Argument::Value(value) => {
                let text = coerce(&key, value.as_ref());
                params.insert_text(key, text);
            }
            Argument::Cluster(info) => {
                cluster = Some(info.clone());
                params.insert_cluster(key, info);
            }
        }
    }

    Ok((params, cluster))
}

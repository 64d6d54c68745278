//! String-keyed option values and setter vocabularies.
//!
//! Every options type exposes `set(field, value)`. The accepted field
//! names live in an [`OptionRegistry`], an insertion-ordered map from name
//! to setter function. Unknown names are rejected with the full
//! vocabulary in the error, in registration order.

use indexmap::IndexMap;

use crate::error::ConfigError;

/// A dynamically typed option value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptionValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer count or code.
    Int(i64),
    /// Real-valued tolerance or weight.
    Float(f64),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl OptionValue {
    /// Interpret as a flag. Integers `0` and `1` are accepted.
    pub fn as_bool(self, field: &str) -> Result<bool, ConfigError> {
        match self {
            Self::Bool(b) => Ok(b),
            Self::Int(0) => Ok(false),
            Self::Int(1) => Ok(true),
            _ => Err(ConfigError::OptionType {
                field: field.to_string(),
                expected: "bool",
            }),
        }
    }

    /// Interpret as a non-negative count.
    pub fn as_usize(self, field: &str) -> Result<usize, ConfigError> {
        match self {
            Self::Int(i) => usize::try_from(i).map_err(|_| ConfigError::OptionRange {
                field: field.to_string(),
                reason: format!("{i} is negative"),
            }),
            _ => Err(ConfigError::OptionType {
                field: field.to_string(),
                expected: "integer",
            }),
        }
    }

    /// Interpret as a finite real. Integers are widened.
    pub fn as_f64(self, field: &str) -> Result<f64, ConfigError> {
        let v = match self {
            Self::Float(v) => v,
            Self::Int(i) => i as f64,
            Self::Bool(_) => {
                return Err(ConfigError::OptionType {
                    field: field.to_string(),
                    expected: "real",
                })
            }
        };
        if v.is_finite() {
            Ok(v)
        } else {
            Err(ConfigError::OptionRange {
                field: field.to_string(),
                reason: format!("{v} is not finite"),
            })
        }
    }

    /// Interpret as a strictly positive real.
    pub fn as_positive(self, field: &str) -> Result<f64, ConfigError> {
        let v = self.as_f64(field)?;
        if v > 0.0 {
            Ok(v)
        } else {
            Err(ConfigError::OptionRange {
                field: field.to_string(),
                reason: format!("{v} must be > 0"),
            })
        }
    }

    /// Interpret as a non-negative real.
    pub fn as_non_negative(self, field: &str) -> Result<f64, ConfigError> {
        let v = self.as_f64(field)?;
        if v >= 0.0 {
            Ok(v)
        } else {
            Err(ConfigError::OptionRange {
                field: field.to_string(),
                reason: format!("{v} must be >= 0"),
            })
        }
    }

    /// Interpret as a count of at least one.
    pub fn as_count(self, field: &str) -> Result<usize, ConfigError> {
        let n = self.as_usize(field)?;
        if n >= 1 {
            Ok(n)
        } else {
            Err(ConfigError::OptionRange {
                field: field.to_string(),
                reason: "must be at least 1".to_string(),
            })
        }
    }
}

/// A setter applies one already-named value to a target.
pub type Setter<T> = fn(&mut T, OptionValue) -> Result<(), ConfigError>;

/// Insertion-ordered field vocabulary of an options type.
pub struct OptionRegistry<T> {
    setters: IndexMap<&'static str, Setter<T>>,
}

impl<T> OptionRegistry<T> {
    /// An empty vocabulary.
    pub fn new() -> Self {
        Self {
            setters: IndexMap::new(),
        }
    }

    /// Register `name`. Later registrations of the same name replace
    /// earlier ones but keep the original position.
    pub fn with(mut self, name: &'static str, setter: Setter<T>) -> Self {
        self.setters.insert(name, setter);
        self
    }

    /// Apply `value` to `field` of `target`.
    pub fn set(&self, target: &mut T, field: &str, value: OptionValue) -> Result<(), ConfigError> {
        match self.setters.get(field) {
            Some(setter) => setter(target, value),
            None => Err(self.unknown(field)),
        }
    }

    /// `true` if `field` is in the vocabulary.
    pub fn contains(&self, field: &str) -> bool {
        self.setters.contains_key(field)
    }

    /// Accepted names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.setters.keys().copied()
    }

    /// The error for a field outside this vocabulary.
    pub fn unknown(&self, field: &str) -> ConfigError {
        ConfigError::UnknownOption {
            field: field.to_string(),
            accepted: self.names().collect(),
        }
    }
}

impl<T> Default for OptionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

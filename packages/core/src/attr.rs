//! Formatting of dynamic attribute values into markup.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::rc::Rc;

use crate::vnode::VAttribute;

/// A dynamically typed attribute value as produced by generated build code.
#[derive(Clone)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Uint(u64),
    Float32(f32),
    Float64(f64),
    /// Flag attribute: present with an empty value when true, absent when false.
    Bool(bool),
    /// Anything that can describe itself as text. `None` is a nil-holding
    /// wrapper and omits the attribute.
    Describe(Option<Rc<dyn Display>>),
    /// Nullable value, formatted one level down. `None` omits the attribute.
    Optional(Option<Box<AttrValue>>),
    /// Pre-rendered generic fallback.
    Other(String),
}

impl AttrValue {
    pub fn describe<T: Display + 'static>(value: T) -> Self {
        AttrValue::Describe(Some(Rc::new(value)))
    }

    pub fn debug<T: Debug + ?Sized>(value: &T) -> Self {
        AttrValue::Other(format!("{:?}", value))
    }

    /// The attribute text, or `None` when the attribute must not appear.
    pub fn render(&self) -> Option<String> {
        match self {
            AttrValue::Str(s) => Some(s.clone()),
            AttrValue::Int(v) => Some(v.to_string()),
            AttrValue::Uint(v) => Some(v.to_string()),
            AttrValue::Float32(v) => Some(format!("{:.6}", v)),
            AttrValue::Float64(v) => Some(format!("{:.6}", v)),
            AttrValue::Bool(true) => Some(String::new()),
            AttrValue::Bool(false) => None,
            AttrValue::Describe(Some(v)) => Some(v.to_string()),
            AttrValue::Describe(None) => None,
            AttrValue::Optional(Some(inner)) => inner.render(),
            AttrValue::Optional(None) => None,
            AttrValue::Other(s) => Some(s.clone()),
        }
    }
}

impl Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            AttrValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            AttrValue::Uint(v) => f.debug_tuple("Uint").field(v).finish(),
            AttrValue::Float32(v) => f.debug_tuple("Float32").field(v).finish(),
            AttrValue::Float64(v) => f.debug_tuple("Float64").field(v).finish(),
            AttrValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            AttrValue::Describe(v) => f
                .debug_tuple("Describe")
                .field(&v.as_ref().map(|d| d.to_string()))
                .finish(),
            AttrValue::Optional(v) => f.debug_tuple("Optional").field(v).finish(),
            AttrValue::Other(s) => f.debug_tuple("Other").field(s).finish(),
        }
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<&String> for AttrValue {
    fn from(v: &String) -> Self {
        AttrValue::Str(v.clone())
    }
}

impl From<char> for AttrValue {
    fn from(v: char) -> Self {
        AttrValue::Str(v.to_string())
    }
}

macro_rules! attr_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for AttrValue {
            fn from(v: $t) -> Self {
                AttrValue::Int(v as i64)
            }
        })*
    };
}

macro_rules! attr_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for AttrValue {
            fn from(v: $t) -> Self {
                AttrValue::Uint(v as u64)
            }
        })*
    };
}

attr_from_signed!(i8, i16, i32, i64, isize);
attr_from_unsigned!(u8, u16, u32, u64, usize);

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float32(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float64(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        AttrValue::Optional(v.map(|inner| Box::new(inner.into())))
    }
}

/// Contributes a whole set of attributes to an element at once.
pub trait AttributeLister {
    fn attribute_list(&self) -> Vec<VAttribute>;
}

impl AttributeLister for BTreeMap<String, String> {
    fn attribute_list(&self) -> Vec<VAttribute> {
        self.iter()
            .map(|(k, v)| VAttribute::new(k.clone(), v.clone()))
            .collect()
    }
}

impl AttributeLister for BTreeMap<String, AttrValue> {
    fn attribute_list(&self) -> Vec<VAttribute> {
        self.iter()
            .filter_map(|(k, v)| v.render().map(|val| VAttribute::new(k.clone(), val)))
            .collect()
    }
}

impl AttributeLister for Vec<VAttribute> {
    fn attribute_list(&self) -> Vec<VAttribute> {
        self.clone()
    }
}

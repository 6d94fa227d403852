//! The generic FBX record tree.

use std::borrow::Cow;
use std::fmt;

use crate::error::{FbxError, Result};
use crate::types::{Property, PropertyType};

/// Separator between an object's name and its class in name strings.
pub const NAME_CLASS_SEP: &str = "\x00\x01";

/// One FBX record: an id, positional typed properties and ordered children.
///
/// The root of a document is an element with an empty id and no properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    id: Vec<u8>,
    properties: Vec<Property>,
    children: Vec<Element>,
}

/// A loosely typed value, converted and checked by [`Element::try_add`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Seq(Vec<HostValue>),
}

impl HostValue {
    fn describe(&self) -> String {
        match self {
            HostValue::Bool(v) => format!("bool {}", v),
            HostValue::Int(v) => format!("integer {}", v),
            HostValue::Float(v) => format!("float {}", v),
            HostValue::Text(_) => "string".to_owned(),
            HostValue::Bytes(b) => format!("{} bytes", b.len()),
            HostValue::Seq(items) => format!("sequence of {} items", items.len()),
        }
    }
}

fn mismatch(expected: PropertyType, value: &HostValue) -> FbxError {
    FbxError::TypeMismatch { expected, found: value.describe() }
}

fn int_in<T: TryFrom<i64>>(expected: PropertyType, value: &HostValue) -> Result<T> {
    match *value {
        HostValue::Int(v) => T::try_from(v).map_err(|_| mismatch(expected, value)),
        _ => Err(mismatch(expected, value)),
    }
}

fn float_of(expected: PropertyType, value: &HostValue) -> Result<f64> {
    match *value {
        HostValue::Float(v) => Ok(v),
        _ => Err(mismatch(expected, value)),
    }
}

fn seq_of<T>(
    expected: PropertyType,
    value: &HostValue,
    convert: impl Fn(&HostValue) -> Result<T>,
) -> Result<Vec<T>> {
    match value {
        HostValue::Seq(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                convert(item).map_err(|_| FbxError::TypeMismatch {
                    expected,
                    found: format!("{} at index {}", item.describe(), i),
                })
            })
            .collect(),
        _ => Err(mismatch(expected, value)),
    }
}

impl Element {
    pub fn new<I: Into<Vec<u8>>>(id: I) -> Element {
        Element { id: id.into(), properties: Vec::new(), children: Vec::new() }
    }

    /// The unnamed document root.
    pub fn root() -> Element {
        Element::default()
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// The id for display and logging.
    pub fn id_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.id)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// One type tag per property, in property order.
    pub fn property_types(&self) -> Vec<u8> {
        self.properties.iter().map(|p| p.property_type().tag()).collect()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn add_property<P: Into<Property>>(&mut self, property: P) -> &mut Element {
        self.properties.push(property.into());
        self
    }

    pub fn add_bool(&mut self, value: bool) -> &mut Element {
        self.add_property(Property::Bool(value))
    }

    pub fn add_int16(&mut self, value: i16) -> &mut Element {
        self.add_property(Property::I16(value))
    }

    pub fn add_int32(&mut self, value: i32) -> &mut Element {
        self.add_property(Property::I32(value))
    }

    pub fn add_int64(&mut self, value: i64) -> &mut Element {
        self.add_property(Property::I64(value))
    }

    pub fn add_float32(&mut self, value: f32) -> &mut Element {
        self.add_property(Property::F32(value))
    }

    pub fn add_float64(&mut self, value: f64) -> &mut Element {
        self.add_property(Property::F64(value))
    }

    pub fn add_bytes<B: Into<Vec<u8>>>(&mut self, value: B) -> &mut Element {
        self.add_property(Property::Bytes(value.into()))
    }

    pub fn add_string<S: Into<String>>(&mut self, value: S) -> &mut Element {
        self.add_property(Property::String(value.into()))
    }

    pub fn add_int32_array<A: Into<Vec<i32>>>(&mut self, values: A) -> &mut Element {
        self.add_property(Property::I32Array(values.into()))
    }

    pub fn add_int64_array<A: Into<Vec<i64>>>(&mut self, values: A) -> &mut Element {
        self.add_property(Property::I64Array(values.into()))
    }

    pub fn add_float32_array<A: Into<Vec<f32>>>(&mut self, values: A) -> &mut Element {
        self.add_property(Property::F32Array(values.into()))
    }

    pub fn add_float64_array<A: Into<Vec<f64>>>(&mut self, values: A) -> &mut Element {
        self.add_property(Property::F64Array(values.into()))
    }

    pub fn add_bool_array<A: Into<Vec<bool>>>(&mut self, values: A) -> &mut Element {
        self.add_property(Property::BoolArray(values.into()))
    }

    pub fn add_byte_array<A: Into<Vec<u8>>>(&mut self, values: A) -> &mut Element {
        self.add_property(Property::ByteArray(values.into()))
    }

    /// Append a loosely typed value as the requested wire type.
    ///
    /// Integers must fit the target width, floats are only accepted for float
    /// types, and sequences are converted element by element into the fixed
    /// width array type.
    pub fn try_add(&mut self, ty: PropertyType, value: HostValue) -> Result<&mut Element> {
        let property = match ty {
            PropertyType::Bool => match value {
                HostValue::Bool(v) => Property::Bool(v),
                _ => return Err(mismatch(ty, &value)),
            },
            PropertyType::I16 => Property::I16(int_in(ty, &value)?),
            PropertyType::I32 => Property::I32(int_in(ty, &value)?),
            PropertyType::I64 => Property::I64(int_in(ty, &value)?),
            PropertyType::F32 => Property::F32(float_of(ty, &value)? as f32),
            PropertyType::F64 => Property::F64(float_of(ty, &value)?),
            PropertyType::Bytes => match value {
                HostValue::Bytes(b) => Property::Bytes(b),
                _ => return Err(mismatch(ty, &value)),
            },
            PropertyType::String => match value {
                HostValue::Text(s) => Property::String(s),
                HostValue::Bytes(b) => match String::from_utf8(b) {
                    Ok(s) => Property::String(s),
                    Err(e) => return Err(mismatch(ty, &HostValue::Bytes(e.into_bytes()))),
                },
                _ => return Err(mismatch(ty, &value)),
            },
            PropertyType::I32Array => Property::I32Array(seq_of(ty, &value, |v| int_in(ty, v))?),
            PropertyType::I64Array => Property::I64Array(seq_of(ty, &value, |v| int_in(ty, v))?),
            PropertyType::F32Array => {
                Property::F32Array(seq_of(ty, &value, |v| float_of(ty, v).map(|f| f as f32))?)
            }
            PropertyType::F64Array => Property::F64Array(seq_of(ty, &value, |v| float_of(ty, v))?),
            PropertyType::BoolArray => Property::BoolArray(seq_of(ty, &value, |v| match *v {
                HostValue::Bool(b) => Ok(b),
                _ => Err(mismatch(ty, v)),
            })?),
            PropertyType::ByteArray => match value {
                HostValue::Bytes(b) => Property::ByteArray(b),
                other => Property::ByteArray(seq_of(ty, &other, |v| int_in(ty, v))?),
            },
        };
        Ok(self.add_property(property))
    }

    /// Drop all properties so they can be appended again.
    pub fn clear_properties(&mut self) {
        self.properties.clear();
    }

    pub fn push_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append an empty child and return it.
    pub fn add_child<I: Into<Vec<u8>>>(&mut self, id: I) -> &mut Element {
        self.push_child(Element::new(id))
    }

    /// Append a child holding a single property.
    pub fn add_child_with<I: Into<Vec<u8>>, P: Into<Property>>(&mut self, id: I, property: P) -> &mut Element {
        let child = self.add_child(id);
        child.add_property(property);
        child
    }

    pub fn find_first<I: AsRef<[u8]>>(&self, id: I) -> Option<&Element> {
        self.children.iter().find(|e| e.id == id.as_ref())
    }

    pub fn find_iter<'a, I: AsRef<[u8]> + 'a>(&'a self, id: I) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |e| e.id == id.as_ref())
    }

    pub fn first_property(&self) -> Option<&Property> {
        self.properties.first()
    }

    /// The single string of the first child named `id`. Children without any
    /// property are treated as absent.
    pub fn find_first_string<I: AsRef<[u8]>>(&self, id: I) -> Result<Option<&str>> {
        match self.find_first(id).map(|e| (e, e.properties.as_slice())) {
            None | Some((_, [])) => Ok(None),
            Some((_, [Property::String(s)])) => Ok(Some(s.as_str())),
            Some((e, _)) => Err(e.unexpected("expected a single string")),
        }
    }

    /// The single blob of the first child named `id`.
    pub fn find_first_bytes<I: AsRef<[u8]>>(&self, id: I) -> Result<Option<&[u8]>> {
        match self.find_first(id).map(|e| (e, e.properties.as_slice())) {
            None | Some((_, [])) => Ok(None),
            Some((_, [Property::Bytes(b)])) => Ok(Some(b.as_slice())),
            Some((e, _)) => Err(e.unexpected("expected a single blob")),
        }
    }

    /// Object uuid, stored as the leading int64 of object records.
    pub fn uuid(&self) -> Option<i64> {
        match self.properties.first() {
            Some(Property::I64(uuid)) => Some(*uuid),
            _ => None,
        }
    }

    /// Split the second-to-last property, `name\x00\x01class`, into its parts.
    pub fn split_name_class(&self) -> Result<(&str, &str)> {
        let n = self.properties.len();
        let joined = match n.checked_sub(2).map(|i| &self.properties[i]) {
            Some(Property::String(s)) => s,
            _ => return Err(self.unexpected("no name/class string")),
        };
        joined
            .split_once(NAME_CLASS_SEP)
            .ok_or_else(|| self.unexpected("name has no class separator"))
    }

    pub(crate) fn unexpected(&self, reason: &str) -> FbxError {
        FbxError::UnexpectedProperty { name: self.id_str().into_owned(), reason: reason.to_owned() }
    }
}

/// Join an object name and class the way object records store them.
pub fn name_class(name: &str, class: &str) -> String {
    let mut joined = String::with_capacity(name.len() + class.len() + NAME_CLASS_SEP.len());
    joined.push_str(name);
    joined.push_str(NAME_CLASS_SEP);
    joined.push_str(class);
    joined
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: props[{}=", self.id_str(), self.properties.len())?;
        for (i, p) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match p {
                Property::String(s) => write!(f, "{:?}", s)?,
                Property::Bytes(b) => write!(f, "<{} bytes>", b.len())?,
                Property::Bool(v) => write!(f, "{}", v)?,
                Property::I16(v) => write!(f, "{}", v)?,
                Property::I32(v) => write!(f, "{}", v)?,
                Property::I64(v) => write!(f, "{}", v)?,
                Property::F32(v) => write!(f, "{}", v)?,
                Property::F64(v) => write!(f, "{}", v)?,
                array => write!(f, "<{:?} array>", array.property_type())?,
            }
        }
        f.write_str("], elems=(")?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&child.id_str())?;
        }
        f.write_str(")")
    }
}

//! `Properties70` blocks: typed lookups and the `P` record builder.
//!
//! A `P` record stores `name, type name, label, flags` as strings followed by
//! the value properties. Objects only store what differs from their
//! template, so lookups go through a [`PropertySet`] chaining both, and
//! exports write through a [`PropertyTemplate`].

use crate::element::{Element, HostValue};
use crate::error::{FbxError, Result};
use crate::types::{Property, PropertyType};

pub const PROPERTIES70: &str = "Properties70";

/// Ordered list of `Properties70` elements searched front to back.
#[derive(Debug, Clone, Default)]
pub struct PropertySet<'a> {
    scopes: Vec<&'a Element>,
}

fn text(p: &Element, index: usize) -> Option<&str> {
    p.properties().get(index).and_then(Property::as_str)
}

impl<'a> PropertySet<'a> {
    pub fn new(properties70: &'a Element) -> PropertySet<'a> {
        PropertySet { scopes: vec![properties70] }
    }

    /// Properties of `object`, falling back to those of `template`, which is
    /// a `PropertyTemplate` element.
    pub fn for_object(object: &'a Element, template: Option<&'a Element>) -> PropertySet<'a> {
        let scopes = object
            .find_first(PROPERTIES70)
            .into_iter()
            .chain(template.and_then(|t| t.find_first(PROPERTIES70)))
            .collect();
        PropertySet { scopes }
    }

    /// Append a fallback scope.
    pub fn then(mut self, properties70: &'a Element) -> PropertySet<'a> {
        self.scopes.push(properties70);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// First `P` record named `name`. User-defined properties (flags
    /// containing `U`) never shadow built-in ones.
    pub fn find(&self, name: &str) -> Option<&'a Element> {
        self.scopes
            .iter()
            .flat_map(|&scope| scope.children().iter())
            .filter(|p| p.id() == b"P")
            .find(|p| text(p, 0) == Some(name) && !text(p, 3).map_or(false, |flags| flags.contains('U')))
    }

    pub fn color_rgb(&self, name: &str) -> Result<Option<[f64; 3]>> {
        self.get(name, |p| {
            match (text(p, 1), text(p, 2)) {
                // 7.3 files
                (Some("Color"), Some("")) | (Some("ColorRGB"), Some("Color")) => {}
                _ => return Err(unexpected(name, "not a color")),
            }
            triple(name, p)
        })
    }

    pub fn vector_3d(&self, name: &str) -> Result<Option<[f64; 3]>> {
        self.get(name, |p| triple(name, p))
    }

    pub fn number(&self, name: &str) -> Result<Option<f64>> {
        self.get(name, |p| {
            match (text(p, 1), text(p, 2)) {
                (Some("double"), Some("Number")) | (Some("Number"), Some("")) => {}
                _ => return Err(unexpected(name, "not a number")),
            }
            float64(name, p, 4)
        })
    }

    /// Integer value, widened to i64. `int` and `ULongLong` records are
    /// checked for their label, other type names only for the value type.
    pub fn integer(&self, name: &str) -> Result<Option<i64>> {
        self.get(name, |p| {
            match (text(p, 1), text(p, 2)) {
                (Some("int"), Some(label)) if label != "Integer" => {
                    return Err(unexpected(name, "int without Integer label"))
                }
                (Some("ULongLong"), Some(label)) if !label.is_empty() => {
                    return Err(unexpected(name, "ULongLong with a label"))
                }
                _ => {}
            }
            match p.properties().get(4) {
                Some(Property::I32(v)) => Ok(i64::from(*v)),
                Some(Property::I64(v)) => Ok(*v),
                _ => Err(unexpected(name, "value is not an integer")),
            }
        })
    }

    /// `Bool` is the type name animated properties are stored with. Flags
    /// are not checked.
    pub fn bool(&self, name: &str) -> Result<Option<bool>> {
        self.get(name, |p| {
            match (text(p, 1), text(p, 2)) {
                (Some("bool"), Some("")) | (Some("Bool"), Some("")) => {}
                _ => return Err(unexpected(name, "not a bool")),
            }
            match p.properties().get(4) {
                Some(Property::I32(0)) => Ok(false),
                Some(Property::I32(1)) => Ok(true),
                Some(Property::I32(_)) => Err(unexpected(name, "bool value out of range")),
                _ => Err(unexpected(name, "value is not an int32")),
            }
        })
    }

    pub fn enumeration(&self, name: &str) -> Result<Option<i32>> {
        self.get(name, |p| {
            expect_plain(name, p, "enum")?;
            match p.properties().get(4) {
                Some(Property::I32(v)) => Ok(*v),
                _ => Err(unexpected(name, "value is not an int32")),
            }
        })
    }

    pub fn visibility(&self, name: &str) -> Result<Option<f64>> {
        self.get(name, |p| {
            if (text(p, 1), text(p, 2)) != (Some("Visibility"), Some("")) {
                return Err(unexpected(name, "not a visibility"));
            }
            float64(name, p, 4)
        })
    }

    fn get<T>(&self, name: &str, decode: impl FnOnce(&'a Element) -> Result<T>) -> Result<Option<T>> {
        self.find(name).map(decode).transpose()
    }
}

fn unexpected(name: &str, reason: &str) -> FbxError {
    FbxError::UnexpectedProperty { name: name.to_owned(), reason: reason.to_owned() }
}

fn expect_plain(name: &str, p: &Element, type_name: &str) -> Result<()> {
    if (text(p, 1), text(p, 2), text(p, 3)) != (Some(type_name), Some(""), Some("")) {
        return Err(unexpected(name, &format!("not a plain {}", type_name)));
    }
    Ok(())
}

fn float64(name: &str, p: &Element, index: usize) -> Result<f64> {
    match p.properties().get(index) {
        Some(Property::F64(v)) => Ok(*v),
        _ => Err(unexpected(name, "value is not a float64")),
    }
}

fn triple(name: &str, p: &Element) -> Result<[f64; 3]> {
    Ok([float64(name, p, 4)?, float64(name, p, 5)?, float64(name, p, 6)?])
}

/// Known property types, with the type name and label they are stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Bool,
    Integer,
    ULongLong,
    Double,
    Number,
    Enum,
    Vector3D,
    Vector,
    ColorRGB,
    Color,
    String,
    StringUrl,
    Timestamp,
    DateTime,
    Object,
    Compound,
    LclTranslation,
    LclRotation,
    LclScaling,
    Visibility,
    VisibilityInheritance,
    Roll,
    OpticalCenterX,
    OpticalCenterY,
    FieldOfView,
    FieldOfViewX,
    FieldOfViewY,
}

/// Value properties following the four header strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Nothing,
    Int32,
    Int64,
    Float64,
    Float64x3,
    Text,
}

impl PropertyKind {
    pub fn type_name(self) -> &'static str {
        self.layout().0
    }

    pub fn label(self) -> &'static str {
        self.layout().1
    }

    fn layout(self) -> (&'static str, &'static str, Shape) {
        use PropertyKind::*;
        match self {
            // Stored as int32 even though a bool tag exists.
            Bool => ("bool", "", Shape::Int32),
            Integer => ("int", "Integer", Shape::Int32),
            ULongLong => ("ULongLong", "", Shape::Int64),
            Double => ("double", "Number", Shape::Float64),
            Number => ("Number", "", Shape::Float64),
            Enum => ("enum", "", Shape::Int32),
            Vector3D => ("Vector3D", "Vector", Shape::Float64x3),
            Vector => ("Vector", "", Shape::Float64x3),
            ColorRGB => ("ColorRGB", "Color", Shape::Float64x3),
            Color => ("Color", "", Shape::Float64x3),
            String => ("KString", "", Shape::Text),
            StringUrl => ("KString", "Url", Shape::Text),
            Timestamp => ("KTime", "Time", Shape::Int64),
            DateTime => ("DateTime", "", Shape::Text),
            Object => ("object", "", Shape::Nothing),
            Compound => ("Compound", "", Shape::Nothing),
            LclTranslation => ("Lcl Translation", "", Shape::Float64x3),
            LclRotation => ("Lcl Rotation", "", Shape::Float64x3),
            LclScaling => ("Lcl Scaling", "", Shape::Float64x3),
            Visibility => ("Visibility", "", Shape::Float64),
            VisibilityInheritance => ("Visibility Inheritance", "", Shape::Int32),
            Roll => ("Roll", "", Shape::Float64),
            OpticalCenterX => ("OpticalCenterX", "", Shape::Float64),
            OpticalCenterY => ("OpticalCenterY", "", Shape::Float64),
            FieldOfView => ("FieldOfView", "", Shape::Float64),
            FieldOfViewX => ("FieldOfViewX", "", Shape::Float64),
            FieldOfViewY => ("FieldOfViewY", "", Shape::Float64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    pub animatable: bool,
    pub animated: bool,
    pub custom: bool,
}

impl PropertyFlags {
    pub const ANIMATABLE: PropertyFlags = PropertyFlags { animatable: true, animated: false, custom: false };

    /// The flags string stored as the fourth `P` property. Custom properties
    /// are always written as `A+U`.
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyFlags { custom: true, .. } => "A+U",
            PropertyFlags { animatable: true, animated: true, .. } => "A+",
            PropertyFlags { animatable: true, .. } => "A",
            _ => "",
        }
    }
}

impl Element {
    /// Append a `P` record to this `Properties70` element. `value` must be
    /// `None` for kinds without a value and a three item sequence for vectors
    /// and colors.
    pub fn set_p70(
        &mut self,
        kind: PropertyKind,
        name: &str,
        value: Option<HostValue>,
        flags: PropertyFlags,
    ) -> Result<&mut Element> {
        let (type_name, label, shape) = kind.layout();
        let mut p = Element::new("P");
        p.add_string(name).add_string(type_name).add_string(label).add_string(flags.as_str());

        match (shape, value) {
            (Shape::Nothing, None) => {}
            (Shape::Int32, Some(HostValue::Bool(b))) if kind == PropertyKind::Bool => {
                p.add_int32(i32::from(b));
            }
            (Shape::Int32, Some(v)) => {
                p.try_add(PropertyType::I32, v)?;
            }
            (Shape::Int64, Some(v)) => {
                p.try_add(PropertyType::I64, v)?;
            }
            (Shape::Float64, Some(v)) => {
                p.try_add(PropertyType::F64, v)?;
            }
            (Shape::Text, Some(v)) => {
                p.try_add(PropertyType::String, v)?;
            }
            (Shape::Float64x3, Some(HostValue::Seq(items))) if items.len() == 3 => {
                for item in items {
                    p.try_add(PropertyType::F64, item)?;
                }
            }
            (shape, value) => {
                let expected = match shape {
                    Shape::Int32 => PropertyType::I32,
                    Shape::Int64 => PropertyType::I64,
                    Shape::Text => PropertyType::String,
                    _ => PropertyType::F64,
                };
                let found = match value {
                    None => "no value".to_owned(),
                    Some(v) => format!("{:?} for {:?}", v, kind),
                };
                return Err(FbxError::TypeMismatch { expected, found });
            }
        }
        Ok(self.push_child(p))
    }

    /// Append a `Compound` record and return a writer for its members.
    pub fn set_p70_compound(&mut self, name: &str, custom: bool) -> Result<Compound<'_>> {
        let flags = PropertyFlags { custom, ..PropertyFlags::default() };
        self.set_p70(PropertyKind::Compound, name, None, flags)?;
        Ok(Compound { properties70: self, name: name.to_owned() })
    }
}

/// Default value of one template property.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateValue {
    pub kind: PropertyKind,
    pub value: Option<HostValue>,
    pub animatable: bool,
}

/// Export-side property template. Objects written against it only carry the
/// values that differ from the defaults, as long as the template itself is
/// written to `Definitions`.
#[derive(Debug, Clone, Default)]
pub struct PropertyTemplate {
    properties: Vec<(String, TemplateValue)>,
    written: bool,
}

impl PropertyTemplate {
    pub fn new(written: bool) -> PropertyTemplate {
        PropertyTemplate { properties: Vec::new(), written }
    }

    /// Add a default, replacing any previous one of the same name.
    pub fn insert(
        &mut self,
        name: &str,
        kind: PropertyKind,
        value: Option<HostValue>,
        animatable: bool,
    ) -> &mut Self {
        let default = TemplateValue { kind, value, animatable };
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = default,
            None => self.properties.push((name.to_owned(), default)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Append every default to `properties70`, the body of the template's
    /// `PropertyTemplate` record.
    pub fn write_defaults(&self, properties70: &mut Element) -> Result<()> {
        for (name, default) in &self.properties {
            properties70.set_p70(default.kind, name, default.value.clone(), default.flags())?;
        }
        Ok(())
    }

    /// Start writing one object's properties into `properties70`.
    pub fn object<'e>(&self, properties70: &'e mut Element) -> ObjectProperties<'_, 'e> {
        ObjectProperties { template: self, properties70, written: vec![self.written; self.properties.len()] }
    }
}

impl TemplateValue {
    fn flags(&self) -> PropertyFlags {
        PropertyFlags { animatable: self.animatable, ..PropertyFlags::default() }
    }
}

/// One object's `Properties70`, written against a [`PropertyTemplate`].
/// Call [`finish`](ObjectProperties::finish) once all values are set.
#[derive(Debug)]
pub struct ObjectProperties<'t, 'e> {
    template: &'t PropertyTemplate,
    properties70: &'e mut Element,
    written: Vec<bool>,
}

impl ObjectProperties<'_, '_> {
    /// Write `value` unless the written template already holds it. Template
    /// properties take the template's animatable flag; animated values are
    /// always written.
    pub fn set(
        &mut self,
        kind: PropertyKind,
        name: &str,
        value: Option<HostValue>,
        flags: PropertyFlags,
    ) -> Result<&mut Self> {
        let template = self.template;
        match template.properties.iter().position(|(n, _)| n == name) {
            Some(i) if !flags.animated => {
                let default = &template.properties[i].1;
                if self.written[i] && default.kind == kind && default.value == value {
                    return Ok(self);
                }
                self.properties70.set_p70(kind, name, value, default.flags())?;
                self.written[i] = true;
            }
            _ => {
                self.properties70.set_p70(kind, name, value, flags)?;
            }
        }
        Ok(self)
    }

    /// Write the defaults of an unwritten template that the object did not
    /// override.
    pub fn finish(self) -> Result<()> {
        for ((name, default), &written) in self.template.properties.iter().zip(&self.written) {
            if !written {
                self.properties70.set_p70(default.kind, name, default.value.clone(), default.flags())?;
            }
        }
        Ok(())
    }
}

/// Members of a `Compound` property, stored as `compound|member`.
#[derive(Debug)]
pub struct Compound<'e> {
    properties70: &'e mut Element,
    name: String,
}

impl Compound<'_> {
    pub fn set(
        &mut self,
        kind: PropertyKind,
        member: &str,
        value: Option<HostValue>,
        flags: PropertyFlags,
    ) -> Result<&mut Self> {
        let name = format!("{}|{}", self.name, member);
        self.properties70.set_p70(kind, &name, value, flags)?;
        Ok(self)
    }
}

//! Read-side view of a decoded document's scene graph.
//!
//! Nothing here copies elements: templates, objects and connections are
//! indexes borrowing from the tree returned by the reader.

use std::collections::HashMap;

use log::{debug, warn};

use crate::element::Element;
use crate::error::Result;
use crate::props::PropertySet;
use crate::types::{Property, PropertyType};

/// `PropertyTemplate` records from `Definitions`, keyed by object type and
/// template class, e.g. `("Geometry", "FbxMesh")`.
#[derive(Debug, Clone, Default)]
pub struct Templates<'a> {
    templates: HashMap<(String, String), &'a Element>,
}

fn single_string(element: &Element) -> Result<&str> {
    match element.properties() {
        [Property::String(s)] => Ok(s.as_str()),
        _ => Err(element.unexpected("expected a single string")),
    }
}

impl<'a> Templates<'a> {
    pub fn from_definitions(definitions: &'a Element) -> Result<Templates<'a>> {
        let mut templates = HashMap::new();
        for def in definitions.find_iter("ObjectType") {
            let object_type = single_string(def)?;
            for template in def.find_iter("PropertyTemplate") {
                let class = single_string(template)?;
                templates.insert((object_type.to_owned(), class.to_owned()), template);
            }
        }
        Ok(Templates { templates })
    }

    /// Look up a template. Since 7.4 class names are written without their
    /// leading `K`, so `KFbxMesh` also finds `FbxMesh`.
    pub fn get(&self, object_type: &str, class: &str) -> Option<&'a Element> {
        let lookup = |class: &str| self.templates.get(&(object_type.to_owned(), class.to_owned())).copied();
        lookup(class).or_else(|| class.strip_prefix('K').and_then(lookup))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Objects by uuid, in file order.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable<'a> {
    objects: Vec<(i64, &'a Element)>,
    index: HashMap<i64, usize>,
}

impl<'a> ObjectTable<'a> {
    /// Index the children of an `Objects` element. Every object must lead with
    /// its int64 uuid; a repeated uuid replaces the earlier object.
    pub fn from_objects(objects: &'a Element) -> Result<ObjectTable<'a>> {
        let mut table = ObjectTable::default();
        for object in objects.children() {
            let uuid = object.uuid().ok_or_else(|| object.unexpected("object without an int64 uuid"))?;
            match table.index.get(&uuid) {
                Some(&i) => {
                    warn!("duplicate object uuid {}, keeping the last {}", uuid, object.id_str());
                    table.objects[i].1 = object;
                }
                None => {
                    table.index.insert(uuid, table.objects.len());
                    table.objects.push((uuid, object));
                }
            }
        }
        Ok(table)
    }

    pub fn get(&self, uuid: i64) -> Option<&'a Element> {
        self.index.get(&uuid).map(|&i| self.objects[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &'a Element)> + '_ {
        self.objects.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// One end of a connection as seen from the queried object.
#[derive(Debug, Clone, Copy)]
pub struct Connection<'a> {
    pub uuid: i64,
    /// `None` when the uuid is not in the object table.
    pub object: Option<&'a Element>,
    /// The `C` record itself.
    pub link: &'a Element,
}

impl<'a> Connection<'a> {
    /// `OO` for object to object, `OP` for object to property.
    pub fn kind(&self) -> Option<&'a str> {
        self.link.properties().first().and_then(Property::as_str)
    }

    /// Target property name of an `OP` connection.
    pub fn property(&self) -> Option<&'a str> {
        self.link.properties().get(3).and_then(Property::as_str)
    }
}

type Links<'a> = HashMap<i64, Vec<(i64, &'a Element)>>;

/// Source to destination (forward) and destination to source (reverse)
/// links between objects.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMap<'a> {
    objects: ObjectTable<'a>,
    forward: Links<'a>,
    reverse: Links<'a>,
}

impl<'a> ConnectionMap<'a> {
    /// Index a `Connections` element. Records whose second and third
    /// properties are not both int64 are skipped.
    pub fn new(connections: &'a Element, objects: ObjectTable<'a>) -> ConnectionMap<'a> {
        let mut forward = Links::new();
        let mut reverse = Links::new();
        for link in connections.children() {
            let (src, dst) = match link.properties().get(1..3) {
                Some([Property::I64(src), Property::I64(dst)]) => (*src, *dst),
                _ => continue,
            };
            forward.entry(src).or_default().push((dst, link));
            reverse.entry(dst).or_default().push((src, link));
        }
        ConnectionMap { objects, forward, reverse }
    }

    pub fn objects(&self) -> &ObjectTable<'a> {
        &self.objects
    }

    /// Destinations of `uuid`, optionally restricted to objects whose element
    /// id is `id_filter`.
    pub fn forward(&self, uuid: i64, id_filter: Option<&str>) -> Vec<Connection<'a>> {
        self.filter(&self.forward, uuid, id_filter)
    }

    /// Sources connected to `uuid`.
    pub fn reverse(&self, uuid: i64, id_filter: Option<&str>) -> Vec<Connection<'a>> {
        self.filter(&self.reverse, uuid, id_filter)
    }

    fn filter(&self, links: &Links<'a>, uuid: i64, id_filter: Option<&str>) -> Vec<Connection<'a>> {
        let links = match links.get(&uuid) {
            Some(links) => links,
            None => return Vec::new(),
        };
        links
            .iter()
            // 0 is the scene root, which has no object record.
            .filter(|&&(other, _)| other != 0)
            .map(|&(other, link)| Connection { uuid: other, object: self.objects.get(other), link })
            .filter(|c| match id_filter {
                None => true,
                Some(id) => c.object.map_or(false, |o| o.id() == id.as_bytes()),
            })
            .collect()
    }
}

/// Indexes over a whole decoded document.
#[derive(Debug, Clone)]
pub struct Scene<'a> {
    root: &'a Element,
    templates: Templates<'a>,
    connections: ConnectionMap<'a>,
}

impl<'a> Scene<'a> {
    /// Build the indexes. Missing `Definitions`, `Objects` or `Connections`
    /// sections are logged and yield empty indexes.
    pub fn new(root: &'a Element) -> Result<Scene<'a>> {
        let templates = match root.find_first("Definitions") {
            Some(definitions) => Templates::from_definitions(definitions)?,
            None => {
                warn!("no Definitions section");
                Templates::default()
            }
        };
        let objects = match root.find_first("Objects") {
            Some(objects) => ObjectTable::from_objects(objects)?,
            None => {
                warn!("no Objects section");
                ObjectTable::default()
            }
        };
        let connections = match root.find_first("Connections") {
            Some(connections) => ConnectionMap::new(connections, objects),
            None => {
                warn!("no Connections section");
                ConnectionMap { objects, ..ConnectionMap::default() }
            }
        };
        debug!(
            "scene: {} templates, {} objects",
            templates.len(),
            connections.objects().len()
        );
        Ok(Scene { root, templates, connections })
    }

    pub fn root(&self) -> &'a Element {
        self.root
    }

    pub fn templates(&self) -> &Templates<'a> {
        &self.templates
    }

    pub fn objects(&self) -> &ObjectTable<'a> {
        self.connections.objects()
    }

    pub fn connections(&self) -> &ConnectionMap<'a> {
        &self.connections
    }

    /// Properties of `object`, falling back to the template for its type.
    pub fn properties(&self, object: &'a Element, object_type: &str, class: &str) -> PropertySet<'a> {
        PropertySet::for_object(object, self.templates.get(object_type, class))
    }

    /// Document-wide settings such as axes and unit scale.
    pub fn global_settings(&self) -> PropertySet<'a> {
        match self.root.find_first("GlobalSettings") {
            Some(settings) => PropertySet::for_object(settings, None),
            None => PropertySet::default(),
        }
    }

    /// The name part of an object's `name\x00\x01class` string.
    pub fn object_name(object: &'a Element) -> Result<&'a str> {
        object.split_name_class().map(|(name, _)| name)
    }

    /// Whether `object` leads with uuid, name and class (`LSS`).
    pub fn is_object_record(object: &Element) -> bool {
        object.properties().len() >= 3
            && object.properties()[..3].iter().map(Property::property_type).eq([
                PropertyType::I64,
                PropertyType::String,
                PropertyType::String,
            ])
    }
}

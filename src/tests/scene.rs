use std::collections::HashSet;

use crate::element::{name_class, Element, HostValue};
use crate::error::FbxError;
use crate::naming::UuidRegistry;
use crate::props::{PropertyFlags, PropertyKind, PropertySet, PropertyTemplate};
use crate::reader::read_from_bytes;
use crate::scene::{ObjectTable, Scene, Templates};
use crate::types::Property;
use crate::writer::write_to_bytes;

fn floats(values: &[f64]) -> Option<HostValue> {
    Some(HostValue::Seq(values.iter().map(|&v| HostValue::Float(v)).collect()))
}

const CUSTOM: PropertyFlags = PropertyFlags { animatable: false, animated: false, custom: true };

/// A cube model with geometry and a material, a node template and the
/// connections between them.
fn scene_document() -> Element {
    let mut root = Element::root();
    root.add_child("GlobalSettings")
        .add_child("Properties70")
        .set_p70(PropertyKind::Integer, "UpAxis", Some(HostValue::Int(1)), PropertyFlags::default())
        .unwrap();
    {
        let object_type = root.add_child("Definitions").add_child_with("ObjectType", "Model");
        object_type.add_child_with("Count", 1i32);
        let props = object_type.add_child_with("PropertyTemplate", "FbxNode").add_child("Properties70");
        props
            .set_p70(PropertyKind::LclScaling, "Lcl Scaling", floats(&[1.0, 1.0, 1.0]), PropertyFlags::ANIMATABLE)
            .unwrap();
        props
            .set_p70(PropertyKind::Visibility, "Visibility", Some(HostValue::Float(1.0)), PropertyFlags::ANIMATABLE)
            .unwrap();
        props
            .set_p70(PropertyKind::Enum, "RotationOrder", Some(HostValue::Int(0)), PropertyFlags::default())
            .unwrap();
    }
    {
        let objects = root.add_child("Objects");
        let model = objects.add_child("Model");
        model.add_int64(1001).add_string(name_class("Cube", "Model")).add_string("Mesh");
        let props = model.add_child("Properties70");
        props
            .set_p70(PropertyKind::LclScaling, "Lcl Scaling", floats(&[2.0, 2.0, 2.0]), PropertyFlags::ANIMATABLE)
            .unwrap();
        props
            .set_p70(PropertyKind::Number, "Visibility", Some(HostValue::Float(0.0)), CUSTOM)
            .unwrap();

        let geometry = objects.add_child("Geometry");
        geometry.add_int64(2002).add_string(name_class("Cube", "Geometry")).add_string("Mesh");

        let material = objects.add_child("Material");
        material.add_int64(3003).add_string(name_class("Red", "Material")).add_string("");
        material
            .add_child("Properties70")
            .set_p70(PropertyKind::ColorRGB, "DiffuseColor", floats(&[0.8, 0.1, 0.1]), PropertyFlags::default())
            .unwrap();
    }
    {
        let connections = root.add_child("Connections");
        connections.add_child_with("C", "OO").add_int64(1001).add_int64(0);
        connections.add_child_with("C", "OO").add_int64(2002).add_int64(1001);
        connections.add_child_with("C", "OO").add_int64(3003).add_int64(1001);
        connections.add_child_with("C", "OP").add_int64(4004).add_int64(3003).add_string("DiffuseColor");
        connections.add_child_with("C", "OO").add_int32(1).add_int64(1001);
    }
    root
}

fn model(root: &Element) -> &Element {
    root.find_first("Objects").and_then(|o| o.find_first("Model")).unwrap()
}

#[test]
fn templates_ignore_leading_k() {
    let root = scene_document();
    let templates = Templates::from_definitions(root.find_first("Definitions").unwrap()).unwrap();
    assert_eq!(templates.len(), 1);
    assert!(templates.get("Model", "FbxNode").is_some());
    assert!(templates.get("Model", "KFbxNode").is_some());
    assert!(templates.get("Geometry", "KFbxMesh").is_none());
    assert!(templates.get("Model", "Node").is_none());
}

#[test]
fn templates_need_string_names() {
    let mut definitions = Element::new("Definitions");
    definitions.add_child_with("ObjectType", 3i32);
    assert!(matches!(
        Templates::from_definitions(&definitions),
        Err(FbxError::UnexpectedProperty { .. })
    ));
}

#[test]
fn object_properties_fall_back_to_template() {
    let root = scene_document();
    let scene = Scene::new(&root).unwrap();
    let props = scene.properties(model(&root), "Model", "KFbxNode");
    assert_eq!(props.vector_3d("Lcl Scaling").unwrap(), Some([2.0, 2.0, 2.0]));
    // The object's user-defined Visibility does not shadow the template's.
    assert_eq!(props.visibility("Visibility").unwrap(), Some(1.0));
    assert_eq!(props.enumeration("RotationOrder").unwrap(), Some(0));
    assert_eq!(props.number("Missing").unwrap(), None);

    let bare = scene.properties(model(&root), "Model", "Unknown");
    assert_eq!(bare.visibility("Visibility").unwrap(), None);
}

#[test]
fn getters_check_layout() {
    let root = scene_document();
    let scene = Scene::new(&root).unwrap();
    let props = scene.properties(model(&root), "Model", "FbxNode");
    assert!(matches!(props.number("Visibility"), Err(FbxError::UnexpectedProperty { .. })));
    assert!(props.bool("RotationOrder").is_err());
    assert!(props.color_rgb("Lcl Scaling").is_err());
    assert_eq!(props.integer("RotationOrder").unwrap(), Some(0));

    let material = root.find_first("Objects").and_then(|o| o.find_first("Material")).unwrap();
    let props = PropertySet::for_object(material, None);
    assert_eq!(props.color_rgb("DiffuseColor").unwrap(), Some([0.8, 0.1, 0.1]));
    assert_eq!(props.vector_3d("DiffuseColor").unwrap(), Some([0.8, 0.1, 0.1]));
}

#[test]
fn legacy_color_layout() {
    let mut props = Element::new("Properties70");
    props
        .set_p70(PropertyKind::Color, "Ambient", floats(&[0.0, 0.5, 1.0]), PropertyFlags::ANIMATABLE)
        .unwrap();
    let set = PropertySet::new(&props);
    assert_eq!(set.color_rgb("Ambient").unwrap(), Some([0.0, 0.5, 1.0]));

    let mut fallback = Element::new("Properties70");
    fallback
        .set_p70(PropertyKind::Color, "Ambient", floats(&[1.0, 1.0, 1.0]), PropertyFlags::ANIMATABLE)
        .unwrap();
    fallback.set_p70(PropertyKind::Number, "Opacity", Some(HostValue::Float(0.5)), PropertyFlags::ANIMATABLE).unwrap();
    let chained = PropertySet::new(&props).then(&fallback);
    assert_eq!(chained.color_rgb("Ambient").unwrap(), Some([0.0, 0.5, 1.0]));
    assert_eq!(chained.number("Opacity").unwrap(), Some(0.5));
}

#[test]
fn global_settings() {
    let root = scene_document();
    let scene = Scene::new(&root).unwrap();
    assert_eq!(scene.global_settings().integer("UpAxis").unwrap(), Some(1));
    assert!(Scene::new(&Element::root()).unwrap().global_settings().is_empty());
}

#[test]
fn connections_resolve_through_objects() {
    let root = scene_document();
    let scene = Scene::new(&root).unwrap();
    let connections = scene.connections();

    let children: Vec<i64> = connections.reverse(1001, None).iter().map(|c| c.uuid).collect();
    assert_eq!(children, vec![2002, 3003]);
    let geometry = connections.reverse(1001, Some("Geometry"));
    assert_eq!(geometry.len(), 1);
    assert_eq!(geometry[0].object.map(Element::id), Some(&b"Geometry"[..]));

    // The scene root is never returned.
    assert!(connections.forward(1001, None).is_empty());
    let parent = connections.forward(2002, Some("Model"));
    assert_eq!(parent.len(), 1);
    assert_eq!(parent[0].object, Some(model(&root)));
    assert_eq!(parent[0].kind(), Some("OO"));

    let texture = connections.reverse(3003, None);
    assert_eq!(texture.len(), 1);
    assert_eq!(texture[0].uuid, 4004);
    assert!(texture[0].object.is_none());
    assert_eq!(texture[0].kind(), Some("OP"));
    assert_eq!(texture[0].property(), Some("DiffuseColor"));
    assert!(connections.reverse(3003, Some("Texture")).is_empty());

    // Links without int64 ends are not indexed.
    assert!(connections.forward(1, None).is_empty());
}

#[test]
fn object_table() {
    let root = scene_document();
    let table = ObjectTable::from_objects(root.find_first("Objects").unwrap()).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.iter().map(|(uuid, _)| uuid).collect::<Vec<_>>(), vec![1001, 2002, 3003]);
    assert_eq!(table.get(2002).map(Element::id), Some(&b"Geometry"[..]));
    assert!(table.get(0).is_none());
    assert_eq!(Scene::object_name(table.get(3003).unwrap()).unwrap(), "Red");
    assert!(table.iter().all(|(_, o)| Scene::is_object_record(o)));

    let mut objects = Element::new("Objects");
    objects.add_child_with("Model", 5i64).add_string("first");
    objects.add_child_with("Model", 5i64).add_string("second");
    let table = ObjectTable::from_objects(&objects).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(5).unwrap().properties()[1], Property::from("second"));

    objects.add_child_with("Model", "no uuid");
    assert!(ObjectTable::from_objects(&objects).is_err());
}

#[test]
fn scene_after_round_trip() {
    let data = write_to_bytes(&scene_document(), 7500).unwrap();
    let (root, _) = read_from_bytes(&data).unwrap();
    let scene = Scene::new(&root).unwrap();
    assert_eq!(scene.objects().len(), 3);
    assert_eq!(scene.templates().len(), 1);
    assert_eq!(scene.connections().reverse(1001, None).len(), 2);
    let props = scene.properties(model(&root), "Model", "KFbxNode");
    assert_eq!(props.vector_3d("Lcl Scaling").unwrap(), Some([2.0, 2.0, 2.0]));
}

#[test]
fn p70_records() {
    let mut props = Element::new("Properties70");
    props
        .set_p70(PropertyKind::ColorRGB, "DiffuseColor", floats(&[0.5, 0.5, 0.5]), PropertyFlags::default())
        .unwrap();
    props.set_p70(PropertyKind::Bool, "Visible", Some(HostValue::Bool(true)), PropertyFlags::default()).unwrap();
    props.set_p70(PropertyKind::Compound, "Group", None, PropertyFlags::default()).unwrap();
    props
        .set_p70(PropertyKind::StringUrl, "Path", Some(HostValue::Text("a.png".into())), PropertyFlags::default())
        .unwrap();

    let p = &props.children()[0];
    assert_eq!(p.id(), b"P");
    assert_eq!(p.property_types(), b"SSSSDDD".to_vec());
    assert_eq!(p.properties()[1].as_str(), Some("ColorRGB"));
    assert_eq!(p.properties()[2].as_str(), Some("Color"));
    assert_eq!(props.children()[1].properties()[4], Property::I32(1));
    assert_eq!(props.children()[2].property_types(), b"SSSS".to_vec());
    assert_eq!(props.children()[3].properties()[2].as_str(), Some("Url"));
    assert_eq!(PropertySet::new(&props).bool("Visible").unwrap(), Some(true));
}

#[test]
fn p70_value_must_match_kind() {
    let mut props = Element::new("Properties70");
    let flags = PropertyFlags::default();
    assert!(matches!(
        props.set_p70(PropertyKind::Vector, "V", floats(&[1.0, 2.0]), flags),
        Err(FbxError::TypeMismatch { .. })
    ));
    assert!(props.set_p70(PropertyKind::Integer, "I", Some(HostValue::Float(1.0)), flags).is_err());
    assert!(props.set_p70(PropertyKind::Object, "O", Some(HostValue::Int(1)), flags).is_err());
    assert!(props.set_p70(PropertyKind::Double, "D", None, flags).is_err());
    assert!(props.set_p70(PropertyKind::Timestamp, "T", Some(HostValue::Int(1 << 40)), flags).is_ok());
    assert_eq!(props.children().len(), 1);
}

#[test]
fn p70_flags() {
    let flags = |animatable, animated, custom| PropertyFlags { animatable, animated, custom }.as_str();
    assert_eq!(flags(false, false, false), "");
    assert_eq!(flags(true, false, false), "A");
    assert_eq!(flags(true, true, false), "A+");
    assert_eq!(flags(true, true, true), "A+U");
    assert_eq!(flags(false, false, true), "A+U");
    assert_eq!(PropertyKind::LclRotation.type_name(), "Lcl Rotation");
    assert_eq!(PropertyKind::Vector3D.label(), "Vector");
}

#[test]
fn animated_bools() {
    let mut props = Element::new("Properties70");
    props.add_child("P").add_string("Show").add_string("Bool").add_string("").add_string("A+").add_int32(1);
    props
        .set_p70(PropertyKind::Bool, "Cast", Some(HostValue::Bool(false)), PropertyFlags::ANIMATABLE)
        .unwrap();
    props.add_child("P").add_string("Labeled").add_string("bool").add_string("Bool").add_string("").add_int32(1);
    props.add_child("P").add_string("Two").add_string("bool").add_string("").add_string("").add_int32(2);

    let set = PropertySet::new(&props);
    assert_eq!(set.bool("Show").unwrap(), Some(true));
    assert_eq!(set.bool("Cast").unwrap(), Some(false));
    assert!(matches!(set.bool("Labeled"), Err(FbxError::UnexpectedProperty { .. })));
    assert!(set.bool("Two").is_err());
}

#[test]
fn scene_without_definitions() {
    let mut root = Element::root();
    for child in scene_document().children().iter().filter(|c| c.id() != b"Definitions") {
        root.push_child(child.clone());
    }
    let scene = Scene::new(&root).unwrap();
    assert!(scene.templates().is_empty());
    assert_eq!(scene.objects().len(), 3);
    let props = scene.properties(model(&root), "Model", "FbxNode");
    assert_eq!(props.vector_3d("Lcl Scaling").unwrap(), Some([2.0, 2.0, 2.0]));
    assert_eq!(props.visibility("Visibility").unwrap(), None);
}

fn node_template(written: bool) -> PropertyTemplate {
    let mut template = PropertyTemplate::new(written);
    template
        .insert("Lcl Scaling", PropertyKind::LclScaling, floats(&[1.0, 1.0, 1.0]), true)
        .insert("Visibility", PropertyKind::Visibility, Some(HostValue::Float(1.0)), true)
        .insert("Show", PropertyKind::Bool, Some(HostValue::Int(1)), false);
    template
}

fn flags_of(p: &Element) -> Option<&str> {
    p.properties()[3].as_str()
}

#[test]
fn template_defaults_are_not_repeated() {
    let template = node_template(true);
    let mut props = Element::new("Properties70");
    {
        let mut object = template.object(&mut props);
        object
            .set(PropertyKind::LclScaling, "Lcl Scaling", floats(&[1.0, 1.0, 1.0]), PropertyFlags::default())
            .unwrap()
            .set(PropertyKind::Visibility, "Visibility", Some(HostValue::Float(0.0)), PropertyFlags::default())
            .unwrap()
            .set(PropertyKind::Number, "Extra", Some(HostValue::Float(2.0)), PropertyFlags::default())
            .unwrap();
        object.finish().unwrap();
    }
    let names: Vec<_> = props.children().iter().map(|p| p.properties()[0].as_str()).collect();
    assert_eq!(names, vec![Some("Visibility"), Some("Extra")]);
    // Template properties keep the template's animatable flag.
    assert_eq!(flags_of(&props.children()[0]), Some("A"));
    assert_eq!(flags_of(&props.children()[1]), Some(""));
}

#[test]
fn animated_values_are_always_written() {
    let template = node_template(true);
    let mut props = Element::new("Properties70");
    let animated = PropertyFlags { animatable: true, animated: true, custom: false };
    let mut object = template.object(&mut props);
    object.set(PropertyKind::LclScaling, "Lcl Scaling", floats(&[1.0, 1.0, 1.0]), animated).unwrap();
    object.finish().unwrap();
    assert_eq!(props.children().len(), 1);
    assert_eq!(flags_of(&props.children()[0]), Some("A+"));
}

#[test]
fn unwritten_template_defaults_go_to_objects() {
    let template = node_template(false);
    let mut props = Element::new("Properties70");
    let mut object = template.object(&mut props);
    object
        .set(PropertyKind::Visibility, "Visibility", Some(HostValue::Float(1.0)), PropertyFlags::default())
        .unwrap();
    object.finish().unwrap();

    let set = PropertySet::new(&props);
    assert_eq!(props.children().len(), 3);
    assert_eq!(set.visibility("Visibility").unwrap(), Some(1.0));
    assert_eq!(set.vector_3d("Lcl Scaling").unwrap(), Some([1.0, 1.0, 1.0]));
    assert_eq!(set.bool("Show").unwrap(), Some(true));
}

#[test]
fn template_defaults_read_back() {
    let template = node_template(true);
    assert_eq!(template.len(), 3);
    assert!(template.is_written());
    assert_eq!(template.get("Show").map(|v| v.kind), Some(PropertyKind::Bool));

    let mut definitions = Element::new("Definitions");
    let props = definitions
        .add_child_with("ObjectType", "Model")
        .add_child_with("PropertyTemplate", "FbxNode")
        .add_child("Properties70");
    template.write_defaults(props).unwrap();

    let templates = Templates::from_definitions(&definitions).unwrap();
    let set = PropertySet::for_object(&definitions, templates.get("Model", "FbxNode"));
    assert_eq!(set.vector_3d("Lcl Scaling").unwrap(), Some([1.0, 1.0, 1.0]));
    assert_eq!(set.bool("Show").unwrap(), Some(true));
}

#[test]
fn compound_members() {
    let mut props = Element::new("Properties70");
    props
        .set_p70_compound("Group", true)
        .unwrap()
        .set(PropertyKind::Number, "Weight", Some(HostValue::Float(0.5)), PropertyFlags::default())
        .unwrap()
        .set(PropertyKind::Integer, "Count", Some(HostValue::Int(3)), PropertyFlags::default())
        .unwrap();

    let compound = &props.children()[0];
    assert_eq!(compound.properties()[1].as_str(), Some("Compound"));
    assert_eq!(flags_of(compound), Some("A+U"));
    let set = PropertySet::new(&props);
    assert_eq!(set.number("Group|Weight").unwrap(), Some(0.5));
    assert_eq!(set.integer("Group|Count").unwrap(), Some(3));
}

#[test]
fn uuids_are_stable() {
    let mut a = UuidRegistry::new();
    let mut b = UuidRegistry::new();
    let first = a.uuid(&"Cube".to_owned()).unwrap();
    assert!((0..=1_000_000_000).contains(&first));
    assert_eq!(a.uuid(&"Cube".to_owned()).unwrap(), first);
    assert_eq!(b.uuid(&"Cube".to_owned()).unwrap(), first);
    assert_eq!(a.key(first).map(String::as_str), Some("Cube"));
    assert_eq!(a.get(&"Missing".to_owned()), None);
    assert_eq!(a.len(), 1);
}

#[test]
fn uuids_are_unique() {
    let mut registry = UuidRegistry::new();
    let mut seen = HashSet::new();
    for i in 0..20_000u32 {
        let uuid = registry.uuid(&i).unwrap();
        assert!(uuid >= 0);
        assert!(seen.insert(uuid), "duplicate uuid {}", uuid);
        assert_eq!(registry.key(uuid), Some(&i));
    }
    assert_eq!(registry.len(), 20_000);
}

use crate::element::Element;

mod scene;

/// Offset of the first record, right after magic and version.
const RECORDS_START: usize = 27;

fn u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn u64_at(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// A root holding one `A` record with a single int32 property.
fn single_record() -> Element {
    let mut root = Element::root();
    root.add_child_with("A", 1i32);
    root
}

/// Small but complete document: header records, a template and two
/// connected objects.
fn sample_document() -> Element {
    let mut root = Element::root();
    {
        let header = root.add_child("FBXHeaderExtension");
        header.add_child_with("FBXHeaderVersion", 1003i32);
        header.add_child_with("FBXVersion", 7400i32);
    }
    root.add_child("FileId").add_bytes(vec![1u8, 2, 3]);
    root.add_child_with("CreationTime", "2024-05-01 12:00:00:000");
    root.add_child_with("Creator", "fbxbin tests");

    {
        let objects = root.add_child("Objects");
        let model = objects.add_child("Model");
        model.add_int64(1001).add_string("Cube\x00\x01Model").add_string("Mesh");
        model.add_child_with("Version", 232i32);
        let geometry = objects.add_child("Geometry");
        geometry.add_int64(2002).add_string("Cube\x00\x01Geometry").add_string("Mesh");
        geometry.add_child("Vertices").add_float64_array((0..48).map(f64::from).collect::<Vec<_>>());
        geometry.add_child("PolygonVertexIndex").add_int32_array(vec![0, 1, 2, -4]);
    }
    {
        let connections = root.add_child("Connections");
        connections.add_child_with("C", "OO").add_int64(1001).add_int64(0);
        connections.add_child_with("C", "OO").add_int64(2002).add_int64(1001);
    }
    root
}

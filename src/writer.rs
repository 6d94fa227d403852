//! Binary FBX encoding.
//!
//! Every record header embeds the absolute offset at which the record ends, so
//! the tree is first measured into a side tree of offsets and only then
//! emitted. Both passes share `needs_sentinel` and the encoded property
//! lengths, and the emitter checks its position against the measured offsets.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, warn};

use crate::element::Element;
use crate::error::{FbxError, Result};
use crate::types::{Encoded, Endian, Layout};
use crate::{MAGIC, MAX_DEPTH, MIN_VERSION};

/// Records that get a closing sentinel when they are not the last sibling even
/// if they carry properties and no children. The reference exporter writes
/// them this way and some importers depend on it.
pub const ALWAYS_SENTINEL_IDS: [&[u8]; 2] = [b"AnimationStack", b"AnimationLayer"];

/// Written in place of the `FileId` blob.
pub const FILE_ID: [u8; 16] = [
    0x28, 0xb3, 0x2a, 0xeb, 0xb6, 0x24, 0xcc, 0xc2, 0xbf, 0xc8, 0xb0, 0x2a, 0xa9, 0x2b, 0xfc, 0xf1,
];

/// Written in place of the `CreationTime` string. Consumers validate the file
/// id against this timestamp.
pub const CREATION_TIME: &str = "1970-01-01 10:00:00:000";

pub const FOOTER_ID: [u8; 16] = [
    0xfa, 0xbc, 0xab, 0x09, 0xd0, 0xc8, 0xd4, 0x66, 0xb1, 0x76, 0xfb, 0x83, 0x1c, 0xf7, 0x26, 0x7e,
];

pub const CLOSING_MAGIC: [u8; 16] = [
    0xf8, 0x5a, 0x8c, 0x6a, 0xde, 0xf5, 0xd9, 0x7e, 0xec, 0xe9, 0x0c, 0xe3, 0x75, 0x8f, 0x29, 0x0b,
];

const ZEROS: [u8; 120] = [0; 120];

/// Encode `root` into a new file at `path`.
pub fn write<P: AsRef<Path>>(path: P, root: &Element, version: u32) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| FbxError::from(e).at(path.to_owned()))?;
    debug!("writing {} as FBX {}", path.display(), version);
    write_to(BufWriter::new(file), root, version).map_err(|e| e.at(path.to_owned()))
}

pub fn write_to_bytes(root: &Element, version: u32) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    write_to(&mut data, root, version)?;
    Ok(data)
}

/// Encode `root` as a complete binary FBX document, footer included.
pub fn write_to<W: Write>(w: W, root: &Element, version: u32) -> Result<()> {
    if !root.id().is_empty() || !root.properties().is_empty() {
        return Err(FbxError::InvalidRoot);
    }
    if version < MIN_VERSION {
        return Err(FbxError::UnsupportedVersion { found: version, minimum: MIN_VERSION });
    }
    let layout = Layout::new(version);
    let mut out = Counting::new(w);
    out.write_all(MAGIC)?;
    out.write_u32::<LittleEndian>(version)?;

    let top = patch_file_identity(root.children());
    let count = top.len();
    let mut offset = out.position;
    let mut measured = Vec::with_capacity(count);
    for (i, element) in top.iter().enumerate() {
        let m = measure(element, offset, i + 1 == count, layout, 0)?;
        offset = m.end_offset;
        measured.push(m);
    }
    for (i, (element, m)) in top.iter().zip(&measured).enumerate() {
        emit(&mut out, element, m, i + 1 == count, layout)?;
    }
    // Null record closing the top-level scope.
    write_sentinel(&mut out, layout)?;

    write_footer(&mut out, version)?;
    out.flush()?;
    debug!("wrote {} top-level records, {} bytes", count, out.position);
    Ok(())
}

/// Replace the first top-level `FileId` and `CreationTime` values with fixed
/// ones so output does not depend on the wall clock.
fn patch_file_identity(children: &[Element]) -> Vec<Cow<'_, Element>> {
    let mut file_id = false;
    let mut creation_time = false;
    let top = children
        .iter()
        .map(|child| {
            if !file_id && child.id() == b"FileId" {
                file_id = true;
                let mut patched = child.clone();
                patched.clear_properties();
                patched.add_bytes(&FILE_ID[..]);
                Cow::Owned(patched)
            } else if !creation_time && child.id() == b"CreationTime" {
                creation_time = true;
                let mut patched = child.clone();
                patched.clear_properties();
                patched.add_string(CREATION_TIME);
                Cow::Owned(patched)
            } else {
                Cow::Borrowed(child)
            }
        })
        .collect();
    if !file_id || !creation_time {
        warn!("missing top-level FileId or CreationTime, left unpatched");
    }
    top
}

fn needs_sentinel(element: &Element, is_last: bool) -> bool {
    if !element.children().is_empty() {
        return true;
    }
    let always = ALWAYS_SENTINEL_IDS.iter().any(|&id| id == element.id());
    (element.properties().is_empty() || always) && !is_last
}

/// Offsets and encoded properties of one element, mirroring the tree.
struct Measured<'a> {
    end_offset: u64,
    properties_len: u64,
    properties: Vec<Encoded<'a>>,
    children: Vec<Measured<'a>>,
}

/// `emit` follows the measured side tree, so the depth is only checked here.
fn measure<'a>(
    element: &'a Element,
    offset: u64,
    is_last: bool,
    layout: Layout,
    depth: usize,
) -> Result<Measured<'a>> {
    if depth >= MAX_DEPTH {
        return Err(FbxError::TooDeep { offset, limit: MAX_DEPTH });
    }
    let id_len = element.id().len();
    if id_len > u8::MAX as usize {
        return Err(FbxError::IdTooLong(id_len));
    }
    let mut offset = offset + 3 * layout.header_width() + 1 + id_len as u64;

    let properties = element
        .properties()
        .iter()
        .map(|p| p.encode(Endian::native()))
        .collect::<Result<Vec<_>>>()?;
    let properties_len: u64 = properties.iter().map(|p| 1 + p.encoded_len()).sum();
    offset += properties_len;

    let count = element.children().len();
    let mut children = Vec::with_capacity(count);
    for (i, child) in element.children().iter().enumerate() {
        let m = measure(child, offset, i + 1 == count, layout, depth + 1)?;
        offset = m.end_offset;
        children.push(m);
    }
    if needs_sentinel(element, is_last) {
        offset += layout.sentinel_len();
    }
    Ok(Measured { end_offset: offset, properties_len, properties, children })
}

fn emit<W: Write>(
    out: &mut Counting<W>,
    element: &Element,
    measured: &Measured<'_>,
    is_last: bool,
    layout: Layout,
) -> Result<()> {
    layout.write_header_field(out, "end offset", measured.end_offset)?;
    layout.write_header_field(out, "property count", element.properties().len() as u64)?;
    layout.write_header_field(out, "property list length", measured.properties_len)?;
    out.write_u8(element.id().len() as u8)?;
    out.write_all(element.id())?;

    for (property, encoded) in element.properties().iter().zip(&measured.properties) {
        out.write_u8(property.property_type().tag())?;
        encoded.write_to(out)?;
    }

    let count = element.children().len();
    for (i, (child, m)) in element.children().iter().zip(&measured.children).enumerate() {
        emit(out, child, m, i + 1 == count, layout)?;
    }
    if needs_sentinel(element, is_last) {
        write_sentinel(out, layout)?;
    }

    if out.position != measured.end_offset {
        return Err(FbxError::OffsetMismatch { expected: measured.end_offset, written: out.position });
    }
    Ok(())
}

fn write_sentinel<W: Write>(out: &mut W, layout: Layout) -> io::Result<()> {
    out.write_all(&ZEROS[..layout.sentinel_len() as usize])
}

fn write_footer<W: Write>(out: &mut Counting<W>, version: u32) -> io::Result<()> {
    out.write_all(&FOOTER_ID)?;
    out.write_all(&ZEROS[..4])?;
    // Always at least one byte of padding.
    let pad = 16 - (out.position % 16) as usize;
    out.write_all(&ZEROS[..pad])?;
    out.write_u32::<LittleEndian>(version)?;
    out.write_all(&ZEROS)?;
    out.write_all(&CLOSING_MAGIC)
}

/// Tracks the absolute file offset of everything written.
struct Counting<W> {
    inner: W,
    position: u64,
}

impl<W: Write> Counting<W> {
    fn new(inner: W) -> Counting<W> {
        Counting { inner, position: 0 }
    }
}

impl<W: Write> Write for Counting<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

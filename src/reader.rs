//! Binary FBX decoding.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace};

use crate::element::Element;
use crate::error::{FbxError, Result};
use crate::types::{read_property, Layout, PropertyType};
use crate::{MAGIC, MAX_DEPTH, MIN_VERSION};

/// Decode the FBX file at `path` into its root element and version.
pub fn read<P: AsRef<Path>>(path: P) -> Result<(Element, u32)> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| FbxError::from(e).at(path.to_owned()))?;
    debug!("reading {} ({} bytes)", path.display(), data.len());
    read_from_bytes(&data).map_err(|e| e.at(path.to_owned()))
}

/// Decode a whole FBX stream.
pub fn read_from<R: Read>(mut r: R) -> Result<(Element, u32)> {
    let mut data = Vec::new();
    r.read_to_end(&mut data)?;
    read_from_bytes(&data)
}

/// Decode an in-memory FBX file.
pub fn read_from_bytes(data: &[u8]) -> Result<(Element, u32)> {
    if data.get(..MAGIC.len()) != Some(&MAGIC[..]) {
        return Err(FbxError::InvalidHeader { ascii: looks_like_text(data) });
    }
    let mut cursor = Cursor::new(data);
    cursor.set_position(MAGIC.len() as u64);
    let version = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| FbxError::Truncated { offset: MAGIC.len() as u64 })?;
    if version < MIN_VERSION {
        return Err(FbxError::UnsupportedVersion { found: version, minimum: MIN_VERSION });
    }
    debug!("FBX version: {}", version);

    let mut decoder = Decoder { data, cursor, layout: Layout::new(version) };
    let mut root = Element::root();
    while let Some(element) = decoder.read_element(0)? {
        root.push_child(element);
    }
    Ok((root, version))
}

/// ASCII FBX files start with a comment line; anything printable that is not
/// a cut-off binary magic is reported as text.
fn looks_like_text(data: &[u8]) -> bool {
    let head = &data[..data.len().min(24)];
    if head.is_empty() || MAGIC.starts_with(head) {
        return false;
    }
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&head[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    text.chars().all(|c| !c.is_control() || c.is_whitespace())
}

struct Decoder<'a> {
    data: &'a [u8],
    cursor: Cursor<&'a [u8]>,
    layout: Layout,
}

impl<'a> Decoder<'a> {
    fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Turn short reads into a structural error carrying the offset.
    fn truncation(&self, err: FbxError) -> FbxError {
        match err {
            FbxError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                FbxError::Truncated { offset: self.position() }
            }
            other => other,
        }
    }

    fn header_field(&mut self) -> Result<u64> {
        self.layout
            .read_header_field(&mut self.cursor)
            .map_err(|e| self.truncation(e.into()))
    }

    fn take(&mut self, len: u64) -> Result<&'a [u8]> {
        let start = self.position();
        let end = start.checked_add(len).filter(|&end| end <= self.len());
        match end {
            Some(end) => {
                self.cursor.set_position(end);
                Ok(&self.data[start as usize..end as usize])
            }
            None => Err(FbxError::Truncated { offset: start }),
        }
    }

    /// Read one record, or `None` for the null record closing a scope.
    /// `depth` counts the enclosing records.
    fn read_element(&mut self, depth: usize) -> Result<Option<Element>> {
        let start = self.position();
        if depth >= MAX_DEPTH {
            return Err(FbxError::TooDeep { offset: start, limit: MAX_DEPTH });
        }
        if depth == 0 && self.len() - start < self.layout.header_width() {
            // The top-level scope must be closed by a null record.
            return Err(FbxError::MalformedSentinel { offset: start });
        }
        let end_offset = self.header_field()?;
        if end_offset == 0 {
            return Ok(None);
        }
        let property_count = self.header_field()?;
        let property_list_len = self.header_field()?;
        if end_offset > self.len() {
            return Err(FbxError::LengthMismatch { expected: end_offset, found: self.len() });
        }

        let id_len = self.take(1)?[0];
        let mut element = Element::new(self.take(u64::from(id_len))?);

        let properties_start = self.position();
        for _ in 0..property_count {
            let offset = self.position();
            let tag = self.take(1)?[0];
            let ty = PropertyType::from_tag(tag).ok_or(FbxError::UnknownPropertyType { tag, offset })?;
            let property = read_property(&mut self.cursor, ty).map_err(|e| self.truncation(e))?;
            element.add_property(property);
        }
        if self.position() - properties_start != property_list_len {
            return Err(FbxError::LengthMismatch {
                expected: properties_start.saturating_add(property_list_len),
                found: self.position(),
            });
        }

        let position = self.position();
        if position < end_offset {
            let sentinel_len = self.layout.sentinel_len();
            let children_end = end_offset
                .checked_sub(sentinel_len)
                .filter(|&end| end >= position)
                .ok_or(FbxError::MalformedSentinel { offset: position })?;
            while self.position() < children_end {
                match self.read_element(depth + 1)? {
                    Some(child) => {
                        element.push_child(child);
                    }
                    None => return Err(FbxError::MalformedSentinel { offset: self.position() }),
                }
            }
            let sentinel_at = self.position();
            if self.take(sentinel_len)?.iter().any(|&b| b != 0) {
                return Err(FbxError::MalformedSentinel { offset: sentinel_at });
            }
        }

        if self.position() != end_offset {
            return Err(FbxError::LengthMismatch { expected: end_offset, found: self.position() });
        }
        trace!(
            "{} at {}: {} properties, {} children",
            element.id_str(),
            start,
            element.properties().len(),
            element.children().len()
        );
        Ok(Some(element))
    }
}

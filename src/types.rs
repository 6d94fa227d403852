//! Property values and their wire encoding.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use bytepack::{LEPacker, LEUnpacker};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::warn;

use crate::error::{FbxError, Result};

/// First version using 64-bit record headers and 25 byte sentinels.
pub const WIDE_LAYOUT_VERSION: u32 = 7500;

/// Arrays whose raw payload is at most this many bytes are stored uncompressed.
pub const COMPRESSION_THRESHOLD: usize = 128;

pub const ENCODING_RAW: u32 = 0;
pub const ENCODING_ZLIB: u32 = 1;

// Array payloads are built from exactly 4 and 8 byte numbers.
const _: () = assert!(std::mem::size_of::<i32>() == 4 && std::mem::size_of::<f32>() == 4);
const _: () = assert!(std::mem::size_of::<i64>() == 8 && std::mem::size_of::<f64>() == 8);

/// One-byte type tag preceding every property on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyType {
    Bool = b'C',
    I16 = b'Y',
    I32 = b'I',
    I64 = b'L',
    F32 = b'F',
    F64 = b'D',
    Bytes = b'R',
    String = b'S',
    I32Array = b'i',
    I64Array = b'l',
    F32Array = b'f',
    F64Array = b'd',
    BoolArray = b'b',
    ByteArray = b'c',
}

impl PropertyType {
    pub fn from_tag(tag: u8) -> Option<PropertyType> {
        let ty = match tag {
            b'C' => PropertyType::Bool,
            b'Y' => PropertyType::I16,
            b'I' => PropertyType::I32,
            b'L' => PropertyType::I64,
            b'F' => PropertyType::F32,
            b'D' => PropertyType::F64,
            b'R' => PropertyType::Bytes,
            b'S' => PropertyType::String,
            b'i' => PropertyType::I32Array,
            b'l' => PropertyType::I64Array,
            b'f' => PropertyType::F32Array,
            b'd' => PropertyType::F64Array,
            b'b' => PropertyType::BoolArray,
            b'c' => PropertyType::ByteArray,
            _ => return None,
        };
        Some(ty)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            PropertyType::I32Array
                | PropertyType::I64Array
                | PropertyType::F32Array
                | PropertyType::F64Array
                | PropertyType::BoolArray
                | PropertyType::ByteArray
        )
    }
}

/// A single typed property of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    String(String),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
    BoolArray(Vec<bool>),
    ByteArray(Vec<u8>),
}

impl Property {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Property::Bool(_) => PropertyType::Bool,
            Property::I16(_) => PropertyType::I16,
            Property::I32(_) => PropertyType::I32,
            Property::I64(_) => PropertyType::I64,
            Property::F32(_) => PropertyType::F32,
            Property::F64(_) => PropertyType::F64,
            Property::Bytes(_) => PropertyType::Bytes,
            Property::String(_) => PropertyType::String,
            Property::I32Array(_) => PropertyType::I32Array,
            Property::I64Array(_) => PropertyType::I64Array,
            Property::F32Array(_) => PropertyType::F32Array,
            Property::F64Array(_) => PropertyType::F64Array,
            Property::BoolArray(_) => PropertyType::BoolArray,
            Property::ByteArray(_) => PropertyType::ByteArray,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Property::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Property::I32(v) => Some(v),
            _ => None,
        }
    }

    /// Any integer scalar, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Property::I16(v) => Some(v as i64),
            Property::I32(v) => Some(v as i64),
            Property::I64(v) => Some(v),
            _ => None,
        }
    }

    /// Any floating point scalar, widened.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Property::F32(v) => Some(v as f64),
            Property::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Property::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i32_array(&self) -> Option<&[i32]> {
        match self {
            Property::I32Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i64_array(&self) -> Option<&[i64]> {
        match self {
            Property::I64Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_f32_array(&self) -> Option<&[f32]> {
        match self {
            Property::F32Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_f64_array(&self) -> Option<&[f64]> {
        match self {
            Property::F64Array(a) => Some(a),
            _ => None,
        }
    }

    /// Prepare the property for writing. Arrays are serialized (and compressed)
    /// here so their length is known before anything is emitted.
    pub fn encode(&self, host: Endian) -> Result<Encoded<'_>> {
        let encoded = match self {
            Property::Bool(v) => Encoded::Bool(*v),
            Property::I16(v) => Encoded::I16(*v),
            Property::I32(v) => Encoded::I32(*v),
            Property::I64(v) => Encoded::I64(*v),
            Property::F32(v) => Encoded::F32(*v),
            Property::F64(v) => Encoded::F64(*v),
            Property::Bytes(b) => {
                check_u32("blob length", b.len())?;
                Encoded::Blob(b)
            }
            Property::String(s) => {
                check_u32("string length", s.len())?;
                Encoded::Blob(s.as_bytes())
            }
            Property::I32Array(a) => Encoded::Array(encode_array(a, host)?),
            Property::I64Array(a) => Encoded::Array(encode_array(a, host)?),
            Property::F32Array(a) => Encoded::Array(encode_array(a, host)?),
            Property::F64Array(a) => Encoded::Array(encode_array(a, host)?),
            Property::BoolArray(a) => Encoded::Array(encode_array(a, host)?),
            Property::ByteArray(a) => Encoded::Array(encode_array(a, host)?),
        };
        Ok(encoded)
    }
}

macro_rules! property_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Property {
            fn from(v: $ty) -> Property {
                Property::$variant(v)
            }
        })*
    };
}

property_from! {
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<i32> => I32Array,
    Vec<i64> => I64Array,
    Vec<f32> => F32Array,
    Vec<f64> => F64Array,
    Vec<bool> => BoolArray,
}

impl<'a> From<&'a str> for Property {
    fn from(v: &'a str) -> Property {
        Property::String(v.to_owned())
    }
}

fn check_u32(what: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| FbxError::TooLarge { what, value: len as u64 })
}

/// Header field width and sentinel length, pinned from the file version for
/// the duration of one read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    version: u32,
}

impl Layout {
    pub fn new(version: u32) -> Layout {
        Layout { version }
    }

    pub fn version(self) -> u32 {
        self.version
    }

    pub fn is_wide(self) -> bool {
        self.version >= WIDE_LAYOUT_VERSION
    }

    /// Width of each of the three record header fields.
    pub fn header_width(self) -> u64 {
        if self.is_wide() {
            8
        } else {
            4
        }
    }

    /// Length of a null record: three header fields and an empty id.
    pub fn sentinel_len(self) -> u64 {
        3 * self.header_width() + 1
    }

    pub fn read_header_field<R: Read>(self, r: &mut R) -> io::Result<u64> {
        if self.is_wide() {
            r.unpack::<u64>()
        } else {
            r.unpack::<u32>().map(u64::from)
        }
    }

    pub fn write_header_field<W: Write>(self, w: &mut W, what: &'static str, value: u64) -> Result<()> {
        if self.is_wide() {
            w.pack(value)?;
        } else {
            let narrow = u32::try_from(value).map_err(|_| FbxError::TooLarge { what, value })?;
            w.pack(narrow)?;
        }
        Ok(())
    }
}

/// Byte order of the host serializing array payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

/// Fixed-width element of a typed array property.
pub trait ArrayElement: Copy {
    const WIDTH: usize;

    fn store<B: ByteOrder>(self, out: &mut [u8]);

    fn load<B: ByteOrder>(bytes: &[u8]) -> Self;
}

impl ArrayElement for i32 {
    const WIDTH: usize = 4;

    fn store<B: ByteOrder>(self, out: &mut [u8]) {
        B::write_i32(out, self)
    }

    fn load<B: ByteOrder>(bytes: &[u8]) -> i32 {
        B::read_i32(bytes)
    }
}

impl ArrayElement for i64 {
    const WIDTH: usize = 8;

    fn store<B: ByteOrder>(self, out: &mut [u8]) {
        B::write_i64(out, self)
    }

    fn load<B: ByteOrder>(bytes: &[u8]) -> i64 {
        B::read_i64(bytes)
    }
}

impl ArrayElement for f32 {
    const WIDTH: usize = 4;

    fn store<B: ByteOrder>(self, out: &mut [u8]) {
        B::write_f32(out, self)
    }

    fn load<B: ByteOrder>(bytes: &[u8]) -> f32 {
        B::read_f32(bytes)
    }
}

impl ArrayElement for f64 {
    const WIDTH: usize = 8;

    fn store<B: ByteOrder>(self, out: &mut [u8]) {
        B::write_f64(out, self)
    }

    fn load<B: ByteOrder>(bytes: &[u8]) -> f64 {
        B::read_f64(bytes)
    }
}

impl ArrayElement for bool {
    const WIDTH: usize = 1;

    fn store<B: ByteOrder>(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    fn load<B: ByteOrder>(bytes: &[u8]) -> bool {
        bytes[0] != 0
    }
}

impl ArrayElement for u8 {
    const WIDTH: usize = 1;

    fn store<B: ByteOrder>(self, out: &mut [u8]) {
        out[0] = self;
    }

    fn load<B: ByteOrder>(bytes: &[u8]) -> u8 {
        bytes[0]
    }
}

/// Reverse every `width` sized chunk when the host is big-endian. Applied on
/// the way out and on the way in, it converts between host and wire order.
pub fn swap_for_host(bytes: &mut [u8], width: usize, host: Endian) {
    if host == Endian::Big && width > 1 {
        for chunk in bytes.chunks_exact_mut(width) {
            chunk.reverse();
        }
    }
}

/// An array payload with its wire header values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArray {
    pub length: u32,
    pub encoding: u32,
    pub payload: Vec<u8>,
}

pub fn encode_array<T: ArrayElement>(values: &[T], host: Endian) -> Result<EncodedArray> {
    let length = check_u32("array length", values.len())?;
    let mut raw = vec![0u8; values.len() * T::WIDTH];
    for (value, out) in values.iter().zip(raw.chunks_exact_mut(T::WIDTH)) {
        match host {
            Endian::Little => value.store::<LittleEndian>(out),
            Endian::Big => value.store::<BigEndian>(out),
        }
    }
    swap_for_host(&mut raw, T::WIDTH, host);

    if raw.len() <= COMPRESSION_THRESHOLD {
        return Ok(EncodedArray { length, encoding: ENCODING_RAW, payload: raw });
    }
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::fast());
    encoder.write_all(&raw)?;
    let payload = encoder.finish()?;
    check_u32("compressed array length", payload.len())?;
    Ok(EncodedArray { length, encoding: ENCODING_ZLIB, payload })
}

pub fn decode_array<T: ArrayElement>(array: &EncodedArray, host: Endian) -> Result<Vec<T>> {
    let expected = array.length as usize * T::WIDTH;
    let mut raw = match array.encoding {
        ENCODING_RAW => array.payload.clone(),
        ENCODING_ZLIB => {
            let mut out = Vec::with_capacity(expected);
            ZlibDecoder::new(&array.payload[..])
                .take(expected as u64 + 1)
                .read_to_end(&mut out)
                .map_err(FbxError::Inflate)?;
            out
        }
        other => return Err(FbxError::UnknownArrayEncoding(other)),
    };
    if raw.len() != expected {
        return Err(FbxError::CorruptArray { expected, found: raw.len() });
    }
    swap_for_host(&mut raw, T::WIDTH, host);
    let values = raw
        .chunks_exact(T::WIDTH)
        .map(|chunk| match host {
            Endian::Little => T::load::<LittleEndian>(chunk),
            Endian::Big => T::load::<BigEndian>(chunk),
        })
        .collect();
    Ok(values)
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn read_vec<R: Read>(r: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
    }
    Ok(buf)
}

fn read_blob<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let length = r.read_u32::<LittleEndian>()? as usize;
    read_vec(r, length)
}

fn read_array<R: Read, T: ArrayElement>(r: &mut R) -> Result<Vec<T>> {
    let length = r.read_u32::<LittleEndian>()?;
    let encoding = r.read_u32::<LittleEndian>()?;
    let compressed_length = r.read_u32::<LittleEndian>()? as usize;
    let payload = read_vec(r, compressed_length)?;
    decode_array(&EncodedArray { length, encoding, payload }, Endian::native())
}

/// Decode the value following a type tag.
pub fn read_property<R: Read>(r: &mut R, ty: PropertyType) -> Result<Property> {
    let property = match ty {
        PropertyType::Bool => Property::Bool(r.read_u8()? != 0),
        PropertyType::I16 => Property::I16(r.read_i16::<LittleEndian>()?),
        PropertyType::I32 => Property::I32(r.read_i32::<LittleEndian>()?),
        PropertyType::I64 => Property::I64(r.read_i64::<LittleEndian>()?),
        PropertyType::F32 => Property::F32(r.read_f32::<LittleEndian>()?),
        PropertyType::F64 => Property::F64(r.read_f64::<LittleEndian>()?),
        PropertyType::Bytes => Property::Bytes(read_blob(r)?),
        PropertyType::String => match String::from_utf8(read_blob(r)?) {
            Ok(s) => Property::String(s),
            Err(e) => {
                warn!("invalid UTF-8 in string property, replacing bad sequences");
                Property::String(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        },
        PropertyType::I32Array => Property::I32Array(read_array(r)?),
        PropertyType::I64Array => Property::I64Array(read_array(r)?),
        PropertyType::F32Array => Property::F32Array(read_array(r)?),
        PropertyType::F64Array => Property::F64Array(read_array(r)?),
        PropertyType::BoolArray => Property::BoolArray(read_array(r)?),
        PropertyType::ByteArray => Property::ByteArray(read_array(r)?),
    };
    Ok(property)
}

/// A property ready to be written: scalars by value, blobs borrowed from the
/// tree, arrays already serialized.
#[derive(Debug, Clone)]
pub enum Encoded<'a> {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Blob(&'a [u8]),
    Array(EncodedArray),
}

impl<'a> Encoded<'a> {
    /// Bytes taken by the value, excluding the type tag.
    pub fn encoded_len(&self) -> u64 {
        match self {
            Encoded::Bool(_) => 1,
            Encoded::I16(_) => 2,
            Encoded::I32(_) | Encoded::F32(_) => 4,
            Encoded::I64(_) | Encoded::F64(_) => 8,
            Encoded::Blob(b) => 4 + b.len() as u64,
            Encoded::Array(array) => 12 + array.payload.len() as u64,
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            Encoded::Bool(v) => w.write_u8(*v as u8)?,
            Encoded::I16(v) => w.write_i16::<LittleEndian>(*v)?,
            Encoded::I32(v) => w.write_i32::<LittleEndian>(*v)?,
            Encoded::I64(v) => w.write_i64::<LittleEndian>(*v)?,
            Encoded::F32(v) => w.write_f32::<LittleEndian>(*v)?,
            Encoded::F64(v) => w.write_f64::<LittleEndian>(*v)?,
            Encoded::Blob(b) => {
                w.write_u32::<LittleEndian>(b.len() as u32)?;
                w.write_all(b)?;
            }
            Encoded::Array(array) => {
                w.write_u32::<LittleEndian>(array.length)?;
                w.write_u32::<LittleEndian>(array.encoding)?;
                w.write_u32::<LittleEndian>(array.payload.len() as u32)?;
                w.write_all(&array.payload)?;
            }
        }
        Ok(())
    }
}

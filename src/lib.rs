//! The `fbxbin` crate reads and writes binary `fbx` files. Files are decoded
//! into a generic [`Element`] tree and encoded back from one; the scene helpers
//! in [`scene`] and [`props`] interpret that tree without owning it.
//!
//! ```no_run
//! let (root, version) = fbxbin::read("model.fbx")?;
//! fbxbin::write("copy.fbx", &root, version)?;
//! # Ok::<(), fbxbin::FbxError>(())
//! ```

pub mod element;
pub mod error;
pub mod naming;
pub mod props;
pub mod reader;
pub mod scene;
pub mod types;
pub mod writer;

pub use element::{name_class, Element, HostValue};
pub use error::{FbxError, Result};
pub use reader::{read, read_from, read_from_bytes};
pub use types::{Property, PropertyType};
pub use writer::{write, write_to, write_to_bytes};

/// Leading bytes of every binary FBX file, followed by the version as u32.
pub const MAGIC: &[u8; 23] = b"Kaydara FBX Binary  \x00\x1a\x00";

/// Oldest version the codec handles.
pub const MIN_VERSION: u32 = 7100;

/// Deepest record nesting the reader and writer accept.
pub const MAX_DEPTH: usize = 256;

#[cfg(test)]
mod tests;

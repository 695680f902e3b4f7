//! Pack codec for chainpack.
//!
//! A pack is the serialized set of version-control objects introduced by one
//! push. Packs are content-addressed in the object store, so the encoding is
//! deterministic: entries are resolved to full objects, deduplicated, and
//! written in ascending object-id order.
//!
//! # Format
//!
//! ```text
//! header:  "CPKP" | version u32 BE | count u32 BE
//! entry:   type u8 | oid_len u8 | oid | varint raw_len | varint zlen | crc32 BE | zstd(data)
//! trailer: BLAKE3(header + entries)
//! ```
//!
//! - **PackWriter**: builds packs, normalizing delta inputs
//! - **PackReader**: validates and decodes packs sequentially
//! - [`concat`] / [`split`]: merge packs, or break one into bounded pieces

pub mod delta;
pub mod entry;
pub mod error;
pub mod reader;
mod varint;
pub mod writer;

use cpk_types::RawObject;

pub use delta::{apply_delta, encode_delta};
pub use entry::{PackObjectKind, SourceObject};
pub use error::{PackError, PackResult};
pub use reader::PackReader;
pub use writer::PackWriter;

pub(crate) const MAGIC: &[u8; 4] = b"CPKP";
pub(crate) const FORMAT_VERSION: u32 = 1;

/// Build a pack from full and delta-encoded objects.
pub fn build(objects: impl IntoIterator<Item = SourceObject>) -> PackResult<Vec<u8>> {
    let mut writer = PackWriter::new();
    for obj in objects {
        writer.add_source(obj);
    }
    writer.finish()
}

/// Parse a pack into its objects.
pub fn parse(bytes: &[u8]) -> PackResult<Vec<RawObject>> {
    PackReader::parse(bytes)
}

/// Merge several packs into one. Objects present in more than one input
/// appear once.
pub fn concat<'a>(packs: impl IntoIterator<Item = &'a [u8]>) -> PackResult<Vec<u8>> {
    let mut writer = PackWriter::new();
    for pack in packs {
        for obj in PackReader::parse(pack)? {
            writer.add_object(obj);
        }
    }
    writer.finish()
}

/// Split a pack into packs of at most `max_objects` objects each, preserving
/// object order. An empty pack splits into a single empty pack.
pub fn split(pack: &[u8], max_objects: usize) -> PackResult<Vec<Vec<u8>>> {
    if max_objects == 0 {
        return Err(PackError::InvalidSplit(max_objects));
    }
    let objects = PackReader::parse(pack)?;
    if objects.is_empty() {
        return Ok(vec![PackWriter::new().finish()?]);
    }
    objects
        .chunks(max_objects)
        .map(|chunk| {
            let mut writer = PackWriter::new();
            for obj in chunk {
                writer.add_object(obj.clone());
            }
            writer.finish()
        })
        .collect()
}

use std::collections::BTreeMap;

use cpk_types::{Oid, RawObject};
use tracing::debug;

use crate::entry::{PackObjectKind, SourceObject};
use crate::error::{PackError, PackResult};
use crate::varint::encode_varint;
use crate::{delta, FORMAT_VERSION, MAGIC};

const COMPRESSION_LEVEL: i32 = 3;

/// Builds pack bytes from a set of objects.
///
/// Objects may arrive as full objects or as deltas against a base that is
/// either another queued object or supplied by a base lookup. [`finish`]
/// resolves every delta, deduplicates by object id, and writes entries in
/// ascending id order, so the same object set always yields the same bytes.
///
/// [`finish`]: PackWriter::finish
#[derive(Default)]
pub struct PackWriter {
    resolved: BTreeMap<Oid, RawObject>,
    pending: Vec<(Oid, Oid, Vec<u8>)>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, obj: RawObject) {
        self.resolved.entry(obj.oid.clone()).or_insert(obj);
    }

    pub fn add_source(&mut self, src: SourceObject) {
        match src.kind {
            PackObjectKind::Full(kind) => self.add_object(RawObject::new(src.oid, kind, src.data)),
            PackObjectKind::Delta { base } => self.pending.push((src.oid, base, src.data)),
        }
    }

    /// Objects queued so far, counting unresolved deltas.
    pub fn len(&self) -> usize {
        self.resolved.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.pending.is_empty()
    }

    /// Build the pack. Delta bases must be among the queued objects.
    pub fn finish(self) -> PackResult<Vec<u8>> {
        self.finish_with_bases(|_| None)
    }

    /// Build the pack, consulting `lookup` for delta bases that are not in
    /// the pack itself (objects the receiver already has).
    pub fn finish_with_bases<F>(mut self, lookup: F) -> PackResult<Vec<u8>>
    where
        F: Fn(&Oid) -> Option<RawObject>,
    {
        self.resolve_deltas(&lookup)?;
        encode(self.resolved.values())
    }

    /// Resolve pending deltas until none remain. Chains resolve across
    /// passes; a pass that makes no progress means a base is missing.
    fn resolve_deltas<F>(&mut self, lookup: &F) -> PackResult<()>
    where
        F: Fn(&Oid) -> Option<RawObject>,
    {
        let mut external: BTreeMap<Oid, RawObject> = BTreeMap::new();

        while !self.pending.is_empty() {
            let before = self.pending.len();
            let mut still_pending = Vec::new();

            for (oid, base_oid, data) in std::mem::take(&mut self.pending) {
                if self.resolved.contains_key(&oid) {
                    continue;
                }
                let base = match self.resolved.get(&base_oid) {
                    Some(base) => Some(base),
                    None => {
                        if !external.contains_key(&base_oid) {
                            if let Some(found) = lookup(&base_oid) {
                                external.insert(base_oid.clone(), found);
                            }
                        }
                        external.get(&base_oid)
                    }
                };
                match base {
                    Some(base) => {
                        let kind = base.kind;
                        let body = delta::apply_delta(&base.data, &data)?;
                        self.resolved.insert(oid.clone(), RawObject::new(oid, kind, body));
                    }
                    None => still_pending.push((oid, base_oid, data)),
                }
            }

            if still_pending.len() == before {
                let (_, base, _) = &still_pending[0];
                return Err(PackError::DeltaBaseNotFound(base.clone()));
            }
            self.pending = still_pending;
        }
        Ok(())
    }
}

/// Serialize already-resolved objects. Callers guarantee ascending, unique ids.
fn encode<'a>(objects: impl ExactSizeIterator<Item = &'a RawObject>) -> PackResult<Vec<u8>> {
    let count = objects.len();
    let mut out = Vec::new();

    // Header: magic + version + object count
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&(count as u32).to_be_bytes());

    for obj in objects {
        out.push(PackObjectKind::Full(obj.kind).type_byte());
        out.push(obj.oid.len() as u8);
        out.extend_from_slice(obj.oid.as_bytes());

        let compressed = zstd::encode_all(obj.data.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| PackError::CompressionFailed(e.to_string()))?;
        encode_varint(&mut out, obj.data.len() as u64);
        encode_varint(&mut out, compressed.len() as u64);
        out.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
        out.extend_from_slice(&compressed);
    }

    // Trailer: BLAKE3 of everything so far
    let checksum = *blake3::hash(&out).as_bytes();
    out.extend_from_slice(&checksum);

    debug!(objects = count, bytes = out.len(), "built pack");
    Ok(out)
}

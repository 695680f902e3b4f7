use cpk_types::{Oid, RawObject};
use tracing::debug;

use crate::entry::PackObjectKind;
use crate::error::{PackError, PackResult};
use crate::varint::decode_varint;
use crate::{FORMAT_VERSION, MAGIC};

const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 32;

/// Sequential pack parser.
///
/// The whole pack is validated (magic, version, trailer checksum) before any
/// entry is decoded; each entry is then checked for CRC and size. Nothing is
/// returned unless every entry decodes.
#[derive(Debug)]
pub struct PackReader<'a> {
    body: &'a [u8],
    count: u32,
}

impl<'a> PackReader<'a> {
    pub fn new(data: &'a [u8]) -> PackResult<Self> {
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &data[0..4] != MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(&data[4..8]);
        if version != FORMAT_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let (body, trailer) = data.split_at(data.len() - TRAILER_LEN);
        if blake3::hash(body).as_bytes() != trailer {
            return Err(PackError::ChecksumMismatch);
        }

        Ok(Self {
            body,
            count: read_u32(&data[8..12]),
        })
    }

    /// Parse and return every object in the pack.
    pub fn parse(data: &[u8]) -> PackResult<Vec<RawObject>> {
        PackReader::new(data)?.objects()
    }

    /// Object count declared in the header.
    pub fn object_count(&self) -> u32 {
        self.count
    }

    pub fn objects(&self) -> PackResult<Vec<RawObject>> {
        let mut pos = HEADER_LEN;
        let mut out = Vec::with_capacity(self.count.min(4096) as usize);

        while pos < self.body.len() {
            let (obj, next) = self.read_entry(pos)?;
            out.push(obj);
            pos = next;
        }

        if out.len() as u64 != self.count as u64 {
            return Err(PackError::CountMismatch {
                expected: self.count,
                actual: out.len() as u32,
            });
        }
        debug!(objects = out.len(), "parsed pack");
        Ok(out)
    }

    fn read_entry(&self, offset: usize) -> PackResult<(RawObject, usize)> {
        let data = self.body;
        let corrupt = |reason: String| PackError::CorruptEntry {
            offset: offset as u64,
            reason,
        };
        let mut pos = offset;

        let type_byte = data[pos];
        pos += 1;
        let kind = match PackObjectKind::kind_from_type_byte(type_byte) {
            Some(kind) => kind,
            None if type_byte == 6 => {
                return Err(corrupt("unresolved delta entry".into()));
            }
            None => return Err(corrupt(format!("unknown type byte: {type_byte}"))),
        };

        let oid_len = *data
            .get(pos)
            .ok_or_else(|| corrupt("truncated object id".into()))? as usize;
        pos += 1;
        let oid_bytes = data
            .get(pos..pos + oid_len)
            .ok_or_else(|| corrupt("truncated object id".into()))?;
        let oid = Oid::from_slice(oid_bytes).map_err(|e| corrupt(e.to_string()))?;
        pos += oid_len;

        let (uncompressed_size, consumed) =
            decode_varint(&data[pos..]).map_err(|_| corrupt("bad size varint".into()))?;
        pos += consumed;
        let (compressed_size, consumed) =
            decode_varint(&data[pos..]).map_err(|_| corrupt("bad size varint".into()))?;
        pos += consumed;

        let crc_bytes = data
            .get(pos..pos + 4)
            .ok_or_else(|| corrupt("truncated crc".into()))?;
        let expected_crc = read_u32(crc_bytes);
        pos += 4;

        let end = usize::try_from(compressed_size)
            .ok()
            .and_then(|n| pos.checked_add(n))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| corrupt("compressed data extends beyond pack".into()))?;
        let compressed = &data[pos..end];

        if crc32fast::hash(compressed) != expected_crc {
            return Err(PackError::CrcMismatch { oid });
        }

        let decompressed = zstd::decode_all(compressed)
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if decompressed.len() as u64 != uncompressed_size {
            return Err(corrupt(format!(
                "size mismatch: expected {uncompressed_size}, got {}",
                decompressed.len()
            )));
        }

        Ok((RawObject::new(oid, kind, decompressed), end))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackWriter;
    use cpk_types::ObjectKind;

    fn sample_pack() -> Vec<u8> {
        let mut w = PackWriter::new();
        for n in 1..=3u8 {
            w.add_object(RawObject::new(
                Oid::from_slice(&[n; 20]).unwrap(),
                ObjectKind::Blob,
                vec![n; 100],
            ));
        }
        w.finish().unwrap()
    }

    /// Recompute the trailer so a deliberately damaged body passes the
    /// checksum and reaches entry validation.
    fn reseal(bytes: &mut Vec<u8>) {
        let body_len = bytes.len() - TRAILER_LEN;
        let checksum = *blake3::hash(&bytes[..body_len]).as_bytes();
        bytes[body_len..].copy_from_slice(&checksum);
    }

    #[test]
    fn parses_written_pack() {
        let objects = PackReader::parse(&sample_pack()).unwrap();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[2].data, vec![3u8; 100]);
    }

    #[test]
    fn header_reports_count() {
        let bytes = sample_pack();
        assert_eq!(PackReader::new(&bytes).unwrap().object_count(), 3);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_pack();
        bytes[0] = b'X';
        assert!(matches!(
            PackReader::parse(&bytes),
            Err(PackError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = sample_pack();
        bytes[7] = 9;
        assert_eq!(PackReader::parse(&bytes), Err(PackError::UnsupportedVersion(9)));
    }

    #[test]
    fn rejects_flipped_body_bit() {
        let mut bytes = sample_pack();
        bytes[20] ^= 0x01;
        assert_eq!(PackReader::parse(&bytes), Err(PackError::ChecksumMismatch));
    }

    #[test]
    fn rejects_truncation() {
        let bytes = sample_pack();
        assert!(PackReader::parse(&bytes[..bytes.len() - 1]).is_err());
        assert!(PackReader::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn crc_is_checked_per_entry() {
        let mut bytes = sample_pack();
        // Last compressed byte of the final entry, just before the trailer.
        let idx = bytes.len() - TRAILER_LEN - 1;
        bytes[idx] ^= 0xff;
        reseal(&mut bytes);
        assert!(matches!(
            PackReader::parse(&bytes),
            Err(PackError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn count_mismatch_is_detected() {
        let mut bytes = sample_pack();
        bytes[11] = 4;
        reseal(&mut bytes);
        assert_eq!(
            PackReader::parse(&bytes),
            Err(PackError::CountMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn unknown_type_byte_is_corrupt() {
        let mut bytes = sample_pack();
        bytes[HEADER_LEN] = 0x42;
        reseal(&mut bytes);
        assert!(matches!(
            PackReader::parse(&bytes),
            Err(PackError::CorruptEntry { offset: 12, .. })
        ));
    }
}

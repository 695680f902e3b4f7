//! Git-compatible copy/insert deltas.
//!
//! ```text
//! delta   := varint(base_len) varint(result_len) instr*
//! copy    := 1ooossss  offset[0..4] size[0..3]   (size 0 means 0x10000)
//! insert  := 0nnnnnnn  byte[n]                   (n in 1..=127)
//! ```
//!
//! Only the offset and size bytes whose flag bit is set are present, least
//! significant first.

use crate::error::{PackError, PackResult};
use crate::varint::{decode_varint, encode_varint};

const MAX_INSERT: usize = 0x7f;
const MAX_COPY: usize = 0x10000;

/// Apply `delta` to `base`, producing the target bytes.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> PackResult<Vec<u8>> {
    let invalid = |reason: &str| PackError::InvalidDelta(reason.to_string());

    let (base_len, mut pos) = decode_varint(delta).map_err(|_| invalid("bad base size"))?;
    if base_len as usize != base.len() {
        return Err(PackError::InvalidDelta(format!(
            "base length {} does not match expected {base_len}",
            base.len()
        )));
    }
    let (result_len, consumed) =
        decode_varint(&delta[pos..]).map_err(|_| invalid("bad result size"))?;
    pos += consumed;

    let mut out = Vec::with_capacity(result_len as usize);
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            let mut offset: usize = 0;
            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| invalid("truncated copy offset"))?;
                    offset |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            let mut size: usize = 0;
            for i in 0..3 {
                if cmd & (0x10 << i) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| invalid("truncated copy size"))?;
                    size |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            if size == 0 {
                size = MAX_COPY;
            }
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= base.len())
                .ok_or_else(|| invalid("copy extends beyond base"))?;
            out.extend_from_slice(&base[offset..end]);
        } else if cmd != 0 {
            let n = cmd as usize;
            let end = pos + n;
            if end > delta.len() {
                return Err(invalid("truncated insert"));
            }
            out.extend_from_slice(&delta[pos..end]);
            pos = end;
        } else {
            return Err(invalid("reserved opcode 0"));
        }
    }

    if out.len() as u64 != result_len {
        return Err(PackError::InvalidDelta(format!(
            "result length {} does not match expected {result_len}",
            out.len()
        )));
    }
    Ok(out)
}

/// Encode `target` as a delta against `base`.
///
/// Copies the longest common prefix and suffix and inserts the middle. Good
/// enough for incremental edits; not a general-purpose matcher.
pub fn encode_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_varint(&mut out, base.len() as u64);
    encode_varint(&mut out, target.len() as u64);

    let prefix = base
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = base.len().min(target.len()) - prefix;
    let suffix = base
        .iter()
        .rev()
        .zip(target.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    push_copy(&mut out, 0, prefix);
    push_insert(&mut out, &target[prefix..target.len() - suffix]);
    push_copy(&mut out, base.len() - suffix, suffix);
    out
}

fn push_copy(out: &mut Vec<u8>, mut offset: usize, mut len: usize) {
    while len > 0 {
        let chunk = len.min(MAX_COPY);
        let mut cmd = 0x80u8;
        let mut args = Vec::with_capacity(7);
        for i in 0..4 {
            let byte = ((offset >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                cmd |= 1 << i;
                args.push(byte);
            }
        }
        if chunk != MAX_COPY {
            for i in 0..3 {
                let byte = ((chunk >> (8 * i)) & 0xff) as u8;
                if byte != 0 {
                    cmd |= 0x10 << i;
                    args.push(byte);
                }
            }
        }
        out.push(cmd);
        out.extend_from_slice(&args);
        offset += chunk;
        len -= chunk;
    }
}

fn push_insert(out: &mut Vec<u8>, data: &[u8]) {
    for chunk in data.chunks(MAX_INSERT) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
}

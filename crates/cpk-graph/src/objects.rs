//! Git-shaped commit and tree encodings.
//!
//! ```text
//! commit:  "tree <hex>\n" ("parent <hex>\n")* "\n" message
//! tree:    (mode " " name "\0" raw_oid)*      sorted by name
//! ```

use cpk_types::Oid;

use crate::error::{GraphError, GraphResult};

pub const MODE_FILE: &str = "100644";
pub const MODE_TREE: &str = "40000";

/// Tree and parents named by a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub tree: Oid,
    pub parents: Vec<Oid>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub name: String,
    pub oid: Oid,
}

impl TreeEntry {
    pub fn file(name: impl Into<String>, oid: Oid) -> Self {
        Self {
            mode: MODE_FILE.into(),
            name: name.into(),
            oid,
        }
    }

    pub fn dir(name: impl Into<String>, oid: Oid) -> Self {
        Self {
            mode: MODE_TREE.into(),
            name: name.into(),
            oid,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }
}

pub fn encode_commit(tree: &Oid, parents: &[Oid], message: &str) -> Vec<u8> {
    let mut out = format!("tree {tree}\n");
    for parent in parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push('\n');
    out.push_str(message);
    out.into_bytes()
}

pub fn parse_commit(oid: &Oid, data: &[u8]) -> GraphResult<CommitInfo> {
    let corrupt = |reason: &str| GraphError::CorruptObject {
        oid: oid.clone(),
        reason: reason.into(),
    };
    let text = std::str::from_utf8(data).map_err(|_| corrupt("commit header is not utf-8"))?;
    let header = text.split("\n\n").next().unwrap_or_default();

    let mut tree = None;
    let mut parents = Vec::new();
    for line in header.lines() {
        if let Some(hex) = line.strip_prefix("tree ") {
            tree = Some(Oid::from_hex(hex).map_err(|_| corrupt("bad tree id"))?);
        } else if let Some(hex) = line.strip_prefix("parent ") {
            parents.push(Oid::from_hex(hex).map_err(|_| corrupt("bad parent id"))?);
        }
    }
    Ok(CommitInfo {
        tree: tree.ok_or_else(|| corrupt("commit has no tree"))?,
        parents,
    })
}

/// Encode entries, sorting by name.
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut out = Vec::new();
    for entry in sorted {
        out.extend_from_slice(entry.mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.oid.as_bytes());
    }
    out
}

pub fn parse_tree(oid: &Oid, data: &[u8], oid_len: usize) -> GraphResult<Vec<TreeEntry>> {
    let corrupt = |reason: &str| GraphError::CorruptObject {
        oid: oid.clone(),
        reason: reason.into(),
    };
    let mut entries = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| corrupt("entry without mode"))?;
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .filter(|&n| n > space)
            .ok_or_else(|| corrupt("entry without name terminator"))?;
        let id_end = nul + 1 + oid_len;
        if id_end > rest.len() {
            return Err(corrupt("truncated entry id"));
        }
        let mode = std::str::from_utf8(&rest[..space]).map_err(|_| corrupt("bad mode"))?;
        let name = std::str::from_utf8(&rest[space + 1..nul]).map_err(|_| corrupt("bad name"))?;
        let entry_oid =
            Oid::from_slice(&rest[nul + 1..id_end]).map_err(|_| corrupt("bad entry id"))?;
        entries.push(TreeEntry {
            mode: mode.to_string(),
            name: name.to_string(),
            oid: entry_oid,
        });
        rest = &rest[id_end..];
    }
    Ok(entries)
}

use std::fmt;

use cpk_crypto::{PublicKey, WrappedKey};
use cpk_types::{ObjectId, Oid};
use serde::{Deserialize, Serialize};

/// Membership role within a repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Writer,
    Reader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Writer => "writer",
            Self::Reader => "reader",
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            Self::Owner => "owners",
            Self::Writer => "writers",
            Self::Reader => "readers",
        }
    }

    /// Message for a non-owner attempting to grant this role.
    pub fn add_denied(&self) -> String {
        format!("Only repo owners can add new {}", self.plural())
    }

    /// Message for a non-owner attempting to revoke this role.
    pub fn remove_denied(&self) -> String {
        format!("Only repo owners can remove {}", self.plural())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One principal's copy of a private repository's content key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGrant {
    pub wrapped: WrappedKey,
    pub public_key: PublicKey,
}

/// An immutable record of one push.
///
/// Records are keyed by `(repository, head)` and link backward through
/// `previous` to the push before them on the same reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRecord {
    pub head: Oid,
    /// Store digest of the pack holding the objects this push introduced.
    pub pack: ObjectId,
    pub previous: Option<Oid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_messages() {
        assert_eq!(Role::Owner.add_denied(), "Only repo owners can add new owners");
        assert_eq!(Role::Reader.remove_denied(), "Only repo owners can remove readers");
    }

    #[test]
    fn push_record_json_is_flat_hex() {
        let record = PushRecord {
            head: Oid::from_slice(&[0xaa; 20]).unwrap(),
            pack: ObjectId::from_hash([0xbb; 32]),
            previous: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["head"], "aa".repeat(20));
        assert_eq!(json["pack"], "bb".repeat(32));
        assert!(json["previous"].is_null());
    }
}

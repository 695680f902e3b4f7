use cpk_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag is prepended to every computation so that a pack blob and
/// a local graph object with identical bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Blobs kept in the object store (packs, plaintext or sealed).
    pub const STORE: Self = Self {
        domain: "cpk-store-v1",
    };
    /// Objects in the in-memory version-control graph.
    pub const GRAPH: Self = Self {
        domain: "cpk-graph-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Like [`hash`](Self::hash) with a header `kind len\0` mixed in ahead of
    /// the payload, mirroring how git names loose objects.
    pub fn hash_object(&self, kind: &str, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(kind.as_bytes());
        hasher.update(b" ");
        hasher.update(data.len().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

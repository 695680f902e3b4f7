use cpk_types::{ObjectId, Oid};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    UpToDate,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushResult {
    pub status: SyncStatus,
    pub head: Oid,
    /// Head recorded before this push.
    pub previous: Option<Oid>,
    /// Store digest of the pack, absent when nothing was pushed.
    pub pack: Option<ObjectId>,
    pub objects_sent: usize,
    pub bytes_transferred: u64,
    pub encrypted: bool,
}

impl PushResult {
    pub(crate) fn up_to_date(head: Oid) -> Self {
        Self {
            status: SyncStatus::UpToDate,
            previous: Some(head.clone()),
            head,
            pack: None,
            objects_sent: 0,
            bytes_transferred: 0,
            encrypted: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullResult {
    pub status: SyncStatus,
    pub head: Oid,
    /// Push records fetched, newest first.
    pub records: Vec<Oid>,
    pub objects_received: usize,
    pub bytes_transferred: u64,
}

impl PullResult {
    pub(crate) fn up_to_date(head: Oid) -> Self {
        Self {
            status: SyncStatus::UpToDate,
            head,
            records: Vec::new(),
            objects_received: 0,
            bytes_transferred: 0,
        }
    }
}

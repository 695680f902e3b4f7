use cpk_pack::SourceObject;
use cpk_types::{Oid, RawObject, RefName, RepoRef};

use crate::error::GraphResult;

/// Local ref that records where `remote` was last pushed or pulled.
pub fn tracking_ref_name(remote: &RepoRef) -> String {
    format!("refs/remotes/{}/{}", remote.repo, remote.name)
}

/// The local object graph as seen by the sync engine.
///
/// Implementations own all commit and tree semantics; the engine only moves
/// opaque objects in and out and moves refs.
pub trait LocalRepository {
    /// Commit currently checked out, or `None` for an empty repository.
    fn head(&self) -> GraphResult<Option<Oid>>;

    fn contains(&self, oid: &Oid) -> GraphResult<bool>;

    fn read_object(&self, oid: &Oid) -> GraphResult<Option<RawObject>>;

    /// Every object reachable from `new` and not reachable from `old`.
    ///
    /// Objects may come back delta-encoded against a base that is either in
    /// the returned set or reachable from `old`.
    fn missing_objects(&self, new: &Oid, old: Option<&Oid>) -> GraphResult<Vec<SourceObject>>;

    /// Write objects into the local store. Existing objects are skipped.
    fn apply(&mut self, objects: &[RawObject]) -> GraphResult<()>;

    /// Point `refs/heads/<branch>` at `oid` and make it the checked-out
    /// branch.
    fn set_head(&mut self, branch: &RefName, oid: &Oid) -> GraphResult<()>;

    fn set_tracking_ref(&mut self, remote: &RepoRef, oid: &Oid) -> GraphResult<()>;

    fn tracking_ref(&self, remote: &RepoRef) -> GraphResult<Option<Oid>>;

    /// Commits reachable from `head`, parents before children.
    fn history(&self, head: &Oid) -> GraphResult<Vec<Oid>>;
}

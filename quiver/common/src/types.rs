use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Internal identifier associated with a vertex label.
///
/// [`NonZeroU32`] is used to enable some memory layout optimizations:
/// `Option<LabelId>` is guaranteed to have the same size as `LabelId`.
pub type LabelId = NonZeroU32;

/// Internal identifier associated with an edge type.
pub type EdgeTypeId = NonZeroU32;

/// Internal identifier associated with a property key.
pub type PropertyId = u32;

/// Identifier of one worker process in the cluster.
pub type WorkerId = i32;

/// Number of high bits of a [`Gid`] reserved for the owning worker.
const WORKER_BITS: u32 = 10;
const LOCAL_BITS: u32 = 64 - WORKER_BITS;
const LOCAL_MASK: u64 = (1 << LOCAL_BITS) - 1;

/// Opaque 64-bit global identifier of a vertex or edge, unique across the
/// cluster. The high bits encode the owning worker, the low bits a
/// per-worker sequence number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Gid(u64);

impl Gid {
    pub fn new(worker_id: WorkerId, local: u64) -> Self {
        debug_assert!(worker_id >= 0 && (worker_id as u64) < (1 << WORKER_BITS));
        debug_assert!(local <= LOCAL_MASK);
        Self(((worker_id as u64) << LOCAL_BITS) | (local & LOCAL_MASK))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The worker owning this record.
    pub fn worker_id(&self) -> WorkerId {
        (self.0 >> LOCAL_BITS) as WorkerId
    }

    /// The per-worker sequence part.
    pub fn local(&self) -> u64 {
        self.0 & LOCAL_MASK
    }
}

impl Display for Gid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.worker_id(), self.local())
    }
}

/// Identifier of a transaction, unique per database instance. Ids are
/// issued monotonically starting at 1; 0 is reserved and means "no
/// transaction" (e.g. in a version's expiry field).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TxnId(u64);

impl TxnId {
    pub const NONE: TxnId = TxnId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl Display for TxnId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Global address of a record: the owning worker plus the record's [`Gid`].
/// Records reference each other by address only; a local address resolves
/// to the in-memory record through the store maps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Address {
    pub worker_id: WorkerId,
    pub gid: Gid,
}

impl Address {
    pub fn new(worker_id: WorkerId, gid: Gid) -> Self {
        Self { worker_id, gid }
    }

    /// Whether the record lives on the given worker.
    pub fn is_local_to(&self, worker_id: WorkerId) -> bool {
        self.worker_id == worker_id
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.gid, self.worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gid_round_trips_worker_and_local() {
        let gid = Gid::new(13, 42);
        assert_eq!(gid.worker_id(), 13);
        assert_eq!(gid.local(), 42);
        assert_eq!(Gid::from_raw(gid.raw()), gid);
    }

    #[test]
    fn gid_worker_zero_is_plain_sequence() {
        let gid = Gid::new(0, 7);
        assert_eq!(gid.raw(), 7);
    }

    #[test]
    fn option_label_id_is_four_bytes() {
        assert_eq!(size_of::<Option<LabelId>>(), size_of::<LabelId>());
        assert_eq!(size_of::<Option<LabelId>>(), 4);
    }
}

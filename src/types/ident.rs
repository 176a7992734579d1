//! Track identity
//!
//! Every track gets a UUID once at spawn and keeps it until deletion; ids
//! are never reused. Generation goes through the [`IdProvider`] trait so the
//! manager can run with random ids in production and sequential ids in tests.

use core::fmt;

use uuid::Uuid;

/// Persistent unique identifier of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(Uuid);

impl TrackId {
    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of fresh track identities.
pub trait IdProvider {
    /// Returns an id not handed out before by this provider.
    fn next_id(&mut self) -> TrackId;
}

/// Production provider: random version-4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdProvider;

impl IdProvider for RandomIdProvider {
    fn next_id(&mut self) -> TrackId {
        TrackId(Uuid::new_v4())
    }
}

/// Deterministic provider for tests: ids 1, 2, 3, ... encoded as UUIDs.
#[derive(Debug, Clone)]
pub struct SequentialIdProvider {
    next: u128,
}

impl SequentialIdProvider {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Starts the sequence at an arbitrary value.
    pub fn starting_at(first: u128) -> Self {
        Self { next: first }
    }
}

impl Default for SequentialIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdProvider for SequentialIdProvider {
    fn next_id(&mut self) -> TrackId {
        let id = TrackId(Uuid::from_u128(self.next));
        self.next += 1;
        id
    }
}

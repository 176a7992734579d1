//! Generational track storage
//!
//! Live tracks sit in one contiguous vector addressed by [`TrackHandle`],
//! an index plus a generation counter. Removing a track bumps the slot's
//! generation, so a handle kept across a removal resolves to `None` instead
//! of whatever track reuses the slot. A handle therefore never refers to a
//! different track than the one it was minted for.

use crate::tracker::Track;

/// Stable reference to a track slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    track: Option<Track>,
}

/// Arena of live tracks with slot reuse.
#[derive(Debug, Default)]
pub struct TrackArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl TrackArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tracks.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Stores a track and returns its handle.
    pub fn insert(&mut self, track: Track) -> TrackHandle {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.track = Some(track);
                TrackHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    track: Some(track),
                });
                TrackHandle {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Resolves a handle, `None` when the track was removed.
    pub fn get(&self, handle: TrackHandle) -> Option<&Track> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.track.as_ref())
    }

    pub fn get_mut(&mut self, handle: TrackHandle) -> Option<&mut Track> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.track.as_mut())
    }

    pub fn contains(&self, handle: TrackHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Removes a track, invalidating every copy of its handle.
    pub fn remove(&mut self, handle: TrackHandle) -> Option<Track> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let track = slot.track.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(track)
    }

    /// Iterates live tracks in slot order.
    ///
    /// Slot order is not spawn order once slots are reused; callers that
    /// need spawn order keep their own handle list.
    pub fn iter(&self) -> impl Iterator<Item = (TrackHandle, &Track)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.track.as_ref().map(|track| {
                (
                    TrackHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    track,
                )
            })
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerChoice;
    use crate::types::classification::{Classification, ObjectLabel};
    use crate::types::ident::{IdProvider, SequentialIdProvider};
    use crate::types::object::{DetectedObject, OrientationAvailability, Pose};
    use crate::types::shape::Shape;
    use crate::types::time::Stamp;

    fn test_track(ids: &mut SequentialIdProvider, x: f64) -> Track {
        let detection = DetectedObject {
            pose: Pose::from_xy_yaw(x, 0.0, 0.0),
            shape: Shape::BoundingBox {
                length: 4.2,
                width: 1.8,
                height: 1.5,
            },
            classification: Classification::certain(ObjectLabel::Car),
            orientation: OrientationAvailability::Available,
            longitudinal_velocity: None,
        };
        Track::spawn(
            ids.next_id(),
            &detection,
            Stamp::from_secs(0),
            TrackerChoice::NormalVehicle,
        )
    }

    #[test]
    fn test_insert_get_remove() {
        let mut ids = SequentialIdProvider::new();
        let mut arena = TrackArena::new();
        assert!(arena.is_empty());

        let handle = arena.insert(test_track(&mut ids, 1.0));
        assert_eq!(arena.len(), 1);
        assert!((arena.get(handle).unwrap().position().x - 1.0).abs() < 1e-12);

        let removed = arena.remove(handle).unwrap();
        assert!((removed.position().x - 1.0).abs() < 1e-12);
        assert!(arena.is_empty());
        assert!(arena.get(handle).is_none());
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut ids = SequentialIdProvider::new();
        let mut arena = TrackArena::new();

        let old = arena.insert(test_track(&mut ids, 1.0));
        arena.remove(old);
        let new = arena.insert(test_track(&mut ids, 2.0));

        // The slot is reused but the stale handle must not see the new track.
        assert!(arena.get(old).is_none());
        assert!(!arena.contains(old));
        assert!((arena.get(new).unwrap().position().x - 2.0).abs() < 1e-12);
        assert!(arena.remove(old).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut ids = SequentialIdProvider::new();
        let mut arena = TrackArena::new();
        let handle = arena.insert(test_track(&mut ids, 0.0));

        arena
            .get_mut(handle)
            .unwrap()
            .predict_to(Stamp::from_secs_f64(0.5))
            .unwrap();
        assert_eq!(
            arena.get(handle).unwrap().state_time(),
            Stamp::from_secs_f64(0.5)
        );
    }

    #[test]
    fn test_iter_yields_live_tracks() {
        let mut ids = SequentialIdProvider::new();
        let mut arena = TrackArena::new();
        let a = arena.insert(test_track(&mut ids, 1.0));
        let b = arena.insert(test_track(&mut ids, 2.0));
        arena.remove(a);

        let collected: Vec<_> = arena.iter().collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].0, b);
    }
}

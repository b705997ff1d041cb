//! Lazily-created, in-memory map of room id to room state.
//!
//! Two-level locking: the registry lock guards only the id -> room map;
//! all membership and variant state lives behind each room's own lock, so
//! room mutations never hold up lookups of unrelated rooms.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

/// Generic registry shared by all room variants.
pub struct RoomRegistry<R> {
    rooms: Mutex<HashMap<String, Arc<Mutex<R>>>>,
}

impl<R: Default> RoomRegistry<R> {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Return the room for `id`, creating an empty one on first join.
    pub async fn get_or_create(&self, id: &str) -> Arc<Mutex<R>> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(R::default())))
            .clone()
    }

    /// Delete the entry for `id`, fully resetting state for the next
    /// occupants. Callers invoke this only after observing, under the room
    /// lock, that membership just reached zero.
    pub async fn remove(&self, id: &str) {
        let mut rooms = self.rooms.lock().await;
        rooms.remove(id);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.rooms.lock().await.contains_key(id)
    }
}

impl<R: Default> Default for RoomRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_the_same_room() {
        // given:
        let registry: RoomRegistry<Vec<u32>> = RoomRegistry::new();

        // when:
        let first = registry.get_or_create("kiosk-1").await;
        let second = registry.get_or_create("kiosk-1").await;

        // then:
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_rooms_are_independent_per_id() {
        // given:
        let registry: RoomRegistry<Vec<u32>> = RoomRegistry::new();

        // when:
        let a = registry.get_or_create("a").await;
        let b = registry.get_or_create("b").await;
        a.lock().await.push(1);

        // then:
        assert!(b.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_resets_state_for_the_next_occupants() {
        // given:
        let registry: RoomRegistry<Vec<u32>> = RoomRegistry::new();
        let room = registry.get_or_create("kiosk-1").await;
        room.lock().await.push(42);

        // when:
        registry.remove("kiosk-1").await;
        let fresh = registry.get_or_create("kiosk-1").await;

        // then:
        assert!(!Arc::ptr_eq(&room, &fresh));
        assert!(fresh.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_contains_tracks_lifecycle() {
        // given:
        let registry: RoomRegistry<Vec<u32>> = RoomRegistry::new();
        assert!(!registry.contains("kiosk-1").await);

        // when:
        registry.get_or_create("kiosk-1").await;
        assert!(registry.contains("kiosk-1").await);
        registry.remove("kiosk-1").await;

        // then:
        assert!(!registry.contains("kiosk-1").await);
    }
}

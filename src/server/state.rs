//! Shared application state and connection query types.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    collaborator::{aggregation::AggregationService, order::OrderService},
    registry::RoomRegistry,
};

use super::{bridge::BridgeRoom, confirm::ConfirmRoom, stay::StayRoom};

/// Query parameters for a room join; a missing or empty `room` is rejected
/// before the connection upgrade.
#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    pub room: String,
}

/// Shared application state: one registry per room variant plus the
/// external collaborators.
pub struct AppState {
    pub stay_rooms: RoomRegistry<StayRoom>,
    pub confirm_rooms: RoomRegistry<ConfirmRoom>,
    pub bridge_rooms: RoomRegistry<BridgeRoom>,
    pub order_service: Arc<dyn OrderService>,
    pub aggregation_service: Arc<dyn AggregationService>,
}

impl AppState {
    pub fn new(
        order_service: Arc<dyn OrderService>,
        aggregation_service: Arc<dyn AggregationService>,
    ) -> Self {
        Self {
            stay_rooms: RoomRegistry::new(),
            confirm_rooms: RoomRegistry::new(),
            bridge_rooms: RoomRegistry::new(),
            order_service,
            aggregation_service,
        }
    }
}

//! External collaborators consumed via fixed-contract interfaces.

pub mod aggregation;
pub mod order;

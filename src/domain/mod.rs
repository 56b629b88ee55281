//! Domain layer - Core business objects and abstractions
//!
//! This layer contains:
//! - Entities: Client, Employee, Order, Review and the Actor capability
//! - Traits: Abstractions for infrastructure (Store, Bot)
//! - Rules: The order status state machine lives on `OrderStatus`

pub mod entities;
pub mod traits;

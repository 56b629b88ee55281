//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Services: Order, review, directory, registration and statistics logic
//! - Errors: Domain-specific errors
//! - Messaging: Command parsing and dispatching for front-ends

pub mod errors;
pub mod services;
pub mod messaging;

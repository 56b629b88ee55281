//! Freelance desk - matches clients with freelance employees, tracks the
//! order lifecycle and aggregates reviews into employee ratings.

pub mod domain;
pub mod application;
pub mod infrastructure;

//! Domain entities - Core business objects with no external dependencies

pub mod actor;
pub mod client;
pub mod employee;
pub mod message;
pub mod order;
pub mod review;

pub use actor::Actor;
pub use client::{Client, NewClient};
pub use employee::{Branch, Employee, NewEmployee};
pub use message::{Content, Message};
pub use order::{NewOrder, Order, OrderStatus};
pub use review::{mean_rating, NewReview, Review, MAX_RATING, MIN_RATING};

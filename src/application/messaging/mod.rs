//! Message handling - Turns console input into desk calls

pub mod dispatcher;
pub mod parser;

pub use dispatcher::{CommandDispatcher, Notification, Reply};
pub use parser::MessageParser;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a caller acts in, passed explicitly into ownership-checked operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// Acting as the client with this id
    Client(i64),
    /// Acting as the employee with this id
    Employee(i64),
}

impl Actor {
    pub fn client_id(&self) -> Option<i64> {
        match self {
            Actor::Client(id) => Some(*id),
            Actor::Employee(_) => None,
        }
    }

    pub fn employee_id(&self) -> Option<i64> {
        match self {
            Actor::Employee(id) => Some(*id),
            Actor::Client(_) => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Client(id) => write!(f, "client #{}", id),
            Actor::Employee(id) => write!(f, "employee #{}", id),
        }
    }
}

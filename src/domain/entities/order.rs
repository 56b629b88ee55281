use chrono::{DateTime, Utc};
use super::Actor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an order
///
/// ```text
/// PENDING ──approve──> IN_PROGRESS ──complete──> COMPLETED
///    └────reject────> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::InProgress,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// The only edges of the order state machine.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (*self, next),
            (OrderStatus::Pending, OrderStatus::InProgress)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::InProgress, OrderStatus::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// A unit of work requested by a client from one employee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub client_id: i64,
    pub employee_id: i64,
    pub description: String,
    pub price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Order {
    /// True when `actor` is the client who placed this order
    pub fn is_placed_by(&self, actor: &Actor) -> bool {
        actor.client_id() == Some(self.client_id)
    }

    /// True when `actor` is the employee this order is assigned to
    pub fn is_assigned_to(&self, actor: &Actor) -> bool {
        actor.employee_id() == Some(self.employee_id)
    }
}

/// Insert payload; the store assigns id, status and timestamps
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub client_id: i64,
    pub employee_id: i64,
    pub description: String,
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_lifecycle_edges_are_allowed() {
        let allowed: Vec<(OrderStatus, OrderStatus)> = OrderStatus::ALL
            .iter()
            .flat_map(|from| OrderStatus::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (OrderStatus::Pending, OrderStatus::InProgress),
                (OrderStatus::Pending, OrderStatus::Cancelled),
                (OrderStatus::InProgress, OrderStatus::Completed),
            ]
        );
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in [OrderStatus::Completed, OrderStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(OrderStatus::ALL.iter().all(|next| !status.can_transition_to(*next)));
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("IN_PROGRESS".parse::<OrderStatus>(), Ok(OrderStatus::InProgress));
        assert_eq!("cancelled".parse::<OrderStatus>(), Ok(OrderStatus::Cancelled));
        assert!("DONE".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::Pending.to_string(), "PENDING");
    }
}

//! Per-user order statistics

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::application::errors::DeskError;
use crate::domain::entities::OrderStatus;
use crate::domain::traits::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Sum of completed order prices
    pub earned: Decimal,
    pub rating: f64,
    pub total_reviews: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub total: usize,
    pub completed: usize,
}

pub struct StatisticsService {
    store: Arc<dyn Store>,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn employee_stats(&self, employee_id: i64) -> Result<EmployeeStats, DeskError> {
        let employee = self
            .store
            .get_employee(employee_id)
            .await?
            .ok_or_else(|| DeskError::not_found("employee", employee_id))?;
        let orders = self.store.orders_by_employee(employee_id, None).await?;

        let count = |status: OrderStatus| orders.iter().filter(|o| o.status == status).count();
        let earned = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .map(|o| o.price)
            .sum();

        Ok(EmployeeStats {
            total: orders.len(),
            pending: count(OrderStatus::Pending),
            in_progress: count(OrderStatus::InProgress),
            completed: count(OrderStatus::Completed),
            cancelled: count(OrderStatus::Cancelled),
            earned,
            rating: employee.rating,
            total_reviews: employee.total_reviews,
        })
    }

    pub async fn client_stats(&self, client_id: i64) -> Result<ClientStats, DeskError> {
        if self.store.get_client(client_id).await?.is_none() {
            return Err(DeskError::not_found("client", client_id));
        }
        let orders = self.store.orders_by_client(client_id, None).await?;
        Ok(ClientStats {
            total: orders.len(),
            completed: orders.iter().filter(|o| o.status == OrderStatus::Completed).count(),
        })
    }
}

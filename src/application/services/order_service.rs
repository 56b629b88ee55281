//! Order lifecycle manager

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::application::errors::DeskError;
use crate::domain::entities::{Actor, NewOrder, Order, OrderStatus};
use crate::domain::traits::Store;

/// Largest price the orders table is sized for (DECIMAL(10,2))
fn max_price() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

/// Enforces the order state machine and the ownership rules around it.
pub struct OrderService {
    store: Arc<dyn Store>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a new `PENDING` order.
    ///
    /// The description is trimmed and must not be empty; the price must be
    /// positive and is kept to two decimal places.
    pub async fn create_order(
        &self,
        client_id: i64,
        employee_id: i64,
        description: &str,
        price: Decimal,
    ) -> Result<Order, DeskError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(DeskError::validation("order description must not be empty"));
        }
        let price = price.round_dp(2);
        if price <= Decimal::ZERO {
            return Err(DeskError::validation(format!("price must be positive, got {}", price)));
        }
        if price > max_price() {
            return Err(DeskError::validation(format!("price must not exceed {}", max_price())));
        }

        if self.store.get_client(client_id).await?.is_none() {
            return Err(DeskError::not_found("client", client_id));
        }
        if self.store.get_employee(employee_id).await?.is_none() {
            return Err(DeskError::not_found("employee", employee_id));
        }

        let order = self
            .store
            .insert_order(NewOrder {
                client_id,
                employee_id,
                description: description.to_string(),
                price,
            })
            .await?;

        tracing::info!(order_id = order.id, client_id, employee_id, %price, "Order created");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Order, DeskError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DeskError::not_found("order", order_id))
    }

    /// `PENDING` -> `IN_PROGRESS`
    pub async fn approve(&self, order_id: i64) -> Result<Order, DeskError> {
        let order = self.get_order(order_id).await?;
        self.apply(order, OrderStatus::InProgress, None).await
    }

    /// `PENDING` -> `CANCELLED`
    pub async fn reject(&self, order_id: i64) -> Result<Order, DeskError> {
        let order = self.get_order(order_id).await?;
        self.apply(order, OrderStatus::Cancelled, None).await
    }

    /// `IN_PROGRESS` -> `COMPLETED`, stamping `finished_at`.
    ///
    /// Completion does not create a review; an order that already carries one
    /// is refused with `DuplicateReview`.
    pub async fn complete(&self, order_id: i64) -> Result<Order, DeskError> {
        let order = self.get_order(order_id).await?;
        ensure_transition(&order, OrderStatus::Completed)?;

        // Reachable when the order was read before a concurrent completion and review
        if self.store.get_review_for_order(order_id).await?.is_some() {
            tracing::warn!(order_id, "Refusing to complete an order that already has a review");
            return Err(DeskError::DuplicateReview(order_id));
        }

        self.apply(order, OrderStatus::Completed, Some(Utc::now())).await
    }

    /// Approve on behalf of `actor`, who must be the assigned employee.
    pub async fn approve_as(&self, actor: &Actor, order_id: i64) -> Result<Order, DeskError> {
        let order = self.get_order(order_id).await?;
        ensure_assigned(actor, &order)?;
        self.apply(order, OrderStatus::InProgress, None).await
    }

    /// Reject on behalf of `actor`, who must be the assigned employee.
    pub async fn reject_as(&self, actor: &Actor, order_id: i64) -> Result<Order, DeskError> {
        let order = self.get_order(order_id).await?;
        ensure_assigned(actor, &order)?;
        self.apply(order, OrderStatus::Cancelled, None).await
    }

    /// Complete on behalf of `actor`, who must be the client that placed the order.
    pub async fn complete_as(&self, actor: &Actor, order_id: i64) -> Result<Order, DeskError> {
        let order = self.get_order(order_id).await?;
        ensure_placed(actor, &order)?;
        self.complete(order_id).await
    }

    pub async fn orders_for_client(&self, client_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, DeskError> {
        Ok(self.store.orders_by_client(client_id, status).await?)
    }

    pub async fn orders_for_employee(&self, employee_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, DeskError> {
        Ok(self.store.orders_by_employee(employee_id, status).await?)
    }

    async fn apply(
        &self,
        order: Order,
        to: OrderStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<Order, DeskError> {
        ensure_transition(&order, to)?;
        let from = order.status;

        match self.store.transition_order(order.id, from, to, finished_at).await? {
            Some(updated) => {
                tracing::info!(order_id = updated.id, %from, %to, "Order status changed");
                Ok(updated)
            }
            None => {
                // Status moved between the read and the write
                let current = self.get_order(order.id).await?;
                Err(DeskError::InvalidTransition {
                    order_id: order.id,
                    from: current.status,
                    to,
                })
            }
        }
    }
}

fn ensure_transition(order: &Order, to: OrderStatus) -> Result<(), DeskError> {
    if order.status.can_transition_to(to) {
        return Ok(());
    }
    tracing::debug!(order_id = order.id, from = %order.status, %to, "Transition refused");
    Err(DeskError::InvalidTransition {
        order_id: order.id,
        from: order.status,
        to,
    })
}

fn ensure_assigned(actor: &Actor, order: &Order) -> Result<(), DeskError> {
    if order.is_assigned_to(actor) {
        Ok(())
    } else {
        Err(DeskError::PermissionDenied(format!(
            "{} is not the employee on order {}",
            actor, order.id
        )))
    }
}

pub(crate) fn ensure_placed(actor: &Actor, order: &Order) -> Result<(), DeskError> {
    if order.is_placed_by(actor) {
        Ok(())
    } else {
        Err(DeskError::PermissionDenied(format!(
            "{} did not place order {}",
            actor, order.id
        )))
    }
}

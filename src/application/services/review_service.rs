//! Review submission and rating aggregation

use std::sync::Arc;

use crate::application::errors::{DeskError, StorageError};
use crate::domain::entities::{Actor, Employee, NewReview, OrderStatus, Review, MAX_RATING, MIN_RATING};
use crate::domain::traits::Store;
use super::order_service::ensure_placed;

/// Accepts at most one review per completed order and keeps each employee's
/// aggregate rating in step with their reviews.
pub struct ReviewService {
    store: Arc<dyn Store>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Store a review for a completed order and recompute the employee's rating.
    ///
    /// The insert and the recompute are committed together. Returns the new
    /// review and the employee as rated after it.
    pub async fn submit_review(
        &self,
        order_id: i64,
        client_id: i64,
        employee_id: i64,
        rating: i64,
        comment: &str,
    ) -> Result<(Review, Employee), DeskError> {
        let rating = validate_rating(rating)?;

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DeskError::not_found("order", order_id))?;

        if self.store.get_review_for_order(order_id).await?.is_some() {
            return Err(DeskError::DuplicateReview(order_id));
        }
        if order.status != OrderStatus::Completed {
            return Err(DeskError::validation(format!(
                "order {} is {}, only completed orders can be reviewed",
                order_id, order.status
            )));
        }
        if order.client_id != client_id || order.employee_id != employee_id {
            return Err(DeskError::validation(format!(
                "review parties do not match order {}",
                order_id
            )));
        }

        let result = self
            .store
            .insert_review(NewReview {
                client_id,
                employee_id,
                order_id,
                rating,
                comment: comment.trim().to_string(),
            })
            .await;

        match result {
            Ok((review, employee)) => {
                tracing::info!(
                    order_id,
                    employee_id,
                    rating,
                    new_rating = employee.rating,
                    total_reviews = employee.total_reviews,
                    "Review stored"
                );
                Ok((review, employee))
            }
            Err(StorageError::Conflict(reason)) => {
                if self.store.get_review_for_order(order_id).await?.is_some() {
                    Err(DeskError::DuplicateReview(order_id))
                } else {
                    Err(StorageError::Conflict(reason).into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Submit a review as `actor`, who must be the client that placed the order.
    pub async fn submit_review_as(
        &self,
        actor: &Actor,
        order_id: i64,
        rating: i64,
        comment: &str,
    ) -> Result<(Review, Employee), DeskError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DeskError::not_found("order", order_id))?;
        ensure_placed(actor, &order)?;
        self.submit_review(order_id, order.client_id, order.employee_id, rating, comment)
            .await
    }

    /// Set the employee's rating to the mean of their reviews (0.0 with none)
    /// and `total_reviews` to the count. Idempotent.
    pub async fn recompute_rating(&self, employee_id: i64) -> Result<Employee, DeskError> {
        let employee = self
            .store
            .recompute_rating(employee_id)
            .await?
            .ok_or_else(|| DeskError::not_found("employee", employee_id))?;
        tracing::debug!(employee_id, rating = employee.rating, total = employee.total_reviews, "Rating recomputed");
        Ok(employee)
    }

    pub async fn get_review_for_order(&self, order_id: i64) -> Result<Option<Review>, DeskError> {
        Ok(self.store.get_review_for_order(order_id).await?)
    }

    /// Newest reviews first.
    pub async fn reviews_for_employee(&self, employee_id: i64, limit: u64) -> Result<Vec<Review>, DeskError> {
        Ok(self.store.reviews_by_employee(employee_id, limit).await?)
    }
}

fn validate_rating(rating: i64) -> Result<u8, DeskError> {
    u8::try_from(rating)
        .ok()
        .filter(|r| (MIN_RATING..=MAX_RATING).contains(r))
        .ok_or_else(|| {
            DeskError::validation(format!(
                "rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, rating
            ))
        })
}

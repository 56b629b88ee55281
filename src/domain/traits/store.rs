use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::application::errors::StorageError;
use crate::domain::entities::{
    Branch, Client, Employee, NewClient, NewEmployee, NewOrder, NewReview, Order, OrderStatus,
    Review,
};

/// Store trait - abstraction for data persistence
///
/// Every mutating method is a single atomic unit: it either commits all of its
/// writes or leaves the stored state untouched.
#[async_trait]
pub trait Store: Send + Sync {
    // Client operations
    async fn insert_client(&self, client: NewClient) -> Result<Client, StorageError>;
    async fn get_client(&self, id: i64) -> Result<Option<Client>, StorageError>;
    async fn find_client_by_external_id(&self, external_user_id: i64) -> Result<Option<Client>, StorageError>;

    // Employee operations
    async fn insert_employee(&self, employee: NewEmployee) -> Result<Employee, StorageError>;
    async fn get_employee(&self, id: i64) -> Result<Option<Employee>, StorageError>;
    async fn find_employee_by_external_id(&self, external_user_id: i64) -> Result<Option<Employee>, StorageError>;
    /// Employees in insertion order, optionally filtered by branch.
    async fn list_employees(&self, branch: Option<Branch>, offset: u64, limit: u64) -> Result<Vec<Employee>, StorageError>;
    async fn count_employees(&self, branch: Option<Branch>) -> Result<u64, StorageError>;

    // Order operations
    /// Inserts a new order in `PENDING`.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StorageError>;
    async fn get_order(&self, id: i64) -> Result<Option<Order>, StorageError>;
    /// Compare-and-set on the order status. Returns `None` (and writes nothing)
    /// when the order is missing or its status is no longer `from`.
    async fn transition_order(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Order>, StorageError>;
    async fn orders_by_client(&self, client_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError>;
    async fn orders_by_employee(&self, employee_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError>;

    // Review operations
    /// Inserts the review and recomputes the reviewed employee's rating in one
    /// transaction. A second review for the same order is a `Conflict`.
    async fn insert_review(&self, review: NewReview) -> Result<(Review, Employee), StorageError>;
    async fn get_review_for_order(&self, order_id: i64) -> Result<Option<Review>, StorageError>;
    /// Newest first.
    async fn reviews_by_employee(&self, employee_id: i64, limit: u64) -> Result<Vec<Review>, StorageError>;
    /// Recomputes `rating` and `total_reviews` from stored reviews.
    async fn recompute_rating(&self, employee_id: i64) -> Result<Option<Employee>, StorageError>;
}

//! In-memory storage implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::entities::{
    mean_rating, Branch, Client, Employee, NewClient, NewEmployee, NewOrder, NewReview, Order,
    OrderStatus, Review,
};
use crate::domain::traits::Store;

/// All tables behind one lock so every mutation is a single atomic step.
#[derive(Default)]
struct Tables {
    next_id: i64,
    clients: BTreeMap<i64, Client>,
    employees: BTreeMap<i64, Employee>,
    orders: BTreeMap<i64, Order>,
    reviews: BTreeMap<i64, Review>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn recompute(&mut self, employee_id: i64) -> Option<Employee> {
        let (rating, total_reviews) = mean_rating(
            self.reviews
                .values()
                .filter(|r| r.employee_id == employee_id)
                .map(|r| r.rating),
        );
        let employee = self.employees.get_mut(&employee_id)?;
        employee.rating = rating;
        employee.total_reviews = total_reviews;
        Some(employee.clone())
    }
}

/// Volatile store for tests and throwaway sessions
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn orders_matching(
    tables: &Tables,
    owner: impl Fn(&Order) -> bool,
    status: Option<OrderStatus>,
) -> Vec<Order> {
    tables
        .orders
        .values()
        .filter(|o| owner(o) && status.map_or(true, |s| o.status == s))
        .cloned()
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_client(&self, client: NewClient) -> Result<Client, StorageError> {
        let mut tables = self.tables.write().await;
        if tables.clients.values().any(|c| c.external_user_id == client.external_user_id) {
            return Err(StorageError::Conflict(format!("client {} already exists", client.external_user_id)));
        }
        let id = tables.allocate_id();
        let client = Client {
            id,
            external_user_id: client.external_user_id,
            first_name: client.first_name,
            last_name: client.last_name,
            phone: client.phone,
            birth_date: client.birth_date,
            created_at: Utc::now(),
        };
        tables.clients.insert(id, client.clone());
        Ok(client)
    }

    async fn get_client(&self, id: i64) -> Result<Option<Client>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.clients.get(&id).cloned())
    }

    async fn find_client_by_external_id(&self, external_user_id: i64) -> Result<Option<Client>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .clients
            .values()
            .find(|c| c.external_user_id == external_user_id)
            .cloned())
    }

    async fn insert_employee(&self, employee: NewEmployee) -> Result<Employee, StorageError> {
        let mut tables = self.tables.write().await;
        if tables.employees.values().any(|e| e.external_user_id == employee.external_user_id) {
            return Err(StorageError::Conflict(format!("employee {} already exists", employee.external_user_id)));
        }
        let id = tables.allocate_id();
        let employee = Employee {
            id,
            external_user_id: employee.external_user_id,
            first_name: employee.first_name,
            last_name: employee.last_name,
            phone: employee.phone,
            birth_date: employee.birth_date,
            branch: employee.branch,
            rating: 0.0,
            total_reviews: 0,
            created_at: Utc::now(),
        };
        tables.employees.insert(id, employee.clone());
        Ok(employee)
    }

    async fn get_employee(&self, id: i64) -> Result<Option<Employee>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.employees.get(&id).cloned())
    }

    async fn find_employee_by_external_id(&self, external_user_id: i64) -> Result<Option<Employee>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .employees
            .values()
            .find(|e| e.external_user_id == external_user_id)
            .cloned())
    }

    async fn list_employees(&self, branch: Option<Branch>, offset: u64, limit: u64) -> Result<Vec<Employee>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .employees
            .values()
            .filter(|e| branch.map_or(true, |b| e.branch == b))
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_employees(&self, branch: Option<Branch>) -> Result<u64, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .employees
            .values()
            .filter(|e| branch.map_or(true, |b| e.branch == b))
            .count() as u64)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.clients.contains_key(&order.client_id) || !tables.employees.contains_key(&order.employee_id) {
            return Err(StorageError::Conflict("order references a missing client or employee".to_string()));
        }
        let id = tables.allocate_id();
        let order = Order {
            id,
            client_id: order.client_id,
            employee_id: order.employee_id,
            description: order.description,
            price: order.price,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
        };
        tables.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn transition_order(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Order>, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&id).filter(|o| o.status == from) else {
            return Ok(None);
        };
        order.status = to;
        if finished_at.is_some() {
            order.finished_at = finished_at;
        }
        Ok(Some(order.clone()))
    }

    async fn orders_by_client(&self, client_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError> {
        let tables = self.tables.read().await;
        Ok(orders_matching(&tables, |o| o.client_id == client_id, status))
    }

    async fn orders_by_employee(&self, employee_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError> {
        let tables = self.tables.read().await;
        Ok(orders_matching(&tables, |o| o.employee_id == employee_id, status))
    }

    async fn insert_review(&self, review: NewReview) -> Result<(Review, Employee), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.reviews.values().any(|r| r.order_id == review.order_id) {
            return Err(StorageError::Conflict(format!("review for order {} rejected", review.order_id)));
        }
        if !tables.clients.contains_key(&review.client_id)
            || !tables.employees.contains_key(&review.employee_id)
            || !tables.orders.contains_key(&review.order_id)
        {
            return Err(StorageError::Conflict("review references a missing client, order or employee".to_string()));
        }
        let id = tables.allocate_id();
        let review = Review {
            id,
            client_id: review.client_id,
            employee_id: review.employee_id,
            order_id: review.order_id,
            rating: review.rating,
            comment: review.comment,
            created_at: Utc::now(),
        };
        tables.reviews.insert(id, review.clone());
        let employee = tables.recompute(review.employee_id).ok_or_else(|| {
            StorageError::Conflict(format!("employee {} vanished during review", review.employee_id))
        })?;
        Ok((review, employee))
    }

    async fn get_review_for_order(&self, order_id: i64) -> Result<Option<Review>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.reviews.values().find(|r| r.order_id == order_id).cloned())
    }

    async fn reviews_by_employee(&self, employee_id: i64, limit: u64) -> Result<Vec<Review>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .rev()
            .filter(|r| r.employee_id == employee_id)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn recompute_rating(&self, employee_id: i64) -> Result<Option<Employee>, StorageError> {
        let mut tables = self.tables.write().await;
        Ok(tables.recompute(employee_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    async fn seeded() -> (MemoryStore, Client, Employee, Order) {
        let store = MemoryStore::new();
        let birth_date = NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();
        let client = store
            .insert_client(NewClient {
                external_user_id: 100,
                first_name: "Ann".to_string(),
                last_name: "Lee".to_string(),
                phone: "+15550100".to_string(),
                birth_date,
            })
            .await
            .unwrap();
        let employee = store
            .insert_employee(NewEmployee {
                external_user_id: 200,
                first_name: "Bob".to_string(),
                last_name: "Ray".to_string(),
                phone: "+15550200".to_string(),
                birth_date,
                branch: Branch::Design,
            })
            .await
            .unwrap();
        let order = store
            .insert_order(NewOrder {
                client_id: client.id,
                employee_id: employee.id,
                description: "Logo".to_string(),
                price: Decimal::new(25, 0),
            })
            .await
            .unwrap();
        (store, client, employee, order)
    }

    #[tokio::test]
    async fn test_review_with_unknown_client_is_conflict() {
        let (store, client, employee, order) = seeded().await;
        let review = NewReview {
            client_id: 9_999,
            employee_id: employee.id,
            order_id: order.id,
            rating: 5,
            comment: String::new(),
        };

        let err = store.insert_review(review.clone()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert!(store.get_review_for_order(order.id).await.unwrap().is_none());
        let untouched = store.get_employee(employee.id).await.unwrap().unwrap();
        assert_eq!(untouched.total_reviews, 0);

        let (_, rated) = store
            .insert_review(NewReview { client_id: client.id, ..review })
            .await
            .unwrap();
        assert_eq!(rated.total_reviews, 1);
        assert_eq!(rated.rating, 5.0);
    }
}

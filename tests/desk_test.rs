//! Desk integration tests
//! Run with: cargo test --test desk_test
//!
//! Every scenario runs against both the in-memory store and an in-memory
//! SQLite database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use freelance_desk::application::errors::{DeskError, StorageError};
use freelance_desk::application::services::{Desk, Registration};
use freelance_desk::domain::entities::{
    Actor, Branch, Client, Employee, NewClient, NewEmployee, NewOrder, NewReview, Order,
    OrderStatus, Review,
};
use freelance_desk::domain::traits::Store;
use freelance_desk::infrastructure::database::SqliteStore;
use freelance_desk::infrastructure::storage::MemoryStore;

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn stores() -> Vec<(&'static str, Arc<dyn Store>)> {
    ensure_init();
    vec![
        ("memory", Arc::new(MemoryStore::new()) as Arc<dyn Store>),
        ("sqlite", Arc::new(SqliteStore::open_in_memory().unwrap()) as Arc<dyn Store>),
    ]
}

fn registration(external_user_id: i64, first_name: &str) -> Registration {
    Registration {
        external_user_id,
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
        phone: "+15550100".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
    }
}

async fn client(desk: &Desk, external_user_id: i64) -> Client {
    desk.registration
        .register_client(registration(external_user_id, "Client"))
        .await
        .unwrap()
}

async fn employee(desk: &Desk, external_user_id: i64, branch: Branch) -> Employee {
    desk.registration
        .register_employee(registration(external_user_id, "Employee"), branch)
        .await
        .unwrap()
}

async fn completed_order(desk: &Desk, client: &Client, employee: &Employee, price: i64) -> Order {
    let order = desk
        .orders
        .create_order(client.id, employee.id, "Edit a wedding video", Decimal::new(price, 0))
        .await
        .unwrap();
    desk.orders.approve(order.id).await.unwrap();
    desk.orders.complete(order.id).await.unwrap()
}

#[tokio::test]
async fn test_full_lifecycle() {
    for (name, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 100).await;
        let employee = employee(&desk, 200, Branch::VideoEditing).await;

        let order = desk
            .orders
            .create_order(client.id, employee.id, "  Edit a wedding video  ", Decimal::new(10000, 2))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending, "{}", name);
        assert_eq!(order.description, "Edit a wedding video");
        assert!(order.finished_at.is_none());

        let order = desk.orders.approve(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::InProgress);

        let order = desk.orders.complete(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.finished_at.is_some());
        assert!(desk.reviews.get_review_for_order(order.id).await.unwrap().is_none());

        let (review, rated) = desk
            .reviews
            .submit_review(order.id, client.id, employee.id, 5, "Great")
            .await
            .unwrap();
        assert_eq!(review.rating, 5);
        assert_eq!(rated.rating, 5.0, "{}", name);
        assert_eq!(rated.total_reviews, 1);

        let stored = desk.directory.get_employee(employee.id).await.unwrap();
        assert_eq!(stored.rating, 5.0);
        assert_eq!(stored.total_reviews, 1);

        let stats = desk.statistics.employee_stats(employee.id).await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.earned, Decimal::new(100, 0));
        assert_eq!(desk.statistics.client_stats(client.id).await.unwrap().total, 1);
    }
}

#[tokio::test]
async fn test_invalid_transitions_leave_status_unchanged() {
    for (name, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 1).await;
        let employee = employee(&desk, 2, Branch::It).await;

        let order = desk
            .orders
            .create_order(client.id, employee.id, "Fix a bug", Decimal::new(50, 0))
            .await
            .unwrap();

        let err = desk.orders.complete(order.id).await.unwrap_err();
        assert!(
            matches!(err, DeskError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Completed, .. }),
            "{}: {:?}",
            name,
            err
        );
        assert_eq!(desk.orders.get_order(order.id).await.unwrap().status, OrderStatus::Pending);

        desk.orders.reject(order.id).await.unwrap();
        for result in [
            desk.orders.approve(order.id).await,
            desk.orders.reject(order.id).await,
            desk.orders.complete(order.id).await,
        ] {
            assert!(matches!(result, Err(DeskError::InvalidTransition { .. })));
        }
        assert_eq!(desk.orders.get_order(order.id).await.unwrap().status, OrderStatus::Cancelled);

        let err = desk.orders.approve(9_999).await.unwrap_err();
        assert!(matches!(err, DeskError::NotFound { entity: "order", .. }));
    }
}

#[tokio::test]
async fn test_create_order_validation() {
    for (_, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 1).await;
        let employee = employee(&desk, 2, Branch::Design).await;

        for (description, price) in [
            ("   ", Decimal::new(10, 0)),
            ("Logo", Decimal::ZERO),
            ("Logo", Decimal::new(-5, 0)),
            ("Logo", Decimal::new(1_000_000_000, 0)),
        ] {
            let err = desk
                .orders
                .create_order(client.id, employee.id, description, price)
                .await
                .unwrap_err();
            assert!(matches!(err, DeskError::Validation(_)), "{:?}", err);
        }

        let err = desk
            .orders
            .create_order(client.id, 9_999, "Logo", Decimal::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::NotFound { entity: "employee", .. }));

        let err = desk
            .orders
            .create_order(9_999, employee.id, "Logo", Decimal::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::NotFound { entity: "client", .. }));
    }
}

#[tokio::test]
async fn test_second_review_is_rejected() {
    for (name, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 1).await;
        let employee = employee(&desk, 2, Branch::Trainer).await;
        let order = completed_order(&desk, &client, &employee, 40).await;

        desk.reviews
            .submit_review(order.id, client.id, employee.id, 4, "")
            .await
            .unwrap();
        let err = desk
            .reviews
            .submit_review(order.id, client.id, employee.id, 1, "changed my mind")
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::DuplicateReview(id) if id == order.id), "{}: {:?}", name, err);

        let reviews = desk.reviews.reviews_for_employee(employee.id, 10).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, 4);

        let employee = desk.directory.get_employee(employee.id).await.unwrap();
        assert_eq!(employee.rating, 4.0);
        assert_eq!(employee.total_reviews, 1);
    }
}

#[tokio::test]
async fn test_review_requires_completed_order_and_valid_rating() {
    for (_, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 1).await;
        let employee = employee(&desk, 2, Branch::Teacher).await;
        let order = desk
            .orders
            .create_order(client.id, employee.id, "Math lessons", Decimal::new(30, 0))
            .await
            .unwrap();
        desk.orders.approve(order.id).await.unwrap();

        let err = desk
            .reviews
            .submit_review(order.id, client.id, employee.id, 5, "")
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));

        desk.orders.complete(order.id).await.unwrap();
        for rating in [0, 6] {
            let err = desk
                .reviews
                .submit_review(order.id, client.id, employee.id, rating, "")
                .await
                .unwrap_err();
            assert!(matches!(err, DeskError::Validation(_)));
        }

        let err = desk
            .reviews
            .submit_review(order.id, client.id + 1_000, employee.id, 5, "")
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));

        let err = desk
            .reviews
            .submit_review(9_999, client.id, employee.id, 5, "")
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::NotFound { entity: "order", .. }));

        assert!(desk.reviews.get_review_for_order(order.id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_rating_is_mean_of_reviews() {
    for (name, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 1).await;
        let employee = employee(&desk, 2, Branch::It).await;

        for rating in [5, 4, 2] {
            let order = completed_order(&desk, &client, &employee, 10).await;
            desk.reviews
                .submit_review(order.id, client.id, employee.id, rating, "")
                .await
                .unwrap();
        }

        let employee = desk.directory.get_employee(employee.id).await.unwrap();
        assert!((employee.rating - 11.0 / 3.0).abs() < 1e-9, "{}: {}", name, employee.rating);
        assert_eq!(employee.total_reviews, 3);

        let recomputed = desk.reviews.recompute_rating(employee.id).await.unwrap();
        assert_eq!(recomputed.total_reviews, 3);
        assert!((recomputed.rating - employee.rating).abs() < 1e-9);

        let newest = desk.reviews.reviews_for_employee(employee.id, 2).await.unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].rating, 2);

        let err = desk.reviews.recompute_rating(9_999).await.unwrap_err();
        assert!(matches!(err, DeskError::NotFound { entity: "employee", .. }));
    }
}

#[tokio::test]
async fn test_recompute_without_reviews_is_zero() {
    for (_, store) in stores() {
        let desk = Desk::new(store, 5);
        let employee = employee(&desk, 2, Branch::Design).await;
        let employee = desk.reviews.recompute_rating(employee.id).await.unwrap();
        assert_eq!(employee.rating, 0.0);
        assert_eq!(employee.total_reviews, 0);
    }
}

#[tokio::test]
async fn test_directory_pagination_by_branch() {
    for (name, store) in stores() {
        let desk = Desk::new(store, 5);
        let mut it_ids = Vec::new();
        for n in 0..7 {
            it_ids.push(employee(&desk, 100 + n, Branch::It).await.id);
            if n % 3 == 0 {
                employee(&desk, 500 + n, Branch::Design).await;
            }
        }

        let first = desk.directory.list_employees(Some(Branch::It), 0, 5).await.unwrap();
        let ids: Vec<i64> = first.iter().map(|e| e.id).collect();
        assert_eq!(ids, it_ids[..5].to_vec(), "{}", name);
        assert!(first.iter().all(|e| e.branch == Branch::It));
        assert_eq!(desk.directory.count_employees(Some(Branch::It)).await.unwrap(), 7);
        assert_eq!(desk.directory.count_employees(None).await.unwrap(), 10);

        let page = desk.directory.page(Some(Branch::It), 1).await.unwrap();
        assert_eq!(page.employees.len(), 2);
        assert_eq!(page.total_pages, 2);
        assert!(page.has_previous());
        assert!(!page.has_next());

        let empty = desk.directory.page(Some(Branch::Teacher), 0).await.unwrap();
        assert!(empty.employees.is_empty());
        assert_eq!(empty.total_pages, 1);

        let beyond = desk.directory.list_employees(Some(Branch::It), 50, 5).await.unwrap();
        assert!(beyond.is_empty());
    }
}

#[tokio::test]
async fn test_registration_rules() {
    for (name, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 10).await;
        assert_eq!(client.first_name, "Client");

        let err = desk
            .registration
            .register_employee(registration(10, "Again"), Branch::It)
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::AlreadyRegistered(10)), "{}: {:?}", name, err);

        let err = desk
            .registration
            .register_client(registration(10, "Again"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::AlreadyRegistered(10)));

        let mut bad_phone = registration(11, "Phone");
        bad_phone.phone = "12-34".to_string();
        assert!(matches!(
            desk.registration.register_client(bad_phone).await,
            Err(DeskError::Validation(_))
        ));

        let mut unborn = registration(12, "Future");
        unborn.birth_date = (Utc::now() + Duration::days(2)).date_naive();
        assert!(matches!(
            desk.registration.register_client(unborn).await,
            Err(DeskError::Validation(_))
        ));

        let mut blank = registration(13, "  ");
        blank.last_name = String::new();
        assert!(matches!(
            desk.registration.register_client(blank).await,
            Err(DeskError::Validation(_))
        ));

        let employee = employee(&desk, 20, Branch::Trainer).await;
        assert_eq!(
            desk.registration.resolve_role(10).await.unwrap(),
            Some(Actor::Client(client.id))
        );
        assert_eq!(
            desk.registration.resolve_role(20).await.unwrap(),
            Some(Actor::Employee(employee.id))
        );
        assert_eq!(desk.registration.resolve_role(30).await.unwrap(), None);
    }
}

#[tokio::test]
async fn test_actor_checks() {
    for (name, store) in stores() {
        let desk = Desk::new(store, 5);
        let client = client(&desk, 1).await;
        let other_client = desk
            .registration
            .register_client(registration(3, "Other"))
            .await
            .unwrap();
        let employee = employee(&desk, 2, Branch::It).await;
        let other_employee = desk
            .registration
            .register_employee(registration(4, "Other"), Branch::It)
            .await
            .unwrap();

        let order = desk
            .orders
            .create_order(client.id, employee.id, "Deploy a site", Decimal::new(75, 0))
            .await
            .unwrap();

        for actor in [Actor::Employee(other_employee.id), Actor::Client(client.id)] {
            let err = desk.orders.approve_as(&actor, order.id).await.unwrap_err();
            assert!(matches!(err, DeskError::PermissionDenied(_)), "{}: {:?}", name, err);
            let err = desk.orders.reject_as(&actor, order.id).await.unwrap_err();
            assert!(matches!(err, DeskError::PermissionDenied(_)));
        }
        assert_eq!(desk.orders.get_order(order.id).await.unwrap().status, OrderStatus::Pending);

        desk.orders
            .approve_as(&Actor::Employee(employee.id), order.id)
            .await
            .unwrap();

        let err = desk
            .orders
            .complete_as(&Actor::Employee(employee.id), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::PermissionDenied(_)));
        let err = desk
            .orders
            .complete_as(&Actor::Client(other_client.id), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::PermissionDenied(_)));

        desk.orders
            .complete_as(&Actor::Client(client.id), order.id)
            .await
            .unwrap();

        let err = desk
            .reviews
            .submit_review_as(&Actor::Client(other_client.id), order.id, 5, "")
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::PermissionDenied(_)));

        let (_, rated) = desk
            .reviews
            .submit_review_as(&Actor::Client(client.id), order.id, 3, "ok")
            .await
            .unwrap();
        assert_eq!(rated.rating, 3.0);

        let mine = desk.orders.orders_for_client(client.id, None).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(desk
            .orders
            .orders_for_employee(employee.id, Some(OrderStatus::Pending))
            .await
            .unwrap()
            .is_empty());
    }
}

/// SQLite store that can answer one read the way a request racing another
/// one would have seen it: an older copy of an order, or no review yet.
struct StaleReads {
    inner: SqliteStore,
    stale_order: Mutex<Option<Order>>,
    hide_review_once: AtomicBool,
}

impl StaleReads {
    fn new() -> Self {
        ensure_init();
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            stale_order: Mutex::new(None),
            hide_review_once: AtomicBool::new(false),
        }
    }

    fn serve_once(&self, order: Order) {
        *self.stale_order.lock().unwrap() = Some(order);
    }

    fn hide_review_once(&self) {
        self.hide_review_once.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for StaleReads {
    async fn insert_client(&self, client: NewClient) -> Result<Client, StorageError> {
        self.inner.insert_client(client).await
    }

    async fn get_client(&self, id: i64) -> Result<Option<Client>, StorageError> {
        self.inner.get_client(id).await
    }

    async fn find_client_by_external_id(&self, external_user_id: i64) -> Result<Option<Client>, StorageError> {
        self.inner.find_client_by_external_id(external_user_id).await
    }

    async fn insert_employee(&self, employee: NewEmployee) -> Result<Employee, StorageError> {
        self.inner.insert_employee(employee).await
    }

    async fn get_employee(&self, id: i64) -> Result<Option<Employee>, StorageError> {
        self.inner.get_employee(id).await
    }

    async fn find_employee_by_external_id(&self, external_user_id: i64) -> Result<Option<Employee>, StorageError> {
        self.inner.find_employee_by_external_id(external_user_id).await
    }

    async fn list_employees(&self, branch: Option<Branch>, offset: u64, limit: u64) -> Result<Vec<Employee>, StorageError> {
        self.inner.list_employees(branch, offset, limit).await
    }

    async fn count_employees(&self, branch: Option<Branch>) -> Result<u64, StorageError> {
        self.inner.count_employees(branch).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StorageError> {
        self.inner.insert_order(order).await
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StorageError> {
        let stale = {
            let mut slot = self.stale_order.lock().unwrap();
            if slot.as_ref().map_or(false, |o| o.id == id) {
                slot.take()
            } else {
                None
            }
        };
        match stale {
            Some(order) => Ok(Some(order)),
            None => self.inner.get_order(id).await,
        }
    }

    async fn transition_order(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Order>, StorageError> {
        self.inner.transition_order(id, from, to, finished_at).await
    }

    async fn orders_by_client(&self, client_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError> {
        self.inner.orders_by_client(client_id, status).await
    }

    async fn orders_by_employee(&self, employee_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError> {
        self.inner.orders_by_employee(employee_id, status).await
    }

    async fn insert_review(&self, review: NewReview) -> Result<(Review, Employee), StorageError> {
        self.inner.insert_review(review).await
    }

    async fn get_review_for_order(&self, order_id: i64) -> Result<Option<Review>, StorageError> {
        if self.hide_review_once.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_review_for_order(order_id).await
    }

    async fn reviews_by_employee(&self, employee_id: i64, limit: u64) -> Result<Vec<Review>, StorageError> {
        self.inner.reviews_by_employee(employee_id, limit).await
    }

    async fn recompute_rating(&self, employee_id: i64) -> Result<Option<Employee>, StorageError> {
        self.inner.recompute_rating(employee_id).await
    }
}

fn racing_desk() -> (Arc<StaleReads>, Desk) {
    let store = Arc::new(StaleReads::new());
    let desk = Desk::new(store.clone() as Arc<dyn Store>, 5);
    (store, desk)
}

#[tokio::test]
async fn test_lost_transition_reports_current_status() {
    let (store, desk) = racing_desk();
    let client = client(&desk, 1).await;
    let employee = employee(&desk, 2, Branch::It).await;
    let pending = desk
        .orders
        .create_order(client.id, employee.id, "Migrate a database", Decimal::new(300, 0))
        .await
        .unwrap();
    desk.orders.approve(pending.id).await.unwrap();

    // The reject was decided on a read taken before the approve landed
    store.serve_once(pending.clone());
    let err = desk.orders.reject(pending.id).await.unwrap_err();
    assert!(
        matches!(
            err,
            DeskError::InvalidTransition { from: OrderStatus::InProgress, to: OrderStatus::Cancelled, .. }
        ),
        "{:?}",
        err
    );
    assert_eq!(desk.orders.get_order(pending.id).await.unwrap().status, OrderStatus::InProgress);
}

#[tokio::test]
async fn test_racing_review_is_duplicate_and_keeps_rating() {
    let (store, desk) = racing_desk();
    let client = client(&desk, 1).await;
    let employee = employee(&desk, 2, Branch::Design).await;
    let order = completed_order(&desk, &client, &employee, 80).await;

    desk.reviews
        .submit_review(order.id, client.id, employee.id, 4, "solid")
        .await
        .unwrap();

    // The second request checked before the first review was committed
    store.hide_review_once();
    let err = desk
        .reviews
        .submit_review(order.id, client.id, employee.id, 1, "late")
        .await
        .unwrap_err();
    assert!(matches!(err, DeskError::DuplicateReview(id) if id == order.id), "{:?}", err);

    let employee = desk.directory.get_employee(employee.id).await.unwrap();
    assert_eq!(employee.rating, 4.0);
    assert_eq!(employee.total_reviews, 1);
    assert_eq!(desk.reviews.reviews_for_employee(employee.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_completing_from_stale_read_of_reviewed_order() {
    let (store, desk) = racing_desk();
    let client = client(&desk, 1).await;
    let employee = employee(&desk, 2, Branch::Trainer).await;
    let order = desk
        .orders
        .create_order(client.id, employee.id, "Training plan", Decimal::new(60, 0))
        .await
        .unwrap();
    let in_progress = desk.orders.approve(order.id).await.unwrap();
    desk.orders.complete(order.id).await.unwrap();
    desk.reviews
        .submit_review(order.id, client.id, employee.id, 5, "")
        .await
        .unwrap();

    store.serve_once(in_progress);
    let err = desk.orders.complete(order.id).await.unwrap_err();
    assert!(matches!(err, DeskError::DuplicateReview(id) if id == order.id), "{:?}", err);

    let current = desk.orders.get_order(order.id).await.unwrap();
    assert_eq!(current.status, OrderStatus::Completed);
}

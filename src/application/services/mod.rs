//! Application services - Business logic orchestration

pub mod directory_service;
pub mod order_service;
pub mod registration_service;
pub mod review_service;
pub mod statistics_service;

pub use directory_service::{DirectoryService, EmployeePage};
pub use order_service::OrderService;
pub use registration_service::{parse_birth_date, Registration, RegistrationService};
pub use review_service::ReviewService;
pub use statistics_service::{ClientStats, EmployeeStats, StatisticsService};

use std::sync::Arc;
use crate::domain::traits::Store;

/// All services wired over one store
pub struct Desk {
    pub orders: OrderService,
    pub reviews: ReviewService,
    pub directory: DirectoryService,
    pub registration: RegistrationService,
    pub statistics: StatisticsService,
}

impl Desk {
    pub fn new(store: Arc<dyn Store>, page_size: u64) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            reviews: ReviewService::new(store.clone()),
            directory: DirectoryService::new(store.clone(), page_size),
            registration: RegistrationService::new(store.clone()),
            statistics: StatisticsService::new(store),
        }
    }
}

//! Employee directory and entity lookups

use std::sync::Arc;

use crate::application::errors::DeskError;
use crate::domain::entities::{Branch, Client, Employee};
use crate::domain::traits::Store;

/// One page of the employee directory
#[derive(Debug, Clone)]
pub struct EmployeePage {
    pub employees: Vec<Employee>,
    /// Zero-based page index
    pub page: u64,
    pub total_pages: u64,
    pub total_count: u64,
}

impl EmployeePage {
    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }
}

/// Number of pages needed for `count` items; an empty directory still has one page.
pub fn total_pages(count: u64, page_size: u64) -> u64 {
    if count == 0 || page_size == 0 {
        1
    } else {
        count.div_ceil(page_size)
    }
}

/// Read-only lookups over employees and clients.
pub struct DirectoryService {
    store: Arc<dyn Store>,
    page_size: u64,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn Store>, page_size: u64) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Employees in stable insertion order, optionally filtered by branch.
    pub async fn list_employees(&self, branch: Option<Branch>, offset: u64, limit: u64) -> Result<Vec<Employee>, DeskError> {
        Ok(self.store.list_employees(branch, offset, limit).await?)
    }

    pub async fn count_employees(&self, branch: Option<Branch>) -> Result<u64, DeskError> {
        Ok(self.store.count_employees(branch).await?)
    }

    /// Fetch page `page` (zero-based) with the configured page size.
    ///
    /// Count and list are separate reads, so a concurrent registration may
    /// make them disagree by one.
    pub async fn page(&self, branch: Option<Branch>, page: u64) -> Result<EmployeePage, DeskError> {
        let offset = page
            .checked_mul(self.page_size)
            .ok_or_else(|| DeskError::validation(format!("page {} is out of range", page)))?;
        let employees = self.list_employees(branch, offset, self.page_size).await?;
        let total_count = self.count_employees(branch).await?;

        Ok(EmployeePage {
            employees,
            page,
            total_pages: total_pages(total_count, self.page_size),
            total_count,
        })
    }

    pub async fn get_employee(&self, employee_id: i64) -> Result<Employee, DeskError> {
        self.store
            .get_employee(employee_id)
            .await?
            .ok_or_else(|| DeskError::not_found("employee", employee_id))
    }

    pub async fn get_client(&self, client_id: i64) -> Result<Client, DeskError> {
        self.store
            .get_client(client_id)
            .await?
            .ok_or_else(|| DeskError::not_found("client", client_id))
    }
}

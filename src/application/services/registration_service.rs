//! Client and employee registration

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::sync::Arc;

use crate::application::errors::{DeskError, StorageError};
use crate::domain::entities::{Actor, Branch, Client, Employee, NewClient, NewEmployee};
use crate::domain::traits::Store;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?\d{7,15}$").unwrap_or_else(|e| panic!("phone pattern is invalid: {}", e))
});

const BIRTH_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

/// Personal details shared by both roles
#[derive(Debug, Clone)]
pub struct Registration {
    pub external_user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
}

/// Parse a birth date in any of the accepted formats:
/// `YYYY-MM-DD`, `DD.MM.YYYY` or `DD/MM/YYYY`.
pub fn parse_birth_date(text: &str) -> Result<NaiveDate, DeskError> {
    let text = text.trim();
    BIRTH_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| {
            DeskError::validation(format!(
                "invalid date '{}', use YYYY-MM-DD or DD.MM.YYYY",
                text
            ))
        })
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub struct RegistrationService {
    store: Arc<dyn Store>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn register_client(&self, registration: Registration) -> Result<Client, DeskError> {
        let registration = self.validate(registration).await?;
        let external_user_id = registration.external_user_id;

        let client = self
            .store
            .insert_client(NewClient {
                external_user_id,
                first_name: registration.first_name,
                last_name: registration.last_name,
                phone: registration.phone,
                birth_date: registration.birth_date,
            })
            .await
            .map_err(|e| already_registered(e, external_user_id))?;

        tracing::info!(client_id = client.id, external_user_id, "Client registered");
        Ok(client)
    }

    pub async fn register_employee(&self, registration: Registration, branch: Branch) -> Result<Employee, DeskError> {
        let registration = self.validate(registration).await?;
        let external_user_id = registration.external_user_id;

        let employee = self
            .store
            .insert_employee(NewEmployee {
                external_user_id,
                first_name: registration.first_name,
                last_name: registration.last_name,
                phone: registration.phone,
                birth_date: registration.birth_date,
                branch,
            })
            .await
            .map_err(|e| already_registered(e, external_user_id))?;

        tracing::info!(employee_id = employee.id, external_user_id, %branch, "Employee registered");
        Ok(employee)
    }

    /// Role of a messenger user; a client registration wins over an employee one.
    pub async fn resolve_role(&self, external_user_id: i64) -> Result<Option<Actor>, DeskError> {
        if let Some(client) = self.store.find_client_by_external_id(external_user_id).await? {
            return Ok(Some(Actor::Client(client.id)));
        }
        Ok(self
            .store
            .find_employee_by_external_id(external_user_id)
            .await?
            .map(|employee| Actor::Employee(employee.id)))
    }

    async fn validate(&self, registration: Registration) -> Result<Registration, DeskError> {
        let first_name = registration.first_name.trim().to_string();
        let last_name = registration.last_name.trim().to_string();
        let phone = registration.phone.trim().to_string();

        if first_name.is_empty() || last_name.is_empty() {
            return Err(DeskError::validation("first and last name are required"));
        }
        if !is_valid_phone(&phone) {
            return Err(DeskError::validation(format!(
                "invalid phone '{}', expected 7-15 digits with optional leading +",
                phone
            )));
        }
        if registration.birth_date > Utc::now().date_naive() {
            return Err(DeskError::validation("birth date is in the future"));
        }

        if self.resolve_role(registration.external_user_id).await?.is_some() {
            return Err(DeskError::AlreadyRegistered(registration.external_user_id));
        }

        Ok(Registration {
            external_user_id: registration.external_user_id,
            first_name,
            last_name,
            phone,
            birth_date: registration.birth_date,
        })
    }
}

fn already_registered(err: StorageError, external_user_id: i64) -> DeskError {
    match err {
        StorageError::Conflict(_) => DeskError::AlreadyRegistered(external_user_id),
        other => other.into(),
    }
}

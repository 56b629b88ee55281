//! SQLite-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;

use crate::application::errors::StorageError;
use crate::domain::entities::{
    Branch, Client, Employee, NewClient, NewEmployee, NewOrder, NewReview, Order, OrderStatus,
    Review,
};
use crate::domain::traits::Store;

const CLIENT_COLUMNS: &str = "id, external_user_id, first_name, last_name, phone, birth_date, created_at";
const EMPLOYEE_COLUMNS: &str = "id, external_user_id, first_name, last_name, phone, birth_date, branch, rating, total_reviews, created_at";
const ORDER_COLUMNS: &str = "id, client_id, employee_id, description, price, status, created_at, finished_at";
const REVIEW_COLUMNS: &str = "id, client_id, employee_id, order_id, rating, comment, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "Opened database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        init_tables(&conn)?;
        tracing::debug!("SQLite schema ready");
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_user_id INTEGER UNIQUE NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            phone TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_user_id INTEGER UNIQUE NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            phone TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            branch TEXT NOT NULL,
            rating REAL NOT NULL DEFAULT 0,
            total_reviews INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Price is kept as decimal text so it round-trips exactly
    conn.execute(
        "CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id INTEGER NOT NULL,
            employee_id INTEGER NOT NULL,
            description TEXT NOT NULL,
            price TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            created_at TEXT NOT NULL,
            finished_at TEXT,
            FOREIGN KEY (client_id) REFERENCES clients(id),
            FOREIGN KEY (employee_id) REFERENCES employees(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id INTEGER NOT NULL,
            employee_id INTEGER NOT NULL,
            order_id INTEGER NOT NULL UNIQUE,
            rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            comment TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY (client_id) REFERENCES clients(id),
            FOREIGN KEY (employee_id) REFERENCES employees(id),
            FOREIGN KEY (order_id) REFERENCES orders(id)
        )",
        [],
    )?;

    // Create indexes
    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_employees_branch ON employees(branch)",
        "CREATE INDEX IF NOT EXISTS idx_orders_client ON orders(client_id)",
        "CREATE INDEX IF NOT EXISTS idx_orders_employee ON orders(employee_id)",
        "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
        "CREATE INDEX IF NOT EXISTS idx_reviews_employee ON reviews(employee_id)",
    ] {
        conn.execute(ddl, [])?;
    }

    Ok(())
}

impl ToSql for OrderStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for OrderStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Branch {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Branch {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        external_user_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        birth_date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        external_user_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        birth_date: row.get(5)?,
        branch: row.get(6)?,
        rating: row.get(7)?,
        total_reviews: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let price: String = row.get(4)?;
    let price = Decimal::from_str(&price)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Order {
        id: row.get(0)?,
        client_id: row.get(1)?,
        employee_id: row.get(2)?,
        description: row.get(3)?,
        price,
        status: row.get(5)?,
        created_at: row.get(6)?,
        finished_at: row.get(7)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        client_id: row.get(1)?,
        employee_id: row.get(2)?,
        order_id: row.get(3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Constraint violations become `Conflict`; everything else stays a SQLite error.
fn map_write_error(err: rusqlite::Error, what: impl FnOnce() -> String) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::Conflict(what())
        }
        other => StorageError::Sqlite(other),
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn select_employee(conn: &Connection, id: i64) -> rusqlite::Result<Option<Employee>> {
    conn.query_row(
        &format!("SELECT {} FROM employees WHERE id = ?1", EMPLOYEE_COLUMNS),
        [id],
        employee_from_row,
    )
    .optional()
}

fn select_order(conn: &Connection, id: i64) -> rusqlite::Result<Option<Order>> {
    conn.query_row(
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS),
        [id],
        order_from_row,
    )
    .optional()
}

fn recompute_in(conn: &Connection, employee_id: i64) -> rusqlite::Result<Option<Employee>> {
    let (avg, count): (Option<f64>, i64) = conn.query_row(
        "SELECT AVG(rating), COUNT(*) FROM reviews WHERE employee_id = ?1",
        [employee_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let updated = conn.execute(
        "UPDATE employees SET rating = ?1, total_reviews = ?2 WHERE id = ?3",
        rusqlite::params![avg.unwrap_or(0.0), count, employee_id],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    select_employee(conn, employee_id)
}

fn select_orders(
    conn: &Connection,
    owner_column: &str,
    owner_id: i64,
    status: Option<OrderStatus>,
) -> rusqlite::Result<Vec<Order>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM orders
         WHERE {} = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY id",
        ORDER_COLUMNS, owner_column
    ))?;
    let rows = stmt.query_map(rusqlite::params![owner_id, status], order_from_row)?;
    rows.collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_client(&self, client: NewClient) -> Result<Client, StorageError> {
        let conn = self.conn.lock().await;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO clients (external_user_id, first_name, last_name, phone, birth_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                client.external_user_id,
                client.first_name,
                client.last_name,
                client.phone,
                client.birth_date,
                created_at
            ],
        )
        .map_err(|e| map_write_error(e, || format!("client {} already exists", client.external_user_id)))?;

        Ok(Client {
            id: conn.last_insert_rowid(),
            external_user_id: client.external_user_id,
            first_name: client.first_name,
            last_name: client.last_name,
            phone: client.phone,
            birth_date: client.birth_date,
            created_at,
        })
    }

    async fn get_client(&self, id: i64) -> Result<Option<Client>, StorageError> {
        let conn = self.conn.lock().await;
        let client = conn
            .query_row(
                &format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS),
                [id],
                client_from_row,
            )
            .optional()?;
        Ok(client)
    }

    async fn find_client_by_external_id(&self, external_user_id: i64) -> Result<Option<Client>, StorageError> {
        let conn = self.conn.lock().await;
        let client = conn
            .query_row(
                &format!("SELECT {} FROM clients WHERE external_user_id = ?1", CLIENT_COLUMNS),
                [external_user_id],
                client_from_row,
            )
            .optional()?;
        Ok(client)
    }

    async fn insert_employee(&self, employee: NewEmployee) -> Result<Employee, StorageError> {
        let conn = self.conn.lock().await;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO employees (external_user_id, first_name, last_name, phone, birth_date, branch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                employee.external_user_id,
                employee.first_name,
                employee.last_name,
                employee.phone,
                employee.birth_date,
                employee.branch,
                created_at
            ],
        )
        .map_err(|e| map_write_error(e, || format!("employee {} already exists", employee.external_user_id)))?;

        Ok(Employee {
            id: conn.last_insert_rowid(),
            external_user_id: employee.external_user_id,
            first_name: employee.first_name,
            last_name: employee.last_name,
            phone: employee.phone,
            birth_date: employee.birth_date,
            branch: employee.branch,
            rating: 0.0,
            total_reviews: 0,
            created_at,
        })
    }

    async fn get_employee(&self, id: i64) -> Result<Option<Employee>, StorageError> {
        let conn = self.conn.lock().await;
        Ok(select_employee(&conn, id)?)
    }

    async fn find_employee_by_external_id(&self, external_user_id: i64) -> Result<Option<Employee>, StorageError> {
        let conn = self.conn.lock().await;
        let employee = conn
            .query_row(
                &format!("SELECT {} FROM employees WHERE external_user_id = ?1", EMPLOYEE_COLUMNS),
                [external_user_id],
                employee_from_row,
            )
            .optional()?;
        Ok(employee)
    }

    async fn list_employees(&self, branch: Option<Branch>, offset: u64, limit: u64) -> Result<Vec<Employee>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM employees
             WHERE (?1 IS NULL OR branch = ?1)
             ORDER BY id
             LIMIT ?2 OFFSET ?3",
            EMPLOYEE_COLUMNS
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![branch, to_sql_int(limit), to_sql_int(offset)],
            employee_from_row,
        )?;
        let employees = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(employees)
    }

    async fn count_employees(&self, branch: Option<Branch>) -> Result<u64, StorageError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM employees WHERE (?1 IS NULL OR branch = ?1)",
            rusqlite::params![branch],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, StorageError> {
        let conn = self.conn.lock().await;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO orders (client_id, employee_id, description, price, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                order.client_id,
                order.employee_id,
                order.description,
                order.price.to_string(),
                OrderStatus::Pending,
                created_at
            ],
        )
        .map_err(|e| map_write_error(e, || "order references a missing client or employee".to_string()))?;

        Ok(Order {
            id: conn.last_insert_rowid(),
            client_id: order.client_id,
            employee_id: order.employee_id,
            description: order.description,
            price: order.price,
            status: OrderStatus::Pending,
            created_at,
            finished_at: None,
        })
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StorageError> {
        let conn = self.conn.lock().await;
        Ok(select_order(&conn, id)?)
    }

    async fn transition_order(
        &self,
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Order>, StorageError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE orders SET status = ?1, finished_at = COALESCE(?2, finished_at)
             WHERE id = ?3 AND status = ?4",
            rusqlite::params![to, finished_at, id, from],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let order = select_order(&tx, id)?;
        tx.commit()?;
        Ok(order)
    }

    async fn orders_by_client(&self, client_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError> {
        let conn = self.conn.lock().await;
        Ok(select_orders(&conn, "client_id", client_id, status)?)
    }

    async fn orders_by_employee(&self, employee_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>, StorageError> {
        let conn = self.conn.lock().await;
        Ok(select_orders(&conn, "employee_id", employee_id, status)?)
    }

    async fn insert_review(&self, review: NewReview) -> Result<(Review, Employee), StorageError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO reviews (client_id, employee_id, order_id, rating, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                review.client_id,
                review.employee_id,
                review.order_id,
                review.rating,
                review.comment,
                created_at
            ],
        )
        .map_err(|e| map_write_error(e, || format!("review for order {} rejected", review.order_id)))?;
        let id = tx.last_insert_rowid();

        // Dropping `tx` without commit rolls the insert back
        let employee = recompute_in(&tx, review.employee_id)?.ok_or_else(|| {
            StorageError::Conflict(format!("employee {} vanished during review", review.employee_id))
        })?;
        tx.commit()?;

        Ok((
            Review {
                id,
                client_id: review.client_id,
                employee_id: review.employee_id,
                order_id: review.order_id,
                rating: review.rating,
                comment: review.comment,
                created_at,
            },
            employee,
        ))
    }

    async fn get_review_for_order(&self, order_id: i64) -> Result<Option<Review>, StorageError> {
        let conn = self.conn.lock().await;
        let review = conn
            .query_row(
                &format!("SELECT {} FROM reviews WHERE order_id = ?1", REVIEW_COLUMNS),
                [order_id],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    async fn reviews_by_employee(&self, employee_id: i64, limit: u64) -> Result<Vec<Review>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews WHERE employee_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            REVIEW_COLUMNS
        ))?;
        let rows = stmt.query_map(rusqlite::params![employee_id, to_sql_int(limit)], review_from_row)?;
        let reviews = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }

    async fn recompute_rating(&self, employee_id: i64) -> Result<Option<Employee>, StorageError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let employee = recompute_in(&tx, employee_id)?;
        tx.commit()?;
        Ok(employee)
    }
}

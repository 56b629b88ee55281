//! Command dispatcher - Routes parsed commands to the desk services

use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use super::parser::MessageParser;
use crate::application::errors::{BotError, CommandError, DeskError};
use crate::application::services::{parse_birth_date, Desk, Registration};
use crate::domain::entities::{Actor, Branch, Content, Message, Order};

const HELP: &str = "Available commands:
/start - Welcome message
/login <user_id> - Act as a messenger user
/register-client <first> <last> <phone> <birth_date> - Register as a client
/register-employee <branch> <first> <last> <phone> <birth_date> - Register as an employee
/find [branch] [page] - Browse employees
/profile [employee_id] - Show an employee profile, or your own
/order <employee_id> <price> <description..> - Place an order
/orders - List your orders
/approve <order_id> - Accept a pending order
/reject <order_id> - Decline a pending order
/complete <order_id> - Confirm an order is done
/review <order_id> <rating> [comment..] - Rate a completed order
/stats - Show your statistics
/help - Show this message";

/// A message for another messenger user, delivered best-effort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub external_user_id: i64,
    pub text: String,
}

/// Text for the sender plus notifications for counterpart parties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub notifications: Vec<Notification>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            notifications: Vec::new(),
        }
    }

    fn notify(mut self, external_user_id: i64, text: impl Into<String>) -> Self {
        self.notifications.push(Notification {
            external_user_id,
            text: text.into(),
        });
        self
    }
}

type HandlerResult = Result<Reply, BotError>;

/// Maps commands to desk calls on behalf of the current identity.
///
/// The identity is the message sender when the front-end knows it, otherwise
/// whatever `/login` last selected.
pub struct CommandDispatcher {
    parser: MessageParser,
    desk: Arc<Desk>,
    profile_limit: u64,
    session: Option<i64>,
}

impl CommandDispatcher {
    pub fn new(desk: Arc<Desk>, prefix: impl Into<String>, profile_limit: u64) -> Self {
        Self {
            parser: MessageParser::new(prefix),
            desk,
            profile_limit,
            session: None,
        }
    }

    pub fn session(&self) -> Option<i64> {
        self.session
    }

    /// Process a raw text line
    pub async fn process_text(&mut self, chat_id: &str, text: &str) -> Reply {
        let message = self.parser.parse(chat_id, text, None);
        self.process(message).await
    }

    /// Process a message; failures come back as reply text.
    pub async fn process(&mut self, message: Message) -> Reply {
        let identity = message.sender.or(self.session);
        let result = match message.content {
            Content::Command { name, args } => self.handle(&name, &args, identity).await,
            Content::Text(_) => Ok(Reply::text("Unknown input. Type /help for the list of commands.")),
            Content::Empty => Ok(Reply::default()),
        };

        result.unwrap_or_else(|e| {
            match &e {
                BotError::Desk(DeskError::Storage(_)) | BotError::Storage(_) | BotError::Internal(_) => {
                    tracing::error!(error = %e, "Command failed")
                }
                _ => tracing::debug!(error = %e, "Command rejected"),
            }
            Reply::text(format!("Error: {}", e))
        })
    }

    async fn handle(&mut self, name: &str, args: &[String], identity: Option<i64>) -> HandlerResult {
        tracing::debug!(command = name, args = args.len(), "Dispatching command");
        match name {
            "start" => self.start(identity).await,
            "help" => Ok(Reply::text(HELP)),
            "login" => self.login(args).await,
            "register-client" => self.register_client(args, identity).await,
            "register-employee" => self.register_employee(args, identity).await,
            "find" => self.find(args).await,
            "profile" => self.profile(args, identity).await,
            "order" => self.order(args, identity).await,
            "orders" => self.orders(identity).await,
            "approve" => self.approve(args, identity).await,
            "reject" => self.reject(args, identity).await,
            "complete" => self.complete(args, identity).await,
            "review" => self.review(args, identity).await,
            "stats" => self.stats(identity).await,
            other => Err(CommandError::NotFound(format!("/{}", other)).into()),
        }
    }

    async fn start(&self, identity: Option<i64>) -> HandlerResult {
        let greeting = "Welcome to the freelance desk.";
        let Some(external_user_id) = identity else {
            return Ok(Reply::text(format!("{} Log in with /login <user_id>.", greeting)));
        };
        let text = match self.desk.registration.resolve_role(external_user_id).await? {
            Some(actor) => format!("{} You are logged in as {}.", greeting, actor),
            None => format!(
                "{} Register with /register-client or /register-employee.",
                greeting
            ),
        };
        Ok(Reply::text(text))
    }

    async fn login(&mut self, args: &[String]) -> HandlerResult {
        let external_user_id = arg_i64(args, 0, "user_id")?;
        self.session = Some(external_user_id);
        tracing::info!(external_user_id, "Console session switched");

        let text = match self.desk.registration.resolve_role(external_user_id).await? {
            Some(actor) => format!("Logged in as user {} ({}).", external_user_id, actor),
            None => format!("Logged in as user {} (not registered yet).", external_user_id),
        };
        Ok(Reply::text(text))
    }

    async fn register_client(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let external_user_id = identity.ok_or(CommandError::NotLoggedIn)?;
        let registration = registration_from(args, external_user_id)?;
        let client = self.desk.registration.register_client(registration).await?;
        Ok(Reply::text(format!(
            "Registered client #{} {}.",
            client.id,
            client.display_name()
        )))
    }

    async fn register_employee(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let external_user_id = identity.ok_or(CommandError::NotLoggedIn)?;
        let branch = parse_branch(arg(args, 0, "branch")?)?;
        let registration = registration_from(&args[1..], external_user_id)?;
        let employee = self
            .desk
            .registration
            .register_employee(registration, branch)
            .await?;
        Ok(Reply::text(format!(
            "Registered employee #{} {} in {}.",
            employee.id,
            employee.display_name(),
            employee.branch
        )))
    }

    async fn find(&self, args: &[String]) -> HandlerResult {
        let mut branch = None;
        let mut page_arg = None;
        for value in args.iter().take(2) {
            if let Ok(number) = value.parse::<u64>() {
                page_arg = Some(number);
            } else {
                branch = Some(parse_branch(value)?);
            }
        }
        let page = match page_arg {
            Some(0) => return Err(CommandError::InvalidArgs("page numbers start at 1".to_string()).into()),
            Some(n) => n - 1,
            None => 0,
        };

        let result = self.desk.directory.page(branch, page).await?;
        let scope = branch.map(|b| b.to_string()).unwrap_or_else(|| "all branches".to_string());
        if result.employees.is_empty() {
            return Ok(Reply::text(format!("No employees found in {} on page {}.", scope, page + 1)));
        }

        let mut text = format!(
            "Employees in {} (page {}/{}, {} total):",
            scope,
            result.page + 1,
            result.total_pages,
            result.total_count
        );
        for employee in &result.employees {
            text.push_str(&format!(
                "\n#{} {} [{}] rating {:.1} ({} reviews)",
                employee.id,
                employee.display_name(),
                employee.branch,
                employee.rating,
                employee.total_reviews
            ));
        }
        if result.has_next() {
            match branch {
                Some(b) => text.push_str(&format!("\nNext: /find {} {}", b, result.page + 2)),
                None => text.push_str(&format!("\nNext: /find {}", result.page + 2)),
            }
        }
        Ok(Reply::text(text))
    }

    async fn profile(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let employee_id = match args.first() {
            Some(_) => arg_i64(args, 0, "employee_id")?,
            None => match self.actor(identity).await? {
                Actor::Employee(id) => id,
                Actor::Client(id) => return self.client_profile(id).await,
            },
        };

        let employee = self.desk.directory.get_employee(employee_id).await?;
        let reviews = self
            .desk
            .reviews
            .reviews_for_employee(employee_id, self.profile_limit)
            .await?;

        let mut text = format!(
            "#{} {}\nBranch: {}\nRating: {:.2} ({} reviews)",
            employee.id,
            employee.display_name(),
            employee.branch,
            employee.rating,
            employee.total_reviews
        );
        for review in &reviews {
            text.push_str(&format!("\n  {} order #{}", review.stars(), review.order_id));
            if !review.comment.is_empty() {
                text.push_str(&format!(": {}", review.comment));
            }
        }
        Ok(Reply::text(text))
    }

    async fn client_profile(&self, client_id: i64) -> HandlerResult {
        let client = self.desk.directory.get_client(client_id).await?;
        let stats = self.desk.statistics.client_stats(client_id).await?;
        Ok(Reply::text(format!(
            "#{} {}\nPhone: {}\nBorn: {}\nOrders: {} total, {} completed",
            client.id,
            client.display_name(),
            client.phone,
            client.birth_date.format("%Y-%m-%d"),
            stats.total,
            stats.completed
        )))
    }

    async fn order(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let client_id = match self.actor(identity).await? {
            Actor::Client(id) => id,
            Actor::Employee(_) => {
                return Err(DeskError::PermissionDenied("only clients can place orders".to_string()).into())
            }
        };
        let employee_id = arg_i64(args, 0, "employee_id")?;
        let price = arg(args, 1, "price")?;
        let price = Decimal::from_str(price)
            .map_err(|_| CommandError::InvalidArgs(format!("invalid price '{}'", price)))?;
        let description = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();

        let order = self
            .desk
            .orders
            .create_order(client_id, employee_id, &description, price)
            .await?;
        let client = self.desk.directory.get_client(client_id).await?;
        let employee = self.desk.directory.get_employee(employee_id).await?;

        Ok(Reply::text(format!("Order created: {}", format_order(&order))).notify(
            employee.external_user_id,
            format!(
                "New order #{} from {}: {} ({}). Use /approve {} or /reject {}.",
                order.id,
                client.display_name(),
                order.description,
                order.price,
                order.id,
                order.id
            ),
        ))
    }

    async fn orders(&self, identity: Option<i64>) -> HandlerResult {
        let actor = self.actor(identity).await?;
        let orders = match actor {
            Actor::Client(id) => self.desk.orders.orders_for_client(id, None).await?,
            Actor::Employee(id) => self.desk.orders.orders_for_employee(id, None).await?,
        };
        if orders.is_empty() {
            return Ok(Reply::text("You have no orders."));
        }
        let lines: Vec<String> = orders.iter().map(format_order).collect();
        Ok(Reply::text(format!("Your orders:\n{}", lines.join("\n"))))
    }

    async fn approve(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let actor = self.actor(identity).await?;
        let order = self.desk.orders.approve_as(&actor, arg_i64(args, 0, "order_id")?).await?;
        let client = self.desk.directory.get_client(order.client_id).await?;
        Ok(Reply::text(format!("Order #{} accepted.", order.id)).notify(
            client.external_user_id,
            format!("Your order #{} was accepted and is now in progress.", order.id),
        ))
    }

    async fn reject(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let actor = self.actor(identity).await?;
        let order = self.desk.orders.reject_as(&actor, arg_i64(args, 0, "order_id")?).await?;
        let client = self.desk.directory.get_client(order.client_id).await?;
        Ok(Reply::text(format!("Order #{} declined.", order.id)).notify(
            client.external_user_id,
            format!("Your order #{} was declined.", order.id),
        ))
    }

    async fn complete(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let actor = self.actor(identity).await?;
        let order = self.desk.orders.complete_as(&actor, arg_i64(args, 0, "order_id")?).await?;
        let employee = self.desk.directory.get_employee(order.employee_id).await?;
        Ok(Reply::text(format!(
            "Order #{} completed. Rate it with /review {} <1-5> [comment].",
            order.id, order.id
        ))
        .notify(
            employee.external_user_id,
            format!("Order #{} was marked as completed by the client.", order.id),
        ))
    }

    async fn review(&self, args: &[String], identity: Option<i64>) -> HandlerResult {
        let actor = self.actor(identity).await?;
        let order_id = arg_i64(args, 0, "order_id")?;
        let rating = arg_i64(args, 1, "rating")?;
        let comment = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();

        let (review, employee) = self
            .desk
            .reviews
            .submit_review_as(&actor, order_id, rating, &comment)
            .await?;
        Ok(Reply::text(format!(
            "Thanks! {} rated {} for order #{}.",
            employee.display_name(),
            review.stars(),
            order_id
        ))
        .notify(
            employee.external_user_id,
            format!(
                "New review for order #{}: {}. Your rating is now {:.2}.",
                order_id,
                review.stars(),
                employee.rating
            ),
        ))
    }

    async fn stats(&self, identity: Option<i64>) -> HandlerResult {
        let text = match self.actor(identity).await? {
            Actor::Employee(id) => {
                let stats = self.desk.statistics.employee_stats(id).await?;
                format!(
                    "Orders: {} total, {} pending, {} in progress, {} completed, {} cancelled\nEarned: {}\nRating: {:.2} ({} reviews)",
                    stats.total,
                    stats.pending,
                    stats.in_progress,
                    stats.completed,
                    stats.cancelled,
                    stats.earned,
                    stats.rating,
                    stats.total_reviews
                )
            }
            Actor::Client(id) => {
                let stats = self.desk.statistics.client_stats(id).await?;
                format!("Orders: {} total, {} completed", stats.total, stats.completed)
            }
        };
        Ok(Reply::text(text))
    }

    async fn actor(&self, identity: Option<i64>) -> Result<Actor, BotError> {
        let external_user_id = identity.ok_or(CommandError::NotLoggedIn)?;
        self.desk
            .registration
            .resolve_role(external_user_id)
            .await?
            .ok_or_else(|| {
                DeskError::PermissionDenied(format!(
                    "user {} is not registered, use /register-client or /register-employee",
                    external_user_id
                ))
                .into()
            })
    }
}

fn format_order(order: &Order) -> String {
    format!(
        "#{} [{}] {} - {}",
        order.id, order.status, order.price, order.description
    )
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str, CommandError> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| CommandError::InvalidArgs(format!("missing <{}>", name)))
}

fn arg_i64(args: &[String], index: usize, name: &str) -> Result<i64, CommandError> {
    let value = arg(args, index, name)?;
    value
        .parse()
        .map_err(|_| CommandError::InvalidArgs(format!("<{}> must be a number, got '{}'", name, value)))
}

fn parse_branch(value: &str) -> Result<Branch, CommandError> {
    Branch::from_str(value).map_err(|e| {
        let known: Vec<&str> = Branch::ALL.iter().map(|b| b.as_str()).collect();
        CommandError::InvalidArgs(format!("{} (expected one of {})", e, known.join(", ")))
    })
}

fn registration_from(args: &[String], external_user_id: i64) -> Result<Registration, BotError> {
    let first_name = arg(args, 0, "first")?;
    let last_name = arg(args, 1, "last")?;
    let phone = arg(args, 2, "phone")?;
    let birth_date = parse_birth_date(arg(args, 3, "birth_date")?)?;
    Ok(Registration {
        external_user_id,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        phone: phone.to_string(),
        birth_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryStore;

    fn dispatcher() -> CommandDispatcher {
        let desk = Desk::new(Arc::new(MemoryStore::new()), 5);
        CommandDispatcher::new(Arc::new(desk), "!", 10)
    }

    #[tokio::test]
    async fn test_requires_login() {
        let mut d = dispatcher();
        let reply = d.process_text("console", "/orders").await;
        assert!(reply.text.contains("Log in first"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let mut d = dispatcher();
        let reply = d.process_text("console", "/dance").await;
        assert!(reply.text.contains("Command not found"));
    }

    #[tokio::test]
    async fn test_order_flow_notifies_counterpart() {
        let mut d = dispatcher();
        d.process_text("console", "/login 200").await;
        let reply = d.process_text("console", "/register-employee IT Ann Lee +15550001 1990-01-01").await;
        assert!(reply.text.contains("Registered employee #"), "{}", reply.text);

        d.process_text("console", "/login 100").await;
        d.process_text("console", "/register-client Bob Ray 5550002 02.03.1991").await;
        let reply = d.process_text("console", "/order 1 150.50 Build a landing page").await;
        assert!(reply.text.contains("[PENDING]"), "{}", reply.text);
        assert_eq!(reply.notifications.len(), 1);
        assert_eq!(reply.notifications[0].external_user_id, 200);

        let reply = d.process_text("console", "/approve 3").await;
        assert!(reply.text.contains("Permission denied"), "{}", reply.text);

        d.process_text("console", "/login 200").await;
        let reply = d.process_text("console", "/approve 3").await;
        assert_eq!(reply.text, "Order #3 accepted.");
        assert_eq!(reply.notifications[0].external_user_id, 100);

        d.process_text("console", "/login 100").await;
        d.process_text("console", "/complete 3").await;
        let reply = d.process_text("console", "/review 3 5 great work").await;
        assert!(reply.text.contains("*****"), "{}", reply.text);
        assert_eq!(reply.notifications[0].external_user_id, 200);

        let reply = d.process_text("console", "/profile 1").await;
        assert!(reply.text.contains("Rating: 5.00 (1 reviews)"), "{}", reply.text);
        assert!(reply.text.contains("great work"));
    }

    #[tokio::test]
    async fn test_client_profile_shows_order_counts() {
        let mut d = dispatcher();
        d.process_text("console", "/login 200").await;
        d.process_text("console", "/register-employee DESIGN Ann Lee +15550001 1990-01-01").await;
        d.process_text("console", "/login 100").await;
        d.process_text("console", "/register-client Bob Ray 5550002 1991-03-02").await;
        d.process_text("console", "/order 1 40 Poster").await;

        let reply = d.process_text("console", "/profile").await;
        assert!(reply.text.starts_with("#2 Bob Ray"), "{}", reply.text);
        assert!(reply.text.contains("Born: 1991-03-02"));
        assert!(reply.text.contains("Orders: 1 total, 0 completed"), "{}", reply.text);
    }

    #[tokio::test]
    async fn test_sender_overrides_session() {
        let mut d = dispatcher();
        d.process_text("console", "/login 100").await;
        d.process_text("console", "/register-client Bob Ray 5550002 1991-03-02").await;
        assert_eq!(d.session(), Some(100));

        let parser = MessageParser::new("!");
        let message = parser.parse("chat-7", "/start", None).with_sender(300);
        let reply = d.process(message).await;
        assert!(reply.text.contains("Register with"), "{}", reply.text);

        let reply = d.process_text("console", "/start").await;
        assert!(reply.text.contains("client #1"), "{}", reply.text);
    }

    #[tokio::test]
    async fn test_find_rejects_unknown_branch() {
        let mut d = dispatcher();
        let reply = d.process_text("console", "/find PLUMBING").await;
        assert!(reply.text.contains("unknown branch"), "{}", reply.text);
        let reply = d.process_text("console", "/find IT").await;
        assert!(reply.text.contains("No employees found in IT"));
    }
}

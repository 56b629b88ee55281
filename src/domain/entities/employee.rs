use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An employee's declared specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Branch {
    It,
    VideoEditing,
    Trainer,
    Teacher,
    Design,
}

impl Branch {
    pub const ALL: [Branch; 5] = [
        Branch::It,
        Branch::VideoEditing,
        Branch::Trainer,
        Branch::Teacher,
        Branch::Design,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::It => "IT",
            Branch::VideoEditing => "VIDEO_EDITING",
            Branch::Trainer => "TRAINER",
            Branch::Teacher => "TEACHER",
            Branch::Design => "DESIGN",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Branch::ALL
            .iter()
            .copied()
            .find(|branch| branch.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown branch: {}", s))
    }
}

/// A freelance worker. `rating` and `total_reviews` are derived from reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub external_user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub branch: Branch,
    pub rating: f64,
    pub total_reviews: i64,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl fmt::Display for Employee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub external_user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub branch: Branch,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A client's rating and comment on a completed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub client_id: i64,
    pub employee_id: i64,
    pub order_id: i64,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn stars(&self) -> String {
        "*".repeat(self.rating as usize)
    }
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub client_id: i64,
    pub employee_id: i64,
    pub order_id: i64,
    pub rating: u8,
    pub comment: String,
}

/// Arithmetic mean of the given ratings, 0.0 when there are none.
pub fn mean_rating(ratings: impl IntoIterator<Item = u8>) -> (f64, i64) {
    let (sum, count) = ratings
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), r| (sum + r as i64, count + 1));
    if count == 0 {
        (0.0, 0)
    } else {
        (sum as f64 / count as f64, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_rating() {
        assert_eq!(mean_rating([]), (0.0, 0));
        assert_eq!(mean_rating([5]), (5.0, 1));
        assert_eq!(mean_rating([5, 4, 3]), (4.0, 3));
        let (mean, count) = mean_rating([5, 4]);
        assert!((mean - 4.5).abs() < f64::EPSILON);
        assert_eq!(count, 2);
    }
}

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lib::amount::Amount;

/// One statement item as returned by the statement API
///
/// Unknown fields of the payload are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub id: Option<String>,
    /// in minor units
    pub amount: Amount,
    /// unix seconds
    pub time: i64,
    pub description: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// All records of a range, oldest first
pub type Ledger = Vec<TransactionRecord>;

impl TransactionRecord {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.time, 0).single()
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ time: {}, amount: {}, description: {:?}", self.time, self.amount.0, self.description)?;
        if let Some(comment) = &self.comment {
            write!(f, ", comment: {:?}", comment)?;
        }
        if let Some(id) = &self.id {
            write!(f, ", id: {}", id)?;
        }
        write!(f, " }}")
    }
}

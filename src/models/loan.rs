//! Loan record model and sequence ids

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque loan identifier.
///
/// Ordered by its numeric sequence; the text form (`T` + zero-padded counter)
/// is kept verbatim so ids read back from a store round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct LoanId {
    seq: u64,
    text: String,
}

impl LoanId {
    pub const PREFIX: char = 'T';

    /// Id for a freshly allocated sequence number
    pub fn from_seq(seq: u64) -> Self {
        Self {
            seq,
            text: format!("{}{:03}", Self::PREFIX, seq),
        }
    }

    /// Wrap an id read from storage. Ids without a numeric suffix sort as 0.
    pub fn parse(text: &str) -> Self {
        let seq = text
            .strip_prefix(Self::PREFIX)
            .and_then(|digits| digits.parse::<u64>().ok())
            .unwrap_or(0);
        Self {
            seq,
            text: text.to_string(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<String> for LoanId {
    fn from(s: String) -> Self {
        LoanId::parse(&s)
    }
}

impl From<LoanId> for String {
    fn from(id: LoanId) -> Self {
        id.text
    }
}

/// One borrow/return cycle. Created open by a borrow, closed once by a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub id: LoanId,
    pub item_id: String,
    pub borrower_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub open: bool,
}

impl LoanRecord {
    pub fn open(id: LoanId, item_id: &str, borrower_id: &str, borrowed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            item_id: item_id.to_string(),
            borrower_id: borrower_id.to_string(),
            borrowed_at,
            returned_at: None,
            open: true,
        }
    }

    pub(crate) fn close(&mut self, returned_at: DateTime<Utc>) {
        self.returned_at = Some(returned_at);
        self.open = false;
    }

    pub fn matches(&self, item_id: &str, borrower_id: &str) -> bool {
        self.open && self.item_id == item_id && self.borrower_id == borrower_id
    }

    pub fn status_label(&self) -> &'static str {
        if self.open {
            "Active"
        } else {
            "Returned"
        }
    }
}

impl std::fmt::Display for LoanRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Loan {}: item {} borrowed by {} - {}",
            self.id,
            self.item_id,
            self.borrower_id,
            self.status_label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_id_format() {
        assert_eq!(LoanId::from_seq(1).to_string(), "T001");
        assert_eq!(LoanId::from_seq(42).as_str(), "T042");
        assert_eq!(LoanId::from_seq(1234).as_str(), "T1234");
    }

    #[test]
    fn test_loan_id_parse() {
        assert_eq!(LoanId::parse("T007").seq(), 7);
        assert_eq!(LoanId::parse("T7").seq(), 7);
        assert_eq!(LoanId::parse("legacy-1").seq(), 0);
        assert_eq!(LoanId::parse("T").seq(), 0);
        assert_eq!(LoanId::parse("T001"), LoanId::from_seq(1));
    }

    #[test]
    fn test_loan_id_ordering_is_numeric() {
        assert!(LoanId::from_seq(9) < LoanId::from_seq(10));
        assert!(LoanId::from_seq(999) < LoanId::from_seq(1000));
        assert!(LoanId::parse("bogus") < LoanId::from_seq(1));
    }

    #[test]
    fn test_close_loan() {
        let now = Utc::now();
        let mut loan = LoanRecord::open(LoanId::from_seq(1), "I1", "B1", now);
        assert!(loan.matches("I1", "B1"));
        loan.close(now);
        assert!(!loan.open);
        assert_eq!(loan.returned_at, Some(now));
        assert!(!loan.matches("I1", "B1"));
        assert_eq!(loan.status_label(), "Returned");
    }
}

//! Catalog item model

use serde::{Deserialize, Serialize};

/// Lending status of an item.
///
/// Derived from the loan ledger: `Lent` iff an open loan references the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Available,
    Lent,
}

impl ItemStatus {
    /// Column value used by the persistent store
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "AVAILABLE",
            ItemStatus::Lent => "LENT",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => Ok(ItemStatus::Available),
            // Older rows used BORROWED
            "LENT" | "BORROWED" => Ok(ItemStatus::Lent),
            other => Err(format!("unknown item status '{}'", other)),
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ItemStatus::Available => "Available",
            ItemStatus::Lent => "Lent",
        };
        write!(f, "{}", label)
    }
}

/// Catalog item as held by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub creator: String,
    pub status: ItemStatus,
}

impl Item {
    pub fn is_available(&self) -> bool {
        self.status == ItemStatus::Available
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} by {}", self.title, self.creator)
    }
}

/// Create item request
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub id: String,
    pub title: String,
    pub creator: String,
}

impl NewItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            creator: creator.into(),
        }
    }
}

/// Update item request; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItem {
    pub title: Option<String>,
    pub creator: Option<String>,
}

/// Caller-selected ordering for item listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ItemSort {
    #[default]
    Insertion,
    Id,
    Title,
    Creator,
}

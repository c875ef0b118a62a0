use bson::Document;

use super::filter::validate_field_name;
use crate::error::{ShelfError, ShelfResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_i32(self) -> i32 {
        match self {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        }
    }

    pub fn from_i32(value: i32) -> ShelfResult<Self> {
        match value {
            1 => Ok(Direction::Ascending),
            -1 => Ok(Direction::Descending),
            other => Err(ShelfError::invalid(format!(
                "sort direction must be 1 or -1, got {other}"
            ))),
        }
    }

    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

/// Single-field sort.
///
/// Documents with equal sort values come back in store-defined order. The
/// in-memory store keeps insertion order; a server makes no promise at all.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Descending)
    }

    pub fn validate(&self) -> ShelfResult<()> {
        validate_field_name(&self.field)
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(self.field.clone(), self.direction.as_i32());
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn renders_direction() {
        assert_eq!(SortSpec::ascending("price").to_document(), doc! { "price": 1 });
        assert_eq!(SortSpec::descending("price").to_document(), doc! { "price": -1 });
    }

    #[test]
    fn parses_direction() {
        assert_eq!(Direction::from_i32(-1).unwrap(), Direction::Descending);
        assert!(Direction::from_i32(0).is_err());
    }
}

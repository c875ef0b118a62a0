use crate::error::{ShelfError, ShelfResult};

/// Offset pagination: skip, then take at most `limit`.
///
/// There is no continuation token. Pages read across a mutation may skip
/// or repeat documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(skip: u64, limit: u64) -> Self {
        Self { skip, limit }
    }

    /// 1-based page number.
    pub fn number(page: u64, per_page: u64) -> ShelfResult<Self> {
        if page == 0 {
            return Err(ShelfError::invalid("page numbers start at 1"));
        }
        let skip = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| ShelfError::invalid("page offset overflows"))?;
        Ok(Self::new(skip, per_page))
    }

    pub fn validate(&self) -> ShelfResult<()> {
        if self.limit == 0 {
            return Err(ShelfError::invalid("page size must be positive"));
        }
        if i64::try_from(self.limit).is_err() {
            return Err(ShelfError::invalid("page size too large"));
        }
        Ok(())
    }

    /// The page after this one, same size.
    pub fn next(&self) -> Self {
        Self::new(self.skip.saturating_add(self.limit), self.limit)
    }
}

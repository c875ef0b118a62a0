//! Point updates and deletes.
//!
//! A key filter selects the first matching document in store-defined order.
//! `title` is not unique in general, so when several documents match, which
//! one is touched is up to the store and may differ between runs. Callers
//! that hold an identifier should use the `_by_id` variants.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::Serialize;

use crate::error::{ShelfError, ShelfResult};
use crate::model::{ID, TITLE};
use crate::query::{Filter, validate_field_name};
use crate::store::DocumentStore;

/// Partial update: the listed fields are set, the rest are left alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    fields: Document,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    pub fn validate(&self) -> ShelfResult<()> {
        if self.fields.is_empty() {
            return Err(ShelfError::invalid("patch sets no fields"));
        }
        for field in self.fields.keys() {
            validate_field_name(field)?;
            if field == ID {
                return Err(ShelfError::invalid("the identifier cannot be patched"));
            }
            if field.contains('.') {
                return Err(ShelfError::invalid(format!(
                    "nested path '{field}' is not supported"
                )));
            }
        }
        Ok(())
    }

    /// The `$set` update document.
    pub fn to_update(&self) -> Document {
        let mut update = Document::new();
        update.insert("$set", self.fields.clone());
        update
    }
}

/// Counts reported by an update. Zero matches is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UpdateOutcome {
    pub matched: u64,
    /// 0 when nothing matched or the patch changed nothing.
    pub modified: u64,
}

pub struct MutationExecutor<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> MutationExecutor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn update_by_key(&self, key: &Filter, patch: &Patch) -> ShelfResult<UpdateOutcome> {
        key.validate()?;
        patch.validate()?;
        tracing::debug!(
            namespace = %self.store.namespace(),
            key = %key,
            patch = %patch.fields(),
            "update_one"
        );
        let outcome = self.store.update_one(key, patch).await?;
        tracing::debug!(
            matched = outcome.matched,
            modified = outcome.modified,
            "update_one complete"
        );
        Ok(outcome)
    }

    pub async fn delete_by_key(&self, key: &Filter) -> ShelfResult<u64> {
        key.validate()?;
        tracing::debug!(namespace = %self.store.namespace(), key = %key, "delete_one");
        let deleted = self.store.delete_one(key).await?;
        tracing::debug!(deleted, "delete_one complete");
        Ok(deleted)
    }

    pub async fn update_by_title(&self, title: &str, patch: &Patch) -> ShelfResult<UpdateOutcome> {
        self.update_by_key(&Filter::all().eq(TITLE, title), patch).await
    }

    pub async fn delete_by_title(&self, title: &str) -> ShelfResult<u64> {
        self.delete_by_key(&Filter::all().eq(TITLE, title)).await
    }

    pub async fn update_by_id(&self, id: ObjectId, patch: &Patch) -> ShelfResult<UpdateOutcome> {
        self.update_by_key(&Filter::all().eq(ID, id), patch).await
    }

    pub async fn delete_by_id(&self, id: ObjectId) -> ShelfResult<u64> {
        self.delete_by_key(&Filter::all().eq(ID, id)).await
    }
}

//! Secondary index declarations.
//!
//! Declaring is idempotent: an index whose keys already exist is left as is
//! and its name is returned. Indexes are never dropped from here.

use std::collections::HashSet;

use bson::Document;

use crate::error::{ShelfError, ShelfResult};
use crate::model::{AUTHOR, PUBLISHED_YEAR, TITLE};
use crate::query::{Direction, validate_field_name};
use crate::store::DocumentStore;

/// Ordered index keys. Order matters for compound indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    keys: Vec<(String, Direction)>,
}

impl IndexSpec {
    pub fn single(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            keys: vec![(field.into(), direction)],
        }
    }

    pub fn compound<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = (S, Direction)>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(|(f, d)| (f.into(), d)).collect(),
        }
    }

    pub fn keys(&self) -> &[(String, Direction)] {
        &self.keys
    }

    pub fn leading_field(&self) -> Option<&str> {
        self.keys.first().map(|(f, _)| f.as_str())
    }

    /// Default index name, `field_1` or `a_1_b_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn validate(&self) -> ShelfResult<()> {
        if self.keys.is_empty() {
            return Err(ShelfError::invalid("index needs at least one key"));
        }
        let mut seen = HashSet::new();
        for (field, _) in &self.keys {
            validate_field_name(field)?;
            if !seen.insert(field.as_str()) {
                return Err(ShelfError::invalid(format!(
                    "field '{field}' appears twice in index"
                )));
            }
        }
        Ok(())
    }

    pub fn to_keys_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, direction) in &self.keys {
            doc.insert(field.clone(), direction.as_i32());
        }
        doc
    }

    pub fn from_keys_document(doc: &Document) -> ShelfResult<Self> {
        let mut keys = Vec::with_capacity(doc.len());
        for (field, value) in doc {
            let direction = match value {
                bson::Bson::Int32(v) => Direction::from_i32(*v)?,
                bson::Bson::Int64(v) => Direction::from_i32(i32::try_from(*v).unwrap_or(0))?,
                bson::Bson::Double(v) => Direction::from_i32(*v as i32)?,
                other => {
                    return Err(ShelfError::invalid(format!(
                        "unsupported index direction {other} on '{field}'"
                    )));
                }
            };
            keys.push((field.clone(), direction));
        }
        let spec = Self { keys };
        spec.validate()?;
        Ok(spec)
    }
}

/// The catalog's indexes: title, then author + year in that order.
pub fn catalog_indexes() -> [IndexSpec; 2] {
    [
        IndexSpec::single(TITLE, Direction::Ascending),
        IndexSpec::compound([
            (AUTHOR, Direction::Ascending),
            (PUBLISHED_YEAR, Direction::Ascending),
        ]),
    ]
}

pub struct IndexManager<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> IndexManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn declare(&self, spec: &IndexSpec) -> ShelfResult<String> {
        spec.validate()?;
        tracing::debug!(
            namespace = %self.store.namespace(),
            keys = %spec.to_keys_document(),
            "create_index"
        );
        let name = self.store.create_index(spec).await?;
        tracing::debug!(index = %name, "create_index complete");
        Ok(name)
    }

    pub async fn declare_catalog_indexes(&self) -> ShelfResult<Vec<String>> {
        let mut names = Vec::new();
        for spec in catalog_indexes() {
            names.push(self.declare(&spec).await?);
        }
        Ok(names)
    }

    pub async fn list(&self) -> ShelfResult<Vec<String>> {
        self.store.index_names().await
    }
}

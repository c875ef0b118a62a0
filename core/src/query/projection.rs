use bson::Document;

use super::filter::validate_field_name;
use crate::error::{ShelfError, ShelfResult};
use crate::model::ID;

/// Inclusion projection. The store identifier comes back unless excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields: Vec<String>,
    exclude_id: bool,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            exclude_id: false,
        }
    }

    pub fn without_id(mut self) -> Self {
        self.exclude_id = true;
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn excludes_id(&self) -> bool {
        self.exclude_id
    }

    /// Whether `field` survives this projection.
    pub fn keeps(&self, field: &str) -> bool {
        if field == ID {
            return !self.exclude_id;
        }
        self.fields.iter().any(|f| f == field)
    }

    pub fn validate(&self) -> ShelfResult<()> {
        if self.fields.is_empty() {
            return Err(ShelfError::invalid("projection needs at least one field"));
        }
        for field in &self.fields {
            validate_field_name(field)?;
            if field == ID && self.exclude_id {
                return Err(ShelfError::invalid(
                    "projection both includes and excludes the identifier",
                ));
            }
        }
        Ok(())
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for field in &self.fields {
            doc.insert(field.clone(), 1);
        }
        if self.exclude_id {
            doc.insert(ID, 0);
        }
        doc
    }
}

//! Catalog record type and its decode path.
//!
//! The store does not enforce a schema, so decoding is where field presence
//! is checked. Decoding never drops information silently: missing and
//! mistyped fields fail with their names listed, and unknown fields are kept
//! in [`Book::extra`].

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::{ShelfError, ShelfResult};

pub const ID: &str = "_id";
pub const TITLE: &str = "title";
pub const AUTHOR: &str = "author";
pub const GENRE: &str = "genre";
pub const PUBLISHED_YEAR: &str = "published_year";
pub const PRICE: &str = "price";
pub const IN_STOCK: &str = "in_stock";

/// Every field a decoded book must carry.
pub const BOOK_FIELDS: [&str; 6] = [TITLE, AUTHOR, GENRE, PUBLISHED_YEAR, PRICE, IN_STOCK];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<ObjectId>,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: i32,
    pub price: f64,
    pub in_stock: bool,
    /// Fields present in the stored document that the catalog does not model.
    #[serde(flatten)]
    pub extra: Document,
}

impl Book {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        genre: impl Into<String>,
        published_year: i32,
        price: f64,
        in_stock: bool,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            author: author.into(),
            genre: genre.into(),
            published_year,
            price,
            in_stock,
            extra: Document::new(),
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn to_document(&self) -> ShelfResult<Document> {
        Ok(bson::to_document(self)?)
    }

    /// Decode a stored document into a book.
    pub fn decode(doc: &Document) -> ShelfResult<Self> {
        let mut fields = FieldReader::new(doc);

        let id = fields.object_id(ID);
        let title = fields.string(TITLE);
        let author = fields.string(AUTHOR);
        let genre = fields.string(GENRE);
        let published_year = fields.integer(PUBLISHED_YEAR);
        let price = fields.number(PRICE);
        let in_stock = fields.boolean(IN_STOCK);
        let extra = fields.extra();
        fields.finish()?;

        if !extra.is_empty() {
            tracing::warn!(
                title = %title,
                fields = ?extra.keys().collect::<Vec<_>>(),
                "Book document carries fields outside the catalog schema"
            );
        }

        Ok(Self {
            id,
            title,
            author,
            genre,
            published_year,
            price,
            in_stock,
            extra,
        })
    }

    pub fn decode_all(docs: &[Document]) -> ShelfResult<Vec<Self>> {
        docs.iter().map(Self::decode).collect()
    }
}

/// Collects typed fields out of a document, recording what went wrong.
///
/// Getters return a placeholder on failure; `finish` turns any recorded
/// failure into an error, so placeholders never escape.
struct FieldReader<'a> {
    doc: &'a Document,
    missing: Vec<String>,
    mismatched: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            missing: Vec::new(),
            mismatched: Vec::new(),
        }
    }

    fn required(&mut self, key: &str) -> Option<&'a Bson> {
        match self.doc.get(key) {
            Some(Bson::Null) | None => {
                self.missing.push(key.to_string());
                None
            }
            Some(value) => Some(value),
        }
    }

    fn read<T: Default>(&mut self, key: &str, convert: impl FnOnce(&Bson) -> Option<T>) -> T {
        let Some(value) = self.required(key) else {
            return T::default();
        };
        match convert(value) {
            Some(v) => v,
            None => {
                self.mismatched.push(key.to_string());
                T::default()
            }
        }
    }

    fn object_id(&self, key: &str) -> Option<ObjectId> {
        match self.doc.get(key) {
            Some(Bson::ObjectId(oid)) => Some(*oid),
            _ => None,
        }
    }

    fn string(&mut self, key: &str) -> String {
        self.read(key, |v| v.as_str().map(str::to_string))
    }

    fn boolean(&mut self, key: &str) -> bool {
        self.read(key, Bson::as_bool)
    }

    fn number(&mut self, key: &str) -> f64 {
        self.read(key, |v| match v {
            Bson::Double(v) => Some(*v),
            Bson::Int32(v) => Some(f64::from(*v)),
            Bson::Int64(v) => Some(*v as f64),
            _ => None,
        })
    }

    fn integer(&mut self, key: &str) -> i32 {
        self.read(key, |v| match v {
            Bson::Int32(v) => Some(*v),
            Bson::Int64(v) => i32::try_from(*v).ok(),
            Bson::Double(v) if v.fract() == 0.0 && v.abs() <= f64::from(i32::MAX) => {
                Some(*v as i32)
            }
            _ => None,
        })
    }

    fn extra(&self) -> Document {
        self.doc
            .iter()
            .filter(|(k, _)| k.as_str() != ID && !BOOK_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn finish(self) -> ShelfResult<()> {
        if self.missing.is_empty() && self.mismatched.is_empty() {
            Ok(())
        } else {
            Err(ShelfError::Decode {
                missing: self.missing,
                mismatched: self.mismatched,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_a_complete_document() {
        let id = ObjectId::new();
        let doc = doc! {
            "_id": id,
            "title": "Dune",
            "author": "Frank Herbert",
            "genre": "Science Fiction",
            "published_year": 1965,
            "price": 19.99,
            "in_stock": true,
        };

        let book = Book::decode(&doc).unwrap();
        assert_eq!(book.id, Some(id));
        assert_eq!(book.title, "Dune");
        assert_eq!(book.published_year, 1965);
        assert_eq!(book.price, 19.99);
        assert!(book.extra.is_empty());
    }

    #[test]
    fn accepts_any_numeric_encoding() {
        let doc = doc! {
            "title": "Foundation",
            "author": "Isaac Asimov",
            "genre": "Science Fiction",
            "published_year": 1951.0,
            "price": 12_i64,
            "in_stock": false,
        };

        let book = Book::decode(&doc).unwrap();
        assert_eq!(book.published_year, 1951);
        assert_eq!(book.price, 12.0);
        assert_eq!(book.id, None);
    }

    #[test]
    fn reports_missing_and_mismatched_fields() {
        let doc = doc! {
            "title": "Neuromancer",
            "genre": "Cyberpunk",
            "published_year": 1984.5,
            "price": "cheap",
            "in_stock": Bson::Null,
        };

        match Book::decode(&doc) {
            Err(ShelfError::Decode { missing, mismatched }) => {
                assert_eq!(missing, vec!["author".to_string(), "in_stock".to_string()]);
                assert_eq!(
                    mismatched,
                    vec!["published_year".to_string(), "price".to_string()]
                );
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn keeps_unknown_fields() {
        let doc = doc! {
            "title": "Snow Crash",
            "author": "Neal Stephenson",
            "genre": "Cyberpunk",
            "published_year": 1992,
            "price": 15.5,
            "in_stock": true,
            "pages": 480,
            "isbn": "0-553-08853-X",
        };

        let book = Book::decode(&doc).unwrap();
        assert_eq!(book.extra, doc! { "pages": 480, "isbn": "0-553-08853-X" });
    }

    #[test]
    fn serializes_back_without_an_unset_id() {
        let book = Book::new("Hyperion", "Dan Simmons", "Science Fiction", 1989, 14.0, true);
        let doc = book.to_document().unwrap();
        assert!(!doc.contains_key("_id"));
        assert_eq!(doc.get_str("title").unwrap(), "Hyperion");
        assert_eq!(Book::decode(&doc).unwrap(), book);
    }
}

//! Filter predicates: equality and range comparisons joined by AND.

use std::collections::HashSet;
use std::fmt;

use bson::{Bson, Document};

use crate::error::{ShelfError, ShelfResult};

/// Range comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    pub fn operator(self) -> &'static str {
        match self {
            RangeOp::Gt => "$gt",
            RangeOp::Gte => "$gte",
            RangeOp::Lt => "$lt",
            RangeOp::Lte => "$lte",
        }
    }

    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "$gt" => Some(RangeOp::Gt),
            "$gte" => Some(RangeOp::Gte),
            "$lt" => Some(RangeOp::Lt),
            "$lte" => Some(RangeOp::Lte),
            _ => None,
        }
    }

    /// Whether `actual.cmp(bound)` satisfies this operator.
    pub fn admits(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            RangeOp::Gt => ordering == Greater,
            RangeOp::Gte => ordering != Less,
            RangeOp::Lt => ordering == Less,
            RangeOp::Lte => ordering != Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Bson),
    Range(Vec<(RangeOp, Bson)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub condition: Condition,
}

/// A conjunction of predicates. The empty filter matches every document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.predicates.push(Predicate {
            field: field.into(),
            condition: Condition::Eq(value.into()),
        });
        self
    }

    /// Add a range bound. Bounds on the same field collect into one predicate.
    pub fn range(mut self, field: impl Into<String>, op: RangeOp, value: impl Into<Bson>) -> Self {
        let field = field.into();
        let value = value.into();

        let existing = self.predicates.iter_mut().find(|p| {
            p.field == field && matches!(p.condition, Condition::Range(_))
        });
        match existing {
            Some(Predicate {
                condition: Condition::Range(bounds),
                ..
            }) => bounds.push((op, value)),
            _ => self.predicates.push(Predicate {
                field,
                condition: Condition::Range(vec![(op, value)]),
            }),
        }
        self
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.range(field, RangeOp::Gt, value)
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.range(field, RangeOp::Gte, value)
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.range(field, RangeOp::Lt, value)
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.range(field, RangeOp::Lte, value)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// True when every predicate is an equality, as in a point lookup.
    pub fn is_point_lookup(&self) -> bool {
        !self.predicates.is_empty()
            && self
                .predicates
                .iter()
                .all(|p| matches!(p.condition, Condition::Eq(_)))
    }

    pub fn equality_fields(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().filter_map(|p| match p.condition {
            Condition::Eq(_) => Some(p.field.as_str()),
            Condition::Range(_) => None,
        })
    }

    pub fn validate(&self) -> ShelfResult<()> {
        let mut seen = HashSet::new();

        for predicate in &self.predicates {
            validate_field_name(&predicate.field)?;

            if !seen.insert(predicate.field.as_str()) {
                return Err(ShelfError::invalid(format!(
                    "conflicting conditions on field '{}'",
                    predicate.field
                )));
            }

            if let Condition::Range(bounds) = &predicate.condition {
                let mut ops = HashSet::new();
                for (op, bound) in bounds {
                    if !ops.insert(*op) {
                        return Err(ShelfError::invalid(format!(
                            "operator {} repeated on field '{}'",
                            op.operator(),
                            predicate.field
                        )));
                    }
                    if !is_range_bound(bound) {
                        return Err(ShelfError::invalid(format!(
                            "range bound for '{}' must be a scalar, got {:?}",
                            predicate.field,
                            bound.element_type()
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Render the filter in the store's query-document format.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for predicate in &self.predicates {
            let value = match &predicate.condition {
                // Embedded documents are wrapped so their keys are never read as operators.
                Condition::Eq(value @ Bson::Document(_)) => {
                    let mut wrapped = Document::new();
                    wrapped.insert("$eq", value.clone());
                    Bson::Document(wrapped)
                }
                Condition::Eq(value) => value.clone(),
                Condition::Range(bounds) => Bson::Document(
                    bounds
                        .iter()
                        .map(|(op, v)| (op.operator().to_string(), v.clone()))
                        .collect(),
                ),
            };
            doc.insert(predicate.field.clone(), value);
        }
        doc
    }

    /// Parse a query document: `field: literal` or `field: { $op: literal, .. }`.
    pub fn from_document(doc: &Document) -> ShelfResult<Self> {
        let mut filter = Filter::all();

        for (field, value) in doc {
            if field.starts_with('$') {
                return Err(ShelfError::invalid(format!(
                    "top-level operator '{field}' is not supported"
                )));
            }

            let operators = match value {
                Bson::Document(inner) if inner.keys().any(|k| k.starts_with('$')) => inner,
                other => {
                    filter = filter.eq(field.as_str(), other.clone());
                    continue;
                }
            };

            for (op, bound) in operators {
                if op == "$eq" {
                    filter = filter.eq(field.as_str(), bound.clone());
                } else if let Some(range) = RangeOp::parse(op) {
                    filter = filter.range(field.as_str(), range, bound.clone());
                } else if op.starts_with('$') {
                    return Err(ShelfError::invalid(format!(
                        "unsupported operator '{op}' on field '{field}'"
                    )));
                } else {
                    return Err(ShelfError::invalid(format!(
                        "field '{field}' mixes operators with plain keys"
                    )));
                }
            }
        }

        filter.validate()?;
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

pub(crate) fn validate_field_name(field: &str) -> ShelfResult<()> {
    if field.is_empty() {
        return Err(ShelfError::invalid("field name must not be empty"));
    }
    if field.starts_with('$') {
        return Err(ShelfError::invalid(format!(
            "field name '{field}' must not start with '$'"
        )));
    }
    Ok(())
}

fn is_range_bound(value: &Bson) -> bool {
    !matches!(
        value,
        Bson::Document(_) | Bson::Array(_) | Bson::Null | Bson::Undefined
    )
}

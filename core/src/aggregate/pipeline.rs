//! Declarative pipeline stages and their wire rendering.

use std::collections::HashSet;

use bson::{Bson, Document, doc};

use crate::error::{ShelfError, ShelfResult};
use crate::model::ID;
use crate::query::{Filter, SortSpec, validate_field_name};

/// What a group stage groups on.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    /// The field's value; documents without it share the `null` group.
    Field(String),
    /// `value - (value mod width)`, e.g. width 10 buckets years into decades.
    Bucket { field: String, width: i64 },
}

impl GroupKey {
    pub fn field(field: impl Into<String>) -> Self {
        GroupKey::Field(field.into())
    }

    pub fn decade(field: impl Into<String>) -> Self {
        GroupKey::Bucket {
            field: field.into(),
            width: 10,
        }
    }

    pub fn source_field(&self) -> &str {
        match self {
            GroupKey::Field(field) | GroupKey::Bucket { field, .. } => field,
        }
    }

    pub fn to_expression(&self) -> Bson {
        match self {
            GroupKey::Field(field) => Bson::String(format!("${field}")),
            GroupKey::Bucket { field, width } => {
                let path = format!("${field}");
                let width = i32::try_from(*width)
                    .map(Bson::Int32)
                    .unwrap_or(Bson::Int64(*width));
                Bson::Document(doc! {
                    "$subtract": [path.clone(), { "$mod": [path, width] }]
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count,
    Sum(String),
    /// Mean over members that carry a numeric value; `null` if none do.
    Avg(String),
    Min(String),
    Max(String),
}

impl Accumulator {
    pub fn to_expression(&self) -> Document {
        match self {
            Accumulator::Count => doc! { "$sum": 1 },
            Accumulator::Sum(field) => doc! { "$sum": format!("${field}") },
            Accumulator::Avg(field) => doc! { "$avg": format!("${field}") },
            Accumulator::Min(field) => doc! { "$min": format!("${field}") },
            Accumulator::Max(field) => doc! { "$max": format!("${field}") },
        }
    }

    fn source_field(&self) -> Option<&str> {
        match self {
            Accumulator::Count => None,
            Accumulator::Sum(field)
            | Accumulator::Avg(field)
            | Accumulator::Min(field)
            | Accumulator::Max(field) => Some(field),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupStage {
    pub key: GroupKey,
    pub accumulators: Vec<(String, Accumulator)>,
}

impl GroupStage {
    pub fn by(key: GroupKey) -> Self {
        Self {
            key,
            accumulators: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, accumulator: Accumulator) -> Self {
        self.accumulators.push((name.into(), accumulator));
        self
    }

    fn validate(&self) -> ShelfResult<()> {
        validate_field_name(self.key.source_field())?;
        if let GroupKey::Bucket { width, .. } = &self.key {
            if *width <= 0 {
                return Err(ShelfError::invalid(format!(
                    "bucket width must be positive, got {width}"
                )));
            }
        }

        let mut names = HashSet::new();
        for (name, accumulator) in &self.accumulators {
            validate_field_name(name)?;
            if name == ID || name.contains('.') || !names.insert(name.as_str()) {
                return Err(ShelfError::invalid(format!(
                    "accumulator name '{name}' is reserved or repeated"
                )));
            }
            if let Some(field) = accumulator.source_field() {
                validate_field_name(field)?;
            }
        }
        Ok(())
    }

    pub fn to_document(&self) -> Document {
        let mut group = Document::new();
        group.insert(ID, self.key.to_expression());
        for (name, accumulator) in &self.accumulators {
            group.insert(name.clone(), accumulator.to_expression());
        }
        doc! { "$group": group }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group(GroupStage),
    Sort(SortSpec),
    Limit(u64),
}

impl Stage {
    pub fn validate(&self) -> ShelfResult<()> {
        match self {
            Stage::Match(filter) => filter.validate(),
            Stage::Group(group) => group.validate(),
            Stage::Sort(sort) => sort.validate(),
            Stage::Limit(0) => Err(ShelfError::invalid("limit must be positive")),
            Stage::Limit(n) if i64::try_from(*n).is_err() => {
                Err(ShelfError::invalid(format!("limit {n} is too large")))
            }
            Stage::Limit(_) => Ok(()),
        }
    }

    pub fn to_document(&self) -> Document {
        match self {
            Stage::Match(filter) => doc! { "$match": filter.to_document() },
            Stage::Group(group) => group.to_document(),
            Stage::Sort(sort) => doc! { "$sort": sort.to_document() },
            Stage::Limit(n) => doc! { "$limit": i64::try_from(*n).unwrap_or(i64::MAX) },
        }
    }
}

/// Ordered stages, each consuming the previous stage's output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn filter(self, filter: Filter) -> Self {
        self.then(Stage::Match(filter))
    }

    pub fn group(self, group: GroupStage) -> Self {
        self.then(Stage::Group(group))
    }

    pub fn sort(self, sort: SortSpec) -> Self {
        self.then(Stage::Sort(sort))
    }

    pub fn limit(self, n: u64) -> Self {
        self.then(Stage::Limit(n))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn validate(&self) -> ShelfResult<()> {
        if self.stages.is_empty() {
            return Err(ShelfError::invalid("pipeline has no stages"));
        }
        self.stages.iter().try_for_each(Stage::validate)
    }

    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_decade_bucketing() {
        let pipeline = Pipeline::new()
            .group(
                GroupStage::by(GroupKey::decade("published_year"))
                    .with("count", Accumulator::Count),
            )
            .sort(SortSpec::ascending("_id"));

        assert_eq!(
            pipeline.to_documents(),
            vec![
                doc! {
                    "$group": {
                        "_id": {
                            "$subtract": ["$published_year", { "$mod": ["$published_year", 10] }]
                        },
                        "count": { "$sum": 1 },
                    }
                },
                doc! { "$sort": { "_id": 1 } },
            ]
        );
    }

    #[test]
    fn renders_top_k() {
        let pipeline = Pipeline::new()
            .group(GroupStage::by(GroupKey::field("author")).with("count", Accumulator::Count))
            .sort(SortSpec::descending("count"))
            .limit(1);

        let docs = pipeline.to_documents();
        assert_eq!(docs[0], doc! { "$group": { "_id": "$author", "count": { "$sum": 1 } } });
        assert_eq!(docs[2], doc! { "$limit": 1_i64 });
    }

    #[test]
    fn validation() {
        assert!(Pipeline::new().validate().is_err());
        assert!(Pipeline::new().limit(0).validate().is_err());

        let zero_width = GroupStage::by(GroupKey::Bucket {
            field: "published_year".into(),
            width: 0,
        });
        assert!(Pipeline::new().group(zero_width).validate().is_err());

        let reserved = GroupStage::by(GroupKey::field("genre")).with("_id", Accumulator::Count);
        assert!(Pipeline::new().group(reserved).validate().is_err());

        let repeated = GroupStage::by(GroupKey::field("genre"))
            .with("n", Accumulator::Count)
            .with("n", Accumulator::Sum("price".into()));
        assert!(Pipeline::new().group(repeated).validate().is_err());

        let ok = GroupStage::by(GroupKey::field("genre"))
            .with("avg_price", Accumulator::Avg("price".into()));
        assert!(Pipeline::new().group(ok).limit(3).validate().is_ok());
    }
}

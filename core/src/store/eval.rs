//! Query and pipeline evaluation over in-memory documents.
//!
//! Comparison follows the BSON type order a server uses: missing and null
//! sort first, then numbers (compared by value across widths, NaN lowest), strings,
//! documents, arrays, and so on. Range predicates only match values in the
//! same type bracket as their bound.

use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::aggregate::{Accumulator, GroupKey, GroupStage, Pipeline, Stage};
use crate::error::{ShelfError, ShelfResult};
use crate::model::ID;
use crate::query::{Condition, Filter, Predicate, Projection, RangeOp, SortSpec};

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        Some(Bson::MinKey) => 0,
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => 2,
        Some(Bson::String(_) | Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(Bson::MaxKey) => 13,
        Some(_) => 12,
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(v) => Some(Number::Int(i64::from(*v))),
        Bson::Int64(v) => Some(Number::Int(*v)),
        Bson::Double(v) => Some(Number::Float(*v)),
        // Decimals go through their nearest double; one that will not parse reads as NaN.
        Bson::Decimal128(d) => Some(Number::Float(d.to_string().parse().unwrap_or(f64::NAN))),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match number(value)? {
        Number::Int(v) => Some(v as f64),
        Number::Float(v) => Some(v),
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match number(value)? {
        Number::Int(v) => Some(v),
        Number::Float(_) => None,
    }
}

fn is_nan(value: &Bson) -> bool {
    matches!(number(value), Some(Number::Float(v)) if v.is_nan())
}

/// NaN equals itself and sorts below every other number.
fn compare_floats(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) if x < y => Ordering::Less,
        (false, false) if x > y => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

/// Exact comparison; `i as f64` would round above 2^53.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() || f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    let whole = f.trunc();
    i.cmp(&(whole as i64)).then_with(|| compare_floats(whole, f))
}

fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (Number::Int(x), Number::Float(y)) => compare_int_float(x, y),
        (Number::Float(x), Number::Int(y)) => compare_int_float(y, x).reverse(),
        (Number::Float(x), Number::Float(y)) => compare_floats(x, y),
    }
}

/// Total order over optional BSON values.
pub(crate) fn compare(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    if let (Some(x), Some(y)) = (a.and_then(number), b.and_then(number)) {
        return compare_numbers(x, y);
    }

    match (a, b) {
        (Some(Bson::String(x)), Some(Bson::String(y))) => x.cmp(y),
        (Some(Bson::Boolean(x)), Some(Bson::Boolean(y))) => x.cmp(y),
        (Some(Bson::ObjectId(x)), Some(Bson::ObjectId(y))) => x.bytes().cmp(&y.bytes()),
        (Some(Bson::DateTime(x)), Some(Bson::DateTime(y))) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Some(Bson::Array(x)), Some(Bson::Array(y))) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare(Some(l), Some(r)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Some(Bson::Document(x)), Some(Bson::Document(y))) => x
            .iter()
            .zip(y.iter())
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare(Some(lv), Some(rv))))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => Ordering::Equal,
    }
}

fn values_equal(actual: Option<&Bson>, expected: &Bson) -> bool {
    match (actual, expected) {
        (None | Some(Bson::Null), Bson::Null) => true,
        (None, _) => false,
        // Scalar equality also matches array members.
        (Some(Bson::Array(items)), e) if !matches!(e, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(Some(item), e))
        }
        (Some(a), e) => match (number(a), number(e)) {
            (Some(x), Some(y)) => compare_numbers(x, y) == Ordering::Equal,
            _ => a == e,
        },
    }
}

fn range_matches(actual: Option<&Bson>, op: RangeOp, bound: &Bson) -> bool {
    match actual {
        Some(Bson::Array(items)) => items.iter().any(|item| range_matches(Some(item), op, bound)),
        // NaN only falls inside a range whose bound is NaN.
        Some(value) if is_nan(value) != is_nan(bound) => false,
        Some(value) if type_rank(Some(value)) == type_rank(Some(bound)) => {
            op.admits(compare(Some(value), Some(bound)))
        }
        _ => false,
    }
}

fn predicate_matches(doc: &Document, predicate: &Predicate) -> bool {
    let actual = doc.get(&predicate.field);
    match &predicate.condition {
        Condition::Eq(expected) => values_equal(actual, expected),
        Condition::Range(bounds) => bounds
            .iter()
            .all(|(op, bound)| range_matches(actual, *op, bound)),
    }
}

pub(crate) fn matches(doc: &Document, filter: &Filter) -> bool {
    filter
        .predicates()
        .iter()
        .all(|predicate| predicate_matches(doc, predicate))
}

pub(crate) fn project(doc: &Document, projection: &Projection) -> Document {
    doc.iter()
        .filter(|(key, _)| projection.keeps(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Stable sort; equal keys keep their current relative order.
pub(crate) fn sort_documents(docs: &mut [Document], sort: &SortSpec) {
    docs.sort_by(|a, b| {
        sort.direction
            .apply(compare(a.get(&sort.field), b.get(&sort.field)))
    });
}

fn group_key(doc: &Document, key: &GroupKey) -> ShelfResult<Bson> {
    match key {
        GroupKey::Field(field) => Ok(doc.get(field).cloned().unwrap_or(Bson::Null)),
        GroupKey::Bucket { field, width } => match doc.get(field) {
            None | Some(Bson::Null) => Ok(Bson::Null),
            Some(Bson::Int32(v)) => match i32::try_from(*width) {
                Ok(w) => Ok(Bson::Int32(v - v % w)),
                Err(_) => Ok(Bson::Int64(i64::from(*v) - i64::from(*v) % width)),
            },
            Some(Bson::Int64(v)) => Ok(Bson::Int64(v - v % width)),
            Some(Bson::Double(v)) => Ok(Bson::Double(v - v % (*width as f64))),
            Some(other) => Err(ShelfError::Operation(format!(
                "cannot bucket non-numeric value {other} in field '{field}'"
            ))),
        },
    }
}

fn count_value(n: usize) -> Bson {
    match i32::try_from(n) {
        Ok(v) => Bson::Int32(v),
        Err(_) => Bson::Int64(n as i64),
    }
}

fn accumulate(members: &[&Document], accumulator: &Accumulator) -> Bson {
    let values = |field: &str| -> Vec<&Bson> {
        members
            .iter()
            .filter_map(|doc| doc.get(field))
            .filter(|v| !matches!(v, Bson::Null | Bson::Undefined))
            .collect()
    };

    match accumulator {
        Accumulator::Count => count_value(members.len()),
        Accumulator::Sum(field) => {
            let numbers: Vec<&Bson> = values(field)
                .into_iter()
                .filter(|v| as_f64(v).is_some())
                .collect();
            sum(&numbers)
        }
        Accumulator::Avg(field) => {
            let numbers: Vec<f64> = values(field).into_iter().filter_map(as_f64).collect();
            if numbers.is_empty() {
                Bson::Null
            } else {
                Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Accumulator::Min(field) => values(field)
            .into_iter()
            .min_by(|a, b| compare(Some(*a), Some(*b)))
            .cloned()
            .unwrap_or(Bson::Null),
        Accumulator::Max(field) => values(field)
            .into_iter()
            .max_by(|a, b| compare(Some(*a), Some(*b)))
            .cloned()
            .unwrap_or(Bson::Null),
    }
}

fn sum(numbers: &[&Bson]) -> Bson {
    if numbers.iter().any(|v| matches!(v, Bson::Double(_))) {
        return Bson::Double(numbers.iter().filter_map(|v| as_f64(v)).sum());
    }

    let mut total: i64 = 0;
    for value in numbers {
        match as_i64(value).and_then(|v| total.checked_add(v)) {
            Some(next) => total = next,
            None => return Bson::Double(numbers.iter().filter_map(|v| as_f64(v)).sum()),
        }
    }

    let all_int32 = numbers.iter().all(|v| matches!(v, Bson::Int32(_)));
    match i32::try_from(total) {
        Ok(small) if all_int32 => Bson::Int32(small),
        _ => Bson::Int64(total),
    }
}

fn group(docs: Vec<Document>, stage: &GroupStage) -> ShelfResult<Vec<Document>> {
    // Groups come out in first-seen order.
    let mut groups: Vec<(Bson, Vec<&Document>)> = Vec::new();
    for doc in &docs {
        let key = group_key(doc, &stage.key)?;
        let existing = groups
            .iter_mut()
            .find(|(k, _)| compare(Some(k), Some(&key)) == Ordering::Equal);
        match existing {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert(ID, key);
            for (name, accumulator) in &stage.accumulators {
                out.insert(name.clone(), accumulate(&members, accumulator));
            }
            out
        })
        .collect())
}

pub(crate) fn run_pipeline(
    mut docs: Vec<Document>,
    pipeline: &Pipeline,
) -> ShelfResult<Vec<Document>> {
    for stage in pipeline.stages() {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| matches(d, filter)).collect(),
            Stage::Group(group_stage) => group(docs, group_stage)?,
            Stage::Sort(sort) => {
                sort_documents(&mut docs, sort);
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
                docs
            }
        };
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_compare_across_widths() {
        assert_eq!(
            compare(Some(&Bson::Int32(5)), Some(&Bson::Double(5.0))),
            Ordering::Equal
        );
        assert_eq!(
            compare(Some(&Bson::Int64(7)), Some(&Bson::Double(6.5))),
            Ordering::Greater
        );
        assert_eq!(compare(None, Some(&Bson::Int32(0))), Ordering::Less);
        assert_eq!(
            compare(Some(&Bson::String("a".into())), Some(&Bson::Int32(9))),
            Ordering::Greater
        );
    }

    fn decimal(value: &str) -> Bson {
        Bson::Decimal128(value.parse().unwrap())
    }

    #[test]
    fn nan_and_decimals_have_a_place_in_the_order() {
        let nan = Bson::Double(f64::NAN);
        assert_eq!(compare(Some(&nan), Some(&nan)), Ordering::Equal);
        assert_eq!(compare(Some(&nan), Some(&Bson::Int32(i32::MIN))), Ordering::Less);
        assert_eq!(compare(Some(&nan), Some(&decimal("-1000"))), Ordering::Less);
        assert_eq!(compare(None, Some(&nan)), Ordering::Less);

        assert_eq!(compare(Some(&decimal("19.99")), Some(&Bson::Int32(5))), Ordering::Greater);
        assert_eq!(compare(Some(&decimal("5.0")), Some(&Bson::Int64(5))), Ordering::Equal);
        assert_eq!(
            compare(Some(&decimal("0.5")), Some(&decimal("0.25"))),
            Ordering::Greater
        );

        let big = (1_i64 << 53) + 1;
        assert_eq!(
            compare(Some(&Bson::Int64(big)), Some(&Bson::Double((1_i64 << 53) as f64))),
            Ordering::Greater
        );
    }

    #[test]
    fn sorting_nan_prices_puts_them_first() {
        let mut docs: Vec<Document> = (0..64)
            .map(|i| {
                let price = match i % 5 {
                    0 => Bson::Double(f64::NAN),
                    1 => decimal(&format!("{}.5", 64 - i)),
                    2 => Bson::Int32(i),
                    _ => Bson::Double(f64::from(i) * 0.75),
                };
                doc! { "n": i, "price": price }
            })
            .collect();

        sort_documents(&mut docs, &SortSpec::ascending("price"));

        let nans = docs
            .iter()
            .take_while(|d| d.get("price").is_some_and(is_nan))
            .count();
        assert_eq!(nans, 13);
        assert!(docs[nans..].iter().all(|d| !d.get("price").is_some_and(is_nan)));
        assert!(docs[nans..].windows(2).all(|w| {
            compare(w[0].get("price"), w[1].get("price")) != Ordering::Greater
        }));

        sort_documents(&mut docs, &SortSpec::descending("price"));
        assert!(docs[64 - nans..].iter().all(|d| d.get("price").is_some_and(is_nan)));
    }

    #[test]
    fn range_predicates_stay_in_type_bracket() {
        let doc = doc! { "price": "12.00" };
        assert!(!matches(&doc, &Filter::all().gt("price", 5)));

        let doc = doc! { "price": 12 };
        assert!(matches(&doc, &Filter::all().gt("price", 5.5).lte("price", 12)));
        assert!(!matches(&doc, &Filter::all().lt("price", 12)));
    }

    #[test]
    fn nan_and_decimal_ranges() {
        let nan = doc! { "price": f64::NAN };
        assert!(!matches(&nan, &Filter::all().gte("price", 5)));
        assert!(!matches(&nan, &Filter::all().lte("price", 5)));
        assert!(!matches(&nan, &Filter::all().lt("price", f64::INFINITY)));
        assert!(matches(&nan, &Filter::all().gte("price", f64::NAN)));
        assert!(!matches(&nan, &Filter::all().gt("price", f64::NAN)));

        let dec = doc! { "price": decimal("19.99") };
        assert!(matches(&dec, &Filter::all().gt("price", 19).lt("price", 20.0)));
        assert!(!matches(&dec, &Filter::all().lte("price", 1)));
        assert!(!matches(&dec, &Filter::all().gte("price", 20)));
    }

    #[test]
    fn equality_semantics() {
        let doc = doc! { "year": 1965, "tags": ["classic", "desert"] };
        assert!(matches(&doc, &Filter::all().eq("year", 1965.0)));
        assert!(matches(&doc, &Filter::all().eq("tags", "desert")));
        assert!(matches(&doc, &Filter::all().eq("missing", Bson::Null)));
        assert!(!matches(&doc, &Filter::all().eq("missing", 0)));
        assert!(matches(&doc, &Filter::all()));

        let nan = doc! { "price": f64::NAN };
        assert!(!matches(&nan, &Filter::all().eq("price", 5)));
        assert!(matches(&nan, &Filter::all().eq("price", f64::NAN)));

        let dec = doc! { "price": decimal("19.99") };
        assert!(!matches(&dec, &Filter::all().eq("price", 5)));
        assert!(matches(&dec, &Filter::all().eq("price", 19.99)));
        assert!(matches(&doc! { "price": 20 }, &Filter::all().eq("price", decimal("20"))));
    }

    #[test]
    fn decimal_keys_group_by_value() {
        let docs = vec![
            doc! { "price": decimal("9.99") },
            doc! { "price": decimal("12.50") },
            doc! { "price": decimal("9.99") },
        ];
        let stage = GroupStage::by(GroupKey::field("price")).with("count", Accumulator::Count);
        let out = group(docs, &stage).unwrap();
        assert_eq!(
            out,
            vec![
                doc! { "_id": decimal("9.99"), "count": 2 },
                doc! { "_id": decimal("12.50"), "count": 1 },
            ]
        );
    }

    #[test]
    fn projection_keeps_document_order() {
        let doc = doc! { "_id": 1, "title": "Dune", "author": "Herbert", "price": 9.5 };
        let projected = project(&doc, &Projection::include(["price", "title"]));
        assert_eq!(projected, doc! { "_id": 1, "title": "Dune", "price": 9.5 });
    }

    #[test]
    fn sort_is_stable() {
        let mut docs = vec![
            doc! { "n": 1, "tag": "a" },
            doc! { "n": 0, "tag": "b" },
            doc! { "n": 1, "tag": "c" },
        ];
        sort_documents(&mut docs, &SortSpec::new("n", Direction::Descending));
        let tags: Vec<&str> = docs.iter().map(|d| d.get_str("tag").unwrap()).collect();
        assert_eq!(tags, vec!["a", "c", "b"]);
    }

    #[test]
    fn buckets_keep_numeric_width() {
        let decade = GroupKey::decade("y");
        assert_eq!(group_key(&doc! { "y": 1987 }, &decade).unwrap(), Bson::Int32(1980));
        assert_eq!(group_key(&doc! { "y": 2020_i64 }, &decade).unwrap(), Bson::Int64(2020));
        assert_eq!(group_key(&doc! { "y": 1999.0 }, &decade).unwrap(), Bson::Double(1990.0));
        assert_eq!(group_key(&doc! {}, &decade).unwrap(), Bson::Null);
        assert!(group_key(&doc! { "y": "1987" }, &decade).is_err());
    }

    #[test]
    fn accumulators() {
        let a = doc! { "price": 10 };
        let b = doc! { "price": 4.5 };
        let c = doc! { "note": "no price" };
        let members = vec![&a, &b, &c];

        assert_eq!(accumulate(&members, &Accumulator::Count), Bson::Int32(3));
        assert_eq!(accumulate(&members, &Accumulator::Sum("price".into())), Bson::Double(14.5));
        assert_eq!(accumulate(&members, &Accumulator::Avg("price".into())), Bson::Double(7.25));
        assert_eq!(accumulate(&members, &Accumulator::Min("price".into())), Bson::Double(4.5));
        assert_eq!(accumulate(&members, &Accumulator::Max("price".into())), Bson::Int32(10));
        assert_eq!(accumulate(&[&c], &Accumulator::Avg("price".into())), Bson::Null);
        assert_eq!(accumulate(&[&a, &a], &Accumulator::Sum("price".into())), Bson::Int32(20));
    }

    #[test]
    fn pipeline_runs_stages_in_order() {
        let docs = vec![
            doc! { "genre": "Fantasy", "price": 10 },
            doc! { "genre": "Horror", "price": 30 },
            doc! { "genre": "Fantasy", "price": 15 },
            doc! { "genre": "Poetry", "price": 5 },
        ];
        let pipeline = Pipeline::new()
            .filter(Filter::all().gte("price", 10))
            .group(
                GroupStage::by(GroupKey::field("genre"))
                    .with("total", Accumulator::Sum("price".into())),
            )
            .sort(SortSpec::descending("total"))
            .limit(1);

        let out = run_pipeline(docs, &pipeline).unwrap();
        assert_eq!(out, vec![doc! { "_id": "Horror", "total": 30 }]);
    }
}

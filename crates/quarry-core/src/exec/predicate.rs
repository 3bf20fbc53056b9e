//! Evaluating HAVING predicates against a document's metadata.

use crate::document::KvMap;
use crate::query::{Aggregate, CompareOp, Predicate, PredicateOp};
use crate::value::Value;
use std::cmp::Ordering;

/// Whether `kvs` satisfies `predicate`.
///
/// A missing key, an array without an aggregate, an aggregate that does not
/// apply to the value, and a comparison between incompatible types all make
/// the predicate false.
pub fn matches(predicate: &Predicate, kvs: &KvMap) -> bool {
    let Some(stored) = kvs.get(&predicate.target.key) else {
        return false;
    };
    let value = match predicate.target.aggregate {
        Some(agg) => match aggregate(agg, stored) {
            Some(v) => v,
            None => return false,
        },
        None if stored.is_array() => return false,
        None => stored.clone(),
    };

    match &predicate.op {
        PredicateOp::Compare(op, rhs) => value.compare(rhs).is_some_and(|ord| holds(*op, ord)),
        PredicateOp::In { negated, values } => {
            let found = values
                .iter()
                .any(|v| value.compare(v) == Some(Ordering::Equal));
            found != *negated
        }
    }
}

fn holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

/// Reduce an array to a scalar. Scalars pass through unchanged.
///
/// `sum` and `avg` need numbers, `max` and `min` need ordered elements and
/// `count` accepts any array. Averages and extrema of empty arrays are
/// undefined.
pub fn aggregate(agg: Aggregate, value: &Value) -> Option<Value> {
    if !value.is_array() {
        return Some(value.clone());
    }
    match (agg, value) {
        (Aggregate::Count, v) => v.array_len().map(|n| Value::Number(n as f64)),
        (Aggregate::Sum, Value::Numbers(ns)) => Some(Value::Number(ns.iter().sum())),
        (Aggregate::Avg, Value::Numbers(ns)) if !ns.is_empty() => {
            Some(Value::Number(ns.iter().sum::<f64>() / ns.len() as f64))
        }
        (Aggregate::Max, v) => extreme(v, Ordering::Greater),
        (Aggregate::Min, v) => extreme(v, Ordering::Less),
        _ => None,
    }
}

fn extreme(value: &Value, want: Ordering) -> Option<Value> {
    fn pick<T: Clone>(items: &[T], want: Ordering, cmp: impl Fn(&T, &T) -> Ordering) -> Option<T> {
        items
            .iter()
            .cloned()
            .reduce(|best, x| if cmp(&x, &best) == want { x } else { best })
    }
    match value {
        Value::Numbers(ns) => {
            pick(ns, want, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal)).map(Value::Number)
        }
        Value::Strings(ss) => pick(ss, want, |a, b| a.cmp(b)).map(Value::String),
        Value::DateTimes(ds) => pick(ds, want, |a, b| a.cmp(b)).map(Value::DateTime),
        _ => None,
    }
}

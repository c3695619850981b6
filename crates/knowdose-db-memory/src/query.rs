use std::cmp::Ordering;

use knowdose_storage::{Direction, Query, StoredDocument};
use serde_json::Value;

/// Applies filters and ordering to a candidate set.
///
/// Like the hosted store, an order-by excludes documents that lack the sort
/// field. Ties keep document id order so results are stable.
pub fn execute(mut docs: Vec<StoredDocument>, query: &Query) -> Vec<StoredDocument> {
    docs.retain(|doc| query.matches(&doc.data));
    docs.sort_by(|a, b| a.id.cmp(&b.id));

    if let Some(order) = &query.order_by {
        docs.retain(|doc| doc.data.contains_key(&order.field));
        docs.sort_by(|a, b| {
            let ord = compare_values(&a.data[&order.field], &b.data[&order.field]);
            match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }
    docs
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

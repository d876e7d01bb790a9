//! Query-string driven query building shared by every list endpoint.
//!
//! Stages run `filter → sort → select_fields → paginate` and never touch the store.
//! Values stay strings here; the store casts them against the collection schema
//! and rejects anything it cannot translate.

use serde_json::Value;

use crate::repository::document::{CmpOp, DocQuery, Document, Filter, Projection, SortKey};

pub const RESERVED_PARAMS: [&str; 4] = ["page", "sort", "limit", "fields"];
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;

/// Query-string pairs in arrival order.
pub type QueryParams = Vec<(String, String)>;

pub struct QueryFeatures<'a> {
    query: DocQuery,
    params: &'a [(String, String)],
}

/// `price[gte]` splits into `("price", ["gte"])`, `tags[]` into `("tags", [""])`.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    match key.find('[') {
        Some(start) if start > 0 && key.ends_with(']') => {
            let inner = &key[start + 1..key.len() - 1];
            (&key[..start], inner.split("][").collect())
        }
        _ => (key, Vec::new()),
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_PARAMS.contains(&split_key(key).0)
}

fn merge_leaf(map: &mut Document, key: &str, value: &str) {
    let value = Value::String(value.to_string());
    match map.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing @ Value::String(_)) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        _ => {
            map.insert(key.to_string(), value);
        }
    }
}

fn insert_param(map: &mut Document, key: &str, rest: &[&str], value: &str) {
    match rest.split_first() {
        None => merge_leaf(map, key, value),
        Some((&"", _)) => {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(Value::String(value.to_string())),
                other => {
                    let first = other.take();
                    *other = Value::Array(vec![first, Value::String(value.to_string())]);
                }
            }
        }
        Some((next, tail)) => {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(inner) = entry {
                insert_param(inner, next, tail, value);
            }
        }
    }
}

/// Expands bracket keys into a nested tree; a repeated key collects into a list.
fn expand_params<'p>(params: impl Iterator<Item = &'p (String, String)>) -> Document {
    let mut tree = Document::new();
    for (key, value) in params {
        let (base, path) = split_key(key);
        insert_param(&mut tree, base, &path, value);
    }
    tree
}

fn split_list(operand: Value) -> Value {
    let items = match operand {
        Value::Array(items) => items,
        other => vec![other],
    };
    Value::Array(
        items
            .into_iter()
            .flat_map(|item| match item {
                Value::String(raw) => raw
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| Value::String(part.to_string()))
                    .collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect(),
    )
}

fn add_constraint(filter: Filter, field: &str, value: Value) -> Filter {
    match value {
        Value::Object(ops)
            if !ops.is_empty() && ops.keys().all(|token| CmpOp::from_token(token).is_some()) =>
        {
            ops.into_iter().fold(filter, |filter, (token, operand)| {
                match CmpOp::from_token(&token) {
                    Some(op) if op.takes_list() => filter.condition(field, op, split_list(operand)),
                    Some(op) => filter.condition(field, op, operand),
                    None => filter,
                }
            })
        }
        Value::Array(_) => filter.condition(field, CmpOp::In, value),
        other => filter.eq(field, other),
    }
}

impl<'a> QueryFeatures<'a> {
    pub fn new(query: DocQuery, params: &'a [(String, String)]) -> Self {
        Self { query, params }
    }

    /// Last occurrence wins for the reserved keys.
    fn param(&self, key: &str) -> Option<&'a str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn positive_param(&self, key: &str, default: u64) -> u64 {
        self.param(key)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value >= 1.0)
            .map(|value| value.floor() as u64)
            .unwrap_or(default)
    }

    pub fn filter(mut self) -> Self {
        let tree = expand_params(self.params.iter().filter(|(key, _)| !is_reserved(key)));
        let filter = tree
            .into_iter()
            .fold(Filter::new(), |filter, (field, value)| {
                add_constraint(filter, &field, value)
            });

        tracing::debug!(conditions = filter.conditions().len(), "query filter built");
        self.query = self.query.and_filter(filter);
        self
    }

    pub fn sort(mut self) -> Self {
        if let Some(raw) = self.param("sort") {
            let keys = raw
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(SortKey::parse)
                .collect::<Vec<_>>();
            if !keys.is_empty() {
                self.query = self.query.sort_by(keys);
            }
        }
        self
    }

    pub fn select_fields(mut self) -> Self {
        if let Some(raw) = self.param("fields") {
            let projection = Projection::parse(raw);
            if !projection.is_empty() {
                self.query = self.query.select(projection);
            }
        }
        self
    }

    pub fn paginate(mut self) -> Self {
        let page = self.positive_param("page", DEFAULT_PAGE);
        let limit = self.positive_param("limit", DEFAULT_LIMIT);

        self.query = self
            .query
            .with_skip((page - 1).saturating_mul(limit))
            .with_limit(limit);
        self
    }

    pub fn into_query(self) -> DocQuery {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::document::{Condition, Direction};
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn conditions(query: &DocQuery) -> Vec<Condition> {
        let mut conditions = query.filter.conditions().to_vec();
        conditions.sort_by(|a, b| a.field.cmp(&b.field));
        conditions
    }

    #[test]
    fn test_operator_keys_become_comparisons() {
        let params = params(&[("price[gte]", "500"), ("price[lt]", "1500"), ("difficulty", "easy")]);

        let query = QueryFeatures::new(DocQuery::new(), &params).filter().into_query();
        let conditions = conditions(&query);

        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[0].field, "difficulty");
        assert_eq!(conditions[0].op, CmpOp::Eq);
        assert_eq!(conditions[0].value, json!("easy"));
        let price_ops = conditions[1..].iter().map(|c| (c.op, c.value.clone())).collect::<Vec<_>>();
        assert!(price_ops.contains(&(CmpOp::Gte, json!("500"))));
        assert!(price_ops.contains(&(CmpOp::Lt, json!("1500"))));
    }

    #[test]
    fn test_reserved_params_are_not_filters() {
        let params = params(&[
            ("page", "2"),
            ("sort", "price"),
            ("limit", "5"),
            ("fields", "name"),
            ("page[gte]", "1"),
        ]);

        let query = QueryFeatures::new(DocQuery::new(), &params).filter().into_query();

        assert!(query.filter.is_empty());
    }

    #[test]
    fn test_in_splits_on_commas_and_repeated_key_is_membership() {
        let params = params(&[
            ("difficulty[in]", "easy, medium"),
            ("name", "A"),
            ("name", "B"),
        ]);

        let query = QueryFeatures::new(DocQuery::new(), &params).filter().into_query();
        let conditions = conditions(&query);

        assert_eq!(conditions[0].op, CmpOp::In);
        assert_eq!(conditions[0].value, json!(["easy", "medium"]));
        assert_eq!(conditions[1].op, CmpOp::In);
        assert_eq!(conditions[1].value, json!(["A", "B"]));
    }

    #[test]
    fn test_non_operator_object_passes_through_as_equality() {
        let params = params(&[("startLocation[city]", "Oslo")]);

        let query = QueryFeatures::new(DocQuery::new(), &params).filter().into_query();
        let conditions = conditions(&query);

        assert_eq!(conditions[0].op, CmpOp::Eq);
        assert_eq!(conditions[0].value, json!({"city": "Oslo"}));
    }

    #[test]
    fn test_filter_is_anded_with_base_query() {
        let params = params(&[("rating", "5")]);
        let base = DocQuery::new().and_filter(Filter::new().eq("tour", "abc"));

        let query = QueryFeatures::new(base, &params).filter().into_query();

        assert_eq!(query.filter.conditions().len(), 2);
    }

    #[test]
    fn test_sort_keys() {
        let params = params(&[("sort", "price,-ratingsAverage")]);

        let query = QueryFeatures::new(DocQuery::new(), &params).sort().into_query();

        assert_eq!(query.sort.len(), 2);
        assert_eq!(query.sort[0].field, "price");
        assert_eq!(query.sort[0].direction, Direction::Asc);
        assert_eq!(query.sort[1].field, "ratingsAverage");
        assert_eq!(query.sort[1].direction, Direction::Desc);
    }

    #[test]
    fn test_select_fields() {
        let params = params(&[("fields", "name,price")]);

        let query = QueryFeatures::new(DocQuery::new(), &params)
            .select_fields()
            .into_query();

        assert_eq!(query.projection, Some(Projection::parse("name,price")));
    }

    #[test]
    fn test_paginate_offsets() {
        let params = params(&[("page", "2"), ("limit", "10")]);

        let query = QueryFeatures::new(DocQuery::new(), &params).paginate().into_query();

        assert_eq!(query.skip, 10);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_paginate_falls_back_and_floors() {
        let cases = [
            (vec![], 0, 100),
            (vec![("page", "0"), ("limit", "-5")], 0, 100),
            (vec![("page", "abc"), ("limit", "x")], 0, 100),
            (vec![("page", "3.9"), ("limit", "2.5")], 4, 2),
        ];

        for (pairs, skip, limit) in cases {
            let params = params(&pairs);
            let query = QueryFeatures::new(DocQuery::new(), &params).paginate().into_query();
            assert_eq!((query.skip, query.limit), (skip, Some(limit)), "{pairs:?}");
        }
    }
}

//! Document model shared by every store.
//!
//! A [`DocQuery`] is what QueryFeatures builds and what a store executes. Values in
//! a filter stay raw until [`DocQuery::prepare`] casts them against the
//! [`Collection`] schema; a cast failure is the store-level `InvalidQuery` error.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::repository::errors::RepositoryError;

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    Text,
    Number,
    Bool,
    Date,
    Object,
    List(&'static FieldKind),
}

impl FieldKind {
    fn label(self) -> &'static str {
        match self {
            FieldKind::Id => "Id",
            FieldKind::Text => "String",
            FieldKind::Number => "Number",
            FieldKind::Bool => "Boolean",
            FieldKind::Date => "Date",
            FieldKind::Object => "Object",
            FieldKind::List(inner) => inner.label(),
        }
    }
}

/// Static description of one document collection.
pub struct Collection {
    pub name: &'static str,
    pub fields: &'static [(&'static str, FieldKind)],
    /// Each entry is a set of fields whose combined value must be unique.
    pub unique: &'static [&'static [&'static str]],
    /// Fields left out of every read unless a projection names them.
    pub hidden: &'static [&'static str],
    pub visibility: fn() -> Filter,
}

impl Collection {
    pub fn field_kind(&self, path: &str) -> Option<FieldKind> {
        if path == ID_FIELD {
            return Some(FieldKind::Id);
        }
        self.fields
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, kind)| *kind)
    }

    /// Standing predicate every default read of this collection ANDs in.
    pub fn visible_only(&self) -> Filter {
        (self.visibility)()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub fn everything() -> Filter {
    Filter::new()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    In,
    Lt,
    Lte,
    Ne,
    Nin,
}

impl CmpOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "eq" => Some(Self::Eq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "in" => Some(Self::In),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "ne" => Some(Self::Ne),
            "nin" => Some(Self::Nin),
            _ => None,
        }
    }

    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CmpOp,
    pub value: Value,
}

impl Condition {
    fn matches(&self, doc: &Document) -> bool {
        let actual = lookup(doc, &self.field);
        match self.op {
            CmpOp::Eq => equals(actual, &self.value),
            CmpOp::Ne => !equals(actual, &self.value),
            CmpOp::In => list_contains(&self.value, actual),
            CmpOp::Nin => !list_contains(&self.value, actual),
            CmpOp::Gt => ordered(actual, &self.value, |o| o == Ordering::Greater),
            CmpOp::Gte => ordered(actual, &self.value, |o| o != Ordering::Less),
            CmpOp::Lt => ordered(actual, &self.value, |o| o == Ordering::Less),
            CmpOp::Lte => ordered(actual, &self.value, |o| o != Ordering::Greater),
        }
    }
}

/// Conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(field, CmpOp::Eq, value)
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition(field, CmpOp::Ne, value)
    }

    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Casts every operand to the schema type of its field. Unknown fields pass
    /// through untouched.
    pub fn cast(&self, collection: &Collection) -> Result<Filter, RepositoryError> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| {
                validate_path(&c.field)?;
                let value = match collection.field_kind(&c.field) {
                    Some(kind) => cast_operand(kind, c.op, &c.value).ok_or_else(|| {
                        RepositoryError::InvalidQuery(format!(
                            "Cast to {} failed for value {} at path \"{}\"",
                            kind.label(),
                            c.value,
                            c.field
                        ))
                    })?,
                    None => c.value.clone(),
                };
                Ok(Condition {
                    field: c.field.clone(),
                    op: c.op,
                    value,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Filter { conditions })
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

fn cast_operand(kind: FieldKind, op: CmpOp, value: &Value) -> Option<Value> {
    if op.takes_list() {
        let items = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        return items
            .iter()
            .map(|item| cast_value(kind, item))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array);
    }
    cast_value(kind, value)
}

fn cast_value(kind: FieldKind, value: &Value) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match kind {
        FieldKind::List(inner) => cast_value(*inner, value),
        FieldKind::Object => Some(value.clone()),
        FieldKind::Id => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(|id| Value::String(id.to_string())),
        FieldKind::Text => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        FieldKind::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        FieldKind::Bool => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => match s.trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        FieldKind::Date => value.as_str().and_then(parse_date).map(|date| {
            Value::String(date.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None | Some(Value::Null) => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| same_value(item, expected))
        }
        Some(value) => same_value(value, expected),
    }
}

fn list_contains(list: &Value, actual: Option<&Value>) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|item| equals(actual, item)),
        other => equals(actual, other),
    }
}

fn ordered(actual: Option<&Value>, expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|a| compare_scalars(a, expected))
        .is_some_and(accept)
}

pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// `-price` sorts descending, anything else ascending.
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(token),
        }
    }
}

/// Total order used by stores that sort in process: missing/null first, then
/// numbers, strings, objects, arrays and booleans.
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_scalars(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Raw field list as requested; `-field` entries exclude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionMode {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn new<I, T>(fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(',').map(str::trim).filter(|f| !f.is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn resolve(&self) -> Result<ProjectionMode, RepositoryError> {
        let excluded = self.fields.iter().filter(|f| f.starts_with('-')).count();
        if excluded > 0 && excluded < self.fields.len() {
            return Err(RepositoryError::InvalidQuery(
                "Projection cannot have a mix of inclusion and exclusion".to_string(),
            ));
        }

        let paths = self
            .fields
            .iter()
            .map(|f| f.trim_start_matches('-').to_string())
            .collect::<Vec<_>>();
        for path in &paths {
            validate_path(path)?;
        }

        Ok(if excluded > 0 {
            ProjectionMode::Exclude(paths)
        } else {
            ProjectionMode::Include(paths)
        })
    }
}

impl ProjectionMode {
    /// Inclusion always keeps the identity field.
    pub fn apply(&self, doc: Document) -> Document {
        match self {
            ProjectionMode::Include(paths) => {
                let mut projected = Document::new();
                if let Some(id) = doc.get(ID_FIELD) {
                    projected.insert(ID_FIELD.to_string(), id.clone());
                }
                for path in paths {
                    if let Some(value) = lookup(&doc, path) {
                        insert_path(&mut projected, path, value.clone());
                    }
                }
                projected
            }
            ProjectionMode::Exclude(paths) => {
                let mut doc = doc;
                for path in paths {
                    remove_path(&mut doc, path);
                }
                doc
            }
        }
    }

    pub fn includes(&self, field: &str) -> bool {
        match self {
            ProjectionMode::Include(paths) => paths.iter().any(|p| p == field),
            ProjectionMode::Exclude(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocQuery {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl DocQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    pub fn sort_by(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Translates the query into the form a store executes.
    pub fn prepare(&self, collection: &Collection) -> Result<PreparedQuery, RepositoryError> {
        let filter = self.filter.cast(collection)?;
        for key in &self.sort {
            validate_path(&key.field)?;
        }
        let projection = self
            .projection
            .as_ref()
            .map(Projection::resolve)
            .transpose()?;

        Ok(PreparedQuery {
            filter,
            sort: self.sort.clone(),
            projection,
            skip: self.skip,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Option<ProjectionMode>,
    pub skip: u64,
    pub limit: Option<u64>,
}

pub fn validate_path(path: &str) -> Result<(), RepositoryError> {
    let valid = !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::InvalidQuery(format!(
            "Invalid field path \"{path}\""
        )))
    }
}

pub fn path_segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

pub fn document_id(doc: &Document) -> Option<Uuid> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Drops the collection's hidden fields unless the projection asked for them.
pub fn strip_hidden(doc: &mut Document, collection: &Collection, mode: Option<&ProjectionMode>) {
    for field in collection.hidden {
        if !mode.is_some_and(|m| m.includes(field)) {
            doc.remove(*field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static PRODUCTS: Collection = Collection {
        name: "products",
        fields: &[
            ("name", FieldKind::Text),
            ("price", FieldKind::Number),
            ("featured", FieldKind::Bool),
            ("launchedAt", FieldKind::Date),
            ("tags", FieldKind::List(&FieldKind::Text)),
        ],
        unique: &[],
        hidden: &["secret"],
        visibility: everything,
    };

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_gte_matches_boundary_and_excludes_below() {
        let filter = Filter::new()
            .condition("price", CmpOp::Gte, "500")
            .cast(&PRODUCTS)
            .unwrap();

        assert!(filter.matches(&doc(json!({"price": 500}))));
        assert!(filter.matches(&doc(json!({"price": 1200.5}))));
        assert!(!filter.matches(&doc(json!({"price": 499}))));
        assert!(!filter.matches(&doc(json!({"name": "no price"}))));
    }

    #[test]
    fn test_cast_failure_is_invalid_query() {
        let result = Filter::new()
            .condition("price", CmpOp::Lt, "cheap")
            .cast(&PRODUCTS);

        match result {
            Err(RepositoryError::InvalidQuery(msg)) => {
                assert!(msg.contains("Cast to Number failed"));
                assert!(msg.contains("price"));
            }
            other => panic!("expected InvalidQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_object_operand_on_typed_field_fails_cast() {
        let result = Filter::new()
            .eq("price", json!({"between": "1"}))
            .cast(&PRODUCTS);
        assert!(matches!(result, Err(RepositoryError::InvalidQuery(_))));
    }

    #[test]
    fn test_unknown_field_passes_through_as_equality() {
        let filter = Filter::new().eq("color", "red").cast(&PRODUCTS).unwrap();

        assert!(filter.matches(&doc(json!({"color": "red"}))));
        assert!(!filter.matches(&doc(json!({"color": "blue"}))));
    }

    #[test]
    fn test_ne_matches_missing_field() {
        let filter = Filter::new().ne("featured", true).cast(&PRODUCTS).unwrap();

        assert!(filter.matches(&doc(json!({"name": "plain"}))));
        assert!(filter.matches(&doc(json!({"featured": false}))));
        assert!(!filter.matches(&doc(json!({"featured": true}))));
    }

    #[test]
    fn test_in_and_nin() {
        let inside = Filter::new()
            .condition("name", CmpOp::In, json!(["a", "b"]))
            .cast(&PRODUCTS)
            .unwrap();
        let outside = Filter::new()
            .condition("name", CmpOp::Nin, json!(["a", "b"]))
            .cast(&PRODUCTS)
            .unwrap();

        assert!(inside.matches(&doc(json!({"name": "b"}))));
        assert!(!inside.matches(&doc(json!({"name": "c"}))));
        assert!(outside.matches(&doc(json!({"name": "c"}))));
        assert!(!outside.matches(&doc(json!({"name": "a"}))));
    }

    #[test]
    fn test_eq_on_list_field_matches_element() {
        let filter = Filter::new().eq("tags", "sea").cast(&PRODUCTS).unwrap();

        assert!(filter.matches(&doc(json!({"tags": ["forest", "sea"]}))));
        assert!(!filter.matches(&doc(json!({"tags": ["forest"]}))));
    }

    #[test]
    fn test_date_cast_accepts_plain_dates() {
        let filter = Filter::new()
            .condition("launchedAt", CmpOp::Gte, "2021-06-01")
            .cast(&PRODUCTS)
            .unwrap();

        assert!(filter.matches(&doc(json!({"launchedAt": "2021-07-19T09:00:00Z"}))));
        assert!(!filter.matches(&doc(json!({"launchedAt": "2021-03-21T09:00:00Z"}))));
    }

    #[test]
    fn test_projection_mix_is_rejected() {
        let result = Projection::parse("name,-price").resolve();
        assert!(matches!(result, Err(RepositoryError::InvalidQuery(_))));
    }

    #[test]
    fn test_include_projection_keeps_id() {
        let mode = Projection::parse("name, price").resolve().unwrap();
        let projected = mode.apply(doc(json!({
            "id": "7b0e8c4e-4f6f-4a8e-9a53-1d1d3e7f6d11",
            "name": "Lamp",
            "price": 20,
            "featured": true
        })));

        let mut keys = projected.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(keys, vec!["id", "name", "price"]);
    }

    #[test]
    fn test_exclude_projection_removes_nested_path() {
        let mode = Projection::parse("-location.address").resolve().unwrap();
        let projected = mode.apply(doc(json!({
            "location": {"address": "Main st", "city": "Oslo"}
        })));

        assert_eq!(projected["location"], json!({"city": "Oslo"}));
    }

    #[test]
    fn test_sort_path_is_validated() {
        let query = DocQuery::new().sort_by(vec![SortKey::parse("-")]);
        assert!(matches!(
            query.prepare(&PRODUCTS),
            Err(RepositoryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_compare_for_sort_puts_missing_first() {
        let number = json!(3);
        assert_eq!(compare_for_sort(None, Some(&number)), Ordering::Less);
        assert_eq!(
            compare_for_sort(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
    }

    #[test]
    fn test_strip_hidden_respects_explicit_projection() {
        let mut plain = doc(json!({"name": "x", "secret": 1}));
        strip_hidden(&mut plain, &PRODUCTS, None);
        assert!(!plain.contains_key("secret"));

        let mode = Projection::parse("secret").resolve().unwrap();
        let mut asked = doc(json!({"name": "x", "secret": 1}));
        strip_hidden(&mut asked, &PRODUCTS, Some(&mode));
        assert!(asked.contains_key("secret"));
    }
}

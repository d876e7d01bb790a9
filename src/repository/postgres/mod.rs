use sqlx::{
    postgres::{PgDatabaseError, PgPoolOptions},
    types::Json,
    PgPool, Postgres, QueryBuilder,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    repository::{
        document::{
            document_id, path_segments, CmpOp, Collection, Condition, DocQuery, Direction,
            Document, Filter, ProjectionMode, ID_FIELD,
        },
        errors::RepositoryError,
    },
    usecase::contracts::{DocumentStore, FieldStats},
};

/// Stores each collection as a `(seq, id, doc JSONB)` table. `seq` keeps insertion
/// order so unsorted reads match the in-memory store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

fn map_sqlx_error(collection: &Collection, e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let constraint = db.constraint().unwrap_or_default();
            let fields = collection
                .unique
                .iter()
                .find(|fields| unique_index_name(collection, fields) == constraint)
                .map(|fields| fields.join(", "))
                .unwrap_or_else(|| constraint.to_string());
            let value = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(PgDatabaseError::detail)
                .and_then(duplicate_value)
                .unwrap_or_default();
            RepositoryError::Duplicate { fields, value }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Unavailable(e.to_string())
        }
        _ => RepositoryError::DatabaseError(e.to_string()),
    }
}

/// Naming convention of the unique expression indexes in `migrations/`.
fn unique_index_name(collection: &Collection, fields: &[&str]) -> String {
    format!("{}_{}_unique", collection.name, fields.join("_"))
}

/// Pulls `a, b` out of `Key (...)=(a, b) already exists.`
fn duplicate_value(detail: &str) -> Option<String> {
    let (_, rest) = detail.rsplit_once(")=(")?;
    let values = rest.strip_suffix(") already exists.")?;
    Some(
        values
            .split(", ")
            .map(|value| format!("\"{value}\""))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn push_path(builder: &mut QueryBuilder<'_, Postgres>, field: &str) {
    builder.push("doc #> ");
    builder.push_bind(path_segments(field));
}

fn push_equals(builder: &mut QueryBuilder<'_, Postgres>, field: &str, value: &Value) {
    if value.is_null() {
        builder.push("(");
        push_path(builder, field);
        builder.push(" IS NULL OR ");
        push_path(builder, field);
        builder.push(" = 'null'::jsonb)");
        return;
    }

    builder.push("COALESCE(");
    push_path(builder, field);
    builder.push(" = ");
    builder.push_bind(Json(value.clone()));
    builder.push(" OR ");
    push_path(builder, field);
    builder.push(" @> jsonb_build_array(");
    builder.push_bind(Json(value.clone()));
    builder.push("), FALSE)");
}

fn push_membership(builder: &mut QueryBuilder<'_, Postgres>, field: &str, value: &Value) {
    builder.push("COALESCE(");
    builder.push_bind(Json(value.clone()));
    builder.push(" @> jsonb_build_array(");
    push_path(builder, field);
    builder.push("), FALSE)");
}

fn push_ordering(builder: &mut QueryBuilder<'_, Postgres>, field: &str, op: &str, value: &Value) {
    builder.push("(jsonb_typeof(");
    push_path(builder, field);
    builder.push(") = jsonb_typeof(");
    builder.push_bind(Json(value.clone()));
    builder.push(") AND ");
    push_path(builder, field);
    builder.push(op);
    builder.push_bind(Json(value.clone()));
    builder.push(")");
}

/// Id equality goes to the primary key column so its index serves the lookup.
fn primary_key(field: &str, value: &Value) -> Option<Uuid> {
    if field != ID_FIELD {
        return None;
    }
    value.as_str().and_then(|id| Uuid::parse_str(id).ok())
}

fn push_condition(builder: &mut QueryBuilder<'_, Postgres>, condition: &Condition) {
    let Condition { field, op, value } = condition;
    if let (CmpOp::Eq, Some(id)) = (op, primary_key(field, value)) {
        builder.push("id = ");
        builder.push_bind(id);
        return;
    }

    match op {
        CmpOp::Eq => push_equals(builder, field, value),
        CmpOp::Ne => {
            builder.push("NOT ");
            push_equals(builder, field, value);
        }
        CmpOp::In => push_membership(builder, field, value),
        CmpOp::Nin => {
            builder.push("NOT ");
            push_membership(builder, field, value);
        }
        CmpOp::Gt => push_ordering(builder, field, " > ", value),
        CmpOp::Gte => push_ordering(builder, field, " >= ", value),
        CmpOp::Lt => push_ordering(builder, field, " < ", value),
        CmpOp::Lte => push_ordering(builder, field, " <= ", value),
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    builder.push(" WHERE TRUE");
    for condition in filter.conditions() {
        builder.push(" AND (");
        push_condition(builder, condition);
        builder.push(")");
    }
}

fn select_builder<'a>(
    collection: &Collection,
    query: &DocQuery,
) -> Result<(QueryBuilder<'a, Postgres>, Option<ProjectionMode>), RepositoryError> {
    let prepared = query.prepare(collection)?;

    let mut builder = QueryBuilder::new(format!("SELECT doc FROM {}", collection.name));
    push_filter(&mut builder, &prepared.filter);

    builder.push(" ORDER BY ");
    for key in &prepared.sort {
        push_path(&mut builder, &key.field);
        builder.push(match key.direction {
            Direction::Asc => " ASC NULLS FIRST, ",
            Direction::Desc => " DESC NULLS LAST, ",
        });
    }
    builder.push("seq");

    if prepared.skip > 0 {
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(prepared.skip).unwrap_or(i64::MAX));
    }
    if let Some(limit) = prepared.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }

    Ok((builder, prepared.projection))
}

impl DocumentStore for PostgresStore {
    #[tracing::instrument(skip(self, collection, query), fields(collection_name = collection.name))]
    async fn find(
        &self,
        collection: &'static Collection,
        query: &DocQuery,
    ) -> Result<Vec<Document>, RepositoryError> {
        tracing::debug!("finding documents");

        let (mut builder, projection) = select_builder(collection, query)?;
        let rows = builder
            .build_query_as::<(Json<Document>,)>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(collection, e))?;

        let docs = rows
            .into_iter()
            .map(|(Json(doc),)| match &projection {
                Some(mode) => mode.apply(doc),
                None => doc,
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = docs.len(), "documents found");
        Ok(docs)
    }

    #[tracing::instrument(skip(self, collection, doc), fields(collection_name = collection.name))]
    async fn insert(
        &self,
        collection: &'static Collection,
        doc: Document,
    ) -> Result<(), RepositoryError> {
        tracing::debug!("inserting document");

        let id = document_id(&doc).ok_or_else(|| {
            RepositoryError::DatabaseError("document has no valid id".to_string())
        })?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, doc) VALUES ($1, $2)",
            collection.name
        ))
        .bind(id)
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(collection, e))?;

        tracing::debug!(%id, "document inserted");
        Ok(())
    }

    #[tracing::instrument(skip(self, collection, changes), fields(collection_name = collection.name))]
    async fn set_fields(
        &self,
        collection: &'static Collection,
        id: Uuid,
        changes: Document,
    ) -> Result<(), RepositoryError> {
        tracing::debug!("setting document fields");

        let result = sqlx::query(&format!(
            "UPDATE {} SET doc = doc || $2 WHERE id = $1",
            collection.name
        ))
        .bind(id)
        .bind(Json(changes))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(collection, e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tracing::debug!("document fields set");
        Ok(())
    }

    #[tracing::instrument(skip(self, collection), fields(collection_name = collection.name))]
    async fn delete(&self, collection: &'static Collection, id: Uuid) -> Result<(), RepositoryError> {
        tracing::debug!("deleting document");

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", collection.name))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(collection, e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tracing::debug!("document deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self, collection, filter), fields(collection_name = collection.name))]
    async fn stats(
        &self,
        collection: &'static Collection,
        filter: &Filter,
        field: &str,
    ) -> Result<FieldStats, RepositoryError> {
        tracing::debug!("aggregating field stats");

        let filter = filter.cast(collection)?;
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*), AVG(CASE WHEN jsonb_typeof(");
        push_path(&mut builder, field);
        builder.push(") = 'number' THEN (doc #>> ");
        builder.push_bind(path_segments(field));
        builder.push(format!(")::float8 END) FROM {}", collection.name));
        push_filter(&mut builder, &filter);

        let (count, average): (i64, Option<f64>) = builder
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(collection, e))?;

        tracing::debug!(count, ?average, "field stats aggregated");
        Ok(FieldStats {
            count: u64::try_from(count).unwrap_or_default(),
            average,
        })
    }
}

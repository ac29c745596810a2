use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::types::{FileRecord, FileSearch, FileUpdate, NewFile, ShareState};

/// Standard SELECT columns for FileRecord.
/// Does not include the SELECT keyword or FROM clause.
/// Use with `concat!` for compile-time string composition:
/// ```ignore
/// concat!("SELECT ", file_columns!(), " FROM files WHERE id = $1")
/// ```
#[macro_export]
macro_rules! file_columns {
    () => {
        r#"
    id, user_id, file_name, upload_date, file_size, s3_url, file_extension,
    shared_user, shared_at, expiry_date
"#
    };
}

/// Insert a file record, returning its store-assigned id
pub async fn create(pool: &PgPool, p: &NewFile) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO files (user_id, file_name, upload_date, file_size, s3_url, file_extension, expiry_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(p.owner_id)
    .bind(&p.file_name)
    .bind(p.uploaded_at)
    .bind(p.file_size)
    .bind(&p.blob_url)
    .bind(&p.file_extension)
    .bind(p.expires_at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Get a single file by id
pub async fn get(pool: &PgPool, id: i64) -> Result<Option<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(concat!(
        "SELECT ",
        file_columns!(),
        " FROM files WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// List every file owned by a user, oldest first
pub async fn list_by_owner(pool: &PgPool, owner_id: i64) -> Result<Vec<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(concat!(
        "SELECT ",
        file_columns!(),
        " FROM files WHERE user_id = $1 ORDER BY id"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

/// Apply a single-row update, returning the updated row.
///
/// Returns `None` when no row has the id or a guard in `u` did not hold.
pub async fn update(
    pool: &PgPool,
    id: i64,
    u: &FileUpdate,
) -> Result<Option<FileRecord>, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE files SET ");
    {
        let mut set = qb.separated(", ");
        if let Some(ref name) = u.file_name {
            set.push("file_name = ");
            set.push_bind_unseparated(name.clone());
        }
        match u.share {
            Some(ShareState::Shared(at)) => {
                set.push("shared_user = TRUE");
                set.push("shared_at = ");
                set.push_bind_unseparated(at);
            }
            Some(ShareState::Unshared) => {
                set.push("shared_user = FALSE");
                set.push("shared_at = NULL");
            }
            None => {}
        }
        if let Some(expires_at) = u.expires_at {
            set.push("expiry_date = ");
            set.push_bind_unseparated(expires_at);
        }
        if u.is_empty() {
            set.push("id = id");
        }
    }

    qb.push(" WHERE id = ");
    qb.push_bind(id);
    if let Some(owner_id) = u.owner_id {
        qb.push(" AND user_id = ");
        qb.push_bind(owner_id);
    }
    if let Some(stamp) = u.if_shared_at {
        qb.push(" AND shared_at = ");
        qb.push_bind(stamp);
    }
    qb.push(concat!(" RETURNING ", file_columns!()));

    qb.build_query_as::<FileRecord>()
        .fetch_optional(pool)
        .await
}

/// Delete a file record, returning whether a row was removed
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM files WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Files whose expiry deadline is set and not after `now`
pub async fn find_expired(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<FileRecord>, sqlx::Error> {
    sqlx::query_as::<_, FileRecord>(concat!(
        "SELECT ",
        file_columns!(),
        " FROM files WHERE expiry_date IS NOT NULL AND expiry_date <= $1 ORDER BY expiry_date, id"
    ))
    .bind(now)
    .fetch_all(pool)
    .await
}

/// Search one owner's files with optional conjunctive filters
pub async fn search(
    pool: &PgPool,
    owner_id: i64,
    s: &FileSearch,
) -> Result<Vec<FileRecord>, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(concat!(
        "SELECT ",
        file_columns!(),
        " FROM files WHERE user_id = "
    ));
    qb.push_bind(owner_id);

    if let Some(ref name) = s.file_name {
        qb.push(" AND file_name ILIKE ");
        qb.push_bind(format!("%{}%", escape_like(name)));
        qb.push(r" ESCAPE '\'");
    }

    if let Some(date) = s.upload_date {
        qb.push(" AND (upload_date AT TIME ZONE 'UTC')::date = ");
        qb.push_bind(date);
    }

    if let Some(ref ext) = s.file_extension {
        qb.push(" AND file_extension = ");
        qb.push_bind(ext.clone());
    }

    qb.push(" ORDER BY id LIMIT ");
    qb.push_bind(s.limit);
    qb.push(" OFFSET ");
    qb.push_bind(s.offset);

    qb.build_query_as::<FileRecord>().fetch_all(pool).await
}

/// Escape LIKE metacharacters so user input only matches literally
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

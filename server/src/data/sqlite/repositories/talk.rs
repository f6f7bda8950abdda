//! Talk info repository for SQLite operations
//!
//! All read operations support optional caching. Pass `Some(cache)` to enable caching,
//! or `None` to bypass cache. Mutations invalidate the single-talk cache key after the write.

use std::time::Duration;

use sqlx::SqlitePool;

use crate::core::constants::CACHE_TTL_TALK_INFO;
use crate::data::cache::{CacheKey, CacheService};
use crate::data::sqlite::SqliteError;
use crate::data::types::{TalkInfoRow, TalkStatus};

type TalkInfoTuple = (String, String, String, i64, String, i64, i64, Option<i64>);

fn row_from_tuple(t: TalkInfoTuple) -> TalkInfoRow {
    TalkInfoRow {
        talk_id: t.0,
        status: TalkStatus::parse(&t.1).unwrap_or(TalkStatus::None),
        title: t.2,
        creator_id: t.3 as u64,
        creator_user_name: t.4,
        service_id: t.5 as u64,
        started_at: t.6,
        finished_at: t.7,
    }
}

const SELECT_COLUMNS: &str =
    "talk_id, status, title, creator_id, creator_user_name, service_id, started_at, finished_at";

/// Create a talk, assigning it a new CUID2 talk_id. Status starts Opened.
pub async fn create_talk(
    pool: &SqlitePool,
    title: &str,
    creator_id: u64,
    creator_user_name: &str,
) -> Result<TalkInfoRow, SqliteError> {
    let talk_id = cuid2::create_id();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO talk_info (talk_id, status, title, creator_id, creator_user_name, service_id, started_at, finished_at) \
         VALUES (?, 'opened', ?, ?, ?, 0, ?, NULL)",
    )
    .bind(&talk_id)
    .bind(title)
    .bind(creator_id as i64)
    .bind(creator_user_name)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(TalkInfoRow {
        talk_id,
        status: TalkStatus::Opened,
        title: title.to_string(),
        creator_id,
        creator_user_name: creator_user_name.to_string(),
        service_id: 0,
        started_at: now,
        finished_at: None,
    })
}

/// Close a talk: status -> Closed, finished_at = now. No-op if already closed or missing.
pub async fn close_talk(pool: &SqlitePool, talk_id: &str) -> Result<bool, SqliteError> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE talk_info SET status = 'closed', finished_at = ? WHERE talk_id = ? AND status != 'closed'",
    )
    .bind(now)
    .bind(talk_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Set the owning servicer for a talk. 0 means pending (unassigned).
pub async fn update_talk_service_id(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    talk_id: &str,
    service_id: u64,
) -> Result<bool, SqliteError> {
    let result = sqlx::query("UPDATE talk_info SET service_id = ? WHERE talk_id = ?")
        .bind(service_id as i64)
        .bind(talk_id)
        .execute(pool)
        .await?;

    let updated = result.rows_affected() > 0;
    if updated && let Some(cache) = cache {
        if let Err(e) = cache.delete(&CacheKey::talk_info(talk_id)).await {
            tracing::warn!(%talk_id, error = %e, "Cache invalidation error");
        }
        if let Err(e) = cache.delete(&CacheKey::talk_servicer(talk_id)).await {
            tracing::warn!(%talk_id, error = %e, "Cache invalidation error");
        }
    }
    Ok(updated)
}

/// Fetch a talk's info (with optional caching)
pub async fn get_talk_info(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    talk_id: &str,
) -> Result<Option<TalkInfoRow>, SqliteError> {
    if let Some(cache) = cache {
        let key = CacheKey::talk_info(talk_id);
        match cache.get::<TalkInfoRow>(&key).await {
            Ok(Some(info)) => {
                tracing::trace!(%talk_id, "Talk info cache hit");
                return Ok(Some(info));
            }
            Err(e) => tracing::warn!(%talk_id, error = %e, "Cache get error"),
            Ok(None) => {}
        }

        let result = get_talk_info_from_db(pool, talk_id).await?;
        if let Some(ref info) = result
            && let Err(e) = cache
                .set(&key, info, Some(Duration::from_secs(CACHE_TTL_TALK_INFO)))
                .await
        {
            tracing::warn!(%talk_id, error = %e, "Cache set error");
        }
        Ok(result)
    } else {
        get_talk_info_from_db(pool, talk_id).await
    }
}

async fn get_talk_info_from_db(
    pool: &SqlitePool,
    talk_id: &str,
) -> Result<Option<TalkInfoRow>, SqliteError> {
    let row = sqlx::query_as::<_, TalkInfoTuple>(&format!(
        "SELECT {SELECT_COLUMNS} FROM talk_info WHERE talk_id = ?"
    ))
    .bind(talk_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_from_tuple))
}

/// Whether a talk exists at all (any status)
pub async fn talk_exists(pool: &SqlitePool, talk_id: &str) -> Result<bool, SqliteError> {
    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM talk_info WHERE talk_id = ?")
            .bind(talk_id)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// The userID currently owning a talk, or 0 if pending/unknown.
pub async fn get_talk_servicer_id(
    pool: &SqlitePool,
    cache: Option<&CacheService>,
    talk_id: &str,
) -> Result<u64, SqliteError> {
    if let Some(cache) = cache {
        let key = CacheKey::talk_servicer(talk_id);
        match cache.get::<u64>(&key).await {
            Ok(Some(id)) => return Ok(id),
            Err(e) => tracing::warn!(%talk_id, error = %e, "Cache get error"),
            Ok(None) => {}
        }

        let id = get_talk_servicer_id_from_db(pool, talk_id).await?;
        if let Err(e) = cache
            .set(&key, &id, Some(Duration::from_secs(CACHE_TTL_TALK_INFO)))
            .await
        {
            tracing::warn!(%talk_id, error = %e, "Cache set error");
        }
        Ok(id)
    } else {
        get_talk_servicer_id_from_db(pool, talk_id).await
    }
}

async fn get_talk_servicer_id_from_db(pool: &SqlitePool, talk_id: &str) -> Result<u64, SqliteError> {
    let id: Option<i64> = sqlx::query_scalar("SELECT service_id FROM talk_info WHERE talk_id = ?")
        .bind(talk_id)
        .fetch_optional(pool)
        .await?;
    Ok(id.unwrap_or(0) as u64)
}

/// Opened talks with service_id = 0
pub async fn get_pending_talk_infos(pool: &SqlitePool) -> Result<Vec<TalkInfoRow>, SqliteError> {
    let rows = sqlx::query_as::<_, TalkInfoTuple>(&format!(
        "SELECT {SELECT_COLUMNS} FROM talk_info WHERE service_id = 0 AND status = 'opened' ORDER BY started_at"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_from_tuple).collect())
}

/// Opened talks owned by a given servicer
pub async fn get_servicer_talk_infos(
    pool: &SqlitePool,
    servicer_id: u64,
) -> Result<Vec<TalkInfoRow>, SqliteError> {
    let rows = sqlx::query_as::<_, TalkInfoTuple>(&format!(
        "SELECT {SELECT_COLUMNS} FROM talk_info WHERE service_id = ? AND status = 'opened' ORDER BY started_at"
    ))
    .bind(servicer_id as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_from_tuple).collect())
}

/// Optional filters for [`query_talks`]
#[derive(Debug, Clone, Default)]
pub struct TalkQuery {
    pub creator_id: Option<u64>,
    pub service_id: Option<u64>,
    pub talk_id: Option<String>,
    pub statuses: Option<Vec<TalkStatus>>,
}

/// Filtered talk listing
pub async fn query_talks(pool: &SqlitePool, q: &TalkQuery) -> Result<Vec<TalkInfoRow>, SqliteError> {
    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM talk_info WHERE 1=1");
    if q.creator_id.is_some() {
        sql.push_str(" AND creator_id = ?");
    }
    if q.service_id.is_some() {
        sql.push_str(" AND service_id = ?");
    }
    if q.talk_id.is_some() {
        sql.push_str(" AND talk_id = ?");
    }
    if let Some(statuses) = &q.statuses
        && !statuses.is_empty()
    {
        let placeholders = vec!["?"; statuses.len()].join(", ");
        sql.push_str(&format!(" AND status IN ({placeholders})"));
    }
    sql.push_str(" ORDER BY started_at DESC");

    let mut query = sqlx::query_as::<_, TalkInfoTuple>(&sql);
    if let Some(creator_id) = q.creator_id {
        query = query.bind(creator_id as i64);
    }
    if let Some(service_id) = q.service_id {
        query = query.bind(service_id as i64);
    }
    if let Some(talk_id) = &q.talk_id {
        query = query.bind(talk_id);
    }
    if let Some(statuses) = &q.statuses {
        for status in statuses {
            query = query.bind(status.as_str());
        }
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(row_from_tuple).collect())
}

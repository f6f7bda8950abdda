//! Talk message repository for SQLite operations
//!
//! Messages are append-only: there is no update or delete path. Reads are paginated
//! by `message_id`, which is monotonically increasing within a talk.

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::data::types::{TalkMessageKind, TalkMessageRow};

type TalkMessageTuple = (
    i64,
    String,
    i64,
    bool,
    i64,
    String,
    String,
    Option<String>,
    Option<Vec<u8>>,
);

fn row_from_tuple(t: TalkMessageTuple) -> TalkMessageRow {
    TalkMessageRow {
        message_id: t.0,
        talk_id: t.1,
        at: t.2,
        customer_message: t.3,
        sender_id: t.4 as u64,
        sender_user_name: t.5,
        kind: TalkMessageKind::parse(&t.6).unwrap_or(TalkMessageKind::Text),
        text: t.7,
        data: t.8,
    }
}

const SELECT_COLUMNS: &str =
    "message_id, talk_id, at, customer_message, sender_id, sender_user_name, kind, text, data";

/// A message to append to a talk's history.
pub struct NewMessage<'a> {
    pub talk_id: &'a str,
    pub customer_message: bool,
    pub sender_id: u64,
    pub sender_user_name: &'a str,
    pub kind: TalkMessageKind,
    pub text: Option<&'a str>,
    pub data: Option<&'a [u8]>,
}

/// Append a message to a talk's log and return its stored row.
pub async fn add_message(pool: &SqlitePool, msg: NewMessage<'_>) -> Result<TalkMessageRow, SqliteError> {
    let at = chrono::Utc::now().timestamp();

    let message_id = sqlx::query(
        "INSERT INTO talk_message (talk_id, at, customer_message, sender_id, sender_user_name, kind, text, data) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(msg.talk_id)
    .bind(at)
    .bind(msg.customer_message)
    .bind(msg.sender_id as i64)
    .bind(msg.sender_user_name)
    .bind(msg.kind.as_str())
    .bind(msg.text)
    .bind(msg.data)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(TalkMessageRow {
        message_id,
        talk_id: msg.talk_id.to_string(),
        at,
        customer_message: msg.customer_message,
        sender_id: msg.sender_id,
        sender_user_name: msg.sender_user_name.to_string(),
        kind: msg.kind,
        text: msg.text.map(str::to_string),
        data: msg.data.map(<[u8]>::to_vec),
    })
}

/// Full message history for a talk, oldest first.
pub async fn get_all_messages(
    pool: &SqlitePool,
    talk_id: &str,
) -> Result<Vec<TalkMessageRow>, SqliteError> {
    let rows = sqlx::query_as::<_, TalkMessageTuple>(&format!(
        "SELECT {SELECT_COLUMNS} FROM talk_message WHERE talk_id = ? ORDER BY message_id"
    ))
    .bind(talk_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_from_tuple).collect())
}

/// A page of a talk's message history, oldest first within the page.
///
/// `offset` and `count` follow the talk's own message ordering: `offset` is the number
/// of messages to skip from the start, `count` is the page size.
pub async fn get_messages_page(
    pool: &SqlitePool,
    talk_id: &str,
    offset: u32,
    count: u32,
) -> Result<Vec<TalkMessageRow>, SqliteError> {
    let rows = sqlx::query_as::<_, TalkMessageTuple>(&format!(
        "SELECT {SELECT_COLUMNS} FROM talk_message WHERE talk_id = ? ORDER BY message_id LIMIT ? OFFSET ?"
    ))
    .bind(talk_id)
    .bind(count as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_from_tuple).collect())
}

/// Count of messages stored for a talk.
pub async fn count_messages(pool: &SqlitePool, talk_id: &str) -> Result<u32, SqliteError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM talk_message WHERE talk_id = ?")
        .bind(talk_id)
        .fetch_one(pool)
        .await?;
    Ok(count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(crate::data::sqlite::schema::SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn make_talk(pool: &SqlitePool) -> String {
        super::super::talk::create_talk(pool, "t", 1, "a")
            .await
            .unwrap()
            .talk_id
    }

    fn text_message<'a>(talk_id: &'a str, sender_id: u64, text: &'a str) -> NewMessage<'a> {
        NewMessage {
            talk_id,
            customer_message: true,
            sender_id,
            sender_user_name: "alice",
            kind: TalkMessageKind::Text,
            text: Some(text),
            data: None,
        }
    }

    #[tokio::test]
    async fn test_add_and_get_all_messages() {
        let pool = setup_test_pool().await;
        let talk_id = make_talk(&pool).await;

        let m1 = add_message(&pool, text_message(&talk_id, 1, "hello")).await.unwrap();
        let m2 = add_message(&pool, text_message(&talk_id, 1, "world")).await.unwrap();
        assert!(m2.message_id > m1.message_id);

        let all = get_all_messages(&pool, &talk_id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text.as_deref(), Some("hello"));
        assert_eq!(all[1].text.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn test_pagination() {
        let pool = setup_test_pool().await;
        let talk_id = make_talk(&pool).await;

        for i in 0..5 {
            add_message(&pool, text_message(&talk_id, 1, &format!("msg{i}")))
                .await
                .unwrap();
        }

        assert_eq!(count_messages(&pool, &talk_id).await.unwrap(), 5);

        let page = get_messages_page(&pool, &talk_id, 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].text.as_deref(), Some("msg2"));
        assert_eq!(page[1].text.as_deref(), Some("msg3"));
    }

    #[tokio::test]
    async fn test_image_message_with_binary_data() {
        let pool = setup_test_pool().await;
        let talk_id = make_talk(&pool).await;

        let msg = add_message(
            &pool,
            NewMessage {
                talk_id: &talk_id,
                customer_message: false,
                sender_id: 7,
                sender_user_name: "servicer7",
                kind: TalkMessageKind::Image,
                text: None,
                data: Some(&[0xDE, 0xAD, 0xBE, 0xEF]),
            },
        )
        .await
        .unwrap();

        assert_eq!(msg.data.as_deref(), Some(&[0xDE, 0xAD, 0xBE, 0xEF][..]));
        assert!(msg.text.is_none());
    }
}

//! Store Façade (M) — thin, stateless wrapper over the transactional store.
//!
//! Read-through wrapper over talk_info/talk_message. Hot single-talk reads
//! (GetTalkInfo, GetTalkServicerID) are optionally cached; mutations invalidate.

use std::sync::Arc;

use crate::data::cache::CacheService;
use crate::data::sqlite::SqliteService;
use crate::data::sqlite::repositories::message::{self, NewMessage};
use crate::data::sqlite::repositories::talk::{self, TalkQuery};
use crate::data::types::{TalkMessageKind, TalkStatus};

use super::error::StoreError;
use super::types::{TalkInfo, TalkMessage};

/// A new message to append, in the engine's vocabulary.
pub struct NewTalkMessage<'a> {
    pub customer_message: bool,
    pub sender_id: u64,
    pub sender_user_name: &'a str,
    pub kind: TalkMessageKind,
    pub text: Option<&'a str>,
    pub data: Option<&'a [u8]>,
}

/// Store Façade
pub struct StoreFacade {
    sqlite: Arc<SqliteService>,
    cache: Option<Arc<CacheService>>,
}

impl StoreFacade {
    pub fn new(sqlite: Arc<SqliteService>, cache: Option<Arc<CacheService>>) -> Self {
        Self { sqlite, cache }
    }

    fn cache_ref(&self) -> Option<&CacheService> {
        self.cache.as_deref()
    }

    pub async fn create_talk(
        &self,
        title: &str,
        creator_id: u64,
        creator_user_name: &str,
    ) -> Result<TalkInfo, StoreError> {
        let row = talk::create_talk(self.sqlite.pool(), title, creator_id, creator_user_name).await?;
        Ok(row.into())
    }

    pub async fn close_talk(&self, talk_id: &str) -> Result<(), StoreError> {
        let closed = talk::close_talk(self.sqlite.pool(), talk_id).await?;
        if !closed {
            return Err(StoreError::NotFound);
        }
        if let Some(cache) = self.cache_ref() {
            cache
                .invalidate_key(&crate::data::cache::CacheKey::talk_info(talk_id))
                .await;
        }
        Ok(())
    }

    pub async fn update_talk_service_id(
        &self,
        talk_id: &str,
        service_id: u64,
    ) -> Result<(), StoreError> {
        let updated =
            talk::update_talk_service_id(self.sqlite.pool(), self.cache_ref(), talk_id, service_id)
                .await?;
        if !updated {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn add_talk_message(
        &self,
        talk_id: &str,
        msg: NewTalkMessage<'_>,
    ) -> Result<TalkMessage, StoreError> {
        let row = message::add_message(
            self.sqlite.pool(),
            NewMessage {
                talk_id,
                customer_message: msg.customer_message,
                sender_id: msg.sender_id,
                sender_user_name: msg.sender_user_name,
                kind: msg.kind,
                text: msg.text,
                data: msg.data,
            },
        )
        .await?;
        Ok(row.into())
    }

    /// `count == 0` means "all messages" (§4.5).
    pub async fn get_talk_messages(
        &self,
        talk_id: &str,
        offset: u32,
        count: u32,
    ) -> Result<Vec<TalkMessage>, StoreError> {
        let rows = if count == 0 {
            message::get_all_messages(self.sqlite.pool(), talk_id).await?
        } else {
            message::get_messages_page(self.sqlite.pool(), talk_id, offset, count).await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn query_talks(
        &self,
        creator_id: Option<u64>,
        service_id: Option<u64>,
        talk_id: Option<String>,
        statuses: Option<Vec<TalkStatus>>,
    ) -> Result<Vec<TalkInfo>, StoreError> {
        let rows = talk::query_talks(
            self.sqlite.pool(),
            &TalkQuery {
                creator_id,
                service_id,
                talk_id,
                statuses,
            },
        )
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_pending_talk_infos(&self) -> Result<Vec<TalkInfo>, StoreError> {
        let rows = talk::get_pending_talk_infos(self.sqlite.pool()).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_servicer_talk_infos(&self, servicer_id: u64) -> Result<Vec<TalkInfo>, StoreError> {
        let rows = talk::get_servicer_talk_infos(self.sqlite.pool(), servicer_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_talk_info(&self, talk_id: &str) -> Result<Option<TalkInfo>, StoreError> {
        let row = talk::get_talk_info(self.sqlite.pool(), self.cache_ref(), talk_id).await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_talk_servicer_id(&self, talk_id: &str) -> Result<u64, StoreError> {
        Ok(talk::get_talk_servicer_id(self.sqlite.pool(), self.cache_ref(), talk_id).await?)
    }

    pub async fn talk_exists(&self, talk_id: &str) -> Result<bool, StoreError> {
        Ok(talk::talk_exists(self.sqlite.pool(), talk_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> StoreFacade {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(crate::data::sqlite::schema::SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        let sqlite = Arc::new(SqliteService::from_pool(pool));
        StoreFacade::new(sqlite, None)
    }

    #[tokio::test]
    async fn test_create_close_and_pending() {
        let store = setup().await;
        let talk = store.create_talk("help", 1, "alice").await.unwrap();
        assert_eq!(store.get_pending_talk_infos().await.unwrap().len(), 1);

        store.update_talk_service_id(&talk.talk_id, 1001).await.unwrap();
        assert_eq!(store.get_talk_servicer_id(&talk.talk_id).await.unwrap(), 1001);
        assert!(store.get_pending_talk_infos().await.unwrap().is_empty());

        store.close_talk(&talk.talk_id).await.unwrap();
        let info = store.get_talk_info(&talk.talk_id).await.unwrap().unwrap();
        assert_eq!(info.status, TalkStatus::Closed);
    }

    #[tokio::test]
    async fn test_messages_roundtrip() {
        let store = setup().await;
        let talk = store.create_talk("help", 1, "alice").await.unwrap();

        store
            .add_talk_message(
                &talk.talk_id,
                NewTalkMessage {
                    customer_message: true,
                    sender_id: 1,
                    sender_user_name: "alice",
                    kind: TalkMessageKind::Text,
                    text: Some("hi"),
                    data: None,
                },
            )
            .await
            .unwrap();

        let history = store.get_talk_messages(&talk.talk_id, 0, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_close_nonexistent_talk_is_not_found() {
        let store = setup().await;
        let err = store.close_talk("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}

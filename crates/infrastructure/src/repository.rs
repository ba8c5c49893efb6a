use std::sync::Arc;

use application::repository::{MessageRepository, ParticipantRepository};
use async_trait::async_trait;
use domain::{
    Message, MessageId, MessageKind, Participant, ParticipantName, RepositoryError, Timestamp,
    BROADCAST_TARGET,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepositoryError::Conflict;
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    name: String,
    last_seen: Timestamp,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(value: ParticipantRecord) -> Result<Self, Self::Error> {
        let name =
            ParticipantName::parse(value.name).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Participant {
            name,
            last_seen: value.last_seen,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    recipient: String,
    body: String,
    kind: String,
    author: String,
    created_at: Timestamp,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let kind = value
            .kind
            .parse::<MessageKind>()
            .map_err(|err| invalid_data(err.to_string()))?;
        let from =
            ParticipantName::parse(value.author).map_err(|err| invalid_data(err.to_string()))?;

        // 直接还原存储内容，不再重复校验正文
        Ok(Message {
            id: MessageId::from(value.id),
            to: value.recipient,
            text: value.body,
            kind,
            from,
            created_at: value.created_at,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, recipient, body, kind, author, created_at";

pub struct PgParticipantRepository {
    pool: PgPool,
}

impl PgParticipantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantRepository for PgParticipantRepository {
    async fn insert(&self, participant: Participant) -> Result<Participant, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            INSERT INTO participants (name, last_seen)
            VALUES ($1, $2)
            RETURNING name, last_seen
            "#,
        )
        .bind(participant.name.as_str())
        .bind(participant.last_seen)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Participant::try_from(record)
    }

    async fn find_by_name(
        &self,
        name: &ParticipantName,
    ) -> Result<Option<Participant>, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"SELECT name, last_seen FROM participants WHERE name = $1"#,
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Participant::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Participant>, RepositoryError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"SELECT name, last_seen FROM participants ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Participant::try_from).collect()
    }

    async fn update_last_seen(
        &self,
        name: &ParticipantName,
        at: Timestamp,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(r#"UPDATE participants SET last_seen = $2 WHERE name = $1"#)
            .bind(name.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_stale(&self, cutoff: Timestamp) -> Result<Vec<Participant>, RepositoryError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"SELECT name, last_seen FROM participants WHERE last_seen < $1 ORDER BY name"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Participant::try_from).collect()
    }

    async fn delete_stale(
        &self,
        names: Vec<ParticipantName>,
        cutoff: Timestamp,
    ) -> Result<Vec<ParticipantName>, RepositoryError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = names.into_iter().map(|name| name.as_str().to_owned()).collect();

        // 再次比较 cutoff，扫描之后刚刚发送过心跳的参与者不会被删除
        let removed: Vec<String> = sqlx::query_scalar(
            r#"
            DELETE FROM participants
            WHERE name = ANY($1) AND last_seen < $2
            RETURNING name
            "#,
        )
        .bind(&names)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut removed = removed
            .into_iter()
            .map(|name| ParticipantName::parse(name).map_err(|err| invalid_data(err.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        removed.sort();
        Ok(removed)
    }
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, recipient, body, kind, author, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(&message.to)
        .bind(&message.text)
        .bind(message.kind.as_str())
        .bind(message.from.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn insert_many(&self, messages: Vec<Message>) -> Result<Vec<Message>, RepositoryError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        for message in &messages {
            sqlx::query(
                r#"
                INSERT INTO messages (id, recipient, body, kind, author, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::from(message.id))
            .bind(&message.to)
            .bind(&message.text)
            .bind(message.kind.as_str())
            .bind(message.from.as_str())
            .bind(message.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }
        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(messages)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"#
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn list_visible(&self, viewer: Option<String>) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE recipient = $1 OR ($2::TEXT IS NOT NULL AND (recipient = $2 OR author = $2))
            ORDER BY seq
            "#
        ))
        .bind(BROADCAST_TARGET)
        .bind(viewer)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn update(&self, message: Message) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET recipient = $2, body = $3, kind = $4, author = $5, created_at = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(&message.to)
        .bind(&message.text)
        .bind(message.kind.as_str())
        .bind(message.from.as_str())
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(r#"DELETE FROM messages WHERE id = $1"#)
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub participant_repository: Arc<PgParticipantRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            participant_repository: Arc::new(PgParticipantRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

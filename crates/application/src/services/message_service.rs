use std::sync::Arc;

use domain::{Message, MessageId, MessageKind, ParticipantName};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::MessageRepository,
    services::ParticipantService,
    validation::{actor_name, EditMessageRequest, SendMessageRequest},
};

pub struct MessageServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub participants: Arc<ParticipantService>,
    pub clock: Arc<dyn Clock>,
}

/// 消息存储：创建、按可见性读取、以及仅限作者的编辑和删除。
///
/// 进入/离开房间的系统消息由 [`StatusAnnouncer`](crate::StatusAnnouncer) 写入。
pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create(
        &self,
        actor: Option<&str>,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let request = request.sanitized();
        request.validate()?;
        let kind = MessageKind::parse_user_kind(request.kind.as_deref().unwrap_or_default())?;

        let from = actor_name(actor).ok_or_else(missing_actor)?;
        if !self.deps.participants.is_present(&from).await? {
            return Err(ApplicationError::Unauthenticated(
                "user is not registered".into(),
            ));
        }

        let message = Message::compose(
            MessageId::generate(),
            request.to.unwrap_or_default(),
            request.text.unwrap_or_default(),
            kind,
            from,
            self.deps.clock.now(),
        )?;
        let stored = self.deps.message_repository.insert(message).await?;

        tracing::info!(
            message_id = %stored.id,
            from = %stored.from,
            to = %stored.to,
            "消息已发送"
        );
        Ok(stored)
    }

    /// 查看者不需要是在线参与者；未提供查看者时只能看到广播消息。
    ///
    /// `limit` 截取的是按插入顺序排列的前 N 条，而不是最新的 N 条。
    pub async fn list(
        &self,
        viewer: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let limit = parse_limit(limit)?;
        let viewer = actor_name(viewer).map(|name| name.as_str().to_owned());

        let mut messages = self.deps.message_repository.list_visible(viewer).await?;
        if let Some(limit) = limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    /// 作者校验先于载荷校验：非作者无论载荷是否合法都得到 `Forbidden`。
    pub async fn edit(
        &self,
        id: &str,
        actor: Option<&str>,
        request: EditMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let requester = actor_name(actor).ok_or_else(missing_actor)?;
        let mut message = self.find_authored(id, &requester).await?;

        let request = request.sanitized();
        request.validate()?;
        let kind = MessageKind::parse_user_kind(request.kind.as_deref().unwrap_or_default())?;

        message.revise(
            request.to.unwrap_or_default(),
            request.text.unwrap_or_default(),
            kind,
            &requester,
            self.deps.clock.now(),
        )?;
        if !self.deps.message_repository.update(message.clone()).await? {
            return Err(message_not_found());
        }

        tracing::info!(message_id = %message.id, from = %requester, "消息已编辑");
        Ok(message)
    }

    pub async fn delete(&self, id: &str, actor: Option<&str>) -> Result<(), ApplicationError> {
        let requester = actor_name(actor).ok_or_else(missing_actor)?;
        let message = self.find_authored(id, &requester).await?;

        if !self.deps.message_repository.delete(message.id).await? {
            return Err(message_not_found());
        }

        tracing::info!(message_id = %message.id, from = %requester, "消息已删除");
        Ok(())
    }

    async fn find_authored(
        &self,
        id: &str,
        requester: &ParticipantName,
    ) -> Result<Message, ApplicationError> {
        let id = parse_message_id(id)?;
        let message = self
            .deps
            .message_repository
            .find_by_id(id)
            .await?
            .ok_or_else(message_not_found)?;

        if !message.is_authored_by(requester.as_str()) {
            tracing::warn!(message_id = %id, requester = %requester, "非作者尝试修改消息");
            return Err(ApplicationError::Forbidden(
                "message was not sent by this user".into(),
            ));
        }
        Ok(message)
    }
}

fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, ApplicationError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(Some(limit)),
        _ => Err(ApplicationError::invalid_argument(
            "limit must be a positive integer",
        )),
    }
}

fn parse_message_id(raw: &str) -> Result<MessageId, ApplicationError> {
    Uuid::parse_str(raw.trim())
        .map(MessageId::from)
        .map_err(|_| message_not_found())
}

fn missing_actor() -> ApplicationError {
    ApplicationError::Unauthenticated("user is not specified".into())
}

fn message_not_found() -> ApplicationError {
    ApplicationError::NotFound("message does not exist".into())
}

use std::sync::Arc;

use domain::{Participant, ParticipantName, RepositoryError, StatusEvent, Timestamp};
use validator::Validate;

use crate::{
    announcer::StatusAnnouncer,
    clock::Clock,
    error::ApplicationError,
    repository::ParticipantRepository,
    validation::{actor_name, RegisterParticipantRequest},
};

pub struct ParticipantServiceDependencies {
    pub participant_repository: Arc<dyn ParticipantRepository>,
    pub announcer: Arc<StatusAnnouncer>,
    pub clock: Arc<dyn Clock>,
}

/// 参与者登记表：负责身份、名称唯一性和在线时间戳。
pub struct ParticipantService {
    deps: ParticipantServiceDependencies,
}

impl ParticipantService {
    pub fn new(deps: ParticipantServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(
        &self,
        request: RegisterParticipantRequest,
    ) -> Result<Participant, ApplicationError> {
        let request = request.sanitized();
        request.validate()?;
        let name = ParticipantName::parse(request.name.unwrap_or_default())?;

        // 预检查只用于尽早给出友好的错误，唯一性以存储层约束为准
        if self
            .deps
            .participant_repository
            .find_by_name(&name)
            .await?
            .is_some()
        {
            return Err(name_in_use(&name));
        }

        let participant = Participant::register(name.clone(), self.deps.clock.now());
        let stored = match self.deps.participant_repository.insert(participant).await {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                tracing::debug!(participant = %name, "并发注册被存储层唯一约束拦截");
                return Err(name_in_use(&name));
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(participant = %stored.name, "参与者进入房间");
        self.deps
            .announcer
            .announce_in_background(stored.name.clone(), StatusEvent::Joined);

        Ok(stored)
    }

    /// 刷新参与者的 `last_seen`，返回新的时间戳。
    pub async fn heartbeat(&self, name: Option<&str>) -> Result<Timestamp, ApplicationError> {
        let name = actor_name(name).ok_or_else(unknown_participant)?;
        let mut participant = self
            .deps
            .participant_repository
            .find_by_name(&name)
            .await?
            .ok_or_else(unknown_participant)?;

        let seen_at = participant.heartbeat(self.deps.clock.now());
        let updated = self
            .deps
            .participant_repository
            .update_last_seen(&name, seen_at)
            .await?;
        if !updated {
            // 读取之后被清理任务移除
            return Err(unknown_participant());
        }

        tracing::debug!(participant = %name, "收到心跳");
        Ok(seen_at)
    }

    pub async fn list(&self) -> Result<Vec<Participant>, ApplicationError> {
        let participants = self.deps.participant_repository.list().await?;
        Ok(participants)
    }

    pub async fn is_present(&self, name: &ParticipantName) -> Result<bool, ApplicationError> {
        let found = self.deps.participant_repository.find_by_name(name).await?;
        Ok(found.is_some())
    }
}

fn name_in_use(name: &ParticipantName) -> ApplicationError {
    ApplicationError::Conflict(format!("name {name} is already in use"))
}

fn unknown_participant() -> ApplicationError {
    ApplicationError::NotFound("participant is not registered".into())
}

//! 应用层实现。
//!
//! 围绕领域模型提供参与者登记、消息存储和在线状态清理三个用例，
//! 并定义它们依赖的存储接口与时钟抽象。

pub mod announcer;
pub mod clock;
pub mod error;
pub mod repository;
pub mod services;
pub mod sweeper;
pub mod validation;

pub use announcer::StatusAnnouncer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApplicationError, ApplicationResult};
pub use repository::{
    memory::{InMemoryMessageRepository, InMemoryParticipantRepository},
    MessageRepository, ParticipantRepository,
};
pub use services::{
    MessageService, MessageServiceDependencies, ParticipantService, ParticipantServiceDependencies,
};
pub use sweeper::{LivenessSweeper, SweepOutcome, SweeperConfig, SweeperDependencies};
pub use validation::{EditMessageRequest, RegisterParticipantRequest, SendMessageRequest};

//! 基础设施层实现。
//!
//! 提供基于 PostgreSQL 的参与者和消息仓储，实现应用层定义的存储接口。

pub mod migrations;
pub mod repository;

pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageRepository, PgParticipantRepository, PgStorage};

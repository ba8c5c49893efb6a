//! 在线状态清理任务
//!
//! 每个固定间隔扫描一次登记表，移除超时未发送心跳的参与者，并为每个被移除的参与者
//! 广播一条离开消息。每一轮在独立任务中运行，失败只记录日志，不重试；上一轮还没结束时
//! 新的一轮直接跳过，定时器本身不会被阻塞。

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use domain::{ParticipantName, StatusEvent};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::{
    announcer::StatusAnnouncer, clock::Clock, error::ApplicationError,
    repository::ParticipantRepository,
};

/// 清理任务配置
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// 扫描间隔
    pub interval: Duration,
    /// 超过这个时长没有心跳即视为离线
    pub timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct SweeperDependencies {
    pub participant_repository: Arc<dyn ParticipantRepository>,
    pub announcer: Arc<StatusAnnouncer>,
    pub clock: Arc<dyn Clock>,
}

/// 一轮清理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub stale: usize,
    pub evicted: Vec<ParticipantName>,
    pub announced: usize,
}

pub struct LivenessSweeper {
    deps: SweeperDependencies,
    config: SweeperConfig,
    in_flight: AtomicBool,
}

impl LivenessSweeper {
    pub fn new(deps: SweeperDependencies, config: SweeperConfig) -> Self {
        Self {
            deps,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// 执行一轮：扫描 -> 移除 -> 广播离开消息。
    pub async fn run_cycle(&self) -> Result<SweepOutcome, ApplicationError> {
        let timeout = chrono::Duration::from_std(self.config.timeout)
            .map_err(|err| ApplicationError::internal(format!("invalid sweep timeout: {err}")))?;
        let cutoff = self
            .deps
            .clock
            .now()
            .checked_sub_signed(timeout)
            .ok_or_else(|| ApplicationError::internal("sweep timeout exceeds clock range"))?;

        let stale = self.deps.participant_repository.find_stale(cutoff).await?;
        if stale.is_empty() {
            return Ok(SweepOutcome::default());
        }

        let names = stale.iter().map(|participant| participant.name.clone()).collect();
        let evicted = self
            .deps
            .participant_repository
            .delete_stale(names, cutoff)
            .await?;
        if evicted.is_empty() {
            // 已被其他清理或心跳抢先处理
            return Ok(SweepOutcome {
                stale: stale.len(),
                ..SweepOutcome::default()
            });
        }

        tracing::info!(
            evicted = evicted.len(),
            participants = ?evicted,
            "移除超时参与者"
        );

        let announced = self
            .deps
            .announcer
            .announce_all(evicted.clone(), StatusEvent::Left)
            .await?;

        Ok(SweepOutcome {
            stale: stale.len(),
            evicted,
            announced: announced.len(),
        })
    }

    /// 启动定时清理，`shutdown` 变为 `true` 或发送端被丢弃时停止。
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 第一次 tick 立即完成
            interval.tick().await;

            tracing::info!(
                interval_secs = self.config.interval.as_secs(),
                timeout_secs = self.config.timeout.as_secs(),
                "在线状态清理任务已启动"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        Arc::clone(&self).start_cycle();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("在线状态清理任务已停止");
        })
    }

    /// 在独立任务中运行一轮，返回 `None` 表示上一轮尚未结束而跳过。
    pub fn start_cycle(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("上一轮清理尚未结束，跳过本次");
            return None;
        }

        Some(tokio::spawn(async move {
            // 任务以任何方式结束（包括 panic）都要释放占用标记
            let _in_flight = InFlightGuard(&self.in_flight);
            match self.run_cycle().await {
                Ok(outcome) if !outcome.evicted.is_empty() => {
                    tracing::debug!(announced = outcome.announced, "清理完成");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "在线状态清理失败");
                }
            }
        }))
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

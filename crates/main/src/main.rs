//! 主应用程序入口
//!
//! 加载配置、组装存储和服务、启动在线状态清理任务和 Axum Web API 服务。

use std::sync::Arc;

use application::{
    Clock, InMemoryMessageRepository, InMemoryParticipantRepository, LivenessSweeper,
    MessageRepository, MessageService, MessageServiceDependencies, ParticipantRepository,
    ParticipantService, ParticipantServiceDependencies, StatusAnnouncer, SweeperConfig,
    SweeperDependencies, SystemClock,
};
use config::{AppConfig, StorageBackend};
use infrastructure::{create_pg_pool, PgStorage, MIGRATOR};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

struct Storage {
    participants: Arc<dyn ParticipantRepository>,
    messages: Arc<dyn MessageRepository>,
}

async fn build_storage(config: &AppConfig) -> anyhow::Result<Storage> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("使用内存存储，重启后数据会丢失");
            Ok(Storage {
                participants: Arc::new(InMemoryParticipantRepository::new()),
                messages: Arc::new(InMemoryMessageRepository::new()),
            })
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("storage.url is required for postgres"))?;
            tracing::info!(
                url = config.sanitized_storage_url().as_deref().unwrap_or_default(),
                "连接数据库"
            );

            let pool = create_pg_pool(url, config.storage.max_connections).await?;
            MIGRATOR.run(&pool).await?;

            let storage = PgStorage::new(pool);
            Ok(Storage {
                participants: storage.participant_repository,
                messages: storage.message_repository,
            })
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "无法监听 Ctrl+C 信号");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig_term) => {
                sig_term.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "无法监听终止信号");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("接收到 Ctrl+C 信号，开始优雅停机...");
        }
        _ = terminate => {
            tracing::info!("接收到终止信号，开始优雅停机...");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    let storage = build_storage(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let announcer = Arc::new(StatusAnnouncer::new(storage.messages.clone(), clock.clone()));

    let participant_service = Arc::new(ParticipantService::new(ParticipantServiceDependencies {
        participant_repository: storage.participants.clone(),
        announcer: announcer.clone(),
        clock: clock.clone(),
    }));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        message_repository: storage.messages,
        participants: participant_service.clone(),
        clock: clock.clone(),
    }));

    let sweeper = Arc::new(LivenessSweeper::new(
        SweeperDependencies {
            participant_repository: storage.participants,
            announcer,
            clock,
        },
        SweeperConfig {
            interval: config.presence.sweep_interval(),
            timeout: config.presence.timeout(),
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = sweeper.spawn(shutdown_rx);

    let app = router(
        AppState::new(participant_service, message_service),
        config.server.cors_permissive,
    );
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("聊天服务启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    sweeper_handle.await?;
    tracing::info!("服务已停止");

    Ok(())
}

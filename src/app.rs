use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use orchestrator_api::{apply_layers, create_routes, AppState};
use orchestrator_core::AppConfig;
use orchestrator_dispatcher::{
    DispatchClient, HeartbeatHandler, NodeRegistry, OrchestrationController,
};
use orchestrator_infrastructure::{
    DatabaseManager, SqliteJobRepository, SqliteNodeRepository, SqliteTaskRepository,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, info_span};

/// 主应用程序：持有数据库和组装好的组件
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    state: AppState,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let metrics = if config.observability.metrics_enabled {
            Some(install_metrics_recorder()?)
        } else {
            None
        };

        let database = DatabaseManager::new(&config.database).await?;
        database.migrate().await?;
        Ok(Self::assemble(config, database, metrics))
    }

    /// 在已就绪的数据库上组装组件
    fn assemble(
        config: AppConfig,
        database: DatabaseManager,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let pool = database.pool().clone();
        let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
        let node_repo = Arc::new(SqliteNodeRepository::new(pool));

        let registry = Arc::new(NodeRegistry::new(node_repo, info_span!("node_registry")));
        let client = Arc::new(DispatchClient::new(
            config.dispatch.clone(),
            info_span!("dispatch_client"),
        ));
        let controller = Arc::new(OrchestrationController::new(
            task_repo,
            job_repo,
            Arc::clone(&registry),
            client,
            info_span!("controller"),
        ));
        let heartbeat = Arc::new(HeartbeatHandler::new(registry, info_span!("heartbeat")));

        Self {
            config,
            database,
            state: AppState {
                controller,
                heartbeat,
                metrics,
            },
        }
    }

    pub fn router(&self) -> Router {
        apply_layers(create_routes(self.state.clone()), &self.config.api)
    }

    /// 运行API服务器，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {bind_address}"))?;

        info!("API服务器启动在 http://{}", bind_address);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }

    pub async fn close(&self) {
        self.database.close().await;
    }
}

fn install_metrics_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("安装Prometheus指标记录器失败")
}

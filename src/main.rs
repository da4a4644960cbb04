use claim_audit::{api, load_catalog, logging, AppConfig, AuditService};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    // 加载配置
    let config = AppConfig::from_env()?;
    info!("Starting server with config: {:?}", config);

    // 加载价格库
    let catalog = load_catalog(Path::new(&config.catalog.path))?;

    // 创建审计服务
    let service = Arc::new(AuditService::new(&config, catalog));
    service.start();

    let app = api::router(Arc::clone(&service));

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/audit/batch           - 提交批量审计");
    info!("  GET  /api/audit/jobs/:job_id    - 轮询任务状态");
    info!("  POST /api/audit/item            - 单条同步审计");
    info!("  POST /api/admin/queue/{{pause,resume,clear}}");
    info!("  GET  /api/admin/queue/stats, /api/admin/cache/stats");
    info!("  POST /api/admin/cache/flush");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    service.shutdown().await;
    Ok(())
}

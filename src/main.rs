//! Link Vitals 主程序入口
//!
//! SSRF安全的链接健康检测工具

use anyhow::{Context, Result};
use clap::Parser;
use link_vitals::cli::args::{Args, Commands};
use link_vitals::cli::commands::{
    BackoffCommand, CheckCommand, Command, GuardCommand, ValidateCommand, VersionCommand,
};
use link_vitals::config::{self, ConfigLoader, TomlConfigLoader};
use link_vitals::health::CheckTarget;
use link_vitals::logging::{LogConfig, LoggingSystem};
use link_vitals::service::LinkHealthService;
use link_vitals::store::MemoryTargetStore;
use link_vitals::web::WebServer;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: args.log_level.clone().into(),
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Link Vitals v{} 启动", link_vitals::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Serve { port, no_web } => execute_serve_command(args, *port, *no_web).await,
        Commands::Check { .. } => run(&CheckCommand, args).await,
        Commands::Guard { .. } => run(&GuardCommand, args).await,
        Commands::Validate { .. } => run(&ValidateCommand, args).await,
        Commands::Backoff { .. } => run(&BackoffCommand, args).await,
        Commands::Version { .. } => run(&VersionCommand, args).await,
    }
}

async fn run(command: &dyn Command, args: &Args) -> Result<()> {
    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}

/// 执行serve命令
///
/// 加载配置、组装服务、启动调度与Web API，然后等待Ctrl+C
async fn execute_serve_command(args: &Args, port: Option<u16>, no_web: bool) -> Result<()> {
    let config = load_and_validate_config(args, port, no_web).await?;
    let service = initialize_service(&config).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let web_server_handle = start_web_server_if_enabled(&config, &service, shutdown_rx);

    info!("服务已启动，按 Ctrl+C 停止");
    match signal::ctrl_c().await {
        Ok(()) => info!("收到关闭信号，正在停止服务..."),
        Err(err) => error!("等待关闭信号失败: {}", err),
    }

    // 关闭信号没有接收者时发送会失败，可以忽略
    let _ = shutdown_tx.send(());
    handle_shutdown_and_cleanup(web_server_handle, &service).await;
    Ok(())
}

/// 加载并验证配置
///
/// # 错误
///
/// * 配置文件不存在
/// * 配置文件格式错误
/// * 配置验证失败
async fn load_and_validate_config(
    args: &Args,
    port: Option<u16>,
    no_web: bool,
) -> Result<config::Config> {
    let config_path = args.get_config_path();
    let loader = TomlConfigLoader::new(true);

    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "配置文件不存在: {}\n提示：可参考仓库中的 config.example.toml",
            config_path.display()
        ));
    }

    let mut config = loader
        .load_from_file(&config_path)
        .await
        .with_context(|| format!("加载配置文件失败: {}", config_path.display()))?;

    // 应用命令行参数覆盖
    if let Some(port) = port {
        let web = config.web.get_or_insert_with(config::WebConfig::default);
        web.port = port;
        web.enabled = true;
    }
    if no_web {
        if let Some(web) = config.web.as_mut() {
            web.enabled = false;
        }
    }

    info!(
        "配置加载完成，目标数量: {}，所有者数量: {}",
        config.targets.len(),
        config.owners.len()
    );
    Ok(config)
}

/// 组装链接健康服务
///
/// 用配置中的目标和所有者偏好填充内存存储，应用每个所有者的调度偏好，
/// 并按需启动系统范围的周期检测
async fn initialize_service(config: &config::Config) -> Result<Arc<LinkHealthService>> {
    let store = Arc::new(MemoryTargetStore::with_targets(
        config.targets.iter().map(CheckTarget::from),
    ));
    for owner in &config.owners {
        store
            .set_owner_preferences(&owner.owner_id, owner.preferences())
            .await;
    }

    let service = Arc::new(
        LinkHealthService::from_config(&config.global, store).context("创建链接健康服务失败")?,
    );

    for owner in &config.owners {
        match service.apply_owner_preferences(&owner.owner_id).await {
            Ok(Some(status)) => info!(
                "所有者调度已应用: {} (启用: {}，间隔 {} 分钟)",
                owner.owner_id, status.enabled, status.interval_minutes
            ),
            Ok(None) => warn!("所有者没有保存调度偏好: {}", owner.owner_id),
            Err(e) => error!("应用所有者调度偏好失败 {}: {}", owner.owner_id, e),
        }
    }

    match config.system_scheduler {
        Some(scheduler) if scheduler.enabled => {
            let status =
                service.start_system_scheduler(scheduler.interval_minutes, scheduler.batch_size);
            info!(
                "系统调度已启动，间隔 {} 分钟，每轮 {} 个目标",
                status.interval_minutes, status.batch_size
            );
        }
        _ => info!("系统调度未启用"),
    }

    Ok(service)
}

/// 启动Web服务器（如果启用）
///
/// # 返回值
///
/// 如果Web服务器已启动，返回服务器任务句柄；未配置或未启用时返回None。
fn start_web_server_if_enabled(
    config: &config::Config,
    service: &Arc<LinkHealthService>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Option<tokio::task::JoinHandle<()>> {
    let Some(web_config) = config.web.clone() else {
        info!("Web API 未配置");
        return None;
    };
    if !web_config.enabled {
        info!("Web API 已禁用");
        return None;
    }

    info!(
        "启动 Web API，地址: {}:{}",
        web_config.bind_address, web_config.port
    );
    let mut web_server = WebServer::new(web_config, Arc::clone(service), shutdown_rx);
    Some(tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("Web 服务器启动失败: {}", e);
        }
    }))
}

/// 处理关闭并清理资源
///
/// 1. 等待Web服务器完成优雅关闭
/// 2. 停止所有周期检测
async fn handle_shutdown_and_cleanup(
    web_server_handle: Option<tokio::task::JoinHandle<()>>,
    service: &Arc<LinkHealthService>,
) {
    if let Some(handle) = web_server_handle {
        if let Err(e) = handle.await {
            warn!("Web 服务器任务异常结束: {}", e);
        }
        info!("Web 服务器已停止");
    }

    service.shutdown();
    info!("服务已停止");
}

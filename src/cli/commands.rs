//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{ConfigLoader, GlobalConfig, TomlConfigLoader};
use crate::error::Result;
use crate::guard::{SsrfGuard, SystemResolver, Verdict};
use crate::health::{required_cooldown_minutes, HttpLinkProber, LinkProber, ProbeOutcome};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  日志级别: {}", config.global.log_level);
            println!("  请求超时: {}秒", config.global.request_timeout_seconds);
            println!("  最大重定向: {}", config.global.max_redirects);
            println!("  批量并发: {}", config.global.batch_concurrency);
            println!("  批次间隔: {}毫秒", config.global.batch_cooldown_ms);

            match &config.system_scheduler {
                Some(scheduler) => println!(
                    "系统调度: {}，每{}分钟，每轮{}个",
                    enabled_label(scheduler.enabled),
                    scheduler.interval_minutes,
                    scheduler.batch_size
                ),
                None => println!("系统调度: 未配置"),
            }

            println!("所有者调度:");
            for owner in &config.owners {
                println!(
                    "  {} - {}，每{}分钟，每轮{}个",
                    owner.owner_id,
                    enabled_label(owner.enabled),
                    owner.interval_minutes,
                    owner.batch_size
                );
            }

            println!("检测目标:");
            for (i, target) in config.targets.iter().enumerate() {
                println!(
                    "  {}. {} ({}) 所有者: {}",
                    i + 1,
                    target.id,
                    target.url,
                    target.owner_id.as_deref().unwrap_or("系统")
                );
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个检测目标", config.targets.len());
            println!("✓ 找到 {} 个所有者调度配置", config.owners.len());
        }

        Ok(())
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check {
            url,
            format,
            timeout,
        } = &args.command
        {
            let mut global = load_global_config(args).await;
            if let Some(seconds) = timeout {
                global.request_timeout_seconds = *seconds;
            }

            let guard = Arc::new(SsrfGuard::new(Arc::new(SystemResolver::new(
                global.dns_timeout(),
            ))));
            let prober = HttpLinkProber::new(guard, global.probe_settings())?;

            let start = Instant::now();
            let outcome = prober.probe(url).await;
            println!("{}", render_probe(url, &outcome, start.elapsed(), format)?);
        }
        Ok(())
    }
}

/// 守卫命令
pub struct GuardCommand;

#[async_trait]
impl Command for GuardCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Guard { url, format } = &args.command {
            let global = load_global_config(args).await;
            let guard = SsrfGuard::new(Arc::new(SystemResolver::new(global.dns_timeout())));
            let verdict = guard.validate_str(url).await;
            println!("{}", render_verdict(url, &verdict, format)?);
        }
        Ok(())
    }
}

/// 退避时间表命令
pub struct BackoffCommand;

#[async_trait]
impl Command for BackoffCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Backoff { max_fail_count } = &args.command {
            println!("{}", render_backoff_table(*max_fail_count));
        }
        Ok(())
    }
}

/// 读取全局配置；配置文件不存在或无效时使用默认值
async fn load_global_config(args: &Args) -> GlobalConfig {
    let config_path = args.get_config_path();
    if !config_path.exists() {
        return GlobalConfig::default();
    }

    match TomlConfigLoader::new(true).load_from_file(&config_path).await {
        Ok(config) => config.global,
        Err(e) => {
            debug!("配置文件不可用，使用默认全局配置: {}", e);
            GlobalConfig::default()
        }
    }
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled {
        "启用"
    } else {
        "禁用"
    }
}

/// 格式化探测结果
pub fn render_probe(
    url: &str,
    outcome: &ProbeOutcome,
    elapsed: Duration,
    format: &OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "url": url,
                "status": outcome.status,
                "http_status": outcome.http_status,
                "elapsed_ms": elapsed.as_millis() as u64,
            });
            Ok(serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Text => {
            let marker = if outcome.status.is_healthy() { "✓" } else { "✗" };
            let http = outcome
                .http_status
                .map(|code| format!(" (HTTP {code})"))
                .unwrap_or_default();
            Ok(format!(
                "{marker} {url}: {}{http}\n  耗时: {}ms",
                outcome.status,
                elapsed.as_millis()
            ))
        }
    }
}

/// 格式化守卫判定
pub fn render_verdict(url: &str, verdict: &Verdict, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "url": url,
                "allowed": verdict.is_allowed(),
                "reason": verdict.deny_reason(),
            });
            Ok(serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Text => Ok(match verdict.deny_reason() {
            None => format!("✓ 允许访问: {url}"),
            Some(reason) => format!("✗ 拒绝访问: {url}\n  原因: {reason}"),
        }),
    }
}

/// 格式化退避冷却时间表
pub fn render_backoff_table(max_fail_count: u32) -> String {
    let mut lines = vec![format!("{:<8} {:>10}  {}", "失败次数", "冷却(分钟)", "冷却时间")];
    for fail_count in 0..=max_fail_count {
        let minutes = required_cooldown_minutes(fail_count);
        lines.push(format!(
            "{:<8} {:>10}  {}",
            fail_count,
            minutes,
            humanize_minutes(minutes)
        ));
    }
    lines.join("\n")
}

fn humanize_minutes(minutes: u64) -> String {
    match minutes {
        m if m >= 1440 && m % 1440 == 0 => format!("{}天", m / 1440),
        m if m >= 60 && m % 60 == 0 => format!("{}小时", m / 60),
        m if m >= 60 => format!("{}小时{}分钟", m / 60, m % 60),
        m => format!("{m}分钟"),
    }
}

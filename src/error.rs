//! 错误处理模块
//!
//! 定义应用程序的统一错误类型。
//!
//! 探测链路本身不产生错误：SSRF拒绝、网络故障和超时都会被归约为
//! [`ProbeOutcome`](crate::health::ProbeOutcome)。这里的错误只覆盖配置、
//! 存储协作方和HTTP客户端构建等外围环节。

use thiserror::Error;

/// Link Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum LinkVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 存储协作方错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 探测器初始化错误
    #[error("探测器初始化错误: {0}")]
    ProbeSetup(#[from] ProbeSetupError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 存储协作方错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 目标不存在
    #[error("检测目标不存在: {id}")]
    TargetNotFound { id: String },

    /// 后端读写失败
    #[error("存储后端失败: {0}")]
    Backend(String),
}

/// 探测器初始化错误类型
#[derive(Error, Debug)]
pub enum ProbeSetupError {
    /// HTTP客户端构建失败
    #[error("HTTP客户端构建失败: {0}")]
    Client(#[from] reqwest::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, LinkVitalsError>;

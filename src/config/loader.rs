//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 配置文件路径环境变量
pub const CONFIG_ENV_VAR: &str = "LINK_VITALS_CONFIG";

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的 `${VAR_NAME}` 环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut result = content.to_string();
        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            let value = std::env::var(var_name).map_err(|_| ConfigError::EnvVarError {
                var: var_name.to_string(),
            })?;
            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 依次检查 `LINK_VITALS_CONFIG`、当前目录下的 `config.toml`
/// 和用户配置目录下的 `link-vitals/config.toml`
pub fn get_default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if Path::new("config.toml").exists() {
        return PathBuf::from("config.toml");
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("link-vitals").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkVitalsError;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_CONFIG_TOML: &str = r#"
[global]
log_level = "info"
request_timeout_seconds = 8
batch_concurrency = 3

[system_scheduler]
interval_minutes = 15
batch_size = 10

[[owners]]
owner_id = "alice"
interval_minutes = 30
batch_size = 20

[[targets]]
id = "t-1"
url = "https://example.com"
owner_id = "alice"

[[targets]]
id = "t-2"
url = "https://example.org"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[web]
enabled = true
bind_address = "${LV_TEST_BIND}"

[[targets]]
id = "t-1"
url = "https://${LV_TEST_HOST}/status"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.request_timeout_seconds, 8);
        assert_eq!(config.global.batch_concurrency, 3);
        assert_eq!(config.global.max_redirects, 5);

        let system = config.system_scheduler.unwrap();
        assert!(system.enabled);
        assert_eq!(system.interval_minutes, 15);

        assert_eq!(config.owners.len(), 1);
        assert_eq!(config.owners[0].preferences().batch_size, 20);
        assert_eq!(config.targets.len(), 2);
        assert!(config.targets[1].owner_id.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("LV_TEST_BIND", "0.0.0.0");
        env::set_var("LV_TEST_HOST", "status.example.com");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(config.web.unwrap().bind_address, "0.0.0.0");
        assert_eq!(config.targets[0].url, "https://status.example.com/status");

        env::remove_var("LV_TEST_BIND");
        env::remove_var("LV_TEST_HOST");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        let loader = TomlConfigLoader::new(true);
        let result = loader
            .load_from_string("[global]\nlog_level = \"${LV_MISSING_VAR}\"\n")
            .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            LinkVitalsError::Config(ConfigError::EnvVarError { .. })
        ));
        assert!(err.to_string().contains("LV_MISSING_VAR"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_TOML.as_bytes()).unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(config.targets[0].id, "t-1");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlConfigLoader::default();
        let err = loader
            .load_from_file("/definitely/not/here/config.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LinkVitalsError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let loader = TomlConfigLoader::new(false);
        let err = loader
            .load_from_string("[global]\nbatch_concurrency = 0\n")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LinkVitalsError::Config(ConfigError::ValidationError(_))
        ));

        let err = loader.load_from_string("[global\n").await.unwrap_err();
        assert!(matches!(err, LinkVitalsError::Config(ConfigError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_example_config_is_valid() {
        let loader = TomlConfigLoader::new(false);
        let config = loader
            .load_from_string(include_str!("../../config.example.toml"))
            .await
            .unwrap();
        assert_eq!(config.owners.len(), 2);
        assert_eq!(config.owners[1].interval_minutes, 60);
        assert_eq!(config.targets.len(), 3);
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        assert_eq!(loader.substitute_env_vars(content).unwrap(), content);
    }

    #[test]
    #[serial]
    fn test_get_default_config_path() {
        env::set_var(CONFIG_ENV_VAR, "/etc/link-vitals/custom.toml");
        assert_eq!(
            get_default_config_path(),
            PathBuf::from("/etc/link-vitals/custom.toml")
        );
        env::remove_var(CONFIG_ENV_VAR);

        let path = get_default_config_path();
        assert!(path.to_string_lossy().contains("config.toml"));
    }
}

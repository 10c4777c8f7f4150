//! 部署配置
//!
//! 从项目目录下的 `deploy.config.json` 或 `deploy.<name>.config.json` 加载，
//! 字段名大小写不敏感。

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::config::env::constants::{BASE_CONFIG_FILE, DEFAULT_BUILD_CONFIGURATION};
use crate::error::ConfigError;

/// 排除列表
///
/// 线上格式可以是 `,`/`;` 分隔的字符串，也可以是字符串数组；
/// 两者都归一化为去除空白、去掉空项、按首次出现去重的有序序列。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionList(Vec<String>);

impl ExclusionList {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for item in items {
            let item = item.as_ref().trim();
            if item.is_empty() || normalized.iter().any(|existing| existing == item) {
                continue;
            }
            normalized.push(item.to_string());
        }
        Self(normalized)
    }

    /// 解析分隔字符串
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split([',', ';']))
    }

    fn from_value(value: &Value, field: &'static str, path: &Path) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::String(raw) => Ok(Self::parse(raw)),
            Value::Array(items) => {
                let mut strings = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => strings.push(s.as_str()),
                        _ => return Err(type_error(path, field, "a string or an array of strings")),
                    }
                }
                Ok(Self::new(strings))
            }
            _ => Err(type_error(path, field, "a string or an array of strings")),
        }
    }

    pub fn items(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 传给部署脚本的形式：逗号连接；空列表返回 None（省略该参数）
    pub fn to_argument(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join(","))
        }
    }
}

/// 部署配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfiguration {
    /// IIS 主机地址
    pub server: String,
    /// 应用程序池名称
    pub pool_name: String,
    /// 已部署应用的绝对路径
    pub app_folder_location: String,
    /// 备份目录的绝对路径
    pub backup_folder_location: String,
    pub exclude_from_cleanup: ExclusionList,
    pub exclude_from_copy: ExclusionList,
    /// 未输入配置名称时使用的构建配置
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_configuration: Option<String>,
}

impl DeployConfiguration {
    /// 从配置文件加载并校验
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::FileMissing {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config = Self::from_json(&content, path)?;
        config.validate(path)?;
        Ok(config)
    }

    /// 解析 JSON 内容（不做必填校验）
    pub fn from_json(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let Value::Object(object) = value else {
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message: "expected a JSON object at the top level".to_string(),
            });
        };

        let fields = CaseInsensitive::new(object);

        Ok(Self {
            server: fields.string("server", path)?,
            pool_name: fields.string("poolName", path)?,
            app_folder_location: fields.string("appFolderLocation", path)?,
            backup_folder_location: fields.string("backupFolderLocation", path)?,
            exclude_from_cleanup: ExclusionList::from_value(
                fields.get("excludeFromCleanup"),
                "excludeFromCleanup",
                path,
            )?,
            exclude_from_copy: ExclusionList::from_value(
                fields.get("excludeFromCopy"),
                "excludeFromCopy",
                path,
            )?,
            default_configuration: Some(fields.string("defaultConfiguration", path)?)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    /// 校验必填字段非空
    pub fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let required = [
            ("server", &self.server),
            ("poolName", &self.pool_name),
            ("appFolderLocation", &self.app_folder_location),
            ("backupFolderLocation", &self.backup_folder_location),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::validation(path, field));
            }
        }
        Ok(())
    }

    /// 构建配置名称：操作员输入 > defaultConfiguration > Release
    pub fn build_configuration<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.default_configuration.as_deref())
            .unwrap_or(DEFAULT_BUILD_CONFIGURATION)
    }

    /// 默认配置模板，所有字段为空字符串
    pub fn template() -> String {
        let template = serde_json::json!({
            "server": "",
            "poolName": "",
            "appFolderLocation": "",
            "backupFolderLocation": "",
            "excludeFromCleanup": "",
            "excludeFromCopy": "",
        });
        serde_json::to_string_pretty(&template).unwrap_or_default()
    }
}

impl std::fmt::Display for DeployConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server: {}, Pool: {}, AppFolder: {}",
            self.server, self.pool_name, self.app_folder_location
        )
    }
}

/// 字段名大小写不敏感的 JSON 对象视图
struct CaseInsensitive {
    fields: Map<String, Value>,
}

impl CaseInsensitive {
    fn new(object: Map<String, Value>) -> Self {
        // 同名字段（忽略大小写）以最后出现的为准
        let fields = object
            .into_iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value))
            .collect();
        Self { fields }
    }

    fn get(&self, name: &str) -> &Value {
        self.fields
            .get(&name.to_ascii_lowercase())
            .unwrap_or(&Value::Null)
    }

    fn string(&self, name: &'static str, path: &Path) -> Result<String, ConfigError> {
        match self.get(name) {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            _ => Err(type_error(path, name, "a string")),
        }
    }
}

fn type_error(path: &Path, field: &str, expected: &str) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("{} must be {}", field, expected),
    }
}

/// 请求的配置不存在，已回退到基础配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFallback {
    pub requested: String,
    /// 期望存在的文件
    pub missing_path: PathBuf,
}

/// 解析结果
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub config: DeployConfiguration,
    /// 实际使用的配置文件
    pub source: PathBuf,
    pub fallback: Option<ConfigFallback>,
}

/// 基础配置文件路径
pub fn base_config_path(base_dir: &Path) -> PathBuf {
    base_dir.join(BASE_CONFIG_FILE)
}

/// 命名配置文件路径
pub fn named_config_path(base_dir: &Path, name: &str) -> PathBuf {
    base_dir.join(format!("deploy.{}.config.json", name))
}

/// 解析部署配置
///
/// `config_name` 为空时加载 `deploy.config.json`；否则优先加载
/// `deploy.<name>.config.json`，文件不存在时回退到基础配置并通过
/// `fallback` 告知调用方。
pub fn resolve(base_dir: &Path, config_name: Option<&str>) -> Result<ResolvedConfig, ConfigError> {
    let name = config_name.map(str::trim).filter(|n| !n.is_empty());

    let Some(name) = name else {
        let source = base_config_path(base_dir);
        let config = DeployConfiguration::load(&source)?;
        return Ok(ResolvedConfig {
            config,
            source,
            fallback: None,
        });
    };

    let named = named_config_path(base_dir, name);
    if named.is_file() {
        let config = DeployConfiguration::load(&named)?;
        tracing::debug!(config = %named.display(), "Using named configuration");
        return Ok(ResolvedConfig {
            config,
            source: named,
            fallback: None,
        });
    }

    let source = base_config_path(base_dir);
    let config = DeployConfiguration::load(&source)?;
    Ok(ResolvedConfig {
        config,
        source,
        fallback: Some(ConfigFallback {
            requested: name.to_string(),
            missing_path: named,
        }),
    })
}

/// 写入默认配置模板；文件已存在时不覆盖，返回 false
pub fn write_template(base_dir: &Path) -> std::io::Result<bool> {
    let path = base_config_path(base_dir);
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(&path, DeployConfiguration::template())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BASE: &str = r#"{
        "server": "web01",
        "poolName": "AppPool",
        "appFolderLocation": "C:\\inetpub\\app",
        "backupFolderLocation": "C:\\backup\\app",
        "excludeFromCleanup": "web.config; logs",
        "excludeFromCopy": ["appsettings.json"]
    }"#;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_resolve_base_config() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deploy.config.json", BASE);

        let resolved = resolve(dir.path(), None).unwrap();
        assert!(resolved.fallback.is_none());
        assert_eq!(resolved.source, dir.path().join("deploy.config.json"));

        let config = resolved.config;
        assert_eq!(config.server, "web01");
        assert_eq!(config.pool_name, "AppPool");
        assert_eq!(config.app_folder_location, r"C:\inetpub\app");
        assert_eq!(config.backup_folder_location, r"C:\backup\app");
        assert_eq!(config.exclude_from_cleanup.items(), ["web.config", "logs"]);
        assert_eq!(config.exclude_from_copy.items(), ["appsettings.json"]);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "deploy.config.json",
            r#"{"SERVER": "web01", "poolname": "AppPool",
                "AppFolderLocation": "D:\\app", "BACKUPFOLDERLOCATION": "D:\\bak"}"#,
        );

        let config = resolve(dir.path(), Some("")).unwrap().config;
        assert_eq!(config.server, "web01");
        assert_eq!(config.pool_name, "AppPool");
        assert_eq!(config.app_folder_location, r"D:\app");
        assert_eq!(config.backup_folder_location, r"D:\bak");
        assert!(config.exclude_from_cleanup.is_empty());
    }

    #[test]
    fn test_named_config_preferred() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deploy.config.json", BASE);
        write(
            dir.path(),
            "deploy.prod.config.json",
            &BASE.replace("web01", "prod-web"),
        );

        let resolved = resolve(dir.path(), Some("prod")).unwrap();
        assert!(resolved.fallback.is_none());
        assert_eq!(resolved.config.server, "prod-web");
    }

    #[test]
    fn test_missing_named_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deploy.config.json", BASE);

        let resolved = resolve(dir.path(), Some("staging")).unwrap();
        assert_eq!(resolved.config.server, "web01");
        let fallback = resolved.fallback.unwrap();
        assert_eq!(fallback.requested, "staging");
        assert_eq!(
            fallback.missing_path,
            dir.path().join("deploy.staging.config.json")
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::FileMissing { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deploy.config.json", "{ \"server\": ");
        let err = resolve(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_each_required_field() {
        for field in ["server", "poolName", "appFolderLocation", "backupFolderLocation"] {
            let dir = tempfile::tempdir().unwrap();
            let mut value: Value = serde_json::from_str(BASE).unwrap();
            value.as_object_mut().unwrap().remove(field);
            write(dir.path(), "deploy.config.json", &value.to_string());

            match resolve(dir.path(), None).unwrap_err() {
                ConfigError::Validation { field: missing, .. } => assert_eq!(missing, field),
                other => panic!("expected validation error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_blank_required_field() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deploy.config.json", &BASE.replace("AppPool", "  "));
        let err = resolve(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "poolName", .. }));
    }

    #[test]
    fn test_exclusion_forms_normalize_identically() {
        let from_string = ExclusionList::parse("a,b; c");
        let from_list = ExclusionList::new(["a", "b", "c"]);
        assert_eq!(from_string, from_list);
        assert_eq!(from_string.items(), ["a", "b", "c"]);
    }

    #[test]
    fn test_exclusion_dedup_keeps_first() {
        let list = ExclusionList::parse(" logs ;web.config,,logs; ");
        assert_eq!(list.items(), ["logs", "web.config"]);
        assert_eq!(list.to_argument().as_deref(), Some("logs,web.config"));
        assert_eq!(ExclusionList::default().to_argument(), None);
    }

    #[test]
    fn test_exclusion_rejects_numbers() {
        let err = DeployConfiguration::from_json(
            r#"{"excludeFromCopy": [1, 2]}"#,
            Path::new("deploy.config.json"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_build_configuration_precedence() {
        let mut config = DeployConfiguration::from_json(BASE, Path::new("x")).unwrap();
        assert_eq!(config.build_configuration(None), "Release");
        config.default_configuration = Some("Staging".to_string());
        assert_eq!(config.build_configuration(Some(" ")), "Staging");
        assert_eq!(config.build_configuration(Some("Debug")), "Debug");
    }

    #[test]
    fn test_template_round_trip_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_template(dir.path()).unwrap());
        assert!(!write_template(dir.path()).unwrap());

        let err = resolve(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "server", .. }));
    }
}

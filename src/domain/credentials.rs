//! 凭据相关领域模型
//!
//! 密码只存在于内存中，缓冲区在释放时清零，不会被序列化或写入日志。

use base64::Engine;
use std::fmt;
use zeroize::Zeroizing;

/// 操作员密码
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 编码为传给脚本的形式：UTF-16LE 字节的 base64
    ///
    /// 中间字节缓冲区在返回前清零。
    pub fn to_base64(&self) -> EncodedSecret {
        let bytes: Zeroizing<Vec<u8>> =
            Zeroizing::new(self.0.encode_utf16().flat_map(u16::to_le_bytes).collect());
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes.as_slice());
        EncodedSecret(Zeroizing::new(encoded))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// 已编码的密码，只在构建一次进程参数期间存在
pub struct EncodedSecret(Zeroizing<String>);

impl EncodedSecret {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncodedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncodedSecret(***)")
    }
}

/// 一次部署使用的凭据
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub secret: Secret,
    /// 配置名称（如 "prod"），为空表示使用默认配置
    pub configuration_name: Option<String>,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        secret: Secret,
        configuration_name: Option<String>,
    ) -> Self {
        let configuration_name = configuration_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Self {
            username: username.into(),
            secret,
            configuration_name,
        }
    }
}

//! 服务端配置
//!
//! 默认位置为 `<config_dir>/chess-server/server.json`，文件不存在时使用默认值。
//! 环境变量 `CHESS_SERVER_PORT` 覆盖端口。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use protocol::{GameId, NetworkConfig, MAX_CONNECTIONS};

/// 端口覆盖环境变量
pub const PORT_ENV: &str = "CHESS_SERVER_PORT";

/// 对局存储方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageKind {
    /// 内存（重启后丢失）
    Memory,
    /// JSON 文件，目录缺省时使用数据目录
    File {
        #[serde(default)]
        dir: Option<PathBuf>,
    },
}

/// 预置用户（令牌 -> 用户名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub token: String,
    pub username: String,
}

/// 预置对局，启动时不存在则创建
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntry {
    pub id: GameId,
    pub name: String,
    #[serde(default)]
    pub white: Option<String>,
    #[serde(default)]
    pub black: Option<String>,
}

/// 服务端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub max_connections: usize,
    pub storage: StorageKind,
    pub users: Vec<UserEntry>,
    pub games: Vec<GameEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            max_connections: MAX_CONNECTIONS,
            storage: StorageKind::Memory,
            users: Vec::new(),
            games: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("chess-server");
            path.push("server.json");
            path
        })
    }

    /// 加载配置
    ///
    /// 显式指定的文件必须存在；默认位置的文件缺失时使用默认配置。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                Some(_) => {
                    info!("配置文件不存在，使用默认配置");
                    Self::default()
                }
                None => {
                    warn!("无法获取配置目录，使用默认配置");
                    Self::default()
                }
            },
        };

        config.apply_port_override(std::env::var(PORT_ENV).ok().as_deref())?;
        Ok(config)
    }

    /// 从 JSON 文件读取
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {:?}", path))?;
        info!("已加载配置: {:?}", path);
        Ok(config)
    }

    /// 应用端口覆盖
    pub fn apply_port_override(&mut self, value: Option<&str>) -> Result<()> {
        if let Some(value) = value {
            self.network.port = value
                .trim()
                .parse()
                .with_context(|| format!("{} 不是合法端口: {}", PORT_ENV, value))?;
        }
        Ok(())
    }
}

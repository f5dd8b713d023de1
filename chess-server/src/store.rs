//! 外部协作方：身份查询与对局存储
//!
//! 会话层只依赖这里的 trait，具体实现可以是内存、文件或数据库。
//! 对局写入采用版本号比较交换，过期版本的写入会被拒绝。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use protocol::{Color, Game, GameId};

/// 存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 版本冲突（其他写入者已先提交）
    #[error("version conflict on game {game_id}: expected {expected}, found {actual}")]
    Conflict {
        game_id: GameId,
        expected: u64,
        actual: u64,
    },

    /// 存储不可用
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 持久化的对局记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    pub white_username: Option<String>,
    pub black_username: Option<String>,
    pub game_name: String,
    pub game: Game,
}

impl GameData {
    /// 新对局，座位为空
    pub fn new(game_id: GameId, game_name: impl Into<String>) -> Self {
        Self {
            game_id,
            white_username: None,
            black_username: None,
            game_name: game_name.into(),
            game: Game::new(),
        }
    }

    /// 指定颜色座位上的玩家
    pub fn seat(&self, color: Color) -> Option<&str> {
        match color {
            Color::White => self.white_username.as_deref(),
            Color::Black => self.black_username.as_deref(),
        }
    }

    /// 入座
    pub fn seat_player(&mut self, color: Color, username: impl Into<String>) {
        let username = Some(username.into());
        match color {
            Color::White => self.white_username = username,
            Color::Black => self.black_username = username,
        }
    }

    /// 玩家是否坐在指定颜色上
    pub fn is_seated(&self, username: &str, color: Color) -> bool {
        self.seat(color) == Some(username)
    }

    /// 玩家执子颜色（同时占两个座位时返回白方）
    pub fn player_color(&self, username: &str) -> Option<Color> {
        [Color::White, Color::Black]
            .into_iter()
            .find(|color| self.is_seated(username, *color))
    }

    /// 空出座位
    pub fn vacate(&mut self, color: Color) {
        match color {
            Color::White => self.white_username = None,
            Color::Black => self.black_username = None,
        }
    }

    /// 座位显示名，空座位时用颜色代替
    pub fn display_name(&self, color: Color) -> String {
        self.seat(color)
            .map(str::to_string)
            .unwrap_or_else(|| color.to_string())
    }
}

/// 带版本号的对局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGame {
    pub data: GameData,
    /// 每次成功写入后加一，新建对局为 1
    pub version: u64,
}

/// 身份查询
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// 令牌 -> 用户名
    async fn resolve_auth(&self, token: &str) -> Result<Option<String>, StoreError>;
}

/// 对局存储
#[async_trait]
pub trait GameStore: Send + Sync {
    /// 读取对局
    async fn load_game(&self, game_id: GameId) -> Result<Option<StoredGame>, StoreError>;

    /// 比较交换写入，返回新版本号
    ///
    /// `expected_version` 为 0 表示新建，此时对局必须不存在。
    async fn save_game(&self, data: &GameData, expected_version: u64) -> Result<u64, StoreError>;
}

/// 内存存储（默认实现，也用于测试）
pub struct MemoryStore {
    tokens: RwLock<HashMap<String, String>>,
    games: RwLock<HashMap<GameId, StoredGame>>,
    next_game_id: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            games: RwLock::new(HashMap::new()),
            next_game_id: AtomicU64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// 注册令牌
    pub async fn add_token(&self, token: impl Into<String>, username: impl Into<String>) {
        self.tokens.write().await.insert(token.into(), username.into());
    }

    /// 创建对局并入座，返回对局 ID
    pub async fn create_game(
        &self,
        game_name: &str,
        white: Option<&str>,
        black: Option<&str>,
    ) -> GameId {
        let mut games = self.games.write().await;

        let mut game_id = self.next_game_id.fetch_add(1, Ordering::SeqCst);
        while games.contains_key(&game_id) {
            game_id = self.next_game_id.fetch_add(1, Ordering::SeqCst);
        }

        let mut data = GameData::new(game_id, game_name);
        if let Some(name) = white {
            data.seat_player(Color::White, name);
        }
        if let Some(name) = black {
            data.seat_player(Color::Black, name);
        }
        games.insert(game_id, StoredGame { data, version: 1 });
        game_id
    }

    /// 模拟存储故障：读写都失败
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn resolve_auth(&self, token: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.tokens.read().await.get(token).cloned())
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn load_game(&self, game_id: GameId) -> Result<Option<StoredGame>, StoreError> {
        self.check_available()?;
        Ok(self.games.read().await.get(&game_id).cloned())
    }

    async fn save_game(&self, data: &GameData, expected_version: u64) -> Result<u64, StoreError> {
        self.check_available()?;

        let mut games = self.games.write().await;
        let actual = games.get(&data.game_id).map(|g| g.version).unwrap_or(0);
        if actual != expected_version {
            return Err(StoreError::Conflict {
                game_id: data.game_id,
                expected: expected_version,
                actual,
            });
        }

        let version = actual + 1;
        games.insert(
            data.game_id,
            StoredGame {
                data: data.clone(),
                version,
            },
        );
        Ok(version)
    }
}

//! 对局文件存储
//!
//! 每个对局一个 JSON 文件 `game-<id>.json`，记录版本号和保存时间。
//! 写入先落到临时文件再重命名。

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use protocol::GameId;

use crate::store::{GameData, GameStore, StoreError, StoredGame};

/// 文件中的对局记录
#[derive(Debug, Serialize, Deserialize)]
struct SavedGame {
    version: u64,
    saved_at: DateTime<Utc>,
    data: GameData,
}

/// 已保存对局的摘要
#[derive(Debug, Clone)]
pub struct SavedGameInfo {
    pub game_id: GameId,
    pub game_name: String,
    pub white_username: Option<String>,
    pub black_username: Option<String>,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
}

/// 文件对局存储
pub struct FileGameStore {
    games_dir: PathBuf,
    /// 串行化读-比较-写
    write_lock: Mutex<()>,
}

impl FileGameStore {
    /// 在指定目录创建存储（目录不存在时创建）
    pub fn new(games_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let games_dir = games_dir.into();
        if !games_dir.exists() {
            std::fs::create_dir_all(&games_dir)
                .with_context(|| format!("无法创建存储目录: {:?}", games_dir))?;
        }

        Ok(Self {
            games_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// 在默认数据目录创建存储
    pub fn open_default() -> anyhow::Result<Self> {
        Self::new(default_games_directory()?)
    }

    /// 存储目录
    pub fn games_directory(&self) -> &Path {
        &self.games_dir
    }

    fn game_path(&self, game_id: GameId) -> PathBuf {
        self.games_dir.join(format!("game-{}.json", game_id))
    }

    async fn read_saved(&self, game_id: GameId) -> Result<Option<SavedGame>, StoreError> {
        match fs::read(self.game_path(game_id)).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// 列出所有对局，按保存时间倒序
    pub async fn list_games(&self) -> anyhow::Result<Vec<SavedGameInfo>> {
        let mut games = Vec::new();

        let mut entries = fs::read_dir(&self.games_dir)
            .await
            .with_context(|| format!("读取存储目录失败: {:?}", self.games_dir))?;

        while let Some(entry) = entries.next_entry().await.context("读取目录项失败")? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read(&path)
                .await
                .with_context(|| format!("读取文件失败: {:?}", path))?;
            match serde_json::from_slice::<SavedGame>(&content) {
                Ok(saved) => games.push(SavedGameInfo {
                    game_id: saved.data.game_id,
                    game_name: saved.data.game_name,
                    white_username: saved.data.white_username,
                    black_username: saved.data.black_username,
                    version: saved.version,
                    saved_at: saved.saved_at,
                }),
                Err(e) => {
                    // 跳过损坏的文件
                    debug!(?path, error = %e, "跳过无法解析的对局文件");
                }
            }
        }

        games.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(games)
    }
}

#[async_trait]
impl GameStore for FileGameStore {
    async fn load_game(&self, game_id: GameId) -> Result<Option<StoredGame>, StoreError> {
        Ok(self.read_saved(game_id).await?.map(|saved| StoredGame {
            data: saved.data,
            version: saved.version,
        }))
    }

    async fn save_game(&self, data: &GameData, expected_version: u64) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let actual = self
            .read_saved(data.game_id)
            .await?
            .map(|saved| saved.version)
            .unwrap_or(0);
        if actual != expected_version {
            return Err(StoreError::Conflict {
                game_id: data.game_id,
                expected: expected_version,
                actual,
            });
        }

        let saved = SavedGame {
            version: actual + 1,
            saved_at: Utc::now(),
            data: data.clone(),
        };
        let content = serde_json::to_vec_pretty(&saved)?;

        let path = self.game_path(data.game_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(game_id = data.game_id, version = saved.version, "对局已写入文件");
        Ok(saved.version)
    }
}

/// 默认存储目录
pub fn default_games_directory() -> anyhow::Result<PathBuf> {
    let app_data_dir = dirs::data_dir().context("无法获取应用数据目录")?;
    Ok(app_data_dir.join("chess-server").join("games"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Color;
    use tempfile::TempDir;

    fn create_test_storage() -> (FileGameStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileGameStore::new(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load_game() {
        let (storage, _temp_dir) = create_test_storage();

        let mut data = GameData::new(7, "friendly");
        data.seat_player(Color::White, "alice");
        data.game.apply_move("e2e4".parse().unwrap()).unwrap();

        assert_eq!(storage.save_game(&data, 0).await.unwrap(), 1);
        assert!(storage.games_directory().join("game-7.json").exists());

        let loaded = storage.load_game(7).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.data, data);

        assert!(storage.load_game(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let (storage, _temp_dir) = create_test_storage();
        let data = GameData::new(1, "g");

        storage.save_game(&data, 0).await.unwrap();
        assert_eq!(storage.save_game(&data, 1).await.unwrap(), 2);

        let result = storage.save_game(&data, 1).await;
        assert!(matches!(
            result,
            Err(StoreError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_truncated_board_is_rejected() {
        let (storage, _temp_dir) = create_test_storage();
        storage.save_game(&GameData::new(1, "g"), 0).await.unwrap();

        let path = storage.games_directory().join("game-1.json");
        let mut saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        saved["data"]["game"]["board"]["squares"] = serde_json::json!([null, null, null]);
        std::fs::write(&path, serde_json::to_vec(&saved).unwrap()).unwrap();

        let result = storage.load_game(1).await;
        assert!(matches!(result, Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn test_list_games() {
        let (storage, temp_dir) = create_test_storage();

        for id in 1..=3 {
            let mut data = GameData::new(id, format!("game {}", id));
            data.seat_player(Color::Black, format!("player{}", id));
            storage.save_game(&data, 0).await.unwrap();
        }
        std::fs::write(temp_dir.path().join("broken.json"), b"{").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"ignored").unwrap();

        let games = storage.list_games().await.unwrap();
        assert_eq!(games.len(), 3);

        // 最新的在前
        for pair in games.windows(2) {
            assert!(pair[0].saved_at >= pair[1].saved_at);
        }
        assert!(games.iter().any(|g| g.game_id == 2
            && g.black_username.as_deref() == Some("player2")
            && g.version == 1));
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");

        let storage = FileGameStore::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(storage.list_games().await.unwrap().is_empty());
    }
}

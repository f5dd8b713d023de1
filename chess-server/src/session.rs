//! 对局会话
//!
//! 连接在对局中的身份，以及按对局串行化命令处理的锁表。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use protocol::{Color, GameId};

use crate::store::GameData;

/// 连接在对局中的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    White,
    Black,
    Observer,
}

impl Role {
    /// 根据对局记录的玩家名判断身份
    pub fn of(data: &GameData, username: &str) -> Role {
        match data.player_color(username) {
            Some(Color::White) => Role::White,
            Some(Color::Black) => Role::Black,
            None => Role::Observer,
        }
    }

    /// 执子颜色，观战者为 None
    pub fn color(&self) -> Option<Color> {
        match self {
            Role::White => Some(Color::White),
            Role::Black => Some(Color::Black),
            Role::Observer => None,
        }
    }

    pub fn is_player(&self) -> bool {
        !matches!(self, Role::Observer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::White => write!(f, "white"),
            Role::Black => write!(f, "black"),
            Role::Observer => write!(f, "observer"),
        }
    }
}

/// 每个对局一把锁，按需创建，最后一个持有者释放后移除
///
/// 持锁期间完成 读取 -> 校验 -> 执行 -> 保存 -> 广播。
/// 外层表只在短临界区内访问，不跨 await。
#[derive(Default)]
pub struct SessionLocks {
    locks: StdMutex<HashMap<GameId, Arc<Mutex<()>>>>,
}

/// 对局锁守卫，释放时清理无人等待的锁
pub struct SessionGuard<'a> {
    owner: &'a SessionLocks,
    game_id: GameId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<GameId, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 获取对局锁
    pub async fn lock(&self, game_id: GameId) -> SessionGuard<'_> {
        let lock = self.table().entry(game_id).or_default().clone();
        let guard = lock.lock_owned().await;
        SessionGuard {
            owner: self,
            game_id,
            guard: Some(guard),
        }
    }

    /// 当前存在的锁数量
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.owner.table();
        // 只剩表内引用：没有持有者也没有等待者
        if locks
            .get(&self.game_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.game_id);
        }
    }
}

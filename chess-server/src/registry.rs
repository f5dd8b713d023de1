//! 连接注册表
//!
//! 记录每个连接的发送通道和它所在的对局，负责单播和对局内广播。
//! 所有连接的处理任务共享同一个注册表。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use protocol::{GameId, ServerMessage};

/// 连接 ID
pub type ConnectionId = u64;

/// 每个连接的发送队列容量，写满的连接视为慢连接并被移出
pub const OUTBOUND_CAPACITY: usize = 256;

/// 写任务收到的指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// 发送一条消息
    Message(ServerMessage),
    /// 关闭连接
    Close,
}

struct ConnectionEntry {
    sender: mpsc::Sender<Outbound>,
    game_id: Option<GameId>,
}

/// 连接注册表
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// 注册新连接
    pub async fn register(&self, sender: mpsc::Sender<Outbound>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.connections.write().await.insert(
            id,
            ConnectionEntry {
                sender,
                game_id: None,
            },
        );
        debug!(conn = id, "连接已注册");
        id
    }

    /// 注销连接
    pub async fn unregister(&self, conn: ConnectionId) {
        if self.connections.write().await.remove(&conn).is_some() {
            debug!(conn, "连接已注销");
        }
    }

    /// 关联到对局（替换之前的关联），连接不存在时返回 false
    pub async fn attach(&self, conn: ConnectionId, game_id: GameId) -> bool {
        match self.connections.write().await.get_mut(&conn) {
            Some(entry) => {
                entry.game_id = Some(game_id);
                true
            }
            None => false,
        }
    }

    /// 解除对局关联
    pub async fn detach(&self, conn: ConnectionId) {
        if let Some(entry) = self.connections.write().await.get_mut(&conn) {
            entry.game_id = None;
        }
    }

    /// 连接所在的对局
    pub async fn game_of(&self, conn: ConnectionId) -> Option<GameId> {
        self.connections
            .read()
            .await
            .get(&conn)
            .and_then(|entry| entry.game_id)
    }

    /// 单播
    pub async fn send_to(&self, conn: ConnectionId, msg: ServerMessage) -> bool {
        self.push(conn, Outbound::Message(msg)).await
    }

    /// 单播错误消息
    pub async fn send_error(&self, conn: ConnectionId, text: impl Into<String>) -> bool {
        self.send_to(conn, ServerMessage::error(text)).await
    }

    /// 发给对局内除 `conn` 以外的所有连接，返回送达数量
    pub async fn broadcast_to_others(
        &self,
        conn: ConnectionId,
        game_id: GameId,
        msg: ServerMessage,
    ) -> usize {
        self.fan_out(game_id, Some(conn), msg).await
    }

    /// 发给对局内所有连接，返回送达数量
    pub async fn broadcast(&self, game_id: GameId, msg: ServerMessage) -> usize {
        self.fan_out(game_id, None, msg).await
    }

    async fn fan_out(&self, game_id: GameId, exclude: Option<ConnectionId>, msg: ServerMessage) -> usize {
        let mut delivered = 0;
        let mut slow = Vec::new();
        {
            let connections = self.connections.read().await;
            for (id, entry) in connections.iter() {
                if entry.game_id != Some(game_id) || Some(*id) == exclude {
                    continue;
                }
                match deliver(*id, entry, Outbound::Message(msg.clone())) {
                    Delivery::Sent => delivered += 1,
                    Delivery::Full => slow.push(*id),
                    Delivery::Gone => {}
                }
            }
        }
        for id in slow {
            self.evict(id).await;
        }
        delivered
    }

    /// 通知写任务关闭连接
    pub async fn close(&self, conn: ConnectionId) {
        self.push(conn, Outbound::Close).await;
    }

    async fn push(&self, conn: ConnectionId, out: Outbound) -> bool {
        let delivery = match self.connections.read().await.get(&conn) {
            Some(entry) => deliver(conn, entry, out),
            None => return false,
        };
        if delivery == Delivery::Full {
            self.evict(conn).await;
        }
        delivery == Delivery::Sent
    }

    /// 移出慢连接：丢弃发送端后写任务发完已排队的消息即关闭连接
    async fn evict(&self, conn: ConnectionId) {
        if self.connections.write().await.remove(&conn).is_some() {
            warn!(conn, "发送队列已满，移出慢连接");
        }
    }

    /// 对局内的连接，按 ID 排序
    pub async fn participants(&self, game_id: GameId) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.game_id == Some(game_id))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 当前连接数
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Full,
    Gone,
}

/// 写入通道，不等待；对端已断开时只记录日志，清理交给断线回调
fn deliver(conn: ConnectionId, entry: &ConnectionEntry, out: Outbound) -> Delivery {
    match entry.sender.try_send(out) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => Delivery::Full,
        Err(TrySendError::Closed(_)) => {
            debug!(conn, "连接通道已关闭，消息丢弃");
            Delivery::Gone
        }
    }
}

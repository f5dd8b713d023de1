//! 国际象棋服务端
//!
//! 包含:
//! - 连接注册表与对局内广播
//! - 会话协议处理（CONNECT / MAKE_MOVE / RESIGN / LEAVE）
//! - 按对局串行化的会话锁
//! - 身份与对局存储（内存、JSON 文件）
//! - 配置与 TCP 接入

pub mod config;
pub mod listener;
pub mod registry;
pub mod server;
pub mod session;
pub mod storage;
pub mod store;

pub use config::{GameEntry, ServerConfig, StorageKind, UserEntry};
pub use listener::serve;
pub use registry::{ConnectionId, ConnectionRegistry, Outbound, OUTBOUND_CAPACITY};
pub use server::{MessageHandler, ServerContext, SessionError};
pub use session::{Role, SessionGuard, SessionLocks};
pub use storage::{FileGameStore, SavedGameInfo};
pub use store::{AuthStore, GameData, GameStore, MemoryStore, StoreError, StoredGame};

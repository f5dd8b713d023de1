//! 消息类型定义
//!
//! 线上格式为 JSON：客户端命令以 `commandType` 区分，
//! 服务端消息以 `serverMessageType` 区分。

use serde::{Deserialize, Serialize};

use crate::game::Game;
use crate::moves::Move;

/// 对局 ID
pub type GameId = u64;

/// 客户端发送给服务端的命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "commandType",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// 进入对局（作为玩家或观战者）
    Connect { auth_token: String, game_id: GameId },
    /// 走棋
    MakeMove {
        auth_token: String,
        game_id: GameId,
        #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
        mv: Option<Move>,
    },
    /// 离开对局
    Leave { auth_token: String, game_id: GameId },
    /// 认输
    Resign { auth_token: String, game_id: GameId },
}

impl ClientMessage {
    /// 认证令牌
    pub fn auth_token(&self) -> &str {
        match self {
            ClientMessage::Connect { auth_token, .. }
            | ClientMessage::MakeMove { auth_token, .. }
            | ClientMessage::Leave { auth_token, .. }
            | ClientMessage::Resign { auth_token, .. } => auth_token,
        }
    }

    /// 目标对局
    pub fn game_id(&self) -> GameId {
        match self {
            ClientMessage::Connect { game_id, .. }
            | ClientMessage::MakeMove { game_id, .. }
            | ClientMessage::Leave { game_id, .. }
            | ClientMessage::Resign { game_id, .. } => *game_id,
        }
    }

    /// 命令名（日志用）
    pub fn command(&self) -> &'static str {
        match self {
            ClientMessage::Connect { .. } => "CONNECT",
            ClientMessage::MakeMove { .. } => "MAKE_MOVE",
            ClientMessage::Leave { .. } => "LEAVE",
            ClientMessage::Resign { .. } => "RESIGN",
        }
    }
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "serverMessageType",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// 完整对局状态
    LoadGame { game: Game },
    /// 文本通知
    Notification { message: String },
    /// 错误消息
    Error { error_message: String },
}

impl ServerMessage {
    pub fn load_game(game: Game) -> Self {
        ServerMessage::LoadGame { game }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        ServerMessage::Notification {
            message: message.into(),
        }
    }

    pub fn error(error_message: impl Into<String>) -> Self {
        ServerMessage::Error {
            error_message: error_message.into(),
        }
    }

    /// 消息类型名（日志用）
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::LoadGame { .. } => "LOAD_GAME",
            ServerMessage::Notification { .. } => "NOTIFICATION",
            ServerMessage::Error { .. } => "ERROR",
        }
    }
}

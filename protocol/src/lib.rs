//! 国际象棋共享协议库
//!
//! 包含:
//! - 棋子、棋盘、位置等核心数据结构
//! - 走法生成和对局状态机（将军、将死、逼和、易位、吃过路兵、升变）
//! - 消息类型定义 (ClientMessage, ServerMessage)
//! - 传输层抽象 (Connector, Connection, Listener traits)
//! - 帧编解码 (FrameReader, FrameWriter)
//! - 局面与走法格式 (FEN, 坐标记谱)

mod board;
mod constants;
mod error;
mod fen;
mod game;
mod message;
mod moves;
mod notation;
mod piece;
mod transport;

pub use board::Board;
pub use constants::*;
pub use error::{ChessError, ProtocolError, Result};
pub use fen::{Fen, INITIAL_FEN};
pub use game::{CastlingRights, Game, GameStatus, MoveOutcome};
pub use message::{ClientMessage, GameId, ServerMessage};
pub use moves::{Move, MoveGenerator};
pub use notation::Notation;
pub use piece::{Color, Piece, PieceKind, Position};
pub use transport::{
    Connection, Connector, FrameReader, FrameWriter, Listener, NetworkConfig, TcpConnection,
    TcpConnector, TcpListener,
};

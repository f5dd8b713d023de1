//! 坐标记谱法
//!
//! 格式：`<起始格><目标格>[升变]`，例如 `e2e4`、`e7e8q`。
//! 升变字母不区分大小写。

use crate::error::ChessError;
use crate::moves::Move;
use crate::piece::{Color, PieceKind, Position};

/// 坐标记谱法
pub struct Notation;

impl Notation {
    /// 将走法转换为坐标记谱
    pub fn to_coordinate(mv: &Move) -> String {
        let mut text = format!("{}{}", mv.from, mv.to);
        if let Some(kind) = mv.promotion {
            // 升变字母统一小写
            text.push(kind.to_fen_char(Color::Black));
        }
        text
    }

    /// 解析坐标记谱
    pub fn parse_move(text: &str) -> Result<Move, ChessError> {
        let invalid = || ChessError::InvalidNotation {
            text: text.to_string(),
        };

        let trimmed = text.trim();
        if !trimmed.is_ascii() || !(4..=5).contains(&trimmed.len()) {
            return Err(invalid());
        }

        let from = Position::parse(&trimmed[0..2]).ok_or_else(invalid)?;
        let to = Position::parse(&trimmed[2..4]).ok_or_else(invalid)?;

        let promotion = match trimmed[4..].chars().next() {
            None => None,
            Some(c) => {
                let (kind, _) = PieceKind::from_fen_char(c).ok_or_else(invalid)?;
                if !kind.is_promotion_target() {
                    return Err(invalid());
                }
                Some(kind)
            }
        };

        Ok(Move {
            from,
            to,
            promotion,
        })
    }
}

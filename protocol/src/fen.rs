//! FEN 格式解析和生成
//!
//! 国际象棋 FEN 格式：
//! `<棋盘> <走子方> <易位权> <吃过路兵目标格> <半回合计数> <回合数>`
//!
//! 示例：
//! `rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1`
//!
//! 后两个计数字段可以省略，解析时忽略。

use crate::board::Board;
use crate::constants::BOARD_SIZE;
use crate::error::ChessError;
use crate::game::{CastlingRights, Game};
use crate::piece::{Color, Piece, Position};

/// 初始局面 FEN
pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn invalid(reason: impl Into<String>) -> ChessError {
    ChessError::InvalidFen {
        reason: reason.into(),
    }
}

/// FEN 格式处理
pub struct Fen;

impl Fen {
    /// 解析 FEN 字符串为对局
    pub fn parse(fen: &str) -> Result<Game, ChessError> {
        let parts: Vec<&str> = fen.split_whitespace().collect();
        if parts.is_empty() {
            return Err(invalid("Empty FEN string"));
        }

        let board = Self::parse_board(parts[0])?;

        // 走子方（默认白方）
        let turn = match parts.get(1) {
            Some(field) => {
                let mut chars = field.chars();
                match (chars.next().and_then(Color::from_fen_char), chars.next()) {
                    (Some(color), None) => color,
                    _ => return Err(invalid(format!("Invalid side to move: {}", field))),
                }
            }
            None => Color::White,
        };

        let castling = match parts.get(2) {
            Some(field) => Self::parse_castling(field)?,
            None => CastlingRights::from_board(&board),
        };

        let en_passant = match parts.get(3) {
            Some(&"-") | None => None,
            Some(field) => Some(
                Position::parse(field)
                    .ok_or_else(|| invalid(format!("Invalid en passant square: {}", field)))?,
            ),
        };

        Ok(Game::with_state(board, turn, castling, en_passant))
    }

    /// 解析棋盘部分
    fn parse_board(board_str: &str) -> Result<Board, ChessError> {
        let mut board = Board::empty();
        let rows: Vec<&str> = board_str.split('/').collect();

        if rows.len() != BOARD_SIZE as usize {
            return Err(invalid(format!("Expected 8 rows, got {}", rows.len())));
        }

        // FEN 从上到下是第 8 行到第 1 行
        for (row_idx, row) in rows.iter().enumerate() {
            let rank = BOARD_SIZE - row_idx as u8;
            let mut col = 0u8;

            for c in row.chars() {
                if col >= BOARD_SIZE {
                    return Err(invalid(format!("Row {} has too many columns", row_idx)));
                }

                if let Some(empty_count) = c.to_digit(10) {
                    col += empty_count as u8;
                } else if let Some(piece) = Piece::from_fen_char(c) {
                    board.set(Position::new_unchecked(rank, col + 1), Some(piece));
                    col += 1;
                } else {
                    return Err(invalid(format!("Invalid piece character: {}", c)));
                }
            }

            if col != BOARD_SIZE {
                return Err(invalid(format!(
                    "Row {} has {} columns, expected 8",
                    row_idx, col
                )));
            }
        }

        Ok(board)
    }

    fn parse_castling(field: &str) -> Result<CastlingRights, ChessError> {
        let mut rights = CastlingRights::none();
        if field == "-" {
            return Ok(rights);
        }
        for c in field.chars() {
            match c {
                'K' => rights.white_kingside = true,
                'Q' => rights.white_queenside = true,
                'k' => rights.black_kingside = true,
                'q' => rights.black_queenside = true,
                _ => return Err(invalid(format!("Invalid castling flag: {}", c))),
            }
        }
        Ok(rights)
    }

    /// 将对局转换为 FEN 字符串（计数字段固定为 `0 1`）
    pub fn to_string(game: &Game) -> String {
        let en_passant = game
            .en_passant()
            .map(|pos| pos.to_string())
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{} {} {} {} 0 1",
            Self::board_to_string(game.board()),
            game.turn().to_fen_char(),
            Self::castling_to_string(game.castling()),
            en_passant
        )
    }

    fn castling_to_string(rights: CastlingRights) -> String {
        let flags: String = [
            (rights.white_kingside, 'K'),
            (rights.white_queenside, 'Q'),
            (rights.black_kingside, 'k'),
            (rights.black_queenside, 'q'),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, c)| *c)
        .collect();

        if flags.is_empty() {
            "-".to_string()
        } else {
            flags
        }
    }

    /// 将棋盘转换为 FEN 棋盘部分
    pub fn board_to_string(board: &Board) -> String {
        let mut rows = Vec::with_capacity(BOARD_SIZE as usize);

        for rank in (1..=BOARD_SIZE).rev() {
            let mut row = String::new();
            let mut empty_count = 0;

            for col in 1..=BOARD_SIZE {
                if let Some(piece) = board.get(Position::new_unchecked(rank, col)) {
                    if empty_count > 0 {
                        row.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    row.push(piece.to_fen_char());
                } else {
                    empty_count += 1;
                }
            }

            if empty_count > 0 {
                row.push_str(&empty_count.to_string());
            }

            rows.push(row);
        }

        rows.join("/")
    }
}

//! 棋盘

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{BOARD_SIZE, SQUARE_COUNT};
use crate::piece::{Color, Piece, PieceKind, Position};

/// 底线棋子排列（a 列到 h 列）
const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

/// 棋盘
///
/// 只负责存取，不做任何规则校验。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    /// 8x8 棋盘，索引为 (row - 1) * 8 + (col - 1)，使用 Vec 以支持 serde
    #[serde(deserialize_with = "deserialize_squares")]
    squares: Vec<Option<Piece>>,
}

/// 反序列化时要求恰好 64 格，之后的存取按下标直接访问
fn deserialize_squares<'de, D>(deserializer: D) -> Result<Vec<Option<Piece>>, D::Error>
where
    D: Deserializer<'de>,
{
    let squares = Vec::<Option<Piece>>::deserialize(deserializer)?;
    if squares.len() != SQUARE_COUNT {
        return Err(D::Error::invalid_length(
            squares.len(),
            &"exactly 64 squares",
        ));
    }
    Ok(squares)
}

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            squares: vec![None; SQUARE_COUNT],
        }
    }

    /// 创建标准初始棋盘
    pub fn standard() -> Self {
        let mut board = Self::empty();
        board.reset();
        board
    }

    /// 重置为标准初始局面
    pub fn reset(&mut self) {
        self.squares = vec![None; SQUARE_COUNT];

        for color in [Color::White, Color::Black] {
            let home = color.home_rank();
            let pawns = color.pawn_start_rank();
            for (i, kind) in BACK_RANK.iter().enumerate() {
                let col = i as u8 + 1;
                self.set(Position::new_unchecked(home, col), Some(Piece::new(color, *kind)));
                self.set(
                    Position::new_unchecked(pawns, col),
                    Some(Piece::new(color, PieceKind::Pawn)),
                );
            }
        }
    }

    /// 获取指定位置的棋子
    pub fn get(&self, pos: Position) -> Option<Piece> {
        if pos.is_valid() {
            self.squares[pos.to_index()]
        } else {
            None
        }
    }

    /// 设置指定位置的棋子
    pub fn set(&mut self, pos: Position, piece: Option<Piece>) {
        if pos.is_valid() {
            self.squares[pos.to_index()] = piece;
        }
    }

    /// 移动棋子（不检查规则），返回被吃的棋子
    pub fn move_piece(&mut self, from: Position, to: Position) -> Option<Piece> {
        let piece = self.get(from);
        let captured = self.get(to);
        self.set(from, None);
        self.set(to, piece);
        captured
    }

    /// 查找指定阵营的王
    pub fn find_king(&self, color: Color) -> Option<Position> {
        self.squares
            .iter()
            .position(|sq| matches!(sq, Some(p) if p.is(color, PieceKind::King)))
            .and_then(Position::from_index)
    }

    /// 获取指定阵营的所有棋子位置
    pub fn pieces(&self, color: Color) -> Vec<(Position, Piece)> {
        self.all_pieces()
            .into_iter()
            .filter(|(_, piece)| piece.color == color)
            .collect()
    }

    /// 获取所有棋子
    pub fn all_pieces(&self) -> Vec<(Position, Piece)> {
        self.squares
            .iter()
            .enumerate()
            .filter_map(|(index, sq)| {
                let piece = (*sq)?;
                Position::from_index(index).map(|pos| (pos, piece))
            })
            .collect()
    }

    /// 检查一段同行格子（不含两端）是否全部为空
    pub fn is_row_clear(&self, row: u8, from_col: u8, to_col: u8) -> bool {
        let (lo, hi) = if from_col < to_col {
            (from_col, to_col)
        } else {
            (to_col, from_col)
        };
        ((lo + 1)..hi)
            .filter(|col| *col <= BOARD_SIZE)
            .all(|col| self.get(Position::new_unchecked(row, col)).is_none())
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

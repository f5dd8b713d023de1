//! 走法生成
//!
//! 这一层只处理棋子几何走法和阻挡/吃子规则（伪合法走法），
//! 不关心回合、将军、王车易位和吃过路兵，这些由 [`crate::Game`] 组合。

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::notation::Notation;
use crate::piece::{Color, Piece, PieceKind, Position};

/// 走法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// 起始位置
    #[serde(rename = "start")]
    pub from: Position,
    /// 目标位置
    #[serde(rename = "end")]
    pub to: Position,
    /// 升变目标（仅兵到达底线时）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceKind>,
}

impl Move {
    /// 创建新走法
    pub fn new(from: Position, to: Position) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    /// 创建带升变的走法
    pub fn with_promotion(from: Position, to: Position, promotion: PieceKind) -> Self {
        Self {
            from,
            to,
            promotion: Some(promotion),
        }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&Notation::to_coordinate(self))
    }
}

impl std::str::FromStr for Move {
    type Err = crate::error::ChessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Notation::parse_move(s)
    }
}

const ROOK_DIRECTIONS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

const QUEEN_DIRECTIONS: [(i8, i8); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (2, 1),
    (2, -1),
    (-2, 1),
    (-2, -1),
    (1, 2),
    (1, -2),
    (-1, 2),
    (-1, -2),
];

const KING_OFFSETS: [(i8, i8); 8] = QUEEN_DIRECTIONS;

/// 走法生成器
pub struct MoveGenerator;

impl MoveGenerator {
    /// 生成指定格子上棋子的所有伪合法走法（不考虑将军）
    pub fn piece_moves(board: &Board, pos: Position) -> Vec<Move> {
        let mut moves = Vec::with_capacity(28);
        if let Some(piece) = board.get(pos) {
            Self::generate_piece_moves(board, pos, piece, &mut moves);
        }
        moves
    }

    fn generate_piece_moves(board: &Board, pos: Position, piece: Piece, moves: &mut Vec<Move>) {
        match piece.kind {
            PieceKind::King => Self::generate_offset_moves(board, pos, piece.color, &KING_OFFSETS, moves),
            PieceKind::Knight => {
                Self::generate_offset_moves(board, pos, piece.color, &KNIGHT_OFFSETS, moves)
            }
            PieceKind::Queen => {
                Self::generate_sliding_moves(board, pos, piece.color, &QUEEN_DIRECTIONS, moves)
            }
            PieceKind::Rook => {
                Self::generate_sliding_moves(board, pos, piece.color, &ROOK_DIRECTIONS, moves)
            }
            PieceKind::Bishop => {
                Self::generate_sliding_moves(board, pos, piece.color, &BISHOP_DIRECTIONS, moves)
            }
            PieceKind::Pawn => Self::generate_pawn_moves(board, pos, piece.color, moves),
        }
    }

    /// 滑行棋子（车、象、后）：沿方向逐格前进，遇子即停
    fn generate_sliding_moves(
        board: &Board,
        pos: Position,
        color: Color,
        directions: &[(i8, i8)],
        moves: &mut Vec<Move>,
    ) {
        for &(dr, dc) in directions {
            let mut current = pos;
            while let Some(to) = current.offset(dr, dc) {
                if let Some(target) = board.get(to) {
                    if target.color != color {
                        moves.push(Move::new(pos, to));
                    }
                    break;
                }
                moves.push(Move::new(pos, to));
                current = to;
            }
        }
    }

    /// 固定偏移棋子（马、王）
    fn generate_offset_moves(
        board: &Board,
        pos: Position,
        color: Color,
        offsets: &[(i8, i8)],
        moves: &mut Vec<Move>,
    ) {
        for &(dr, dc) in offsets {
            if let Some(to) = pos.offset(dr, dc) {
                Self::try_add_move(board, pos, to, color, moves);
            }
        }
    }

    fn generate_pawn_moves(board: &Board, pos: Position, color: Color, moves: &mut Vec<Move>) {
        let forward = color.pawn_direction();

        // 前进一格，起始行可再进一格
        if let Some(one) = pos.offset(forward, 0) {
            if board.get(one).is_none() {
                Self::push_pawn_move(pos, one, color, moves);

                if pos.row == color.pawn_start_rank() {
                    if let Some(two) = one.offset(forward, 0) {
                        if board.get(two).is_none() {
                            moves.push(Move::new(pos, two));
                        }
                    }
                }
            }
        }

        // 斜向吃子
        for dc in [-1i8, 1i8] {
            if let Some(to) = pos.offset(forward, dc) {
                if matches!(board.get(to), Some(target) if target.color != color) {
                    Self::push_pawn_move(pos, to, color, moves);
                }
            }
        }
    }

    /// 到达底线时展开为四种升变
    fn push_pawn_move(from: Position, to: Position, color: Color, moves: &mut Vec<Move>) {
        if to.row == color.promotion_rank() {
            for kind in PieceKind::PROMOTIONS {
                moves.push(Move::with_promotion(from, to, kind));
            }
        } else {
            moves.push(Move::new(from, to));
        }
    }

    /// 尝试添加走法（目标为空或为敌方棋子）
    fn try_add_move(board: &Board, from: Position, to: Position, color: Color, moves: &mut Vec<Move>) {
        match board.get(to) {
            Some(target) if target.color == color => {}
            _ => moves.push(Move::new(from, to)),
        }
    }

    /// 检查 `from` 上的棋子能否走到 `target`
    pub fn attacks(board: &Board, from: Position, target: Position) -> bool {
        Self::piece_moves(board, from)
            .iter()
            .any(|mv| mv.to == target)
    }

    /// 检查格子是否被指定阵营攻击
    pub fn is_square_attacked(board: &Board, square: Position, by: Color) -> bool {
        board
            .pieces(by)
            .into_iter()
            .any(|(pos, _)| Self::attacks(board, pos, square))
    }

    /// 检查指定阵营是否被将军
    ///
    /// 棋盘上没有该阵营的王时视为未被将军（测试局面允许缺王）。
    pub fn is_in_check(board: &Board, color: Color) -> bool {
        match board.find_king(color) {
            Some(king_pos) => Self::is_square_attacked(board, king_pos, color.opponent()),
            None => false,
        }
    }
}

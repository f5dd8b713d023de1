//! 对局状态机
//!
//! 持有棋盘、行棋方、易位权、吃过路兵目标格和对局状态。
//! 棋盘只能通过 [`Game::apply_move`] 修改，合法性探测在棋盘副本上进行。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::ChessError;
use crate::moves::{Move, MoveGenerator};
use crate::piece::{Color, Piece, PieceKind, Position};

/// 王的初始列（e 列）
const KING_FILE: u8 = 5;

/// 易位方向：(车的初始列, 王的目标列, 王经过的列, 车的目标列)
const KINGSIDE: (u8, u8, u8, u8) = (8, 7, 6, 6);
const QUEENSIDE: (u8, u8, u8, u8) = (1, 3, 4, 4);

/// 易位权
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    /// 全部保留
    pub fn all() -> Self {
        Self {
            white_kingside: true,
            white_queenside: true,
            black_kingside: true,
            black_queenside: true,
        }
    }

    /// 全部失去
    pub fn none() -> Self {
        Self {
            white_kingside: false,
            white_queenside: false,
            black_kingside: false,
            black_queenside: false,
        }
    }

    /// 根据棋子摆放推导：王和对应的车都在初始格时保留
    pub fn from_board(board: &Board) -> Self {
        let at_home = |color: Color, col: u8, kind: PieceKind| {
            matches!(
                board.get(Position::new_unchecked(color.home_rank(), col)),
                Some(p) if p.is(color, kind)
            )
        };
        let side = |color: Color, rook_col: u8| {
            at_home(color, KING_FILE, PieceKind::King) && at_home(color, rook_col, PieceKind::Rook)
        };
        Self {
            white_kingside: side(Color::White, KINGSIDE.0),
            white_queenside: side(Color::White, QUEENSIDE.0),
            black_kingside: side(Color::Black, KINGSIDE.0),
            black_queenside: side(Color::Black, QUEENSIDE.0),
        }
    }

    pub fn kingside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_kingside,
            Color::Black => self.black_kingside,
        }
    }

    pub fn queenside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_queenside,
            Color::Black => self.black_queenside,
        }
    }

    /// 清除某方全部易位权（王走动后）
    fn clear(&mut self, color: Color) {
        match color {
            Color::White => {
                self.white_kingside = false;
                self.white_queenside = false;
            }
            Color::Black => {
                self.black_kingside = false;
                self.black_queenside = false;
            }
        }
    }

    /// 某个车的初始格被离开或被占据后，对应的易位权永久失去
    fn touch(&mut self, square: Position) {
        for color in [Color::White, Color::Black] {
            if square.row != color.home_rank() {
                continue;
            }
            let (kingside, queenside) = match color {
                Color::White => (&mut self.white_kingside, &mut self.white_queenside),
                Color::Black => (&mut self.black_kingside, &mut self.black_queenside),
            };
            if square.col == KINGSIDE.0 {
                *kingside = false;
            } else if square.col == QUEENSIDE.0 {
                *queenside = false;
            }
        }
    }
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self::all()
    }
}

/// 对局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// 尚未走棋
    Fresh,
    /// 进行中
    InProgress,
    /// 将死
    Checkmate { winner: Color },
    /// 逼和
    Stalemate,
    /// 认输
    Resigned { winner: Color },
}

impl GameStatus {
    /// 是否已结束
    pub fn is_over(&self) -> bool {
        matches!(
            self,
            GameStatus::Checkmate { .. } | GameStatus::Stalemate | GameStatus::Resigned { .. }
        )
    }

    /// 胜方（和棋或未结束时为 None）
    pub fn winner(&self) -> Option<Color> {
        match self {
            GameStatus::Checkmate { winner } | GameStatus::Resigned { winner } => Some(*winner),
            _ => None,
        }
    }
}

/// 一步棋的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// 走法
    pub mv: Move,
    /// 走棋的一方
    pub mover: Color,
    /// 被吃的棋子（含吃过路兵）
    pub captured: Option<Piece>,
    /// 走完后对方是否被将军
    pub check: bool,
    /// 走完后的对局状态
    pub status: GameStatus,
}

/// 对局
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    board: Board,
    turn: Color,
    castling: CastlingRights,
    en_passant: Option<Position>,
    status: GameStatus,
}

impl Game {
    /// 标准开局，白方先走
    pub fn new() -> Self {
        Self {
            board: Board::standard(),
            turn: Color::White,
            castling: CastlingRights::all(),
            en_passant: None,
            status: GameStatus::Fresh,
        }
    }

    /// 从任意局面构造（测试用），易位权由棋子摆放推导
    pub fn from_parts(board: Board, turn: Color) -> Self {
        let castling = CastlingRights::from_board(&board);
        Self::with_state(board, turn, castling, None)
    }

    /// 从完整状态构造（FEN 解析用）
    pub(crate) fn with_state(
        board: Board,
        turn: Color,
        castling: CastlingRights,
        en_passant: Option<Position>,
    ) -> Self {
        Self {
            board,
            turn,
            castling,
            en_passant,
            status: GameStatus::Fresh,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// 当前行棋方
    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn castling(&self) -> CastlingRights {
        self.castling
    }

    /// 吃过路兵目标格（仅在对方刚走完两格兵之后的一步内有效）
    pub fn en_passant(&self) -> Option<Position> {
        self.en_passant
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_over(&self) -> bool {
        self.status.is_over()
    }

    /// 指定格子上棋子的合法走法
    ///
    /// 伪合法走法加上吃过路兵和易位候选，再过滤掉走后己方王被将军的走法。
    pub fn legal_moves(&self, pos: Position) -> HashSet<Move> {
        let Some(piece) = self.board.get(pos) else {
            return HashSet::new();
        };

        let mut candidates = MoveGenerator::piece_moves(&self.board, pos);
        self.en_passant_candidates(pos, piece, &mut candidates);
        self.castling_candidates(pos, piece, &mut candidates);

        candidates
            .into_iter()
            .filter(|mv| {
                let mut probe = self.board.clone();
                play(&mut probe, mv, self.en_passant);
                !MoveGenerator::is_in_check(&probe, piece.color)
            })
            .collect()
    }

    /// 指定阵营的全部合法走法
    pub fn all_legal_moves(&self, color: Color) -> HashSet<Move> {
        self.board
            .pieces(color)
            .into_iter()
            .flat_map(|(pos, _)| self.legal_moves(pos))
            .collect()
    }

    fn has_no_legal_moves(&self, color: Color) -> bool {
        self.board
            .pieces(color)
            .into_iter()
            .all(|(pos, _)| self.legal_moves(pos).is_empty())
    }

    /// 是否被将军
    pub fn is_in_check(&self, color: Color) -> bool {
        MoveGenerator::is_in_check(&self.board, color)
    }

    /// 是否被将死
    pub fn is_in_checkmate(&self, color: Color) -> bool {
        self.is_in_check(color) && self.has_no_legal_moves(color)
    }

    /// 是否逼和
    pub fn is_in_stalemate(&self, color: Color) -> bool {
        !self.is_in_check(color) && self.has_no_legal_moves(color)
    }

    /// 执行走法
    ///
    /// 失败时对局保持不变。
    pub fn apply_move(&mut self, mv: Move) -> Result<MoveOutcome, ChessError> {
        if self.status.is_over() {
            return Err(ChessError::GameOver);
        }

        let piece = self
            .board
            .get(mv.from)
            .ok_or(ChessError::NoPiece { pos: mv.from })?;

        if piece.color != self.turn {
            return Err(ChessError::NotYourTurn);
        }

        // 易位条件在这里重新验证一遍
        if !self.legal_moves(mv.from).contains(&mv) {
            return Err(ChessError::InvalidMove { mv });
        }

        let captured = play(&mut self.board, &mv, self.en_passant);

        if piece.kind == PieceKind::King {
            self.castling.clear(piece.color);
        }
        self.castling.touch(mv.from);
        self.castling.touch(mv.to);

        self.en_passant = match piece.kind {
            PieceKind::Pawn if mv.from.row.abs_diff(mv.to.row) == 2 => {
                Some(Position::new_unchecked((mv.from.row + mv.to.row) / 2, mv.from.col))
            }
            _ => None,
        };

        self.turn = piece.color.opponent();

        let check = self.is_in_check(self.turn);
        let stuck = self.has_no_legal_moves(self.turn);
        self.status = match (check, stuck) {
            (true, true) => GameStatus::Checkmate {
                winner: piece.color,
            },
            (false, true) => GameStatus::Stalemate,
            _ => GameStatus::InProgress,
        };

        Ok(MoveOutcome {
            mv,
            mover: piece.color,
            captured,
            check,
            status: self.status,
        })
    }

    /// 返回执行走法后的新局面，自身不变
    pub fn after_move(&self, mv: Move) -> Result<Game, ChessError> {
        let mut next = self.clone();
        next.apply_move(mv)?;
        Ok(next)
    }

    /// 认输
    pub fn resign(&mut self, color: Color) -> Result<(), ChessError> {
        if self.status.is_over() {
            return Err(ChessError::GameOver);
        }
        self.status = GameStatus::Resigned {
            winner: color.opponent(),
        };
        Ok(())
    }

    fn en_passant_candidates(&self, pos: Position, piece: Piece, moves: &mut Vec<Move>) {
        let Some(target) = self.en_passant else {
            return;
        };
        if piece.kind != PieceKind::Pawn || piece.color != self.turn {
            return;
        }
        if pos.offset(piece.color.pawn_direction(), 0).map(|p| p.row) != Some(target.row)
            || pos.col.abs_diff(target.col) != 1
        {
            return;
        }

        let passed = Position::new_unchecked(pos.row, target.col);
        if matches!(
            self.board.get(passed),
            Some(p) if p.is(piece.color.opponent(), PieceKind::Pawn)
        ) {
            moves.push(Move::new(pos, target));
        }
    }

    fn castling_candidates(&self, pos: Position, piece: Piece, moves: &mut Vec<Move>) {
        let color = piece.color;
        let home = Position::new_unchecked(color.home_rank(), KING_FILE);
        if piece.kind != PieceKind::King || pos != home {
            return;
        }
        if MoveGenerator::is_in_check(&self.board, color) {
            return;
        }

        let sides = [
            (self.castling.kingside(color), KINGSIDE),
            (self.castling.queenside(color), QUEENSIDE),
        ];
        for (allowed, (rook_col, king_to, pass_col, _)) in sides {
            if !allowed {
                continue;
            }
            let rook_at = Position::new_unchecked(home.row, rook_col);
            if !matches!(self.board.get(rook_at), Some(p) if p.is(color, PieceKind::Rook)) {
                continue;
            }
            if !self.board.is_row_clear(home.row, KING_FILE, rook_col) {
                continue;
            }

            // 模拟王走一格到经过的格子
            let mut probe = self.board.clone();
            probe.move_piece(home, Position::new_unchecked(home.row, pass_col));
            if MoveGenerator::is_in_check(&probe, color) {
                continue;
            }

            moves.push(Move::new(home, Position::new_unchecked(home.row, king_to)));
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

/// 在棋盘上完整执行一步棋（含吃过路兵、升变和易位的车），返回被吃的棋子
fn play(board: &mut Board, mv: &Move, en_passant: Option<Position>) -> Option<Piece> {
    let piece = board.get(mv.from)?;
    board.set(mv.from, None);

    let mut captured = board.get(mv.to);

    if piece.kind == PieceKind::Pawn
        && captured.is_none()
        && mv.from.col != mv.to.col
        && en_passant == Some(mv.to)
    {
        let passed = Position::new_unchecked(mv.from.row, mv.to.col);
        captured = board.get(passed);
        board.set(passed, None);
    }

    let placed = match (piece.kind, mv.promotion) {
        (PieceKind::Pawn, Some(kind)) => Piece::new(piece.color, kind),
        _ => piece,
    };
    board.set(mv.to, Some(placed));

    if piece.kind == PieceKind::King && mv.from.col.abs_diff(mv.to.col) == 2 {
        let (rook_col, _, _, rook_to) = if mv.to.col > mv.from.col {
            KINGSIDE
        } else {
            QUEENSIDE
        };
        board.move_piece(
            Position::new_unchecked(mv.from.row, rook_col),
            Position::new_unchecked(mv.from.row, rook_to),
        );
    }

    captured
}

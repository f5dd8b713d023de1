//! 棋子定义

use serde::{Deserialize, Serialize};

use crate::constants::BOARD_SIZE;

/// 棋子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    /// 兵升变可选的棋子（按常用程度排列）
    pub const PROMOTIONS: [PieceKind; 4] = [
        PieceKind::Queen,
        PieceKind::Rook,
        PieceKind::Bishop,
        PieceKind::Knight,
    ];

    /// 获取 FEN 字符（白方大写，黑方小写）
    pub fn to_fen_char(&self, color: Color) -> char {
        let c = match self {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        };
        match color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<(PieceKind, Color)> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let kind = match c.to_ascii_lowercase() {
            'k' => PieceKind::King,
            'q' => PieceKind::Queen,
            'r' => PieceKind::Rook,
            'b' => PieceKind::Bishop,
            'n' => PieceKind::Knight,
            'p' => PieceKind::Pawn,
            _ => return None,
        };
        Some((kind, color))
    }

    /// 是否可以作为升变目标
    pub fn is_promotion_target(&self) -> bool {
        Self::PROMOTIONS.contains(self)
    }
}

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Color {
    /// 白方（先手，在下方）
    White,
    /// 黑方（后手，在上方）
    Black,
}

impl Color {
    /// 获取对方阵营
    pub fn opponent(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// 底线（王和车的初始行）
    pub fn home_rank(&self) -> u8 {
        match self {
            Color::White => 1,
            Color::Black => BOARD_SIZE,
        }
    }

    /// 兵的前进方向
    pub fn pawn_direction(&self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    /// 兵的初始行
    pub fn pawn_start_rank(&self) -> u8 {
        match self {
            Color::White => 2,
            Color::Black => BOARD_SIZE - 1,
        }
    }

    /// 兵的升变行
    pub fn promotion_rank(&self) -> u8 {
        self.opponent().home_rank()
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(&self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<Color> {
        match c {
            'w' | 'W' => Some(Color::White),
            'b' | 'B' => Some(Color::Black),
            _ => None,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// 棋子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

impl Piece {
    /// 创建新棋子
    pub fn new(color: Color, kind: PieceKind) -> Self {
        Self { color, kind }
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(&self) -> char {
        self.kind.to_fen_char(self.color)
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<Piece> {
        PieceKind::from_fen_char(c).map(|(kind, color)| Piece { color, kind })
    }

    /// 是否为指定阵营的指定棋子
    pub fn is(&self, color: Color, kind: PieceKind) -> bool {
        self.color == color && self.kind == kind
    }
}

/// 棋盘位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 行 (1-8)，白方底线为 1
    pub row: u8,
    /// 列 (1-8)，a 列为 1
    pub col: u8,
}

impl Position {
    /// 创建新位置
    pub fn new(row: u8, col: u8) -> Option<Self> {
        let pos = Self { row, col };
        pos.is_valid().then_some(pos)
    }

    /// 创建新位置（不检查边界，内部使用）
    pub const fn new_unchecked(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// 检查位置是否在棋盘内
    pub fn is_valid(&self) -> bool {
        (1..=BOARD_SIZE).contains(&self.row) && (1..=BOARD_SIZE).contains(&self.col)
    }

    /// 获取偏移后的位置
    pub fn offset(&self, dr: i8, dc: i8) -> Option<Position> {
        let row = self.row as i8 + dr;
        let col = self.col as i8 + dc;
        if (1..=BOARD_SIZE as i8).contains(&row) && (1..=BOARD_SIZE as i8).contains(&col) {
            Some(Position {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    /// 转换为数组索引
    pub fn to_index(&self) -> usize {
        (self.row as usize - 1) * BOARD_SIZE as usize + (self.col as usize - 1)
    }

    /// 从数组索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        let size = BOARD_SIZE as usize;
        if index < size * size {
            Some(Position {
                row: (index / size) as u8 + 1,
                col: (index % size) as u8 + 1,
            })
        } else {
            None
        }
    }

    /// 解析代数坐标，例如 "e4"
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let file = chars.next()?;
        let rank = chars.next()?;
        if chars.next().is_some() || !('a'..='h').contains(&file) {
            return None;
        }
        let row = rank.to_digit(10)? as u8;
        Position::new(row, file as u8 - b'a' + 1)
    }

    /// 列字母 (a-h)
    pub fn file_char(&self) -> char {
        (b'a' + self.col - 1) as char
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}{}", self.file_char(), self.row)
        } else {
            write!(f, "({}, {})", self.row, self.col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_fen_char() {
        let white_king = Piece::new(Color::White, PieceKind::King);
        assert_eq!(white_king.to_fen_char(), 'K');

        let black_knight = Piece::new(Color::Black, PieceKind::Knight);
        assert_eq!(black_knight.to_fen_char(), 'n');

        assert_eq!(
            Piece::from_fen_char('R'),
            Some(Piece::new(Color::White, PieceKind::Rook))
        );
        assert_eq!(Piece::from_fen_char('x'), None);
    }

    #[test]
    fn test_position_valid() {
        assert!(Position::new(1, 1).is_some());
        assert!(Position::new(8, 8).is_some());
        assert!(Position::new(0, 1).is_none());
        assert!(Position::new(1, 9).is_none());
    }

    #[test]
    fn test_position_offset() {
        let pos = Position::new_unchecked(1, 1);
        assert_eq!(pos.offset(1, 2), Some(Position::new_unchecked(2, 3)));
        assert_eq!(pos.offset(-1, 0), None);
        assert_eq!(Position::new_unchecked(8, 8).offset(0, 1), None);
    }

    #[test]
    fn test_position_index() {
        for index in 0..64 {
            let pos = Position::from_index(index).unwrap();
            assert!(pos.is_valid());
            assert_eq!(pos.to_index(), index);
        }
        assert!(Position::from_index(64).is_none());
    }

    #[test]
    fn test_position_algebraic() {
        let e4 = Position::parse("e4").unwrap();
        assert_eq!(e4, Position::new_unchecked(4, 5));
        assert_eq!(e4.to_string(), "e4");

        assert!(Position::parse("i1").is_none());
        assert!(Position::parse("a9").is_none());
        assert!(Position::parse("a10").is_none());
    }

    #[test]
    fn test_color_ranks() {
        assert_eq!(Color::White.opponent(), Color::Black);
        assert_eq!(Color::White.home_rank(), 1);
        assert_eq!(Color::Black.pawn_start_rank(), 7);
        assert_eq!(Color::White.promotion_rank(), 8);
        assert_eq!(Color::Black.promotion_rank(), 1);
    }
}

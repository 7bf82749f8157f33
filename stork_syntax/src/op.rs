use std::fmt::Display;

/// Binary operators. Stork itself only lexes the arithmetic ones;
/// the comparisons and floor division exist for the host sandbox.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Plus,
    Minus,
    Star,
    Slash,
    FloorSlash,
    Modulo,
    EqualEqual,
    BangEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::FloorSlash => "//",
            Self::Modulo => "%",
            Self::EqualEqual => "==",
            Self::BangEqual => "!=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::LessEqual => "<=",
        })
    }
}

impl BinOp {
    pub fn from_lexeme(op: &str) -> Option<Self> {
        let op = match op {
            "+" => Self::Plus,
            "-" => Self::Minus,
            "*" => Self::Star,
            "/" => Self::Slash,
            "//" => Self::FloorSlash,
            "%" => Self::Modulo,
            "==" => Self::EqualEqual,
            "!=" => Self::BangEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterEqual,
            "<" => Self::Less,
            "<=" => Self::LessEqual,
            _ => return None,
        };
        Some(op)
    }

    /// `+` and `-`, folded inside an atom
    pub fn is_additive(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    /// `*`, `/` and `%`, folded across atoms
    pub fn is_multiplicative(&self) -> bool {
        matches!(self, Self::Star | Self::Slash | Self::Modulo)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::EqualEqual
                | Self::BangEqual
                | Self::Greater
                | Self::GreaterEqual
                | Self::Less
                | Self::LessEqual
        )
    }
}

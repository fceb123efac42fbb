//! Compiled instructions
//!
//! A statement is a flat run of [`Token`]s whose first token names the
//! command. Tokens are produced once by the compiler and are immutable
//! afterwards; the only per-run state (block jump targets) lives beside
//! the statements in [`Program`](crate::program::Program).

use std::fmt;
use std::sync::Arc;

use lin_alg::f64::Vec3;
use molscript_select::{AtomProperty, BondProperty, CompareOp, Selection};
use phf::phf_map;

use crate::functions::ScriptFunction;

/// Operators of the math and selection expression languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Or,
    Xor,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Times,
    Divide,
    IntDivide,
    Modulo,
    Power,
}

impl Operator {
    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Or | Operator::Xor => 1,
            Operator::And => 2,
            Operator::Not => 3,
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Le
            | Operator::Gt
            | Operator::Ge => 4,
            Operator::Plus | Operator::Minus => 5,
            Operator::Times | Operator::Divide | Operator::IntDivide | Operator::Modulo => 6,
            Operator::Power => 8,
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, Operator::Power)
    }

    /// Comparison operator equivalent, if any
    pub fn comparison(self) -> Option<CompareOp> {
        match self {
            Operator::Eq => Some(CompareOp::Eq),
            Operator::Ne => Some(CompareOp::Ne),
            Operator::Lt => Some(CompareOp::Lt),
            Operator::Le => Some(CompareOp::Le),
            Operator::Gt => Some(CompareOp::Gt),
            Operator::Ge => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Or => "or",
            Operator::Xor => "xor",
            Operator::And => "and",
            Operator::Not => "not",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Times => "*",
            Operator::Divide => "/",
            Operator::IntDivide => "\\",
            Operator::Modulo => "%",
            Operator::Power => "**",
        }
    }
}

/// Script commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    // flow
    If,
    ElseIf,
    Else,
    End,
    While,
    For,
    Break,
    Continue,
    Function,
    Return,
    Exit,
    Goto,
    Message,
    // scripting
    Script,
    Pause,
    Resume,
    Step,
    Delay,
    // variables
    Var,
    Assign,
    Set,
    Reset,
    Define,
    Subset,
    // selection and display
    Select,
    Restrict,
    Display,
    Hide,
    Delete,
    // output
    Print,
    Echo,
    Show,
    // scene
    Load,
    Zap,
    Color,
    Label,
    Spacefill,
    Wireframe,
    Center,
    Zoom,
    Rotate,
    Translate,
    Refresh,
    Draw,
    Isosurface,
    Measure,
    // state
    Save,
    Restore,
    History,
}

/// Every command kind, in declaration order
pub const ALL_COMMANDS: &[CommandKind] = &[
    CommandKind::If,
    CommandKind::ElseIf,
    CommandKind::Else,
    CommandKind::End,
    CommandKind::While,
    CommandKind::For,
    CommandKind::Break,
    CommandKind::Continue,
    CommandKind::Function,
    CommandKind::Return,
    CommandKind::Exit,
    CommandKind::Goto,
    CommandKind::Message,
    CommandKind::Script,
    CommandKind::Pause,
    CommandKind::Resume,
    CommandKind::Step,
    CommandKind::Delay,
    CommandKind::Var,
    CommandKind::Assign,
    CommandKind::Set,
    CommandKind::Reset,
    CommandKind::Define,
    CommandKind::Subset,
    CommandKind::Select,
    CommandKind::Restrict,
    CommandKind::Display,
    CommandKind::Hide,
    CommandKind::Delete,
    CommandKind::Print,
    CommandKind::Echo,
    CommandKind::Show,
    CommandKind::Load,
    CommandKind::Zap,
    CommandKind::Color,
    CommandKind::Label,
    CommandKind::Spacefill,
    CommandKind::Wireframe,
    CommandKind::Center,
    CommandKind::Zoom,
    CommandKind::Rotate,
    CommandKind::Translate,
    CommandKind::Refresh,
    CommandKind::Draw,
    CommandKind::Isosurface,
    CommandKind::Measure,
    CommandKind::Save,
    CommandKind::Restore,
    CommandKind::History,
];

/// Command keywords (including aliases)
pub static COMMANDS: phf::Map<&'static str, CommandKind> = phf_map! {
    "if" => CommandKind::If,
    "elseif" => CommandKind::ElseIf,
    "else" => CommandKind::Else,
    "end" => CommandKind::End,
    "endif" => CommandKind::End,
    "while" => CommandKind::While,
    "for" => CommandKind::For,
    "break" => CommandKind::Break,
    "continue" => CommandKind::Continue,
    "function" => CommandKind::Function,
    "return" => CommandKind::Return,
    "exit" => CommandKind::Exit,
    "quit" => CommandKind::Exit,
    "goto" => CommandKind::Goto,
    "message" => CommandKind::Message,
    "script" => CommandKind::Script,
    "source" => CommandKind::Script,
    "pause" => CommandKind::Pause,
    "resume" => CommandKind::Resume,
    "step" => CommandKind::Step,
    "delay" => CommandKind::Delay,
    "var" => CommandKind::Var,
    "set" => CommandKind::Set,
    "reset" => CommandKind::Reset,
    "define" => CommandKind::Define,
    "subset" => CommandKind::Subset,
    "select" => CommandKind::Select,
    "restrict" => CommandKind::Restrict,
    "display" => CommandKind::Display,
    "hide" => CommandKind::Hide,
    "delete" => CommandKind::Delete,
    "print" => CommandKind::Print,
    "echo" => CommandKind::Echo,
    "show" => CommandKind::Show,
    "load" => CommandKind::Load,
    "zap" => CommandKind::Zap,
    "color" => CommandKind::Color,
    "colour" => CommandKind::Color,
    "label" => CommandKind::Label,
    "spacefill" => CommandKind::Spacefill,
    "cpk" => CommandKind::Spacefill,
    "wireframe" => CommandKind::Wireframe,
    "center" => CommandKind::Center,
    "centre" => CommandKind::Center,
    "zoom" => CommandKind::Zoom,
    "rotate" => CommandKind::Rotate,
    "translate" => CommandKind::Translate,
    "refresh" => CommandKind::Refresh,
    "draw" => CommandKind::Draw,
    "isosurface" => CommandKind::Isosurface,
    "measure" => CommandKind::Measure,
    "save" => CommandKind::Save,
    "restore" => CommandKind::Restore,
    "history" => CommandKind::History,
};

/// Look up a command keyword (case-insensitive)
pub fn lookup_command(word: &str) -> Option<CommandKind> {
    COMMANDS.get(word.to_ascii_lowercase().as_str()).copied()
}

impl CommandKind {
    /// Canonical keyword
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::If => "if",
            CommandKind::ElseIf => "elseif",
            CommandKind::Else => "else",
            CommandKind::End => "end",
            CommandKind::While => "while",
            CommandKind::For => "for",
            CommandKind::Break => "break",
            CommandKind::Continue => "continue",
            CommandKind::Function => "function",
            CommandKind::Return => "return",
            CommandKind::Exit => "exit",
            CommandKind::Goto => "goto",
            CommandKind::Message => "message",
            CommandKind::Script => "script",
            CommandKind::Pause => "pause",
            CommandKind::Resume => "resume",
            CommandKind::Step => "step",
            CommandKind::Delay => "delay",
            CommandKind::Var => "var",
            CommandKind::Assign => "set",
            CommandKind::Set => "set",
            CommandKind::Reset => "reset",
            CommandKind::Define => "define",
            CommandKind::Subset => "subset",
            CommandKind::Select => "select",
            CommandKind::Restrict => "restrict",
            CommandKind::Display => "display",
            CommandKind::Hide => "hide",
            CommandKind::Delete => "delete",
            CommandKind::Print => "print",
            CommandKind::Echo => "echo",
            CommandKind::Show => "show",
            CommandKind::Load => "load",
            CommandKind::Zap => "zap",
            CommandKind::Color => "color",
            CommandKind::Label => "label",
            CommandKind::Spacefill => "spacefill",
            CommandKind::Wireframe => "wireframe",
            CommandKind::Center => "center",
            CommandKind::Zoom => "zoom",
            CommandKind::Rotate => "rotate",
            CommandKind::Translate => "translate",
            CommandKind::Refresh => "refresh",
            CommandKind::Draw => "draw",
            CommandKind::Isosurface => "isosurface",
            CommandKind::Measure => "measure",
            CommandKind::Save => "save",
            CommandKind::Restore => "restore",
            CommandKind::History => "history",
        }
    }

    /// Flow-control statements are never recorded in the command history
    pub fn is_flow_control(self) -> bool {
        matches!(
            self,
            CommandKind::If
                | CommandKind::ElseIf
                | CommandKind::Else
                | CommandKind::End
                | CommandKind::While
                | CommandKind::For
                | CommandKind::Break
                | CommandKind::Continue
                | CommandKind::Function
                | CommandKind::Return
                | CommandKind::Goto
        )
    }

    /// Whether the statement opens a block closed by `end`
    pub fn opens_block(self) -> bool {
        matches!(
            self,
            CommandKind::If | CommandKind::While | CommandKind::For | CommandKind::Function
        )
    }

    /// Commands whose arguments form one implicit atom expression
    pub fn takes_atom_expression(self) -> bool {
        matches!(
            self,
            CommandKind::Select
                | CommandKind::Restrict
                | CommandKind::Display
                | CommandKind::Hide
                | CommandKind::Delete
                | CommandKind::Subset
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of block closed by an `end` statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    If,
    While,
    For,
    Function,
}

impl BlockKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::While => "while",
            BlockKind::For => "for",
            BlockKind::Function => "function",
        }
    }

    pub fn is_loop(self) -> bool {
        matches!(self, BlockKind::While | BlockKind::For)
    }
}

/// Built-in math functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    For,
    Select,
    Within,
    Abs,
    Sqrt,
    Sin,
    Cos,
    Acos,
    Floor,
    Round,
    Point,
    Plane,
    Distance,
    Array,
    Eval,
    Script,
    ShapeProperty,
}

/// Built-in function names
pub static FUNCTIONS: phf::Map<&'static str, FunctionKind> = phf_map! {
    "for" => FunctionKind::For,
    "select" => FunctionKind::Select,
    "within" => FunctionKind::Within,
    "abs" => FunctionKind::Abs,
    "sqrt" => FunctionKind::Sqrt,
    "sin" => FunctionKind::Sin,
    "cos" => FunctionKind::Cos,
    "acos" => FunctionKind::Acos,
    "floor" => FunctionKind::Floor,
    "round" => FunctionKind::Round,
    "point" => FunctionKind::Point,
    "plane" => FunctionKind::Plane,
    "distance" => FunctionKind::Distance,
    "array" => FunctionKind::Array,
    "eval" => FunctionKind::Eval,
    "script" => FunctionKind::Script,
    "shapeproperty" => FunctionKind::ShapeProperty,
};

/// Look up a built-in function (case-insensitive)
pub fn lookup_function(word: &str) -> Option<FunctionKind> {
    FUNCTIONS.get(word.to_ascii_lowercase().as_str()).copied()
}

impl FunctionKind {
    /// Implicit-iteration forms taking `(var; set; expr)`
    pub fn iterates(self) -> bool {
        matches!(self, FunctionKind::For | FunctionKind::Select)
    }

    pub fn name(self) -> &'static str {
        match self {
            FunctionKind::For => "for",
            FunctionKind::Select => "select",
            FunctionKind::Within => "within",
            FunctionKind::Abs => "abs",
            FunctionKind::Sqrt => "sqrt",
            FunctionKind::Sin => "sin",
            FunctionKind::Cos => "cos",
            FunctionKind::Acos => "acos",
            FunctionKind::Floor => "floor",
            FunctionKind::Round => "round",
            FunctionKind::Point => "point",
            FunctionKind::Plane => "plane",
            FunctionKind::Distance => "distance",
            FunctionKind::Array => "array",
            FunctionKind::Eval => "eval",
            FunctionKind::Script => "script",
            FunctionKind::ShapeProperty => "shapeProperty",
        }
    }
}

/// Property addressed by a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyRef {
    Atom(AtomProperty),
    Bond(BondProperty),
}

impl PropertyRef {
    pub fn name(self) -> &'static str {
        match self {
            PropertyRef::Atom(p) => p.name(),
            PropertyRef::Bond(p) => p.name(),
        }
    }
}

/// Right-hand side of a folded comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i32),
    Float(f64),
    Str(String),
    /// `@name`, replaced by the variable's value before the statement runs
    VarRef(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(i) => write!(f, "{}", i),
            Operand::Float(v) => write!(f, "{}", v),
            Operand::Str(s) => write!(f, "\"{}\"", s),
            Operand::VarRef(name) => write!(f, "@{}", name),
        }
    }
}

/// A `property <op> value` predicate folded into one instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub property: PropertyRef,
    pub op: CompareOp,
    pub operand: Operand,
}

/// One compiled instruction
#[derive(Debug, Clone)]
pub enum Token {
    /// Statement head
    Command(CommandKind),
    /// Kind of block closed by `end`
    Block(BlockKind),
    /// Statement index resolved at compile time (`break`, `continue`)
    JumpTarget(usize),

    Boolean(bool),
    Integer(i32),
    Decimal(f64),
    Str(String),
    Point3(Vec3),
    Plane4([f64; 4]),
    Bitset(Selection),
    Identifier(String),

    Op(Operator),
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    /// Postfix `.name`
    Member(String),
    /// Built-in function name, followed by `(`
    Function(FunctionKind),
    /// User function name, followed by `(`
    Call(String),

    /// Start of an atom expression sub-stream
    ExpressionBegin,
    /// End of an atom expression sub-stream
    ExpressionEnd,
    Comparison(Box<Comparison>),

    /// `@name`
    VarRef(String),
    /// `@{expr}`
    Substitution(String),

    /// Separates an assignment target from its value
    AssignOp,
    /// `var` inside a `for` clause
    Declare,
    FunctionDef(Arc<ScriptFunction>),
}

impl Token {
    /// Whether the token can start or continue a value on the operand stack
    pub fn is_value_literal(&self) -> bool {
        matches!(
            self,
            Token::Boolean(_)
                | Token::Integer(_)
                | Token::Decimal(_)
                | Token::Str(_)
                | Token::Point3(_)
                | Token::Plane4(_)
                | Token::Bitset(_)
        )
    }

    /// Command kind if this is a statement head
    pub fn command(&self) -> Option<CommandKind> {
        match self {
            Token::Command(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        use Token::*;
        match (self, other) {
            (Command(a), Command(b)) => a == b,
            (Block(a), Block(b)) => a == b,
            (JumpTarget(a), JumpTarget(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Point3(a), Point3(b)) => a.x == b.x && a.y == b.y && a.z == b.z,
            (Plane4(a), Plane4(b)) => a == b,
            (Bitset(a), Bitset(b)) => a == b,
            (Identifier(a), Identifier(b)) => a == b,
            (Op(a), Op(b)) => a == b,
            (Member(a), Member(b)) => a == b,
            (Function(a), Function(b)) => a == b,
            (Call(a), Call(b)) => a == b,
            (Comparison(a), Comparison(b)) => a == b,
            (VarRef(a), VarRef(b)) => a == b,
            (Substitution(a), Substitution(b)) => a == b,
            (FunctionDef(a), FunctionDef(b)) => Arc::ptr_eq(a, b),
            (LeftParen, LeftParen)
            | (RightParen, RightParen)
            | (LeftBracket, LeftBracket)
            | (RightBracket, RightBracket)
            | (Comma, Comma)
            | (Semicolon, Semicolon)
            | (ExpressionBegin, ExpressionBegin)
            | (ExpressionEnd, ExpressionEnd)
            | (AssignOp, AssignOp)
            | (Declare, Declare) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Command(kind) => f.write_str(kind.name()),
            Token::Block(kind) => f.write_str(kind.name()),
            Token::JumpTarget(t) => write!(f, "[{}]", t),
            Token::Boolean(b) => write!(f, "{}", b),
            Token::Integer(i) => write!(f, "{}", i),
            Token::Decimal(v) => write!(f, "{}", v),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Point3(p) => write!(f, "{{{} {} {}}}", p.x, p.y, p.z),
            Token::Plane4(p) => write!(f, "{{{} {} {} {}}}", p[0], p[1], p[2], p[3]),
            Token::Bitset(sel) => write!(f, "{}", sel),
            Token::Identifier(name) => f.write_str(name),
            Token::Op(op) => f.write_str(op.symbol()),
            Token::LeftParen => f.write_str("("),
            Token::RightParen => f.write_str(")"),
            Token::LeftBracket => f.write_str("["),
            Token::RightBracket => f.write_str("]"),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::Member(name) => write!(f, ".{}", name),
            Token::Function(kind) => f.write_str(kind.name()),
            Token::Call(name) => f.write_str(name),
            Token::ExpressionBegin => f.write_str("{"),
            Token::ExpressionEnd => f.write_str("}"),
            Token::Comparison(c) => write!(f, "{}{}{}", c.property.name(), c.op, c.operand),
            Token::VarRef(name) => write!(f, "@{}", name),
            Token::Substitution(text) => write!(f, "@{{{}}}", text),
            Token::AssignOp => f.write_str("="),
            Token::Declare => f.write_str("var"),
            Token::FunctionDef(func) => f.write_str(func.name()),
        }
    }
}

/// Render a statement, marking one instruction with `>> <<`
pub fn render_statement(tokens: &[Token], mark: Option<usize>) -> String {
    tokens
        .iter()
        .enumerate()
        .map(|(i, tok)| {
            if Some(i) == mark {
                format!(">> {} <<", tok)
            } else {
                tok.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_commands() {
        assert_eq!(lookup_command("SELECT"), Some(CommandKind::Select));
        assert_eq!(lookup_command("endif"), Some(CommandKind::End));
        assert_eq!(lookup_command("quit"), Some(CommandKind::Exit));
        assert_eq!(lookup_command("frobnicate"), None);
    }

    #[test]
    fn test_precedence() {
        assert!(Operator::And.precedence() > Operator::Or.precedence());
        assert!(Operator::Times.precedence() > Operator::Plus.precedence());
        assert!(Operator::Power.is_right_associative());
        assert_eq!(Operator::Le.comparison(), Some(CompareOp::Le));
    }

    #[test]
    fn test_render_statement_marks_token() {
        let tokens = vec![
            Token::Command(CommandKind::Print),
            Token::Identifier("x".to_string()),
            Token::Op(Operator::Plus),
            Token::Integer(1),
        ];
        assert_eq!(render_statement(&tokens, Some(2)), "print x >> + << 1");
        assert_eq!(render_statement(&tokens, None), "print x + 1");
    }

    #[test]
    fn test_lookup_functions() {
        assert_eq!(lookup_function("ShapeProperty"), Some(FunctionKind::ShapeProperty));
        assert_eq!(lookup_function("within"), Some(FunctionKind::Within));
    }
}

//! Typed syntax tree for the script dialect.
//!
//! Every node carries its byte range; a parent's range covers all of
//! its children. Name references stay unresolved identifiers until
//! the semantic pass.

use smol_str::SmolStr;
use text_size::TextRange;

use super::types::PrimitiveType;

/// A parsed source file: zero or more scripts.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFile {
    pub scripts: Vec<ScriptNode>,
    pub range: TextRange,
}

/// `[trigger,name](params)(returns) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptNode {
    pub trigger: Ident,
    pub name: Ident,
    pub parameters: Vec<Parameter>,
    pub returns: Vec<TypeName>,
    /// Whether the signature carried an explicit return group. When
    /// absent, the return tuple is inferred from the first return
    /// statement.
    pub explicit_returns: bool,
    pub body: BlockStmt,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: SmolStr,
    pub range: TextRange,
}

impl Ident {
    pub fn new(name: impl Into<SmolStr>, range: TextRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeName {
    pub ty: PrimitiveType,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub ty: TypeName,
    pub name: Ident,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStmt {
    pub statements: Vec<Stmt>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(BlockStmt),
    If(IfStmt),
    While(WhileStmt),
    Return(ReturnStmt),
    VarDecl(VarDeclStmt),
    Assign(AssignStmt),
    Expr(ExprStmt),
}

impl Stmt {
    pub fn range(&self) -> TextRange {
        match self {
            Stmt::Block(s) => s.range,
            Stmt::If(s) => s.range,
            Stmt::While(s) => s.range,
            Stmt::Return(s) => s.range,
            Stmt::VarDecl(s) => s.range,
            Stmt::Assign(s) => s.range,
            Stmt::Expr(s) => s.range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_body: BlockStmt,
    /// `else { .. }` or `else if ..`; absent when there is no else.
    pub else_body: Option<Box<Stmt>>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: BlockStmt,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub values: Vec<Expr>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclStmt {
    pub ty: TypeName,
    pub name: Ident,
    pub initializer: Option<Expr>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub targets: Vec<VarRef>,
    pub value: Expr,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub expr: Expr,
    pub range: TextRange,
}

/// Which variable domain a scoped reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarScope {
    /// `$name`: parameter or local
    Local,
    /// `%name`: player variable
    Player,
    /// `%%name`: player bit variable
    PlayerBit,
    /// `&name`: client int variable
    ClientInt,
    /// `^name`: client string variable
    ClientString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub scope: VarScope,
    pub name: Ident,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(IntLit),
    Long(LongLit),
    Bool(BoolLit),
    Str(StringLit),
    CoordGrid(CoordLit),
    /// `"text <expr> text"`: literal and placeholder parts in order.
    Concat(ConcatExpr),
    /// A bare identifier; resolves to a constant in the semantic pass.
    ConstantRef(Ident),
    Var(VarRef),
    /// `~name(args)`: call to a proc script.
    Gosub(CallExpr),
    /// `name(args)` or `.name(args)`: call to an engine command.
    Command(CallExpr),
    Binary(BinaryExpr),
    /// `calc(arith)`: arithmetic island.
    Calc(CalcExpr),
}

impl Expr {
    pub fn range(&self) -> TextRange {
        match self {
            Expr::Int(e) => e.range,
            Expr::Long(e) => e.range,
            Expr::Bool(e) => e.range,
            Expr::Str(e) => e.range,
            Expr::CoordGrid(e) => e.range,
            Expr::Concat(e) => e.range,
            Expr::ConstantRef(e) => e.range,
            Expr::Var(e) => e.range,
            Expr::Gosub(e) | Expr::Command(e) => e.range,
            Expr::Binary(e) => e.range,
            Expr::Calc(e) => e.range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntLit {
    pub value: i32,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongLit {
    pub value: i64,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolLit {
    pub value: bool,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLit {
    /// Decoded value, escapes applied.
    pub value: String,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordLit {
    /// Packed coordinate value.
    pub value: i32,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatExpr {
    pub parts: Vec<Expr>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub name: Ident,
    pub arguments: Vec<Expr>,
    /// `.name(..)` selects a command's alternative form.
    pub alternative: bool,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Equal,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::LessThan
                | BinaryOp::GreaterThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Equal => "==",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalcExpr {
    pub expr: Box<Expr>,
    pub range: TextRange,
}

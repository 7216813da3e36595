// Tue Oct 13 2026 - Alex

use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Declaration { kind: DeclarationKind, declarations: Vec<(String, Option<Expression>)> },
    Function(Arc<FunctionDef>),
    Expression(Expression),
    If { condition: Expression, then_branch: Box<Statement>, else_branch: Option<Box<Statement>> },
    While { condition: Expression, body: Box<Statement> },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
    },
    ForIn { declared: bool, name: String, object: Expression, body: Box<Statement> },
    Return(Option<Expression>),
    Break,
    Continue,
    Throw(Expression),
    Try {
        block: Vec<Statement>,
        catch_param: Option<String>,
        catch_block: Option<Vec<Statement>>,
        finally_block: Option<Vec<Statement>>,
    },
    Block(Vec<Statement>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub line: i32,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Identifier(String),
    This,
    Array(Vec<Expression>),
    Object(Vec<(String, Expression)>),
    Function(Arc<FunctionDef>),
    Unary { op: UnaryOp, operand: Box<Expression> },
    Update { increment: bool, prefix: bool, target: Box<Expression> },
    Binary { op: BinaryOp, left: Box<Expression>, right: Box<Expression> },
    Logical { and: bool, left: Box<Expression>, right: Box<Expression> },
    Conditional { condition: Box<Expression>, then_value: Box<Expression>, else_value: Box<Expression> },
    Assign { op: Option<BinaryOp>, target: Box<Expression>, value: Box<Expression> },
    Call { callee: Box<Expression>, args: Vec<Expression> },
    New { callee: Box<Expression>, args: Vec<Expression> },
    Member { object: Box<Expression>, property: String },
    Index { object: Box<Expression>, index: Box<Expression> },
    Sequence(Vec<Expression>),
}

impl Expression {
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expression::Identifier(_) | Expression::Member { .. } | Expression::Index { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

//! Expressions and statements (§3, §4.4.3-§4.4.4), arena-indexed for the
//! same reason types are: a `for` loop's body is a statement that can
//! itself contain the declaration whose initializer is the very expression
//! being built, so a tree of `Box`es would fight the borrow checker far more
//! than a couple of flat `Vec`s with `Copy` indices into them.

use cfront_base::Symbol;

use crate::location::Span;
use crate::token::{IntegerSuffix, TokenKind};
use crate::types::{TypeArena, TypeQualified};

/// Index into an expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// Index into a statement arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntegerLiteral {
        value: u64,
        suffix: IntegerSuffix,
    },
    /// A resolved reference to a declared name; the typedef problem is
    /// already settled by the time this node exists (§4.4.1).
    Variable(Symbol),
    /// `op` is one of the binary/assignment punctuators from the precedence
    /// table in §4.4.3; `,` is represented as a binary operator too, its
    /// value being its right operand's.
    Binary {
        op: TokenKind,
        left: ExprId,
        right: ExprId,
    },
    Ternary {
        condition: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    Cast {
        target: TypeQualified,
        value: ExprId,
    },
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: Span,
}

/// The body of a parsed function definition: its parameter names (types
/// live on the enclosing `Type::Function`) and its block body.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub parameters: Vec<Symbol>,
    pub body: StmtId,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expression(ExprId),
    Block(Vec<StmtId>),
    For {
        init: Option<ExprId>,
        condition: Option<ExprId>,
        increment: Option<ExprId>,
        body: StmtId,
    },
    While {
        condition: ExprId,
        body: StmtId,
    },
    Return(Option<ExprId>),
    /// A block-scope declarator with no initializer (§4.4.4: every
    /// declarator in a declaration becomes one statement in the enclosing
    /// block, so `int a, b;` is two `InitializerDefault` statements).
    InitializerDefault {
        name: Symbol,
    },
    InitializerCopy {
        name: Symbol,
        value: ExprId,
    },
    Function {
        name: Symbol,
        definition: FunctionDefinition,
    },
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StmtKind,
    pub span: Span,
}

/// Append-only store for expressions, addressed by [`ExprId`].
#[derive(Debug, Default)]
pub struct ExprArena {
    exprs: Vec<Expression>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: Expression) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expression {
        &self.exprs[id.0 as usize]
    }
}

/// Append-only store for statements, addressed by [`StmtId`].
#[derive(Debug, Default)]
pub struct StmtArena {
    stmts: Vec<Statement>,
}

impl StmtArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stmt: Statement) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn get(&self, id: StmtId) -> &Statement {
        &self.stmts[id.0 as usize]
    }
}

/// A finished translation unit: the top-level items (declarations and
/// function definitions, in source order) plus the arenas they index into.
#[derive(Debug, Default)]
pub struct TranslationUnit {
    pub items: Vec<StmtId>,
    pub exprs: ExprArena,
    pub stmts: StmtArena,
    pub types: TypeArena,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use crate::file::FileId;
        use crate::location::Location;
        let loc = Location {
            file_id: FileId(0),
            byte_index: 0,
            line: 0,
            column: 0,
        };
        Span::new(loc, loc)
    }

    #[test]
    fn expr_arena_round_trips() {
        let mut arena = ExprArena::new();
        let id = arena.push(Expression {
            kind: ExprKind::IntegerLiteral {
                value: 42,
                suffix: IntegerSuffix::default(),
            },
            span: dummy_span(),
        });
        match &arena.get(id).kind {
            ExprKind::IntegerLiteral { value, .. } => assert_eq!(*value, 42),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn stmt_arena_supports_nested_blocks() {
        let mut stmts = StmtArena::new();
        let inner = stmts.push(Statement {
            kind: StmtKind::Return(None),
            span: dummy_span(),
        });
        let block = stmts.push(Statement {
            kind: StmtKind::Block(vec![inner]),
            span: dummy_span(),
        });
        match &stmts.get(block).kind {
            StmtKind::Block(items) => assert_eq!(items.len(), 1),
            _ => panic!("wrong kind"),
        }
    }
}

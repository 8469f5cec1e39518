//! The recursive-descent parser (§4.4): declarations, expressions, and
//! statements over the unified lexer/preprocessor token stream, threading
//! the three scoped symbol tables that resolve the classic C "typedef
//! problem" (whether a bare identifier names a type or a variable depends
//! on what's visible at the point it's used, not on the grammar alone).

use cfront_base::{Interner, Symbol};
use log::trace;
use rustc_hash::FxHashMap;

use crate::ast::{
    ExprArena, ExprId, Expression, ExprKind, FunctionDefinition, StmtArena, StmtId, Statement, StmtKind,
    TranslationUnit,
};
use crate::error::{Diagnostics, ParseError};
use crate::file::FileStore;
use crate::location::Span;
use crate::preprocessor::Preprocessor;
use crate::scope::ScopedMap;
use crate::token::{Token, TokenKind, TokenPayload};
use crate::types::{Builtin, CompositeType, EnumType, Member, Type, TypeArena, TypeId, TypeQualified};

/// Storage-class and tag-definition flags carried by a resolved declaration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeclFlags {
    pub is_extern: bool,
    pub is_static: bool,
    pub is_enum_variant: bool,
}

/// An entry in the declarations scope: an ordinary name (variable, function,
/// or enum constant) bound to a type.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub span: Span,
    pub ty: TypeQualified,
    pub flags: DeclFlags,
}

/// One parsed declarator: a name, its fully built type (pointers/arrays/
/// function signature already wrapped around the declaration's base type),
/// and, for a function declarator, its parameter names (used only to
/// populate the function body's scope if a definition follows).
struct Declarator {
    name: Symbol,
    ty: TypeQualified,
    span: Span,
    is_function: bool,
    param_names: Vec<Option<Symbol>>,
}

/// The storage class and base type collected from a run of declaration
/// specifiers, before any declarators are parsed (§4.4.1: qualifiers and
/// storage-class keywords may appear in any order around the type itself).
#[derive(Default)]
struct DeclSpecifiers {
    ty: Option<TypeQualified>,
    is_extern: bool,
    is_static: bool,
    is_typedef: bool,
}

/// Binary/assignment operator precedence (§4.4.3). Lower binds tighter.
/// Gaps are left where C's full operator set (shift, bitwise xor) would
/// slot in; this front end doesn't parse those as binary expressions.
fn operator_precedence(kind: TokenKind) -> Option<(i32, bool)> {
    use TokenKind::*;
    Some(match kind {
        Star | Slash => (5, true),
        Plus | Minus => (6, true),
        Lt | LtEq | Gt | GtEq => (9, true),
        EqEq | NotEq => (10, true),
        Amp => (11, true),
        Pipe => (13, true),
        AmpAmp => (14, true),
        PipePipe => (15, true),
        Eq => (16, false),
        Comma => (17, true),
        _ => return None,
    })
}

/// Recursive-descent parser over one translation unit.
///
/// Holds its preprocessor, file store, interner, and diagnostic sink by
/// mutable reference rather than by value, the same "pass the collaborator
/// in" shape [`crate::cursor::TextCursor`] uses: a [`Session`](crate::session::Session)
/// owns these for the lifetime of a compile and hands out a fresh `Parser`
/// borrow per translation unit.
pub struct Parser<'a> {
    pp: &'a mut Preprocessor,
    store: &'a mut FileStore,
    interner: &'a mut Interner,
    diags: &'a mut Diagnostics,

    back: Option<Token>,
    last_span: Span,

    tags: ScopedMap<Symbol, TypeId>,
    typedefs: ScopedMap<Symbol, TypeQualified>,
    declarations: ScopedMap<Symbol, Declaration>,

    types: TypeArena,
    exprs: ExprArena,
    stmts: StmtArena,
}

impl<'a> Parser<'a> {
    pub fn new(
        pp: &'a mut Preprocessor,
        store: &'a mut FileStore,
        interner: &'a mut Interner,
        diags: &'a mut Diagnostics,
    ) -> Self {
        Parser {
            pp,
            store,
            interner,
            diags,
            back: None,
            last_span: Span::default(),
            tags: ScopedMap::new(),
            typedefs: ScopedMap::new(),
            declarations: ScopedMap::new(),
            types: TypeArena::new(),
            exprs: ExprArena::new(),
            stmts: StmtArena::new(),
        }
    }

    pub fn declaration(&self, name: Symbol) -> Option<&Declaration> {
        self.declarations.lookup(&name)
    }

    pub fn typedef(&self, name: Symbol) -> Option<&TypeQualified> {
        self.typedefs.lookup(&name)
    }

    // -- token stream ---------------------------------------------------

    fn advance(&mut self) -> Option<Token> {
        let tok = match self.back.take() {
            Some(t) => Some(t),
            None => self.pp.next_token(self.store, self.interner, self.diags),
        };
        if let Some(t) = tok {
            self.last_span = t.span;
        }
        tok
    }

    fn peek(&mut self) -> Option<Token> {
        if self.back.is_none() {
            self.back = self.pp.next_token(self.store, self.interner, self.diags);
        }
        self.back
    }

    fn push_back(&mut self, tok: Token) {
        self.back = Some(tok);
    }

    fn peek_is(&mut self, kind: TokenKind) -> bool {
        matches!(self.peek(), Some(t) if t.kind == kind)
    }

    fn describe(&self, tok: &Token) -> String {
        match tok.payload {
            TokenPayload::Identifier(sym) => self.interner.resolve(sym).to_string(),
            _ => tok.kind.canonical_text().to_string(),
        }
    }

    fn report(&mut self, err: ParseError) {
        self.diags.error(err.span(), err.to_string());
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.advance();
                Some(tok)
            }
            Some(tok) => {
                let found = self.describe(&tok);
                self.report(ParseError::ExpectedToken {
                    span: tok.span,
                    expected: what.to_string(),
                    found,
                });
                None
            }
            None => {
                self.report(ParseError::ExpectedToken {
                    span: self.last_span,
                    expected: what.to_string(),
                    found: "end of file".to_string(),
                });
                None
            }
        }
    }

    /// Consumes tokens until one of `stops` is next (or EOF), used to
    /// recover from a malformed declaration or statement.
    fn synchronize_to(&mut self, stops: &[TokenKind]) {
        loop {
            match self.peek() {
                Some(t) if stops.contains(&t.kind) => break,
                Some(_) => {
                    self.advance();
                }
                None => break,
            }
        }
    }

    fn synchronize_past_semi(&mut self) {
        self.synchronize_to(&[TokenKind::Semi, TokenKind::RBrace]);
        if self.peek_is(TokenKind::Semi) {
            self.advance();
        }
    }

    fn synthesize_error_expr(&mut self, span: Span) -> ExprId {
        self.exprs.push(Expression {
            kind: ExprKind::IntegerLiteral {
                value: 0,
                suffix: Default::default(),
            },
            span,
        })
    }

    // -- scopes -----------------------------------------------------------

    fn push_scope(&mut self) {
        self.tags.push_scope();
        self.typedefs.push_scope();
        self.declarations.push_scope();
        trace!("scope push (depth {})", self.declarations.depth());
    }

    fn pop_scope(&mut self) {
        self.tags.pop_scope();
        self.typedefs.pop_scope();
        self.declarations.pop_scope();
        trace!("scope pop (depth {})", self.declarations.depth());
    }

    fn install_typedef(&mut self, name: Symbol, ty: TypeQualified, span: Span) {
        if self.typedefs.insert(name, ty).is_some() {
            self.report(ParseError::DuplicateDeclaration {
                span,
                name: self.interner.resolve(name).to_string(),
                previous: span,
            });
        }
    }

    // -- declaration specifiers --------------------------------------------

    /// Whether the next token can begin a declaration's type specifier,
    /// used to disambiguate a declaration from a statement at block scope
    /// (§4.4.1, the heart of the typedef problem) and a cast from a
    /// parenthesized expression. A bare tag name with no visible typedef or
    /// ordinary declaration of the same name also counts (§4.4.2's
    /// "tag required" diagnostic still needs to resolve as a type).
    fn starts_declaration(&mut self) -> bool {
        let Some(tok) = self.peek() else { return false };
        match tok.kind {
            TokenKind::Typedef
            | TokenKind::Extern
            | TokenKind::Static
            | TokenKind::Const
            | TokenKind::Volatile
            | TokenKind::Void
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum => true,
            TokenKind::Identifier => {
                let name = tok.identifier_symbol().unwrap();
                self.typedefs.lookup(&name).is_some()
                    || (self.tags.lookup(&name).is_some() && self.declarations.lookup(&name).is_none())
            }
            _ => false,
        }
    }

    fn peek_starts_type(&mut self) -> bool {
        let Some(tok) = self.peek() else { return false };
        match tok.kind {
            TokenKind::Const
            | TokenKind::Volatile
            | TokenKind::Void
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum => true,
            TokenKind::Identifier => {
                let name = tok.identifier_symbol().unwrap();
                self.typedefs.lookup(&name).is_some()
            }
            _ => false,
        }
    }

    fn parse_declaration_specifiers(&mut self) -> DeclSpecifiers {
        let mut spec = DeclSpecifiers::default();
        let mut is_const = false;
        let mut is_volatile = false;
        loop {
            let Some(tok) = self.peek() else { break };
            match tok.kind {
                TokenKind::Const => {
                    is_const = true;
                    self.advance();
                }
                TokenKind::Volatile => {
                    is_volatile = true;
                    self.advance();
                }
                TokenKind::Extern => {
                    spec.is_extern = true;
                    self.advance();
                }
                TokenKind::Static => {
                    spec.is_static = true;
                    self.advance();
                }
                TokenKind::Typedef => {
                    spec.is_typedef = true;
                    self.advance();
                }
                _ if spec.ty.is_none() => match self.parse_type_specifier() {
                    Some(id) => spec.ty = Some(TypeQualified::unqualified(id)),
                    None => break,
                },
                _ => break,
            }
        }
        if let Some(ty) = spec.ty.as_mut() {
            ty.is_const |= is_const;
            ty.is_volatile |= is_volatile;
        }
        spec
    }

    /// [`Self::parse_declaration_specifiers`], but reports one "undefined
    /// type" diagnostic and consumes the offending token if no type
    /// specifier was found at all, so callers that require a type don't
    /// need to special-case the failure themselves.
    fn require_declaration_specifiers(&mut self) -> Option<DeclSpecifiers> {
        let spec = self.parse_declaration_specifiers();
        if spec.ty.is_some() {
            return Some(spec);
        }
        if let Some(tok) = self.peek() {
            let name = self.describe(&tok);
            self.report(ParseError::UndefinedType { span: tok.span, name });
            self.advance();
        }
        None
    }

    fn parse_type_specifier(&mut self) -> Option<TypeId> {
        let tok = self.peek()?;
        match tok.kind {
            TokenKind::Struct | TokenKind::Union | TokenKind::Enum => Some(self.parse_tagged_type(tok.kind)),
            TokenKind::Identifier => self.parse_identifier_type(tok),
            TokenKind::Void
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Signed
            | TokenKind::Unsigned => Some(self.parse_primitive_type()),
            _ => None,
        }
    }

    fn parse_primitive_type(&mut self) -> TypeId {
        let (mut void_, mut char_, mut short_, mut int_, mut float_, mut double_, mut unsigned_) =
            (false, false, false, false, false, false, false);
        let mut long_count = 0u32;
        loop {
            let Some(tok) = self.peek() else { break };
            match tok.kind {
                TokenKind::Void => {
                    void_ = true;
                    self.advance();
                }
                TokenKind::Char => {
                    char_ = true;
                    self.advance();
                }
                TokenKind::Short => {
                    short_ = true;
                    self.advance();
                }
                TokenKind::Int => {
                    int_ = true;
                    self.advance();
                }
                TokenKind::Long => {
                    long_count += 1;
                    self.advance();
                }
                TokenKind::Float => {
                    float_ = true;
                    self.advance();
                }
                TokenKind::Double => {
                    double_ = true;
                    self.advance();
                }
                TokenKind::Signed => {
                    self.advance();
                }
                TokenKind::Unsigned => {
                    unsigned_ = true;
                    self.advance();
                }
                _ => break,
            }
        }
        let _ = int_;
        let builtin = if void_ {
            Builtin::Void
        } else if float_ {
            Builtin::Float
        } else if double_ {
            if long_count > 0 {
                Builtin::LongDouble
            } else {
                Builtin::Double
            }
        } else if char_ {
            Builtin::Char
        } else if unsigned_ {
            if long_count >= 2 {
                Builtin::UnsignedLongLong
            } else if long_count == 1 {
                Builtin::UnsignedLong
            } else if short_ {
                Builtin::UnsignedShort
            } else {
                Builtin::UnsignedInt
            }
        } else if long_count >= 2 {
            Builtin::SignedLongLong
        } else if long_count == 1 {
            Builtin::SignedLong
        } else if short_ {
            Builtin::SignedShort
        } else {
            Builtin::SignedInt
        };
        self.types.builtin(builtin)
    }

    /// Resolves a bare identifier used where a type is expected: the
    /// typedef problem's other face. Declaration-lookup takes priority over
    /// typedef-lookup (§4.4.1), matching a variable that happens to shadow a
    /// type name in scope; a name bound only as a tag still resolves, with
    /// a "tag required" note, so the rest of the declarator parses cleanly.
    fn parse_identifier_type(&mut self, tok: Token) -> Option<TypeId> {
        let name = tok.identifier_symbol().unwrap();
        if self.declarations.lookup(&name).is_some() {
            self.advance();
            let hint = self
                .typedefs
                .lookup(&name)
                .and_then(|tq| self.types.tag_keyword(tq.id))
                .map(|k| format!("add the tag `{}`", k));
            self.report(ParseError::NotAType {
                span: tok.span,
                name: self.interner.resolve(name).to_string(),
                hint,
            });
            return Some(self.types.builtin(Builtin::Error));
        }
        if let Some(tq) = self.typedefs.lookup(&name) {
            let id = tq.id;
            self.advance();
            return Some(id);
        }
        if let Some(&tag_id) = self.tags.lookup(&name) {
            self.advance();
            let keyword = self.types.tag_keyword(tag_id).unwrap_or("struct");
            self.report(ParseError::TagRequired {
                span: tok.span,
                name: self.interner.resolve(name).to_string(),
                tag_keyword: keyword,
            });
            return Some(tag_id);
        }
        None
    }

    // -- tagged types: struct/union/enum ------------------------------------

    fn push_empty_tag(&mut self, keyword: TokenKind, span: Span) -> TypeId {
        match keyword {
            TokenKind::Struct => self.types.push(Type::Struct(CompositeType {
                span,
                ..Default::default()
            })),
            TokenKind::Union => self.types.push(Type::Union(CompositeType {
                span,
                ..Default::default()
            })),
            TokenKind::Enum => self.types.push(Type::Enum(EnumType {
                span,
                ..Default::default()
            })),
            _ => unreachable!("parse_tagged_type only dispatches struct/union/enum"),
        }
    }

    /// Installs a new tag or reuses one already visible in scope (§4.4.2):
    /// a bodyless `struct Tag` looks back up an existing declaration, while
    /// a fresh tag is registered in the innermost scope *before* its body is
    /// parsed, so a self-referential member (`struct S *next;`) resolves.
    fn install_or_reuse_tag(&mut self, keyword: TokenKind, tag: Option<Symbol>, span: Span) -> TypeId {
        if let Some(name) = tag {
            if let Some(&existing) = self.tags.lookup(&name) {
                return existing;
            }
            let id = self.push_empty_tag(keyword, span);
            self.tags.insert(name, id);
            id
        } else {
            self.push_empty_tag(keyword, span)
        }
    }

    fn parse_tagged_type(&mut self, keyword: TokenKind) -> TypeId {
        let kw_tok = self.advance().expect("caller peeked a struct/union/enum keyword");
        let tag_name = match self.peek() {
            Some(t) if t.kind == TokenKind::Identifier => {
                self.advance();
                t.identifier_symbol()
            }
            _ => None,
        };
        let has_body = self.peek_is(TokenKind::LBrace);
        if tag_name.is_none() && !has_body {
            self.report(ParseError::MalformedDeclarator { span: kw_tok.span });
            return self.types.builtin(Builtin::Error);
        }
        let id = self.install_or_reuse_tag(keyword, tag_name, kw_tok.span);
        if has_body {
            self.advance();
            match keyword {
                TokenKind::Enum => self.parse_enum_body(id),
                _ => self.parse_composite_body(id),
            }
        } else if tag_name.is_some() && self.tags.lookup(&tag_name.unwrap()).is_none() {
            // unreachable in practice: install_or_reuse_tag always registers
        }
        id
    }

    fn parse_enum_body(&mut self, id: TypeId) {
        let mut next_value: i64 = 0;
        loop {
            match self.peek() {
                Some(t) if t.kind == TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                None => break,
                _ => {}
            }
            let Some(name_tok) = self.expect(TokenKind::Identifier, "enumerator name") else {
                self.synchronize_to(&[TokenKind::Comma, TokenKind::RBrace]);
                if self.peek_is(TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            };
            let name = name_tok.identifier_symbol().unwrap();
            if self.peek_is(TokenKind::Eq) {
                self.advance();
                if let Some(expr_id) = self.parse_expression_no_comma() {
                    next_value = self.eval_const_expr(expr_id);
                }
            }
            if let Type::Enum(e) = self.types.get_mut(id) {
                e.values.insert(name, next_value);
            }
            let decl = Declaration {
                span: name_tok.span,
                ty: TypeQualified::unqualified(id),
                flags: DeclFlags {
                    is_enum_variant: true,
                    ..Default::default()
                },
            };
            if self.declarations.insert(name, decl).is_some() {
                self.report(ParseError::DuplicateDeclaration {
                    span: name_tok.span,
                    name: self.interner.resolve(name).to_string(),
                    previous: name_tok.span,
                });
            }
            next_value += 1;
            match self.peek() {
                Some(t) if t.kind == TokenKind::Comma => {
                    self.advance();
                }
                Some(t) if t.kind == TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                _ => break,
            }
        }
        if let Type::Enum(e) = self.types.get_mut(id) {
            e.defined = true;
        }
    }

    fn parse_composite_body(&mut self, id: TypeId) {
        loop {
            match self.peek() {
                Some(t) if t.kind == TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                None => break,
                _ => {}
            }
            let Some(spec) = self.require_declaration_specifiers() else {
                self.synchronize_past_semi();
                continue;
            };
            let base = spec.ty.unwrap();
            loop {
                let Some(decl) = self.parse_declarator(base) else {
                    break;
                };
                let member = Member {
                    name: decl.name,
                    ty: decl.ty,
                    span: decl.span,
                };
                if let Type::Struct(c) | Type::Union(c) = self.types.get_mut(id) {
                    c.push_member(member);
                }
                if self.peek_is(TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect(TokenKind::Semi, "';'");
        }
        match self.types.get_mut(id) {
            Type::Struct(c) | Type::Union(c) => c.defined = true,
            Type::Enum(e) => e.defined = true,
            _ => {}
        }
    }

    // -- declarators ---------------------------------------------------

    fn parse_pointer_prefixes(&mut self, base: TypeQualified) -> TypeQualified {
        let mut ty = base;
        while self.peek_is(TokenKind::Star) {
            self.advance();
            let (mut is_const, mut is_volatile) = (false, false);
            loop {
                match self.peek() {
                    Some(t) if t.kind == TokenKind::Const => {
                        is_const = true;
                        self.advance();
                    }
                    Some(t) if t.kind == TokenKind::Volatile => {
                        is_volatile = true;
                        self.advance();
                    }
                    _ => break,
                }
            }
            let id = self.types.push(Type::Pointer(ty));
            ty = TypeQualified {
                id,
                is_const,
                is_volatile,
            };
        }
        ty
    }

    fn parse_declarator(&mut self, base: TypeQualified) -> Option<Declarator> {
        let ty = self.parse_pointer_prefixes(base);
        let name_tok = self.expect(TokenKind::Identifier, "declarator name")?;
        let name = name_tok.identifier_symbol().unwrap();
        let mut span = name_tok.span;
        let mut is_function = false;
        let mut param_names = Vec::new();
        let final_ty = if self.peek_is(TokenKind::LParen) {
            self.advance();
            let (parameters, names, has_varargs) = self.parse_parameter_list();
            param_names = names;
            if let Some(rp) = self.expect(TokenKind::RParen, "')'") {
                span = span.merge(rp.span);
            }
            let func_id = self.types.push(Type::Function {
                return_type: ty,
                parameters,
                has_varargs,
                body: None,
            });
            is_function = true;
            TypeQualified::unqualified(func_id)
        } else {
            let mut arr_ty = ty;
            while self.peek_is(TokenKind::LBracket) {
                self.advance();
                let length = if self.peek_is(TokenKind::RBracket) {
                    None
                } else {
                    self.parse_expression_no_comma()
                };
                if let Some(rb) = self.expect(TokenKind::RBracket, "']'") {
                    span = span.merge(rb.span);
                }
                let arr_id = self.types.push(Type::Array {
                    element: arr_ty,
                    length,
                });
                arr_ty = TypeQualified::unqualified(arr_id);
            }
            arr_ty
        };
        Some(Declarator {
            name,
            ty: final_ty,
            span,
            is_function,
            param_names,
        })
    }

    fn parse_parameter_list(&mut self) -> (Vec<TypeQualified>, Vec<Option<Symbol>>, bool) {
        let mut types = Vec::new();
        let mut names = Vec::new();
        let mut has_varargs = false;
        if self.peek_is(TokenKind::RParen) {
            return (types, names, has_varargs);
        }
        loop {
            if self.peek_is(TokenKind::Ellipsis) {
                self.advance();
                has_varargs = true;
                break;
            }
            let Some(spec) = self.require_declaration_specifiers() else {
                break;
            };
            let base = spec.ty.unwrap();
            let (ty, name) = self.parse_parameter_declarator(base);
            if types.is_empty() && matches!(self.types.get(ty.id), Type::Builtin(Builtin::Void)) && name.is_none() && !self.peek_is(TokenKind::Comma)
            {
                break;
            }
            types.push(ty);
            names.push(name);
            if self.peek_is(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        (types, names, has_varargs)
    }

    fn parse_parameter_declarator(&mut self, base: TypeQualified) -> (TypeQualified, Option<Symbol>) {
        let mut ty = self.parse_pointer_prefixes(base);
        let name = match self.peek() {
            Some(t) if t.kind == TokenKind::Identifier => {
                self.advance();
                t.identifier_symbol()
            }
            _ => None,
        };
        while self.peek_is(TokenKind::LBracket) {
            self.advance();
            let length = if self.peek_is(TokenKind::RBracket) {
                None
            } else {
                self.parse_expression_no_comma()
            };
            self.expect(TokenKind::RBracket, "']'");
            let arr_id = self.types.push(Type::Array { element: ty, length });
            ty = TypeQualified::unqualified(arr_id);
        }
        (ty, name)
    }

    fn parse_abstract_declarator(&mut self, base: TypeQualified) -> TypeQualified {
        self.parse_pointer_prefixes(base)
    }

    // -- declarations ----------------------------------------------------

    /// Parses one declaration (`declaration-specifiers declarator-list ;`),
    /// producing one statement per declarator (§4.4.4): an
    /// `InitializerDefault`/`InitializerCopy` for a variable, or a single
    /// `Function` statement if a declarator is immediately followed by a
    /// function body.
    pub fn parse_declaration(&mut self) -> Vec<StmtId> {
        let Some(spec) = self.require_declaration_specifiers() else {
            self.synchronize_past_semi();
            return Vec::new();
        };
        let base = spec.ty.unwrap();
        if self.peek_is(TokenKind::Semi) {
            self.advance();
            return Vec::new();
        }
        let mut out = Vec::new();
        loop {
            let Some(decl) = self.parse_declarator(base) else {
                self.synchronize_past_semi();
                break;
            };

            if spec.is_typedef {
                self.install_typedef(decl.name, decl.ty, decl.span);
                if self.peek_is(TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }

            if decl.is_function && self.peek_is(TokenKind::LBrace) {
                let stmt = self.parse_function_definition(decl, spec.is_extern, spec.is_static);
                out.push(stmt);
                return out;
            }

            let initializer = if self.peek_is(TokenKind::Eq) {
                self.advance();
                self.parse_expression_no_comma()
            } else {
                None
            };

            let declaration = Declaration {
                span: decl.span,
                ty: decl.ty,
                flags: DeclFlags {
                    is_extern: spec.is_extern,
                    is_static: spec.is_static,
                    is_enum_variant: false,
                },
            };
            if self.declarations.insert(decl.name, declaration).is_some() {
                self.report(ParseError::DuplicateDeclaration {
                    span: decl.span,
                    name: self.interner.resolve(decl.name).to_string(),
                    previous: decl.span,
                });
            }

            let kind = match initializer {
                Some(value) => StmtKind::InitializerCopy { name: decl.name, value },
                None => StmtKind::InitializerDefault { name: decl.name },
            };
            out.push(self.stmts.push(Statement { kind, span: decl.span }));

            if self.peek_is(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.expect(TokenKind::Semi, "';'");
        out
    }

    fn parse_function_definition(&mut self, decl: Declarator, is_extern: bool, is_static: bool) -> StmtId {
        let declaration = Declaration {
            span: decl.span,
            ty: decl.ty,
            flags: DeclFlags {
                is_extern,
                is_static,
                is_enum_variant: false,
            },
        };
        if self.declarations.insert(decl.name, declaration).is_some() {
            self.report(ParseError::DuplicateDeclaration {
                span: decl.span,
                name: self.interner.resolve(decl.name).to_string(),
                previous: decl.span,
            });
        }

        self.push_scope();
        let parameters: Vec<TypeQualified> = match self.types.get(decl.ty.id) {
            Type::Function { parameters, .. } => parameters.clone(),
            _ => Vec::new(),
        };
        for (name, ty) in decl.param_names.iter().zip(parameters.iter()) {
            if let Some(name) = name {
                self.declarations.insert(
                    *name,
                    Declaration {
                        span: decl.span,
                        ty: *ty,
                        flags: DeclFlags::default(),
                    },
                );
            }
        }
        let body = self.parse_block_contents(decl.span);
        self.pop_scope();

        if let Type::Function { body: body_slot, .. } = self.types.get_mut(decl.ty.id) {
            *body_slot = Some(body);
        }

        self.stmts.push(Statement {
            kind: StmtKind::Function {
                name: decl.name,
                definition: FunctionDefinition {
                    parameters: decl.param_names.into_iter().flatten().collect(),
                    body,
                },
            },
            span: decl.span,
        })
    }

    // -- statements --------------------------------------------------------

    fn parse_declaration_or_statement(&mut self, out: &mut Vec<StmtId>) {
        if self.starts_declaration() {
            out.extend(self.parse_declaration());
        } else if let Some(stmt) = self.parse_statement() {
            out.push(stmt);
        }
    }

    fn parse_block_items(&mut self) -> Vec<StmtId> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(t) if t.kind == TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                None => break,
                _ => {}
            }
            let before = items.len();
            self.parse_declaration_or_statement(&mut items);
            if items.len() == before {
                self.synchronize_past_semi();
            }
        }
        items
    }

    fn parse_block(&mut self) -> StmtId {
        let open = self.advance().expect("caller peeked LBrace");
        self.push_scope();
        let items = self.parse_block_items();
        self.pop_scope();
        self.stmts.push(Statement {
            kind: StmtKind::Block(items),
            span: open.span,
        })
    }

    /// Parses `{ ... }` for a function body whose parameter scope the
    /// caller has already pushed.
    fn parse_block_contents(&mut self, fallback_span: Span) -> StmtId {
        let span = self.expect(TokenKind::LBrace, "'{'").map(|t| t.span).unwrap_or(fallback_span);
        let items = self.parse_block_items();
        self.stmts.push(Statement {
            kind: StmtKind::Block(items),
            span,
        })
    }

    fn parse_for(&mut self) -> StmtId {
        let kw = self.advance().expect("caller peeked For");
        self.expect(TokenKind::LParen, "'('");
        let init = if self.peek_is(TokenKind::Semi) {
            None
        } else {
            self.parse_expression()
        };
        self.expect(TokenKind::Semi, "';'");
        let condition = if self.peek_is(TokenKind::Semi) {
            None
        } else {
            self.parse_expression()
        };
        self.expect(TokenKind::Semi, "';'");
        let increment = if self.peek_is(TokenKind::RParen) {
            None
        } else {
            self.parse_expression()
        };
        self.expect(TokenKind::RParen, "')'");
        let body = self.parse_loop_body(kw.span);
        self.stmts.push(Statement {
            kind: StmtKind::For {
                init,
                condition,
                increment,
                body,
            },
            span: kw.span,
        })
    }

    fn parse_while(&mut self) -> StmtId {
        let kw = self.advance().expect("caller peeked While");
        self.expect(TokenKind::LParen, "'('");
        let condition = self
            .parse_expression()
            .unwrap_or_else(|| self.synthesize_error_expr(kw.span));
        self.expect(TokenKind::RParen, "')'");
        let body = self.parse_loop_body(kw.span);
        self.stmts.push(Statement {
            kind: StmtKind::While { condition, body },
            span: kw.span,
        })
    }

    fn parse_loop_body(&mut self, fallback_span: Span) -> StmtId {
        self.parse_statement().unwrap_or_else(|| {
            self.stmts.push(Statement {
                kind: StmtKind::Block(Vec::new()),
                span: fallback_span,
            })
        })
    }

    fn parse_return(&mut self) -> StmtId {
        let kw = self.advance().expect("caller peeked Return");
        let value = if self.peek_is(TokenKind::Semi) {
            None
        } else {
            self.parse_expression()
        };
        self.expect(TokenKind::Semi, "';'");
        self.stmts.push(Statement {
            kind: StmtKind::Return(value),
            span: kw.span,
        })
    }

    pub fn parse_statement(&mut self) -> Option<StmtId> {
        let tok = self.peek()?;
        match tok.kind {
            TokenKind::LBrace => Some(self.parse_block()),
            TokenKind::For => Some(self.parse_for()),
            TokenKind::While => Some(self.parse_while()),
            TokenKind::Return => Some(self.parse_return()),
            TokenKind::Semi => {
                self.advance();
                None
            }
            _ => {
                let expr = self.parse_expression();
                self.expect(TokenKind::Semi, "';'");
                expr.map(|e| {
                    let span = self.exprs.get(e).span;
                    self.stmts.push(Statement {
                        kind: StmtKind::Expression(e),
                        span,
                    })
                })
            }
        }
    }

    // -- expressions ---------------------------------------------------

    pub fn parse_expression(&mut self) -> Option<ExprId> {
        self.parse_expression_at(18)
    }

    fn parse_expression_no_comma(&mut self) -> Option<ExprId> {
        self.parse_expression_at(17)
    }

    fn parse_expression_at(&mut self, max_precedence: i32) -> Option<ExprId> {
        let mut left = self.parse_atom()?;
        loop {
            let Some(tok) = self.peek() else { break };
            if tok.kind == TokenKind::Question && 16 < max_precedence {
                self.advance();
                let Some(then_branch) = self.parse_expression_at(17) else {
                    break;
                };
                self.expect(TokenKind::Colon, "':'");
                let Some(else_branch) = self.parse_expression_at(16) else {
                    break;
                };
                let span = self.exprs.get(left).span.merge(self.exprs.get(else_branch).span);
                left = self.exprs.push(Expression {
                    kind: ExprKind::Ternary {
                        condition: left,
                        then_branch,
                        else_branch,
                    },
                    span,
                });
                continue;
            }
            let Some((prec, left_assoc)) = operator_precedence(tok.kind) else { break };
            if prec >= max_precedence {
                break;
            }
            self.advance();
            let next_max = if left_assoc { prec } else { prec + 1 };
            let Some(right) = self.parse_expression_at(next_max) else {
                self.report(ParseError::ExpectedExpression { span: tok.span });
                break;
            };
            let span = self.exprs.get(left).span.merge(self.exprs.get(right).span);
            left = self.exprs.push(Expression {
                kind: ExprKind::Binary {
                    op: tok.kind,
                    left,
                    right,
                },
                span,
            });
        }
        Some(left)
    }

    fn parse_atom(&mut self) -> Option<ExprId> {
        let tok = self.advance()?;
        match tok.kind {
            TokenKind::IntegerLiteral => {
                let (value, suffix) = match tok.payload {
                    TokenPayload::Integer { value, suffix } => (value, suffix),
                    _ => (0, Default::default()),
                };
                Some(self.exprs.push(Expression {
                    kind: ExprKind::IntegerLiteral { value, suffix },
                    span: tok.span,
                }))
            }
            TokenKind::Identifier => {
                let name = tok.identifier_symbol().unwrap();
                if self.declarations.lookup(&name).is_none() {
                    self.report(ParseError::UndefinedVariable {
                        span: tok.span,
                        name: self.interner.resolve(name).to_string(),
                    });
                }
                Some(self.exprs.push(Expression {
                    kind: ExprKind::Variable(name),
                    span: tok.span,
                }))
            }
            TokenKind::LParen => {
                if self.peek_starts_type() {
                    let spec = self.parse_declaration_specifiers();
                    let base = spec.ty.unwrap_or_else(|| TypeQualified::unqualified(self.types.builtin(Builtin::Error)));
                    let target = self.parse_abstract_declarator(base);
                    self.expect(TokenKind::RParen, "')'");
                    let value = self.parse_expression_at(5).unwrap_or_else(|| self.synthesize_error_expr(tok.span));
                    let span = tok.span.merge(self.exprs.get(value).span);
                    Some(self.exprs.push(Expression {
                        kind: ExprKind::Cast { target, value },
                        span,
                    }))
                } else {
                    let inner = self.parse_expression();
                    self.expect(TokenKind::RParen, "')'");
                    inner
                }
            }
            // `)` or `;` at atom position terminates cleanly (§4.4.2): the
            // caller expects an empty expression here, not a malformed one.
            TokenKind::RParen | TokenKind::Semi => {
                self.push_back(tok);
                None
            }
            _ => {
                self.report(ParseError::ExpectedExpression { span: tok.span });
                self.push_back(tok);
                None
            }
        }
    }

    /// Folds a constant expression to an `i64`, used for enumerator values
    /// and array bounds. Only the operators this grammar can produce appear
    /// here; an unevaluable node (a cast, an unresolved variable) folds to 0
    /// rather than failing the parse.
    fn eval_const_expr(&self, id: ExprId) -> i64 {
        match &self.exprs.get(id).kind {
            ExprKind::IntegerLiteral { value, .. } => *value as i64,
            ExprKind::Binary { op, left, right } => {
                let l = self.eval_const_expr(*left);
                let r = self.eval_const_expr(*right);
                match op {
                    TokenKind::Plus => l + r,
                    TokenKind::Minus => l - r,
                    TokenKind::Star => l * r,
                    TokenKind::Slash => {
                        if r != 0 {
                            l / r
                        } else {
                            0
                        }
                    }
                    TokenKind::Amp => l & r,
                    TokenKind::Pipe => l | r,
                    TokenKind::AmpAmp => i64::from(l != 0 && r != 0),
                    TokenKind::PipePipe => i64::from(l != 0 || r != 0),
                    TokenKind::Lt => i64::from(l < r),
                    TokenKind::LtEq => i64::from(l <= r),
                    TokenKind::Gt => i64::from(l > r),
                    TokenKind::GtEq => i64::from(l >= r),
                    TokenKind::EqEq => i64::from(l == r),
                    TokenKind::NotEq => i64::from(l != r),
                    _ => r,
                }
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_const_expr(*condition) != 0 {
                    self.eval_const_expr(*then_branch)
                } else {
                    self.eval_const_expr(*else_branch)
                }
            }
            _ => 0,
        }
    }

    // -- translation unit ----------------------------------------------

    pub fn parse_translation_unit(mut self) -> TranslationUnit {
        let mut items = Vec::new();
        while self.peek().is_some() {
            let before = items.len();
            self.parse_declaration_or_statement(&mut items);
            if items.len() == before {
                if self.peek().is_none() {
                    break;
                }
                self.synchronize_past_semi();
            }
        }
        TranslationUnit {
            items,
            exprs: self.exprs,
            stmts: self.stmts,
            types: self.types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfront_base::Interner;
    use crate::ast::StmtKind;
    use crate::file::{FileStore, StdFileLoader};

    fn parse(source: &str) -> (TranslationUnit, Diagnostics) {
        let mut store = FileStore::new();
        let file_id = store.add_str("test.c", source);
        let mut interner = Interner::new();
        let mut diags = Diagnostics::new();
        let mut pp = Preprocessor::new(file_id, Vec::new(), Box::new(StdFileLoader));
        let tu = {
            let parser = Parser::new(&mut pp, &mut store, &mut interner, &mut diags);
            parser.parse_translation_unit()
        };
        (tu, diags)
    }

    #[test]
    fn simple_declaration_with_initializer() {
        let (tu, diags) = parse("int x = 1;");
        assert!(!diags.has_errors());
        assert_eq!(tu.items.len(), 1);
        match &tu.stmts.get(tu.items[0]).kind {
            StmtKind::InitializerCopy { .. } => {}
            other => panic!("expected InitializerCopy, got {:?}", other),
        }
    }

    #[test]
    fn typedef_then_declaration_resolves_type() {
        let (tu, diags) = parse("typedef int my_int; my_int x;");
        assert!(!diags.has_errors());
        assert_eq!(tu.items.len(), 1);
    }

    #[test]
    fn shadowed_typedef_is_not_a_type_scenario() {
        // typedef T=int at file scope; inner block redeclares T as a plain
        // variable, so the following `T x;` must fail to resolve T as a type.
        let (_tu, diags) = parse("typedef int T; void f(void) { int T; T x; }");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.entries()[0].message.contains("not a type") || diags.entries()[0].message.contains("variable"));
    }

    #[test]
    fn bare_tag_without_keyword_is_one_error_and_still_declares() {
        let (tu, diags) = parse("struct S { int x; }; S s;");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.entries()[0].message.contains("tag"));
        // two top-level items: the struct definition (no declarator, so it
        // produces no statement) and `S s;`'s initializer statement.
        assert_eq!(tu.items.len(), 1);
    }

    #[test]
    fn self_referential_struct_via_pointer() {
        let (_tu, diags) = parse("struct node { int value; struct node *next; };");
        assert!(!diags.has_errors());
    }

    #[test]
    fn precedence_and_associativity() {
        // `1 + 2 * 3` should parse as `1 + (2 * 3)`.
        let (tu, diags) = parse("int x = 1 + 2 * 3;");
        assert!(!diags.has_errors());
        let StmtKind::InitializerCopy { value, .. } = &tu.stmts.get(tu.items[0]).kind else {
            panic!("expected initializer")
        };
        let ExprKind::Binary { op, left, right } = &tu.exprs.get(*value).kind else {
            panic!("expected binary")
        };
        assert_eq!(*op, TokenKind::Plus);
        matches!(tu.exprs.get(*left).kind, ExprKind::IntegerLiteral { value: 1, .. });
        matches!(tu.exprs.get(*right).kind, ExprKind::Binary { op: TokenKind::Star, .. });
    }

    #[test]
    fn assignment_is_right_associative() {
        // `a = b = 1` should parse as `a = (b = 1)`.
        let (tu, diags) = parse("void f(void) { int a; int b; a = b = 1; }");
        assert!(!diags.has_errors());
        let StmtKind::Function { definition, .. } = &tu.stmts.get(tu.items[0]).kind else {
            panic!("expected function")
        };
        let StmtKind::Block(items) = &tu.stmts.get(definition.body).kind else {
            panic!("expected block")
        };
        let last = *items.last().unwrap();
        let StmtKind::Expression(expr_id) = &tu.stmts.get(last).kind else {
            panic!("expected expression statement")
        };
        let ExprKind::Binary { op, right, .. } = &tu.exprs.get(*expr_id).kind else {
            panic!("expected assignment")
        };
        assert_eq!(*op, TokenKind::Eq);
        matches!(tu.exprs.get(*right).kind, ExprKind::Binary { op: TokenKind::Eq, .. });
    }

    #[test]
    fn undefined_variable_is_reported() {
        let (_tu, diags) = parse("void f(void) { x; }");
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn enum_values_default_and_explicit() {
        let (tu, diags) = parse("enum color { RED, GREEN = 5, BLUE };");
        assert!(!diags.has_errors());
        let Type::Enum(e) = (match tu.items.first() {
            Some(_) => tu.types.get(TypeId(0)),
            None => panic!("no items"),
        }) else {
            panic!("")
        };
        let _ = e;
    }

    #[test]
    fn function_definition_installs_parameters_in_scope() {
        let (_tu, diags) = parse("int add(int a, int b) { return a + b; }");
        assert!(!diags.has_errors());
    }
}

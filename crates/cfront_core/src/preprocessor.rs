//! The preprocessor (§4.3): directive dispatch, conditional compilation,
//! `#include` file chaining, and object-/function-like macro expansion.
//!
//! This is the layer the parser actually pulls tokens from. It owns the
//! active [`Lexer`], the suspended-ancestor [`IncludeStack`], the
//! [`MacroTable`], the [`ConditionalStack`], and the [`PragmaOnceSet`], plus
//! a `pending` queue that doubles as both "tokens produced by a macro
//! expansion, not yet emitted" and "one-token-at-a-time lookahead pulled
//! from the raw stream while deciding whether an identifier is a macro
//! invocation". Errors are reported to [`Diagnostics`] and synchronized past
//! (§7, §9) rather than returned: a caller just keeps calling `next_token`
//! until it returns `None`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use cfront_base::{Interner, Symbol};

use crate::conditional::ConditionalStack;
use crate::cursor::TextCursor;
use crate::error::{Diagnostics, PreprocessError};
use crate::file::{FileContents, FileLoader, FileStore};
use crate::include::{IncludeFrame, IncludeStack, PragmaOnceSet};
use crate::lexer::Lexer;
use crate::location::Span;
use crate::macros::{MacroDef, MacroTable, ReplacementToken};
use crate::token::{IntegerSuffix, Token, TokenKind, TokenPayload};
use log::trace;

/// Hard nesting bound on `#include`, matching the "recoverable, diagnosed"
/// treatment other resource limits get in this crate rather than a stack
/// overflow.
const MAX_INCLUDE_DEPTH: usize = 200;

#[derive(Clone)]
struct PendingEntry {
    token: Token,
    /// Macro names blocked from re-expanding inside this token (§4.3.1,
    /// §9 "macro re-expansion blocking"). Shared via `Rc` across every token
    /// produced by the same expansion rather than recomputed per token.
    hide: Rc<FxHashSet<Symbol>>,
}

fn no_hide() -> Rc<FxHashSet<Symbol>> {
    Rc::new(FxHashSet::default())
}

/// Renders a token back to the source text it would have been lexed from,
/// used by both `#`-stringify and `##`-paste (§4.3.1).
fn token_text(token: &Token, interner: &Interner) -> String {
    match token.payload {
        TokenPayload::Identifier(sym) => interner.resolve(sym).to_string(),
        TokenPayload::String(sym) => format!("\"{}\"", interner.resolve(sym)),
        TokenPayload::Character(v) => format!("'{}'", char::from_u32(v).unwrap_or('?')),
        TokenPayload::Integer { value, suffix } => {
            let mut s = value.to_string();
            if suffix.unsigned {
                s.push('u');
            }
            if suffix.long_long {
                s.push_str("ll");
            } else if suffix.long {
                s.push('l');
            }
            s
        }
        TokenPayload::None => token.kind.canonical_text().to_string(),
    }
}

/// `#`-stringify: render `tokens` back to source form, one space between
/// adjacent tokens, with the whole result's quotes/backslashes escaped so it
/// can be wrapped in an outer pair of quotes (§4.3.1).
fn stringify_tokens(tokens: &[Token], interner: &Interner) -> String {
    let rendered: Vec<String> = tokens.iter().map(|t| token_text(t, interner)).collect();
    rendered.join(" ").replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders a whole token list back to flat text with single-space
/// separation, used for `#error`'s message and the `<path>` form of
/// `#include`.
fn render_tokens_plain(tokens: &[Token], interner: &Interner) -> String {
    tokens
        .iter()
        .map(|t| token_text(t, interner))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Re-lexes `text` as a standalone source fragment; returns `Some` only if
/// it forms exactly one token that consumes the whole fragment, per the
/// `##`-paste validity rule (§4.3.1).
fn relex_single(store: &mut FileStore, interner: &mut Interner, text: &str) -> Option<Token> {
    let file_id = store.add_str("<paste>", text);
    let cursor = TextCursor::new(file_id);
    let mut lexer = Lexer::new(cursor);
    let mut at_bol = true;
    let first = lexer.next_token(store, interner, &mut at_bol).ok()??;
    if lexer.at_eof(store) {
        Some(first)
    } else {
        None
    }
}

/// The unified preprocessing pipeline: pulls characters through a
/// [`Lexer`]/[`TextCursor`] pair, executes directives, and expands macros.
pub struct Preprocessor {
    lexer: Lexer,
    at_bol: bool,
    conditional_depth_at_entry: usize,
    include_stack: IncludeStack,
    macro_table: MacroTable,
    conditional_stack: ConditionalStack,
    pragma_once: PragmaOnceSet,
    pending: VecDeque<PendingEntry>,
    raw_pushback: Option<(Token, bool)>,
    search_path: Vec<PathBuf>,
    loader: Box<dyn FileLoader>,
}

impl Preprocessor {
    pub fn new(start_file: crate::file::FileId, search_path: Vec<PathBuf>, loader: Box<dyn FileLoader>) -> Self {
        Preprocessor {
            lexer: Lexer::new(TextCursor::new(start_file)),
            at_bol: true,
            conditional_depth_at_entry: 0,
            include_stack: IncludeStack::new(),
            macro_table: MacroTable::new(),
            conditional_stack: ConditionalStack::new(),
            pragma_once: PragmaOnceSet::new(),
            pending: VecDeque::new(),
            raw_pushback: None,
            search_path,
            loader,
        }
    }

    /// Installs a macro before preprocessing begins, for built-in defines
    /// (`__FILE__`-style setups); not used by the core itself today but
    /// kept as the extension seam a driver would use.
    pub fn predefine(&mut self, name: Symbol, def: MacroDef) {
        let _ = self.macro_table.define(name, def);
    }

    // -- raw token sourcing -------------------------------------------------

    /// Pulls one token straight from the lexer, following `#include`/EOF
    /// chaining transparently. Returns `(token, was_at_line_start)`.
    fn pull_raw(&mut self, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) -> Option<(Token, bool)> {
        if let Some(pair) = self.raw_pushback.take() {
            return Some(pair);
        }
        loop {
            match self.lexer.next_token(store, interner, &mut self.at_bol) {
                Ok(Some(tok)) => {
                    let was_bol = self.at_bol;
                    self.at_bol = false;
                    return Some((tok, was_bol));
                }
                Ok(None) => {
                    if self.conditional_stack.depth() > self.conditional_depth_at_entry {
                        let span = Span::point(self.lexer.cursor_location());
                        diags.error(span, "unterminated conditional directive at end of file");
                        self.conditional_stack.truncate_to(self.conditional_depth_at_entry);
                    }
                    match self.include_stack.pop() {
                        Some(frame) => {
                            self.lexer = Lexer::new(frame.cursor);
                            self.at_bol = frame.bol;
                            self.conditional_depth_at_entry = frame.conditional_depth_at_entry;
                            continue;
                        }
                        None => return None,
                    }
                }
                Err(err) => {
                    diags.error(err.span(), err.to_string());
                    continue;
                }
            }
        }
    }

    fn push_back_raw(&mut self, tok: Token, was_bol: bool) {
        self.raw_pushback = Some((tok, was_bol));
    }

    /// Pulls the next token regardless of source: anything still sitting in
    /// `pending` first, otherwise a fresh raw token (wrapped with an empty
    /// hide set). Used for both top-level macro-name lookahead and argument
    /// collection, which may need to read tokens still queued from an
    /// enclosing expansion.
    fn pull_unified(&mut self, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) -> Option<PendingEntry> {
        if let Some(entry) = self.pending.pop_front() {
            return Some(entry);
        }
        self.pull_raw(store, interner, diags).map(|(token, _)| PendingEntry { token, hide: no_hide() })
    }

    /// Discards raw tokens up to (not including) the next line start, used
    /// after a directive whose remainder of line isn't otherwise consumed.
    fn discard_line(&mut self, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        loop {
            match self.pull_raw(store, interner, diags) {
                Some((tok, was_bol)) => {
                    if was_bol {
                        self.push_back_raw(tok, was_bol);
                        return;
                    }
                }
                None => return,
            }
        }
    }

    /// Collects every raw token through the end of the current logical
    /// line, leaving the line-starting token (if any) pushed back.
    fn collect_line(&mut self, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            match self.pull_raw(store, interner, diags) {
                Some((tok, was_bol)) => {
                    if was_bol {
                        self.push_back_raw(tok, was_bol);
                        break;
                    }
                    tokens.push(tok);
                }
                None => break,
            }
        }
        tokens
    }

    // -- top-level token production -----------------------------------------

    /// Produces the next post-preprocessing token, or `None` once the
    /// include stack has fully drained (§4.3).
    pub fn next_token(&mut self, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) -> Option<Token> {
        loop {
            let entry = match self.pending.pop_front() {
                Some(entry) => entry,
                None => {
                    let (tok, was_bol) = self.pull_raw(store, interner, diags)?;
                    if was_bol && tok.kind == TokenKind::Hash {
                        let skipping = self.conditional_stack.is_skipping();
                        self.handle_directive(skipping, store, interner, diags);
                        continue;
                    }
                    if self.conditional_stack.is_skipping() {
                        continue;
                    }
                    PendingEntry { token: tok, hide: no_hide() }
                }
            };

            let Some(sym) = entry.token.identifier_symbol() else {
                return Some(entry.token);
            };
            if entry.hide.contains(&sym) {
                return Some(entry.token);
            }
            let Some(def) = self.macro_table.lookup(sym).cloned() else {
                return Some(entry.token);
            };

            if def.is_function_like {
                match self.pull_unified(store, interner, diags) {
                    Some(next) if next.token.kind == TokenKind::LParen => {
                        let (args, varargs) = self.collect_arguments(&def, sym, entry.token.span, store, interner, diags);
                        self.do_expand(&def, sym, entry.token.span, &args, &varargs, store, interner, diags);
                        continue;
                    }
                    Some(next) => {
                        self.pending.push_front(next);
                        return Some(entry.token);
                    }
                    None => return Some(entry.token),
                }
            }

            self.do_expand(&def, sym, entry.token.span, &[], &[], store, interner, diags);
        }
    }

    fn do_expand(
        &mut self,
        def: &MacroDef,
        name: Symbol,
        invocation_span: Span,
        args: &[Vec<Token>],
        varargs: &[Token],
        store: &mut FileStore,
        interner: &mut Interner,
        diags: &mut Diagnostics,
    ) {
        trace!("expanding macro '{}' ({} replacement tokens)", interner.resolve(name), def.replacement.len());
        let replaced = self.substitute(def, args, varargs, invocation_span, store, interner, diags);
        let mut hide_set = FxHashSet::default();
        hide_set.insert(name);
        let new_hide = Rc::new(hide_set);
        for tok in replaced.into_iter().rev() {
            self.pending.push_front(PendingEntry { token: tok, hide: new_hide.clone() });
        }
        trace!("expansion of '{}' complete", interner.resolve(name));
    }

    // -- macro argument collection ------------------------------------------

    fn collect_arguments(
        &mut self,
        def: &MacroDef,
        name: Symbol,
        invocation_span: Span,
        store: &mut FileStore,
        interner: &mut Interner,
        diags: &mut Diagnostics,
    ) -> (Vec<Vec<Token>>, Vec<Token>) {
        let mut args: Vec<Vec<Token>> = Vec::new();
        let mut current: Vec<Token> = Vec::new();
        let mut varargs: Vec<Token> = Vec::new();
        let mut depth = 0i32;
        let mut in_varargs = def.parameter_count == 0 && def.has_varargs;

        loop {
            let entry = match self.pull_unified(store, interner, diags) {
                Some(e) => e,
                None => break,
            };
            match entry.token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    depth += 1;
                    if in_varargs {
                        varargs.push(entry.token);
                    } else {
                        current.push(entry.token);
                    }
                }
                TokenKind::RParen if depth == 0 => {
                    if !in_varargs && !(current.is_empty() && args.is_empty() && def.parameter_count == 0 && !def.has_varargs) {
                        args.push(std::mem::take(&mut current));
                    }
                    break;
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth -= 1;
                    if in_varargs {
                        varargs.push(entry.token);
                    } else {
                        current.push(entry.token);
                    }
                }
                TokenKind::Comma if depth == 0 && !in_varargs => {
                    args.push(std::mem::take(&mut current));
                    if def.has_varargs && args.len() >= def.parameter_count {
                        in_varargs = true;
                    }
                }
                _ => {
                    if in_varargs {
                        varargs.push(entry.token);
                    } else {
                        current.push(entry.token);
                    }
                }
            }
        }

        if args.len() != def.parameter_count {
            let name_text = interner.resolve(name).to_string();
            diags.error(
                invocation_span,
                PreprocessError::ArityMismatch {
                    span: invocation_span,
                    name: name_text,
                    expected: def.parameter_count,
                    got: args.len(),
                }
                .to_string(),
            );
        }
        (args, varargs)
    }

    // -- substitution (parameter splice, `#`, `##`) --------------------------

    fn substitute(
        &mut self,
        def: &MacroDef,
        args: &[Vec<Token>],
        varargs: &[Token],
        invocation_span: Span,
        store: &mut FileStore,
        interner: &mut Interner,
        diags: &mut Diagnostics,
    ) -> Vec<Token> {
        let expanded_args: Vec<Vec<Token>> =
            args.iter().map(|a| self.expand_token_list(a.clone(), store, interner, diags)).collect();
        let expanded_varargs = self.expand_token_list(varargs.to_vec(), store, interner, diags);

        let repl = &def.replacement;
        let n = repl.len();
        let touches_paste = |i: usize| -> bool {
            (i > 0 && matches!(repl[i - 1], ReplacementToken::Paste))
                || (i + 1 < n && matches!(repl[i + 1], ReplacementToken::Paste))
        };

        let mut pieces: Vec<Vec<Token>> = Vec::new();
        let mut glue_after: Vec<usize> = Vec::new();
        for (idx, elem) in repl.iter().enumerate() {
            match elem {
                ReplacementToken::Paste => {
                    if !pieces.is_empty() {
                        glue_after.push(pieces.len() - 1);
                    }
                }
                ReplacementToken::Plain(tok) => pieces.push(vec![tok.with_span(invocation_span)]),
                ReplacementToken::Stringify(param_idx) => {
                    let raw: &[Token] = if *param_idx == def.parameter_count {
                        varargs
                    } else {
                        args.get(*param_idx).map(Vec::as_slice).unwrap_or(&[])
                    };
                    let text = stringify_tokens(raw, interner);
                    let sym = interner.intern(&text);
                    pieces.push(vec![Token::with_payload(TokenKind::StringLiteral, invocation_span, TokenPayload::String(sym))]);
                }
                ReplacementToken::Parameter(param_idx) => {
                    let source: Vec<Token> = if touches_paste(idx) {
                        let raw: &[Token] = if *param_idx == def.parameter_count {
                            varargs
                        } else {
                            args.get(*param_idx).map(Vec::as_slice).unwrap_or(&[])
                        };
                        raw.to_vec()
                    } else if *param_idx == def.parameter_count {
                        expanded_varargs.clone()
                    } else {
                        expanded_args.get(*param_idx).cloned().unwrap_or_default()
                    };
                    pieces.push(source.into_iter().map(|t| t.with_span(invocation_span)).collect());
                }
                ReplacementToken::Varargs => {
                    let source = if touches_paste(idx) { varargs.to_vec() } else { expanded_varargs.clone() };
                    pieces.push(source.into_iter().map(|t| t.with_span(invocation_span)).collect());
                }
            }
        }

        let mut merged: Vec<Vec<Token>> = Vec::new();
        let mut pending_glue = false;
        for (i, piece) in pieces.into_iter().enumerate() {
            if pending_glue {
                pending_glue = false;
                let prev = merged.last_mut().expect("glue_after never points at piece 0");
                let left = prev.pop();
                let mut piece = piece;
                let right = if piece.is_empty() { None } else { Some(piece.remove(0)) };
                match (left, right) {
                    (Some(l), Some(r)) => {
                        let text = format!("{}{}", token_text(&l, interner), token_text(&r, interner));
                        match relex_single(store, interner, &text) {
                            Some(glued) => prev.push(glued.with_span(invocation_span)),
                            None => {
                                diags.error_in_expansion(
                                    invocation_span,
                                    invocation_span,
                                    PreprocessError::InvalidPaste { span: invocation_span }.to_string(),
                                );
                                prev.push(l);
                                prev.push(r);
                            }
                        }
                    }
                    (Some(l), None) => prev.push(l),
                    (None, Some(r)) => prev.push(r),
                    (None, None) => {}
                }
                prev.extend(piece);
            } else {
                merged.push(piece);
            }
            if glue_after.contains(&i) {
                pending_glue = true;
            }
        }

        merged.into_iter().flatten().collect()
    }

    /// Fully macro-expands a standalone token list (used to pre-expand
    /// macro arguments before substitution, per §4.3.1). Function-like
    /// macro invocations are only recognized when their `(` is part of the
    /// same list; a call whose `(` would come from outside the argument is
    /// left unexpanded, a narrow simplification of the full algorithm.
    fn expand_token_list(&mut self, tokens: Vec<Token>, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) -> Vec<Token> {
        let mut queue: VecDeque<PendingEntry> = tokens.into_iter().map(|token| PendingEntry { token, hide: no_hide() }).collect();
        let mut output = Vec::new();
        while let Some(entry) = queue.pop_front() {
            let sym = match entry.token.identifier_symbol() {
                Some(sym) if !entry.hide.contains(&sym) => sym,
                _ => {
                    output.push(entry.token);
                    continue;
                }
            };
            let def = match self.macro_table.lookup(sym).cloned() {
                Some(def) => def,
                None => {
                    output.push(entry.token);
                    continue;
                }
            };
            if def.is_function_like {
                if matches!(queue.front().map(|e| e.token.kind), Some(TokenKind::LParen)) {
                    queue.pop_front();
                    let (args, varargs) = self.collect_arguments_from_queue(&def, &mut queue);
                    let replaced = self.substitute(&def, &args, &varargs, entry.token.span, store, interner, diags);
                    let mut hide_set = (*entry.hide).clone();
                    hide_set.insert(sym);
                    let new_hide = Rc::new(hide_set);
                    for tok in replaced.into_iter().rev() {
                        queue.push_front(PendingEntry { token: tok, hide: new_hide.clone() });
                    }
                } else {
                    output.push(entry.token);
                }
                continue;
            }
            let replaced = self.substitute(&def, &[], &[], entry.token.span, store, interner, diags);
            let mut hide_set = (*entry.hide).clone();
            hide_set.insert(sym);
            let new_hide = Rc::new(hide_set);
            for tok in replaced.into_iter().rev() {
                queue.push_front(PendingEntry { token: tok, hide: new_hide.clone() });
            }
        }
        output
    }

    fn collect_arguments_from_queue(&self, def: &MacroDef, queue: &mut VecDeque<PendingEntry>) -> (Vec<Vec<Token>>, Vec<Token>) {
        let mut args: Vec<Vec<Token>> = Vec::new();
        let mut current: Vec<Token> = Vec::new();
        let mut varargs: Vec<Token> = Vec::new();
        let mut depth = 0i32;
        let mut in_varargs = def.parameter_count == 0 && def.has_varargs;

        while let Some(entry) = queue.pop_front() {
            match entry.token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    depth += 1;
                    if in_varargs {
                        varargs.push(entry.token);
                    } else {
                        current.push(entry.token);
                    }
                }
                TokenKind::RParen if depth == 0 => {
                    if !in_varargs && !(current.is_empty() && args.is_empty() && def.parameter_count == 0 && !def.has_varargs) {
                        args.push(std::mem::take(&mut current));
                    }
                    break;
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth -= 1;
                    if in_varargs {
                        varargs.push(entry.token);
                    } else {
                        current.push(entry.token);
                    }
                }
                TokenKind::Comma if depth == 0 && !in_varargs => {
                    args.push(std::mem::take(&mut current));
                    if def.has_varargs && args.len() >= def.parameter_count {
                        in_varargs = true;
                    }
                }
                _ => {
                    if in_varargs {
                        varargs.push(entry.token);
                    } else {
                        current.push(entry.token);
                    }
                }
            }
        }
        (args, varargs)
    }

    // -- directive dispatch ---------------------------------------------------

    fn handle_directive(&mut self, skipping: bool, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let (name_tok, _) = match self.pull_raw(store, interner, diags) {
            Some(pair) => pair,
            None => return,
        };
        let name = match name_tok.identifier_symbol() {
            Some(sym) => interner.resolve(sym).to_string(),
            // `if`/`else` lex as keyword tokens, not identifiers, so they
            // carry no interned symbol; fall back to their canonical text.
            None if name_tok.kind.is_keyword() => name_tok.kind.canonical_text().to_string(),
            None => {
                // A bare `#` alone on a line (the null directive) or a `#`
                // followed by something unexpected: either way, nothing more
                // to do but resync to the next line.
                self.discard_line(store, interner, diags);
                return;
            }
        };
        trace!("directive #{} (skipping={})", name, skipping);

        match name.as_str() {
            "include" => {
                if skipping {
                    self.discard_line(store, interner, diags);
                } else {
                    self.handle_include(name_tok.span, store, interner, diags);
                }
            }
            "define" => {
                if skipping {
                    self.discard_line(store, interner, diags);
                } else {
                    self.handle_define(name_tok.span, store, interner, diags);
                }
            }
            "undef" => {
                if skipping {
                    self.discard_line(store, interner, diags);
                } else {
                    self.handle_undef(name_tok.span, store, interner, diags);
                }
            }
            "if" => self.handle_if(name_tok.span, store, interner, diags),
            "elif" => self.handle_elif(name_tok.span, store, interner, diags),
            "ifdef" => self.handle_ifdef(name_tok.span, true, store, interner, diags),
            "ifndef" => self.handle_ifdef(name_tok.span, false, store, interner, diags),
            "else" => {
                if self.conditional_stack.else_branch().is_err() {
                    diags.error(name_tok.span, PreprocessError::UnmatchedElse { span: name_tok.span }.to_string());
                }
                self.discard_line(store, interner, diags);
            }
            "endif" => {
                if self.conditional_stack.pop().is_err() {
                    diags.error(name_tok.span, PreprocessError::UnmatchedEndif { span: name_tok.span }.to_string());
                }
                self.discard_line(store, interner, diags);
            }
            "pragma" => {
                if skipping {
                    self.discard_line(store, interner, diags);
                } else {
                    self.handle_pragma(store, interner, diags);
                }
            }
            "error" => {
                let rest = self.collect_line(store, interner, diags);
                let message = render_tokens_plain(&rest, interner);
                if !skipping {
                    diags.error(name_tok.span, PreprocessError::UserError { span: name_tok.span, message }.to_string());
                }
            }
            _ => {
                diags.error(
                    name_tok.span,
                    PreprocessError::UnknownDirective { span: name_tok.span, name: name.clone() }.to_string(),
                );
                self.discard_line(store, interner, diags);
            }
        }
    }

    fn handle_pragma(&mut self, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let rest = self.collect_line(store, interner, diags);
        if let Some(first) = rest.first() {
            if let Some(sym) = first.identifier_symbol() {
                if interner.resolve(sym) == "once" {
                    self.pragma_once.mark(self.lexer.file_id());
                }
            }
        }
    }

    fn handle_undef(&mut self, directive_span: Span, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let (tok, _) = match self.pull_raw(store, interner, diags) {
            Some(pair) => pair,
            None => {
                self.discard_line(store, interner, diags);
                return;
            }
        };
        match tok.identifier_symbol() {
            Some(sym) => {
                if !self.macro_table.undef(sym) {
                    diags.warning(directive_span, format!("'{}' was not defined", interner.resolve(sym)));
                }
            }
            None => {
                diags.error(directive_span, PreprocessError::MalformedDirective { span: directive_span, directive: "undef".to_string() }.to_string());
            }
        }
        self.discard_line(store, interner, diags);
    }

    fn handle_define(&mut self, directive_span: Span, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let (name_tok, _) = match self.pull_raw(store, interner, diags) {
            Some(pair) => pair,
            None => return,
        };
        let name_sym = match name_tok.identifier_symbol() {
            Some(sym) => sym,
            None => {
                diags.error(directive_span, PreprocessError::MalformedDirective { span: directive_span, directive: "define".to_string() }.to_string());
                self.discard_line(store, interner, diags);
                return;
            }
        };

        // Function-like iff `(` immediately follows with no intervening
        // whitespace; we don't track whitespace adjacency at the token
        // level, so we approximate with "the very next raw token is `(`",
        // which matches every macro definition actually seen in practice.
        let mut parameter_names: FxHashMap<Symbol, usize> = FxHashMap::default();
        let mut parameter_count = 0usize;
        let mut has_varargs = false;
        let mut is_function_like = false;

        let next = self.pull_raw(store, interner, diags);
        match next {
            Some((tok, _)) if tok.kind == TokenKind::LParen => {
                is_function_like = true;
                loop {
                    match self.pull_raw(store, interner, diags) {
                        Some((tok, _)) if tok.kind == TokenKind::RParen => break,
                        Some((tok, _)) if tok.kind == TokenKind::Comma => continue,
                        Some((tok, _)) if tok.kind == TokenKind::Ellipsis => {
                            has_varargs = true;
                        }
                        Some((tok, _)) => {
                            if let Some(sym) = tok.identifier_symbol() {
                                parameter_names.insert(sym, parameter_count);
                                parameter_count += 1;
                            } else {
                                diags.error(
                                    tok.span,
                                    PreprocessError::MalformedDirective { span: tok.span, directive: "define".to_string() }.to_string(),
                                );
                            }
                        }
                        None => break,
                    }
                }
            }
            Some((tok, was_bol)) => self.push_back_raw(tok, was_bol),
            None => {}
        }

        let body = self.collect_line(store, interner, diags);
        let replacement = self.encode_replacement(&body, &parameter_names, has_varargs, interner, diags);

        let def = MacroDef {
            replacement,
            parameter_count,
            is_function_like,
            has_varargs,
            parameter_names,
        };
        if self.macro_table.define(name_sym, def).is_err() {
            diags.error(
                directive_span,
                PreprocessError::IncompatibleRedefinition { span: directive_span, name: interner.resolve(name_sym).to_string() }.to_string(),
            );
        }
    }

    /// Turns a raw replacement-list token sequence into [`ReplacementToken`]s:
    /// parameter names become `Parameter`/`Varargs` markers, `#` immediately
    /// before a parameter becomes `Stringify`, and `##` becomes `Paste`.
    fn encode_replacement(
        &self,
        body: &[Token],
        parameter_names: &FxHashMap<Symbol, usize>,
        has_varargs: bool,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) -> Vec<ReplacementToken> {
        let is_va_args = |tok: &Token| tok.identifier_symbol().map(|s| interner.resolve(s) == "__VA_ARGS__").unwrap_or(false);

        let mut out = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let tok = &body[i];
            if tok.kind == TokenKind::HashHash {
                out.push(ReplacementToken::Paste);
                i += 1;
                continue;
            }
            if tok.kind == TokenKind::Hash && (!parameter_names.is_empty() || has_varargs) {
                if let Some(next) = body.get(i + 1) {
                    if let Some(sym) = next.identifier_symbol() {
                        if let Some(&idx) = parameter_names.get(&sym) {
                            out.push(ReplacementToken::Stringify(idx));
                            i += 2;
                            continue;
                        }
                        if has_varargs && is_va_args(next) {
                            out.push(ReplacementToken::Stringify(parameter_names.len()));
                            i += 2;
                            continue;
                        }
                    }
                }
                diags.error(tok.span, "'#' is not followed by a macro parameter");
                out.push(ReplacementToken::Plain(*tok));
                i += 1;
                continue;
            }
            if let Some(sym) = tok.identifier_symbol() {
                if let Some(&idx) = parameter_names.get(&sym) {
                    out.push(ReplacementToken::Parameter(idx));
                    i += 1;
                    continue;
                }
                if has_varargs && is_va_args(tok) {
                    out.push(ReplacementToken::Varargs);
                    i += 1;
                    continue;
                }
            }
            out.push(ReplacementToken::Plain(*tok));
            i += 1;
        }
        out
    }

    fn handle_include(&mut self, directive_span: Span, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let first = self.pull_raw(store, interner, diags);
        match first {
            Some((tok, _)) if tok.kind == TokenKind::StringLiteral => {
                let target = match tok.payload {
                    TokenPayload::String(sym) => interner.resolve(sym).to_string(),
                    _ => String::new(),
                };
                self.discard_line(store, interner, diags);
                self.do_include(directive_span, target, true, store, diags);
            }
            Some((tok, _)) if tok.kind == TokenKind::Lt => {
                let mut text = String::new();
                loop {
                    match self.pull_raw(store, interner, diags) {
                        Some((t, _)) if t.kind == TokenKind::Gt => break,
                        Some((t, was_bol)) if was_bol => {
                            self.push_back_raw(t, was_bol);
                            break;
                        }
                        Some((t, _)) => text.push_str(&token_text(&t, interner)),
                        None => break,
                    }
                }
                self.discard_line(store, interner, diags);
                self.do_include(directive_span, text, false, store, diags);
            }
            Some((tok, was_bol)) => {
                if was_bol {
                    self.push_back_raw(tok, was_bol);
                    return;
                }
                let mut rest = vec![tok];
                rest.extend(self.collect_line(store, interner, diags));
                let expanded = self.expand_token_list(rest, store, interner, diags);
                match expanded.first() {
                    Some(first) if first.kind == TokenKind::StringLiteral => {
                        if let TokenPayload::String(sym) = first.payload {
                            let target = interner.resolve(sym).to_string();
                            self.do_include(directive_span, target, true, store, diags);
                            return;
                        }
                    }
                    _ => {}
                }
                diags.error(
                    directive_span,
                    PreprocessError::MalformedDirective { span: directive_span, directive: "include".to_string() }.to_string(),
                );
            }
            None => {}
        }
    }

    fn do_include(&mut self, directive_span: Span, target: String, quoted: bool, store: &mut FileStore, diags: &mut Diagnostics) {
        let including_file = Some(self.lexer.file_id());
        let resolved = store.resolve_include(including_file, &target, quoted, &self.search_path);
        let path = match resolved {
            Some(path) => path,
            None => {
                diags.error(directive_span, PreprocessError::IncludeNotFound { span: directive_span, target }.to_string());
                return;
            }
        };
        trace!("#include resolved '{}' -> {}", target, path.display());
        let bytes = match self.loader.load(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                diags.error(directive_span, PreprocessError::Io { span: directive_span, message: format!("{}: {}", path.display(), e) }.to_string());
                return;
            }
        };
        let file_id = store.add(path, FileContents::from_bytes(&bytes));
        if self.pragma_once.contains(file_id) {
            return;
        }
        if self.include_stack.depth() >= MAX_INCLUDE_DEPTH {
            diags.error(directive_span, "#include nested too deeply");
            return;
        }

        let parent_file_id = self.lexer.file_id();
        let resume = self.lexer.resume_point();
        self.include_stack.push(IncludeFrame {
            file_id: parent_file_id,
            cursor: TextCursor::at(parent_file_id, resume),
            conditional_depth_at_entry: self.conditional_depth_at_entry,
            bol: self.at_bol,
        });
        self.conditional_depth_at_entry = self.conditional_stack.depth();
        self.lexer = Lexer::new(TextCursor::new(file_id));
        self.at_bol = true;
    }

    fn handle_ifdef(&mut self, directive_span: Span, want_defined: bool, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let (tok, _) = match self.pull_raw(store, interner, diags) {
            Some(pair) => pair,
            None => {
                self.conditional_stack.push(false);
                return;
            }
        };
        let defined = match tok.identifier_symbol() {
            Some(sym) => self.macro_table.is_defined(sym),
            None => {
                diags.error(directive_span, PreprocessError::MalformedDirective { span: directive_span, directive: "ifdef".to_string() }.to_string());
                false
            }
        };
        self.discard_line(store, interner, diags);
        self.conditional_stack.push(defined == want_defined);
    }

    fn evaluate_condition(&mut self, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) -> bool {
        let raw = self.collect_line(store, interner, diags);
        let with_defined = resolve_defined(raw, &self.macro_table, interner);
        let expanded = self.expand_token_list(with_defined, store, interner, diags);
        ConstEvaluator::evaluate(&expanded) != 0
    }

    fn handle_if(&mut self, _directive_span: Span, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let value = self.evaluate_condition(store, interner, diags);
        self.conditional_stack.push(value);
    }

    fn handle_elif(&mut self, directive_span: Span, store: &mut FileStore, interner: &mut Interner, diags: &mut Diagnostics) {
        let value = self.evaluate_condition(store, interner, diags);
        if self.conditional_stack.elif(value).is_err() {
            diags.error(directive_span, "#elif with no matching #if, or after #else");
        }
    }
}

/// Replaces `defined(X)`/`defined X` with an integer-literal `0`/`1` token,
/// before the rest of the line is macro-expanded (the operand of `defined`
/// must never itself be expanded).
fn resolve_defined(tokens: Vec<Token>, macro_table: &MacroTable, interner: &Interner) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let is_defined_kw = tokens[i].identifier_symbol().map(|s| interner.resolve(s) == "defined").unwrap_or(false);
        if !is_defined_kw {
            out.push(tokens[i]);
            i += 1;
            continue;
        }
        let span = tokens[i].span;
        i += 1;
        let name_sym = if tokens.get(i).map(|t| t.kind) == Some(TokenKind::LParen) {
            i += 1;
            let sym = tokens.get(i).and_then(|t| t.identifier_symbol());
            i += 1;
            if tokens.get(i).map(|t| t.kind) == Some(TokenKind::RParen) {
                i += 1;
            }
            sym
        } else {
            let sym = tokens.get(i).and_then(|t| t.identifier_symbol());
            i += 1;
            sym
        };
        let value = name_sym.map(|s| macro_table.is_defined(s)).unwrap_or(false) as u64;
        out.push(Token::with_payload(TokenKind::IntegerLiteral, span, TokenPayload::Integer { value, suffix: IntegerSuffix::default() }));
    }
    out
}

/// A small precedence-climbing evaluator for `#if`/`#elif` constant
/// expressions (§4.3): unary `+ - ! ~`, the full binary operator set, and
/// `?:`. Unknown identifiers (anything left un-expanded by the macro
/// expander) evaluate to `0`, per spec.
struct ConstEvaluator<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> ConstEvaluator<'t> {
    fn evaluate(tokens: &'t [Token]) -> i64 {
        let mut ev = ConstEvaluator { tokens, pos: 0 };
        ev.conditional()
    }

    fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn conditional(&mut self) -> i64 {
        let cond = self.logical_or();
        if self.peek() == Some(TokenKind::Question) {
            self.bump();
            let then_val = self.conditional();
            if self.peek() == Some(TokenKind::Colon) {
                self.bump();
            }
            let else_val = self.conditional();
            if cond != 0 {
                then_val
            } else {
                else_val
            }
        } else {
            cond
        }
    }

    fn logical_or(&mut self) -> i64 {
        let mut v = self.logical_and();
        while self.peek() == Some(TokenKind::PipePipe) {
            self.bump();
            let r = self.logical_and();
            v = ((v != 0) || (r != 0)) as i64;
        }
        v
    }

    fn logical_and(&mut self) -> i64 {
        let mut v = self.bitwise_or();
        while self.peek() == Some(TokenKind::AmpAmp) {
            self.bump();
            let r = self.bitwise_or();
            v = ((v != 0) && (r != 0)) as i64;
        }
        v
    }

    fn bitwise_or(&mut self) -> i64 {
        let mut v = self.bitwise_xor();
        while self.peek() == Some(TokenKind::Pipe) {
            self.bump();
            v |= self.bitwise_xor();
        }
        v
    }

    fn bitwise_xor(&mut self) -> i64 {
        let mut v = self.bitwise_and();
        while self.peek() == Some(TokenKind::Caret) {
            self.bump();
            v ^= self.bitwise_and();
        }
        v
    }

    fn bitwise_and(&mut self) -> i64 {
        let mut v = self.equality();
        while self.peek() == Some(TokenKind::Amp) {
            self.bump();
            v &= self.equality();
        }
        v
    }

    fn equality(&mut self) -> i64 {
        let mut v = self.relational();
        loop {
            match self.peek() {
                Some(TokenKind::EqEq) => {
                    self.bump();
                    v = (v == self.relational()) as i64;
                }
                Some(TokenKind::NotEq) => {
                    self.bump();
                    v = (v != self.relational()) as i64;
                }
                _ => break,
            }
        }
        v
    }

    fn relational(&mut self) -> i64 {
        let mut v = self.shift();
        loop {
            match self.peek() {
                Some(TokenKind::Lt) => {
                    self.bump();
                    v = (v < self.shift()) as i64;
                }
                Some(TokenKind::LtEq) => {
                    self.bump();
                    v = (v <= self.shift()) as i64;
                }
                Some(TokenKind::Gt) => {
                    self.bump();
                    v = (v > self.shift()) as i64;
                }
                Some(TokenKind::GtEq) => {
                    self.bump();
                    v = (v >= self.shift()) as i64;
                }
                _ => break,
            }
        }
        v
    }

    fn shift(&mut self) -> i64 {
        let mut v = self.additive();
        loop {
            match self.peek() {
                Some(TokenKind::Shl) => {
                    self.bump();
                    v <<= self.additive();
                }
                Some(TokenKind::Shr) => {
                    self.bump();
                    v >>= self.additive();
                }
                _ => break,
            }
        }
        v
    }

    fn additive(&mut self) -> i64 {
        let mut v = self.multiplicative();
        loop {
            match self.peek() {
                Some(TokenKind::Plus) => {
                    self.bump();
                    v += self.multiplicative();
                }
                Some(TokenKind::Minus) => {
                    self.bump();
                    v -= self.multiplicative();
                }
                _ => break,
            }
        }
        v
    }

    fn multiplicative(&mut self) -> i64 {
        let mut v = self.unary();
        loop {
            match self.peek() {
                Some(TokenKind::Star) => {
                    self.bump();
                    v *= self.unary();
                }
                Some(TokenKind::Slash) => {
                    self.bump();
                    let r = self.unary();
                    v = if r != 0 { v / r } else { 0 };
                }
                Some(TokenKind::Percent) => {
                    self.bump();
                    let r = self.unary();
                    v = if r != 0 { v % r } else { 0 };
                }
                _ => break,
            }
        }
        v
    }

    fn unary(&mut self) -> i64 {
        match self.peek() {
            Some(TokenKind::Plus) => {
                self.bump();
                self.unary()
            }
            Some(TokenKind::Minus) => {
                self.bump();
                -self.unary()
            }
            Some(TokenKind::Bang) => {
                self.bump();
                (self.unary() == 0) as i64
            }
            Some(TokenKind::Tilde) => {
                self.bump();
                !self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> i64 {
        match self.bump() {
            Some(tok) => match tok.kind {
                TokenKind::IntegerLiteral => match tok.payload {
                    TokenPayload::Integer { value, .. } => value as i64,
                    _ => 0,
                },
                TokenKind::CharLiteral => match tok.payload {
                    TokenPayload::Character(v) => v as i64,
                    _ => 0,
                },
                TokenKind::LParen => {
                    let v = self.conditional();
                    if self.peek() == Some(TokenKind::RParen) {
                        self.bump();
                    }
                    v
                }
                // Unknown identifiers (anything that survived macro
                // expansion unresolved) evaluate to 0.
                _ => 0,
            },
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileId;

    fn run(src: &str) -> (Vec<Token>, Interner, Diagnostics) {
        let mut store = FileStore::new();
        let file_id = store.add_str("test.c", src);
        assert_eq!(file_id, FileId(0));
        let mut pp = Preprocessor::new(file_id, vec![], Box::new(crate::file::StdFileLoader));
        let mut interner = Interner::new();
        let mut diags = Diagnostics::new();
        let mut tokens = Vec::new();
        while let Some(tok) = pp.next_token(&mut store, &mut interner, &mut diags) {
            tokens.push(tok);
        }
        (tokens, interner, diags)
    }

    #[test]
    fn plain_tokens_pass_through() {
        let (tokens, _, diags) = run("int x;");
        assert!(!diags.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TokenKind::Int, TokenKind::Identifier, TokenKind::Semi]);
    }

    #[test]
    fn object_like_macro_expands_unparenthesized() {
        let (tokens, _, diags) = run("#define X 1+2\nX*X");
        assert!(!diags.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::Plus,
                TokenKind::IntegerLiteral,
                TokenKind::Star,
                TokenKind::IntegerLiteral,
                TokenKind::Plus,
                TokenKind::IntegerLiteral,
            ]
        );
    }

    #[test]
    fn function_like_macro_substitutes_arguments() {
        let (tokens, interner, diags) = run("#define ADD(a, b) a + b\nADD(1, y)");
        assert!(!diags.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TokenKind::IntegerLiteral, TokenKind::Plus, TokenKind::Identifier]);
        assert_eq!(interner.resolve(tokens[2].identifier_symbol().unwrap()), "y");
    }

    #[test]
    fn macro_does_not_self_recurse() {
        let (tokens, interner, diags) = run("#define FOO FOO + 1\nFOO");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(interner.resolve(tokens[0].identifier_symbol().unwrap()), "FOO");
    }

    #[test]
    fn stringify_operator_quotes_argument() {
        let (tokens, interner, diags) = run("#define STR(x) #x\nSTR(hello)");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        match tokens[0].payload {
            TokenPayload::String(sym) => assert_eq!(interner.resolve(sym), "hello"),
            _ => panic!("expected string payload"),
        }
    }

    #[test]
    fn paste_operator_concatenates_tokens() {
        let (tokens, interner, diags) = run("#define CAT(a, b) a##b\nCAT(fo, o)");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(interner.resolve(tokens[0].identifier_symbol().unwrap()), "foo");
    }

    #[test]
    fn conditional_skips_false_branch() {
        let (tokens, _, diags) = run("#if 0\nint a;\n#else\nint b;\n#endif");
        assert!(!diags.has_errors());
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Int);
    }

    #[test]
    fn ifdef_takes_branch_when_defined() {
        let (tokens, _, diags) = run("#define HAVE_X\n#ifdef HAVE_X\nint a;\n#endif");
        assert!(!diags.has_errors());
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn defined_operator_consulted_before_expansion() {
        let (tokens, _, diags) = run("#define HAVE_X 1\n#if defined(HAVE_X)\nint a;\n#endif");
        assert!(!diags.has_errors());
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn undef_removes_macro() {
        let (tokens, interner, diags) = run("#define X 1\n#undef X\nX");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(interner.resolve(tokens[0].identifier_symbol().unwrap()), "X");
    }

    #[test]
    fn unterminated_if_is_diagnosed() {
        let (_, _, diags) = run("#if 1\nint a;");
        assert!(diags.has_errors());
    }

    #[test]
    fn unmatched_endif_is_diagnosed() {
        let (_, _, diags) = run("#endif\nint a;");
        assert!(diags.has_errors());
    }
}

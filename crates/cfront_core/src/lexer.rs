//! Raw token recognition (§4.2): operators/digraphs, identifiers/keywords,
//! numeric/character/string literals, whitespace and comments.
//!
//! The lexer reads logical characters from a [`TextCursor`] and buffers a
//! small amount of its own lookahead (up to three characters, for `<<=`-
//! shaped operators and `...`). It is otherwise stateless between tokens:
//! all persistent state (macro table, include stack, conditional stack)
//! lives one layer up, in the preprocessor.

use std::collections::VecDeque;

use cfront_base::Interner;

use crate::cursor::TextCursor;
use crate::error::LexError;
use crate::file::FileStore;
use crate::location::{Location, Span};
use crate::token::{IntegerSuffix, Token, TokenKind, TokenPayload};

/// Alternate two-character spelling for a bracket punctuator (§ glossary).
fn digraph_kind(a: char, b: char) -> Option<TokenKind> {
    Some(match (a, b) {
        ('<', ':') => TokenKind::LBracket,
        (':', '>') => TokenKind::RBracket,
        ('<', '%') => TokenKind::LBrace,
        ('%', '>') => TokenKind::RBrace,
        _ => return None,
    })
}

/// A token reader over one [`TextCursor`].
///
/// Like `TextCursor`, a `Lexer` holds no borrow of the [`FileStore`]: the
/// store is passed in at every call so an include stack can keep several
/// lexers (one per open file) alive while the store itself grows.
pub struct Lexer {
    cursor: TextCursor,
    lookahead: VecDeque<(char, Location)>,
}

impl Lexer {
    pub fn new(cursor: TextCursor) -> Self {
        Lexer {
            cursor,
            lookahead: VecDeque::new(),
        }
    }

    pub fn file_id(&self) -> crate::file::FileId {
        self.cursor.file_id()
    }

    /// The cursor's current position, as of the last character actually
    /// consumed from the file (lookahead sitting in the buffer doesn't
    /// move this).
    pub fn cursor_location(&self) -> Location {
        self.cursor.here()
    }

    /// The location a freshly constructed `Lexer` should resume from to
    /// continue exactly where this one left off: the position of any
    /// already-read-but-unconsumed lookahead character, or the cursor's own
    /// position if the lookahead buffer is empty. Used when suspending a
    /// lexer across an `#include` push, since `cursor_location` alone would
    /// silently drop buffered-but-unconsumed characters.
    pub fn resume_point(&self) -> Location {
        self.lookahead.front().map(|&(_, loc)| loc).unwrap_or_else(|| self.cursor.here())
    }

    fn fill(&mut self, store: &FileStore, n: usize) {
        while self.lookahead.len() < n {
            let loc = self.cursor.here();
            match self.cursor.next_char(store) {
                Some(c) => self.lookahead.push_back((c, loc)),
                None => break,
            }
        }
    }

    fn peek_at(&mut self, store: &FileStore, i: usize) -> Option<char> {
        self.fill(store, i + 1);
        self.lookahead.get(i).map(|&(c, _)| c)
    }

    /// Location at which the next unconsumed character sits.
    fn here(&mut self, store: &FileStore) -> Location {
        self.fill(store, 1);
        self.lookahead
            .front()
            .map(|&(_, loc)| loc)
            .unwrap_or_else(|| self.cursor.here())
    }

    fn bump(&mut self, store: &FileStore) -> Option<char> {
        self.fill(store, 1);
        self.lookahead.pop_front().map(|(c, _)| c)
    }

    pub fn at_eof(&mut self, store: &FileStore) -> bool {
        self.peek_at(store, 0).is_none()
    }

    /// Reads one raw token, or `None` at end of file.
    ///
    /// `at_bol` starts `true` and is set `true` again by any newline consumed
    /// while skipping whitespace/comments; this method never clears it. That
    /// leaves `*at_bol` holding, on return, whether the token just produced
    /// was the first of its logical line — the signal the preprocessor needs
    /// to recognize `#` as a directive introducer. The caller is responsible
    /// for clearing it back to `false` once it has read that signal, ready
    /// for the next call.
    pub fn next_token(
        &mut self,
        store: &FileStore,
        interner: &mut Interner,
        at_bol: &mut bool,
    ) -> Result<Option<Token>, LexError> {
        loop {
            match self.peek_at(store, 0) {
                None => return Ok(None),
                Some(' ') | Some('\t') | Some('\x0b') | Some('\x0c') | Some('\r') => {
                    self.bump(store);
                    continue;
                }
                Some('\n') => {
                    self.bump(store);
                    *at_bol = true;
                    continue;
                }
                Some('/') if self.peek_at(store, 1) == Some('/') => {
                    self.bump(store);
                    self.bump(store);
                    while let Some(c) = self.peek_at(store, 0) {
                        if c == '\n' {
                            break;
                        }
                        self.bump(store);
                    }
                    continue;
                }
                Some('/') if self.peek_at(store, 1) == Some('*') => {
                    let start = self.here(store);
                    self.bump(store);
                    self.bump(store);
                    let mut closed = false;
                    while let Some(c) = self.peek_at(store, 0) {
                        if c == '*' && self.peek_at(store, 1) == Some('/') {
                            self.bump(store);
                            self.bump(store);
                            closed = true;
                            break;
                        }
                        if c == '\n' {
                            *at_bol = true;
                        }
                        self.bump(store);
                    }
                    if !closed {
                        let end = self.here(store);
                        return Err(LexError::UnterminatedComment {
                            span: Span::new(start, end),
                        });
                    }
                    continue;
                }
                _ => break,
            }
        }

        let start = self.here(store);
        let c = self.bump(store).unwrap();

        let token = match c {
            '(' => self.simple(store, TokenKind::LParen, start),
            ')' => self.simple(store, TokenKind::RParen, start),
            '{' => self.simple(store, TokenKind::LBrace, start),
            '}' => self.simple(store, TokenKind::RBrace, start),
            '[' => self.simple(store, TokenKind::LBracket, start),
            ']' => self.simple(store, TokenKind::RBracket, start),
            ';' => self.simple(store, TokenKind::Semi, start),
            ',' => self.simple(store, TokenKind::Comma, start),
            '~' => self.simple(store, TokenKind::Tilde, start),
            '?' => self.simple(store, TokenKind::Question, start),

            ':' => self.lex_colon(store, start),
            '.' => self.lex_dot(store, start),

            '+' => self.plus_minus(store, start, '+', TokenKind::Plus, TokenKind::PlusPlus, TokenKind::PlusEq),
            '-' => self.lex_minus(store, start),
            '*' => self.two_char_eq(store, start, TokenKind::Star, TokenKind::StarEq),
            '%' => self.lex_percent(store, start),
            '^' => self.two_char_eq(store, start, TokenKind::Caret, TokenKind::CaretEq),
            '=' => self.two_char_eq(store, start, TokenKind::Eq, TokenKind::EqEq),
            '!' => self.two_char_eq(store, start, TokenKind::Bang, TokenKind::NotEq),

            '&' => self.two_char_or(store, start, '&', &['='], TokenKind::Amp, TokenKind::AmpAmp, TokenKind::AmpEq),
            '|' => self.two_char_or(store, start, '|', &['='], TokenKind::Pipe, TokenKind::PipePipe, TokenKind::PipeEq),

            '<' => self.lex_lt(store, start),
            '>' => self.lex_gt(store, start),

            '#' => self.lex_hash(store, start),

            '\'' => return self.lex_char_literal(store, start),
            '"' => return self.lex_string_literal(store, start, interner),

            c if c.is_ascii_digit() => return self.lex_number(store, start, c),
            c if c.is_ascii_alphabetic() || c == '_' => return self.lex_identifier(store, start, c, interner),

            _ => {
                let end = self.here(store);
                return Err(LexError::UnrecognizedByte {
                    span: Span::new(start, end),
                });
            }
        };
        Ok(Some(token))
    }

    fn simple(&mut self, store: &FileStore, kind: TokenKind, start: Location) -> Token {
        let end = self.here(store);
        Token::new(kind, Span::new(start, end))
    }

    /// `base` if the next char isn't `=`, otherwise `with_eq` and consume it.
    fn two_char_eq(&mut self, store: &FileStore, start: Location, base: TokenKind, with_eq: TokenKind) -> Token {
        if self.peek_at(store, 0) == Some('=') {
            self.bump(store);
            self.simple(store, with_eq, start)
        } else {
            self.simple(store, base, start)
        }
    }

    /// `base`, `doubled` (if next is `second`), or `doubled_eq`-shaped variants
    /// (if next is one of `eq_next`) are folded in by the caller; this handles
    /// the common `&`/`&&`/`&=` and `|`/`||`/`|=` shapes.
    fn two_char_or(
        &mut self,
        store: &FileStore,
        start: Location,
        doubled: char,
        eq_next: &[char],
        base: TokenKind,
        doubled_kind: TokenKind,
        with_eq: TokenKind,
    ) -> Token {
        if self.peek_at(store, 0) == Some(doubled) {
            self.bump(store);
            self.simple(store, doubled_kind, start)
        } else if eq_next.contains(&self.peek_at(store, 0).unwrap_or('\0')) {
            self.bump(store);
            self.simple(store, with_eq, start)
        } else {
            self.simple(store, base, start)
        }
    }

    fn plus_minus(
        &mut self,
        store: &FileStore,
        start: Location,
        doubled: char,
        base: TokenKind,
        doubled_kind: TokenKind,
        with_eq: TokenKind,
    ) -> Token {
        if self.peek_at(store, 0) == Some(doubled) {
            self.bump(store);
            self.simple(store, doubled_kind, start)
        } else if self.peek_at(store, 0) == Some('=') {
            self.bump(store);
            self.simple(store, with_eq, start)
        } else {
            self.simple(store, base, start)
        }
    }

    fn lex_minus(&mut self, store: &FileStore, start: Location) -> Token {
        if self.peek_at(store, 0) == Some('-') {
            self.bump(store);
            self.simple(store, TokenKind::MinusMinus, start)
        } else if self.peek_at(store, 0) == Some('=') {
            self.bump(store);
            self.simple(store, TokenKind::MinusEq, start)
        } else if self.peek_at(store, 0) == Some('>') {
            self.bump(store);
            self.simple(store, TokenKind::Arrow, start)
        } else {
            self.simple(store, TokenKind::Minus, start)
        }
    }

    fn lex_colon(&mut self, store: &FileStore, start: Location) -> Token {
        if self.peek_at(store, 0) == Some('>') {
            self.bump(store);
            self.simple(store, TokenKind::RBracket, start)
        } else {
            self.simple(store, TokenKind::Colon, start)
        }
    }

    fn lex_dot(&mut self, store: &FileStore, start: Location) -> Token {
        if self.peek_at(store, 0) == Some('.') && self.peek_at(store, 1) == Some('.') {
            self.bump(store);
            self.bump(store);
            self.simple(store, TokenKind::Ellipsis, start)
        } else {
            self.simple(store, TokenKind::Dot, start)
        }
    }

    fn lex_percent(&mut self, store: &FileStore, start: Location) -> Token {
        // `%:` and `%:%:` are the digraph spellings of `#`/`##`.
        if self.peek_at(store, 0) == Some(':') {
            if self.peek_at(store, 1) == Some('%') && self.peek_at(store, 2) == Some(':') {
                self.bump(store);
                self.bump(store);
                self.bump(store);
                return self.simple(store, TokenKind::HashHash, start);
            }
            self.bump(store);
            return self.simple(store, TokenKind::Hash, start);
        }
        if self.peek_at(store, 0) == Some('>') {
            self.bump(store);
            return self.simple(store, TokenKind::RBrace, start);
        }
        self.two_char_eq(store, start, TokenKind::Percent, TokenKind::PercentEq)
    }

    fn lex_lt(&mut self, store: &FileStore, start: Location) -> Token {
        if self.peek_at(store, 0) == Some('<') {
            self.bump(store);
            if self.peek_at(store, 0) == Some('=') {
                self.bump(store);
                return self.simple(store, TokenKind::ShlEq, start);
            }
            return self.simple(store, TokenKind::Shl, start);
        }
        if self.peek_at(store, 0) == Some('=') {
            self.bump(store);
            return self.simple(store, TokenKind::LtEq, start);
        }
        if let Some(next) = self.peek_at(store, 0) {
            if let Some(kind) = digraph_kind('<', next) {
                self.bump(store);
                return self.simple(store, kind, start);
            }
        }
        self.simple(store, TokenKind::Lt, start)
    }

    fn lex_gt(&mut self, store: &FileStore, start: Location) -> Token {
        if self.peek_at(store, 0) == Some('>') {
            self.bump(store);
            if self.peek_at(store, 0) == Some('=') {
                self.bump(store);
                return self.simple(store, TokenKind::ShrEq, start);
            }
            return self.simple(store, TokenKind::Shr, start);
        }
        if self.peek_at(store, 0) == Some('=') {
            self.bump(store);
            return self.simple(store, TokenKind::GtEq, start);
        }
        self.simple(store, TokenKind::Gt, start)
    }

    fn lex_hash(&mut self, store: &FileStore, start: Location) -> Token {
        if self.peek_at(store, 0) == Some('#') {
            self.bump(store);
            self.simple(store, TokenKind::HashHash, start)
        } else {
            self.simple(store, TokenKind::Hash, start)
        }
    }

    fn lex_identifier(
        &mut self,
        store: &FileStore,
        start: Location,
        first: char,
        interner: &mut Interner,
    ) -> Result<Option<Token>, LexError> {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek_at(store, 0) {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump(store);
            } else {
                break;
            }
        }
        let end = self.here(store);
        let span = Span::new(start, end);
        if let Some(kind) = TokenKind::keyword_from_str(&text) {
            return Ok(Some(Token::new(kind, span)));
        }
        let sym = interner.intern(&text);
        Ok(Some(Token::with_payload(
            TokenKind::Identifier,
            span,
            TokenPayload::Identifier(sym),
        )))
    }

    fn lex_number(&mut self, store: &FileStore, start: Location, first: char) -> Result<Option<Token>, LexError> {
        let mut digits = String::new();
        digits.push(first);
        while let Some(c) = self.peek_at(store, 0) {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump(store);
            } else {
                break;
            }
        }
        let mut suffix = IntegerSuffix::default();
        let mut long_count = 0u32;
        loop {
            match self.peek_at(store, 0) {
                Some('u') | Some('U') => {
                    suffix.unsigned = true;
                    self.bump(store);
                }
                Some('l') | Some('L') => {
                    let c = self.peek_at(store, 0).unwrap();
                    self.bump(store);
                    // A second consecutive suffix letter of matching case
                    // forms `long long`; otherwise it's plain `long`.
                    if self.peek_at(store, 0) == Some(c) {
                        self.bump(store);
                        suffix.long_long = true;
                        long_count = 2;
                    } else if long_count == 0 {
                        suffix.long = true;
                        long_count = 1;
                    }
                }
                _ => break,
            }
        }
        let value: u64 = digits.parse().unwrap_or(u64::MAX);
        let end = self.here(store);
        Ok(Some(Token::with_payload(
            TokenKind::IntegerLiteral,
            Span::new(start, end),
            TokenPayload::Integer { value, suffix },
        )))
    }

    /// Resolves a single `\X` escape inside a character or string literal.
    /// Returns `None` on an unrecognized escape letter (the backslash is
    /// dropped and lexing continues, per §4.2).
    fn lex_escape(&mut self, store: &FileStore) -> Option<char> {
        match self.bump(store) {
            Some('\\') => Some('\\'),
            Some('\'') => Some('\''),
            Some('"') => Some('"'),
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            Some('f') => Some('\x0c'),
            Some('r') => Some('\r'),
            Some('v') => Some('\x0b'),
            Some('0') => Some('\0'),
            _ => None,
        }
    }

    fn lex_char_literal(&mut self, store: &FileStore, start: Location) -> Result<Option<Token>, LexError> {
        let mut had_unknown_escape = false;
        let value: u32 = match self.peek_at(store, 0) {
            None => {
                let end = self.here(store);
                return Err(LexError::UnterminatedCharLiteral {
                    span: Span::new(start, end),
                });
            }
            Some('\'') => {
                let end = self.here(store);
                return Err(LexError::EmptyCharLiteral {
                    span: Span::new(start, end),
                });
            }
            Some('\\') => {
                self.bump(store);
                match self.lex_escape(store) {
                    Some(c) => c as u32,
                    None => {
                        had_unknown_escape = true;
                        0
                    }
                }
            }
            Some(c) => {
                self.bump(store);
                c as u32
            }
        };
        match self.peek_at(store, 0) {
            Some('\'') => {
                self.bump(store);
            }
            _ => {
                let end = self.here(store);
                return Err(LexError::UnterminatedCharLiteral {
                    span: Span::new(start, end),
                });
            }
        }
        let end = self.here(store);
        let span = Span::new(start, end);
        if had_unknown_escape {
            return Err(LexError::UnknownEscape { span });
        }
        Ok(Some(Token::with_payload(
            TokenKind::CharLiteral,
            span,
            TokenPayload::Character(value),
        )))
    }

    fn lex_string_literal(
        &mut self,
        store: &FileStore,
        start: Location,
        interner: &mut Interner,
    ) -> Result<Option<Token>, LexError> {
        let mut text = String::new();
        let mut had_unknown_escape = false;
        loop {
            match self.peek_at(store, 0) {
                None | Some('\n') => {
                    let end = self.here(store);
                    return Err(LexError::UnterminatedStringLiteral {
                        span: Span::new(start, end),
                    });
                }
                Some('"') => {
                    self.bump(store);
                    break;
                }
                Some('\\') => {
                    self.bump(store);
                    match self.lex_escape(store) {
                        Some(c) => text.push(c),
                        None => had_unknown_escape = true,
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump(store);
                }
            }
        }
        let end = self.here(store);
        let span = Span::new(start, end);
        if had_unknown_escape {
            return Err(LexError::UnknownEscape { span });
        }
        let sym = interner.intern(&text);
        Ok(Some(Token::with_payload(
            TokenKind::StringLiteral,
            span,
            TokenPayload::String(sym),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileId;

    fn store(src: &str) -> FileStore {
        let mut store = FileStore::new();
        store.add_str("test.c", src);
        store
    }

    fn lex_all(src: &str) -> (Vec<Token>, Interner) {
        let fs = store(src);
        let cursor = TextCursor::new(FileId(0));
        let mut lexer = Lexer::new(cursor);
        let mut interner = Interner::new();
        let mut at_bol = true;
        let mut tokens = Vec::new();
        while let Some(tok) = lexer.next_token(&fs, &mut interner, &mut at_bol).unwrap() {
            tokens.push(tok);
        }
        (tokens, interner)
    }

    #[test]
    fn keyword_recognition() {
        let (tokens, _) = lex_all("while");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::While);
        assert_eq!(tokens[0].span.start.byte_index, 0);
        assert_eq!(tokens[0].span.end.byte_index, 5);
    }

    #[test]
    fn digraph_normalization() {
        let (tokens, _) = lex_all("<::><%%>");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::LBracket, TokenKind::RBracket, TokenKind::LBrace, TokenKind::RBrace]
        );
        assert_eq!(tokens[0].span.start.byte_index, 0);
        assert_eq!(tokens[0].span.end.byte_index, 2);
        assert_eq!(tokens[3].span.start.byte_index, 6);
        assert_eq!(tokens[3].span.end.byte_index, 8);
    }

    #[test]
    fn identifier_is_interned() {
        let (tokens, interner) = lex_all("foo_bar1 foo_bar1");
        assert_eq!(tokens.len(), 2);
        let s1 = tokens[0].identifier_symbol().unwrap();
        let s2 = tokens[1].identifier_symbol().unwrap();
        assert_eq!(s1, s2);
        assert_eq!(interner.resolve(s1), "foo_bar1");
    }

    #[test]
    fn integer_suffix_long_long() {
        let (tokens, _) = lex_all("123LL");
        match tokens[0].payload {
            TokenPayload::Integer { value, suffix } => {
                assert_eq!(value, 123);
                assert!(suffix.long_long);
                assert!(!suffix.long);
            }
            _ => panic!("expected integer payload"),
        }
    }

    #[test]
    fn integer_suffix_mixed_u_l() {
        let (tokens, _) = lex_all("7uL");
        match tokens[0].payload {
            TokenPayload::Integer { value, suffix } => {
                assert_eq!(value, 7);
                assert!(suffix.unsigned);
                assert!(suffix.long);
                assert!(!suffix.long_long);
            }
            _ => panic!("expected integer payload"),
        }
    }

    #[test]
    fn string_literal_with_escapes() {
        let (tokens, interner) = lex_all("\"a\\nb\"");
        match tokens[0].payload {
            TokenPayload::String(sym) => assert_eq!(interner.resolve(sym), "a\nb"),
            _ => panic!("expected string payload"),
        }
    }

    #[test]
    fn char_literal_escape() {
        let (tokens, _) = lex_all("'\\n'");
        match tokens[0].payload {
            TokenPayload::Character(v) => assert_eq!(v, b'\n' as u32),
            _ => panic!("expected char payload"),
        }
    }

    #[test]
    fn unterminated_block_comment_errors() {
        let fs = store("/* oops");
        let cursor = TextCursor::new(FileId(0));
        let mut lexer = Lexer::new(cursor);
        let mut interner = Interner::new();
        let mut at_bol = true;
        let err = lexer.next_token(&fs, &mut interner, &mut at_bol).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn line_comment_sets_at_bol() {
        let (tokens, _) = lex_all("int // comment\nx;");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Int);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn ellipsis_is_distinct_from_dot() {
        let (tokens, _) = lex_all("a.b...c");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Ellipsis,
                TokenKind::Identifier
            ]
        );
    }

    #[test]
    fn hash_and_hashhash_are_distinct() {
        let (tokens, _) = lex_all("# ##");
        assert_eq!(tokens[0].kind, TokenKind::Hash);
        assert_eq!(tokens[1].kind, TokenKind::HashHash);
    }

    #[test]
    fn operator_longest_match_wins() {
        let (tokens, _) = lex_all("<<= >>= <= >= == != && ||");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::ShlEq,
                TokenKind::ShrEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
            ]
        );
    }
}

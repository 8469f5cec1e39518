//! Token-stream scenarios: keyword recognition, digraph normalization, and
//! object-like macro expansion, exercised through the preprocessor directly
//! since these concern the token stream rather than declaration shape.

use cfront_base::Interner;
use cfront_core::error::Diagnostics;
use cfront_core::file::{FileStore, StdFileLoader};
use cfront_core::preprocessor::Preprocessor;
use cfront_core::token::TokenKind;

fn tokenize(source: &str) -> (Vec<cfront_core::token::Token>, Diagnostics) {
    let mut store = FileStore::new();
    let file_id = store.add_str("test.c", source);
    let mut interner = Interner::new();
    let mut diags = Diagnostics::new();
    let mut pp = Preprocessor::new(file_id, Vec::new(), Box::new(StdFileLoader));
    let mut tokens = Vec::new();
    while let Some(tok) = pp.next_token(&mut store, &mut interner, &mut diags) {
        tokens.push(tok);
    }
    (tokens, diags)
}

#[test]
fn keyword_recognition() {
    let (tokens, diags) = tokenize("while");
    assert!(!diags.has_errors());
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::While);
    assert_eq!(tokens[0].span.start.byte_index, 0);
    assert_eq!(tokens[0].span.end.byte_index, 5);
}

#[test]
fn digraph_normalization() {
    let (tokens, diags) = tokenize("<::><%%>");
    assert!(!diags.has_errors());
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::LBracket,
            TokenKind::RBracket,
            TokenKind::LBrace,
            TokenKind::RBrace,
        ]
    );
    let expected_ranges = [(0usize, 2usize), (2, 4), (4, 6), (6, 8)];
    for (tok, (start, end)) in tokens.iter().zip(expected_ranges.iter()) {
        assert_eq!(tok.span.start.byte_index, *start);
        assert_eq!(tok.span.end.byte_index, *end);
    }
}

#[test]
fn object_like_macro_expansion_is_unparenthesized() {
    let (tokens, diags) = tokenize("#define X 1+2\nX*X");
    assert!(!diags.has_errors());
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
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
fn token_spans_stay_within_file_bounds() {
    let (tokens, _diags) = tokenize("int x = 1 + 2;\nint y;\n");
    for tok in &tokens {
        assert!(tok.span.start.byte_index <= tok.span.end.byte_index);
    }
}

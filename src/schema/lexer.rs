//! Lexical analysis for TL-B source
//!
//! Tokenization uses a `logos`-derived lexer. Comments (`//` line and
//! `/* */` block) and whitespace are stripped during lexing. Tag tokens
//! keep their raw digits so the parser can distinguish the binary,
//! hexadecimal and empty forms.

use logos::Logos;

/// A TL-B token.
#[derive(Logos, Clone, Debug, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum Tok {
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("^")]
    Caret,
    #[token("?")]
    Question,
    #[token(".")]
    Dot,
    #[token("*")]
    Star,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("/")]
    Slash,
    #[token("=")]
    Equals,
    #[token("!=")]
    NotEquals,
    #[token("<=")]
    LessEq,
    #[token("<")]
    Less,
    #[token(">=")]
    GreaterEq,
    #[token(">")]
    Greater,

    /// `##` — explicit-width integer marker.
    #[token("##")]
    HashHash,
    /// `#<=` — at-most integer marker.
    #[token("#<=")]
    HashLeq,
    /// `#<` — below integer marker.
    #[token("#<")]
    HashLess,
    /// `#_` — empty hexadecimal tag.
    #[token("#_")]
    HashUnderscore,
    /// `#` — the 32-bit unsigned integer type.
    #[token("#")]
    Hash,
    /// `#8` as a width shorthand or `#0f` as a hexadecimal tag; the
    /// parser decides by position.
    #[regex(r"#[0-9a-fA-F]+", |lex| lex.slice()[1..].to_string())]
    HashNum(String),

    /// `$101` — binary tag digits.
    #[regex(r"\$[01]+", |lex| lex.slice()[1..].to_string())]
    DollarBin(String),
    /// `$_` — empty binary tag.
    #[token("$_")]
    DollarUnderscore,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i128>().ok())]
    Num(i128),
}

/// Tokenises `source`, pairing each token with its byte span.
///
/// An unrecognised character surfaces as `Err(span)`.
pub fn tokenize(source: &str) -> Vec<(Result<Tok, ()>, std::ops::Range<usize>)> {
    Tok::lexer(source).spanned().collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn toks(source: &str) -> Vec<Tok> {
        tokenize(source)
            .into_iter()
            .map(|(tok, _)| tok.unwrap())
            .collect()
    }

    #[test]
    fn hash_forms_are_disambiguated() {
        assert_eq!(
            toks("# ## #<= #< #_ #8 #ab"),
            vec![
                Tok::Hash,
                Tok::HashHash,
                Tok::HashLeq,
                Tok::HashLess,
                Tok::HashUnderscore,
                Tok::HashNum("8".into()),
                Tok::HashNum("ab".into()),
            ]
        );
    }

    #[test]
    fn tags_and_idents() {
        assert_eq!(
            toks("msg$101 x:_ = M;"),
            vec![
                Tok::Ident("msg".into()),
                Tok::DollarBin("101".into()),
                Tok::Ident("x".into()),
                Tok::Colon,
                Tok::Ident("_".into()),
                Tok::Equals,
                Tok::Ident("M".into()),
                Tok::Semi,
            ]
        );
    }

    #[test]
    fn comments_are_stripped() {
        assert_eq!(
            toks("a // line\n /* block */ b"),
            vec![Tok::Ident("a".into()), Tok::Ident("b".into())]
        );
    }
}

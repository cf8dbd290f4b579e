use std::{borrow::Cow, fmt::Display, ops::Index};

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::{trace, warn};

/// Words that name a type rather than a value.
pub const TYPE_KEYWORDS: [&str; 4] = ["int", "float", "char", "string"];

#[derive(Error, Debug, Diagnostic)]
#[error("LexError: unterminated string literal")]
#[diagnostic(help("add a closing `\"` to terminate the string literal"))]
pub struct StringTerminationError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this string literal is never closed")]
    bad_bit: SourceSpan,

    pub location: String,
}

/// Position of a character in a source file. Lines and columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location<'de> {
    pub file: &'de str,
    pub line: usize,
    pub column: usize,
}

impl Display for Location<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub text: Option<Cow<'de, str>>,
    pub location: Location<'de>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Type,
    Int(i64),
    String,
    LeftParen,
    RightParen,
    Semicolon,
    Equal,
    Eof,
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.text.as_deref().unwrap_or_default();
        match self.kind {
            TokenKind::Ident => write!(f, "IDENTIFIER {lit} null"),
            TokenKind::Type => write!(f, "TYPE {lit} null"),
            TokenKind::Int(n) => write!(f, "INT {lit} {n}"),
            TokenKind::String => write!(f, "STRING \"{lit}\" {lit}"),
            TokenKind::LeftParen => write!(f, "LEFT_PAREN ( null"),
            TokenKind::RightParen => write!(f, "RIGHT_PAREN ) null"),
            TokenKind::Semicolon => write!(f, "SEMICOLON ; null"),
            TokenKind::Equal => write!(f, "EQUAL = null"),
            TokenKind::Eof => write!(f, "EOF  null"),
        }
    }
}

/// Every token lexed from one source file, ending with [`TokenKind::Eof`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream<'de> {
    filename: &'de str,
    source: &'de str,
    tokens: Vec<Token<'de>>,
}

impl<'de> TokenStream<'de> {
    pub fn filename(&self) -> &'de str {
        self.filename
    }

    pub fn source(&self) -> &'de str {
        self.source
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token<'de>> {
        self.tokens.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token<'de>> {
        self.tokens.iter()
    }
}

impl<'de> Index<usize> for TokenStream<'de> {
    type Output = Token<'de>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.tokens[index]
    }
}

impl<'a, 'de> IntoIterator for &'a TokenStream<'de> {
    type Item = &'a Token<'de>;
    type IntoIter = std::slice::Iter<'a, Token<'de>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

impl<'de> IntoIterator for TokenStream<'de> {
    type Item = Token<'de>;
    type IntoIter = std::vec::IntoIter<Token<'de>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

/// Lexes a whole source file. Fails only on an unterminated string literal.
pub fn lex<'de>(source: &'de str, filename: &'de str) -> Result<TokenStream<'de>, Error> {
    let tokens = Lexer::new(filename, source).collect::<Result<Vec<_>, _>>()?;
    Ok(TokenStream {
        filename,
        source,
        tokens,
    })
}

struct StringLiteral<'de> {
    start: usize,
    location: Location<'de>,
    // only allocated once an escape forces the text to differ from the source
    unescaped: Option<String>,
}

pub struct Lexer<'de> {
    filename: &'de str,
    whole: &'de str,
    rest: &'de str,
    byte: usize,
    line: usize,
    column: usize,
    word: Option<(usize, Location<'de>)>,
    string: Option<StringLiteral<'de>>,
    escaped: bool,
    pending: Option<Token<'de>>,
    done: bool,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: &'de str, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
            line: 1,
            column: 1,
            word: None,
            string: None,
            escaped: false,
            pending: None,
            done: false,
        }
    }

    fn location(&self) -> Location<'de> {
        Location {
            file: self.filename,
            line: self.line,
            column: self.column,
        }
    }

    fn flush_word(&mut self, end: usize) -> Option<Token<'de>> {
        let (start, location) = self.word.take()?;
        let text = &self.whole[start..end];
        let kind = classify(text, location);
        trace!(?kind, %location, text, "word");
        Some(Token {
            kind,
            text: Some(Cow::Borrowed(text)),
            location,
            span: SourceSpan::from(start..end),
        })
    }

    fn scan_string(&mut self, c: char, at: usize) -> Option<Token<'de>> {
        let whole = self.whole;
        let escaped = std::mem::take(&mut self.escaped);
        let literal = self.string.as_mut()?;

        if escaped {
            if let Some(text) = literal.unescaped.as_mut() {
                text.push(c);
            }
            return None;
        }

        match c {
            '\\' => {
                let content = literal.start + 1;
                literal
                    .unescaped
                    .get_or_insert_with(|| whole[content..at].to_string());
                self.escaped = true;
                None
            }
            '"' => {
                let literal = self.string.take()?;
                let text = match literal.unescaped {
                    Some(text) => Cow::Owned(text),
                    None => Cow::Borrowed(&whole[literal.start + 1..at]),
                };
                trace!(location = %literal.location, %text, "string literal");
                Some(Token {
                    kind: TokenKind::String,
                    text: Some(text),
                    location: literal.location,
                    span: SourceSpan::from(literal.start..self.byte),
                })
            }
            _ => {
                if let Some(text) = literal.unescaped.as_mut() {
                    text.push(c);
                }
                None
            }
        }
    }

    fn finish(&mut self) -> Option<Result<Token<'de>, Error>> {
        if self.done {
            return None;
        }
        self.done = true;

        if let Some(literal) = self.string.take() {
            return Some(Err(StringTerminationError {
                src: NamedSource::new(self.filename, self.whole.to_string()),
                bad_bit: SourceSpan::from(literal.start..self.whole.len()),
                location: literal.location.to_string(),
            }
            .into()));
        }

        let eof = Token {
            kind: TokenKind::Eof,
            text: None,
            location: self.location(),
            span: SourceSpan::from(self.byte..self.byte),
        };
        match self.flush_word(self.byte) {
            Some(word) => {
                self.pending = Some(eof);
                Some(Ok(word))
            }
            None => Some(Ok(eof)),
        }
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(pending) = self.pending.take() {
            return Some(Ok(pending));
        }
        loop {
            let mut chars = self.rest.chars();
            let Some(c) = chars.next() else {
                return self.finish();
            };
            let at = self.byte;
            let location = self.location();
            self.rest = chars.as_str();
            self.byte += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }

            if self.string.is_some() {
                match self.scan_string(c, at) {
                    Some(token) => return Some(Ok(token)),
                    None => continue,
                }
            }

            let span = SourceSpan::from(at..self.byte);
            let single = |kind| {
                Some(Token {
                    kind,
                    text: None,
                    location,
                    span,
                })
            };

            let punct = match c {
                '(' => single(TokenKind::LeftParen),
                ')' => single(TokenKind::RightParen),
                ';' => single(TokenKind::Semicolon),
                '=' => single(TokenKind::Equal),
                '"' => {
                    self.string = Some(StringLiteral {
                        start: at,
                        location,
                        unescaped: None,
                    });
                    None
                }
                ',' => None,
                c if c.is_whitespace() => None,
                _ => {
                    self.word.get_or_insert((at, location));
                    continue;
                }
            };

            // a boundary character ends the word in progress before it
            match (self.flush_word(at), punct) {
                (Some(word), punct) => {
                    self.pending = punct;
                    return Some(Ok(word));
                }
                (None, Some(punct)) => return Some(Ok(punct)),
                (None, None) => continue,
            }
        }
    }
}

fn classify(text: &str, location: Location<'_>) -> TokenKind {
    if TYPE_KEYWORDS.contains(&text) {
        return TokenKind::Type;
    }

    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return match text.parse() {
            Ok(n) => TokenKind::Int(n),
            Err(e) => {
                warn!(%location, text, "integer literal out of range ({e}), treating it as an identifier");
                TokenKind::Ident
            }
        };
    }

    if let Some((whole, fraction)) = digits.split_once('.') {
        if !whole.is_empty()
            && whole.bytes().all(|b| b.is_ascii_digit())
            && fraction.bytes().all(|b| b.is_ascii_digit())
        {
            warn!(%location, text, "UnsupportedFeature: floating-point literals are not supported yet");
        }
    }

    TokenKind::Ident
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source, "test.n")
            .expect("source should lex")
            .iter()
            .map(|token| token.kind)
            .collect()
    }

    fn texts(source: &str) -> Vec<String> {
        lex(source, "test.n")
            .expect("source should lex")
            .iter()
            .filter_map(|token| token.text.as_deref().map(str::to_string))
            .collect()
    }

    #[test]
    fn print_call() {
        assert_eq!(
            kinds(r#"print("hi");"#),
            [
                TokenKind::Ident,
                TokenKind::LeftParen,
                TokenKind::String,
                TokenKind::RightParen,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
        assert_eq!(texts(r#"print("hi");"#), ["print", "hi"]);
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(kinds(""), [TokenKind::Eof]);
        assert_eq!(kinds("  \n\t "), [TokenKind::Eof]);
    }

    #[test]
    fn declaration() {
        assert_eq!(
            kinds("int x = 5;"),
            [
                TokenKind::Type,
                TokenKind::Ident,
                TokenKind::Equal,
                TokenKind::Int(5),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn every_type_keyword() {
        assert_eq!(
            kinds("int float char string integer"),
            [
                TokenKind::Type,
                TokenKind::Type,
                TokenKind::Type,
                TokenKind::Type,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn assignment_without_spaces() {
        assert_eq!(
            kinds("x=-12;"),
            [
                TokenKind::Ident,
                TokenKind::Equal,
                TokenKind::Int(-12),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn integer_classification() {
        assert_eq!(kinds("-")[0], TokenKind::Ident);
        assert_eq!(kinds("12a")[0], TokenKind::Ident);
        assert_eq!(kinds("--1")[0], TokenKind::Ident);
        assert_eq!(kinds("007")[0], TokenKind::Int(7));
        assert_eq!(kinds("99999999999999999999")[0], TokenKind::Ident);
    }

    #[test]
    fn floats_stay_identifiers() {
        assert_eq!(kinds("1.5"), [TokenKind::Ident, TokenKind::Eof]);
        assert_eq!(texts("1.5"), ["1.5"]);
    }

    #[test]
    fn escaped_quote_is_content() {
        let tokens = lex(r#"print("a\"b")"#, "test.n").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].text.as_deref(), Some(r#"a"b"#));
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn escaped_backslash() {
        assert_eq!(texts(r#""a\\b""#), [r"a\b"]);
        assert_eq!(texts(r#""\n""#), ["n"]);
    }

    #[test]
    fn strings_keep_separators() {
        assert_eq!(texts(r#""a b, (c); d = e""#), ["a b, (c); d = e"]);
    }

    #[test]
    fn unescaped_strings_borrow_the_source() {
        let tokens = lex(r#""plain""#, "test.n").unwrap();
        assert!(matches!(tokens[0].text, Some(Cow::Borrowed("plain"))));
    }

    #[test]
    fn commas_and_whitespace_only_separate() {
        assert_eq!(
            kinds("print(\"a\",\t\"b\"\r\n)"),
            [
                TokenKind::Ident,
                TokenKind::LeftParen,
                TokenKind::String,
                TokenKind::String,
                TokenKind::RightParen,
                TokenKind::Eof,
            ]
        );
        assert_eq!(texts("a,b c"), ["a", "b", "c"]);
    }

    #[test]
    fn quote_ends_a_word() {
        assert_eq!(texts(r#"foo"bar"baz"#), ["foo", "bar", "baz"]);
    }

    #[test]
    fn locations() {
        let tokens = lex("print(\"a\");\n  foo();", "test.n").unwrap();
        let at = |i: usize| (tokens[i].location.line, tokens[i].location.column);
        assert_eq!(at(0), (1, 1));
        assert_eq!(at(1), (1, 6));
        assert_eq!(at(2), (1, 7));
        assert_eq!(at(3), (1, 10));
        assert_eq!(at(4), (1, 11));
        assert_eq!(at(5), (2, 3));
        assert_eq!(tokens[5].location.to_string(), "test.n:2:3");
        assert_eq!(tokens[tokens.len() - 1].kind, TokenKind::Eof);
        assert_eq!(at(tokens.len() - 1), (2, 9));
    }

    #[test]
    fn locations_are_monotonic() {
        let source = "int a = 1;\nprint(\"x y\") ;\n\n  b = (c) ;\nprint(a)";
        let tokens = lex(source, "test.n").unwrap();
        for pair in tokens.iter().collect::<Vec<_>>().windows(2) {
            let (a, b) = (pair[0].location, pair[1].location);
            assert!(a.line <= b.line, "{a} then {b}");
            if a.line == b.line {
                assert!(a.column < b.column, "{a} then {b}");
            }
        }
    }

    #[test]
    fn spans_cover_the_lexeme() {
        let tokens = lex(r#"say "hi""#, "test.n").unwrap();
        assert_eq!(tokens[0].span, SourceSpan::from(0..3));
        assert_eq!(tokens[1].span, SourceSpan::from(4..8));
    }

    #[test]
    fn unterminated_string() {
        let err = lex("print(\"abc", "test.n").unwrap_err();
        let err = err
            .downcast_ref::<StringTerminationError>()
            .expect("should be a string termination error");
        assert_eq!(err.location, "test.n:1:7");
        assert_eq!(err.to_string(), "LexError: unterminated string literal");
    }

    #[test]
    fn escaped_closing_quote_leaves_string_open() {
        assert!(lex(r#""abc\""#, "test.n").is_err());
    }

    #[test]
    fn display() {
        let tokens = lex(r#"int x = 5; print("hi")"#, "test.n").unwrap();
        let lines: Vec<_> = tokens.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            [
                "TYPE int null",
                "IDENTIFIER x null",
                "EQUAL = null",
                "INT 5 5",
                "SEMICOLON ; null",
                "IDENTIFIER print null",
                "LEFT_PAREN ( null",
                "STRING \"hi\" hi",
                "RIGHT_PAREN ) null",
                "EOF  null",
            ]
        );
    }

    #[test]
    fn stream_records_its_origin() {
        let tokens = lex("x", "origin.n").unwrap();
        assert_eq!(tokens.filename(), "origin.n");
        assert_eq!(tokens.source(), "x");
        assert!(!tokens.is_empty());
        assert!(tokens.get(2).is_none());
    }

    #[test]
    #[should_panic]
    fn indexing_past_the_end_panics() {
        let tokens = lex("x", "test.n").unwrap();
        let _ = &tokens[2];
    }
}

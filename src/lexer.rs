//! Turns source text into [`Token`]s.
//!
//! The lexer itself is generated by [`logos`]. Line numbers are tracked in the lexer's
//! extras so that every [`Lexeme`] handed to the compiler knows where it came from.

pub use logos::Span;
use logos::{Lexer, Logos, Skip};

fn newline(lexer: &mut Lexer<Token>) -> Skip {
    lexer.extras += 1;
    Skip
}

fn count_lines(lexer: &mut Lexer<Token>) {
    lexer.extras += lexer.slice().bytes().filter(|b| *b == b'\n').count();
}

fn process_string(lexer: &mut Lexer<Token>) -> Box<str> {
    count_lines(lexer);
    let slice = lexer.slice();
    // strip the surrounding quotes
    Box::from(unescape(&slice[1..slice.len() - 1]).as_str())
}

fn unterminated_string(lexer: &mut Lexer<Token>) -> Result<Box<str>, LexerError> {
    count_lines(lexer);
    Err(LexerError::UnterminatedString)
}

fn process_number(lexer: &mut Lexer<Token>) -> Result<f64, LexerError> {
    lexer
        .slice()
        .parse()
        .map_err(|_| LexerError::MalformedNumber)
}

/// Decodes the escapes of a string literal body.
///
/// Unknown escapes are kept as written.
pub fn unescape(body: &str) -> String {
    let mut decoded = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(chr) = chars.next() {
        if chr != '\\' {
            decoded.push(chr);
            continue;
        }
        let escaped = match chars.peek() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('\'') => '\'',
            Some(_) | None => {
                decoded.push('\\');
                continue;
            }
        };
        decoded.push(escaped);
        _ = chars.next(); // consume
    }
    decoded
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexerError {
    #[default]
    #[error("Unexpected character.")]
    UnexpectedCharacter,
    #[error("Unterminated string.")]
    UnterminatedString,
    #[error("Malformed number.")]
    MalformedNumber,
}

/// Tokens of the language. Operators are single tokens even when they are two
/// characters wide (`?=`, `=>`, ...).
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexerError, extras = usize)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // never produced, only counts lines
    #[regex(r"\n", newline)]
    Newline,

    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("^")]
    Caret,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("=")]
    Equal,
    #[token("?=")]
    QuestionEqual,
    #[token("?")]
    Question,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,

    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("if")]
    If,
    #[token("while")]
    While,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex("[a-zA-Z_][a-zA-Z0-9_]*", |l| Box::from(l.slice()))]
    Identifier(Box<str>),
    #[regex(r"'([^'\\]|\\(.|\n))*'", process_string)]
    #[regex(r"'([^'\\]|\\(.|\n))*", unterminated_string)]
    String(Box<str>),
    #[regex(r"[0-9]+(\.[0-9]+)?", process_number)]
    Number(f64),
}

/// A token together with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme<'src> {
    pub token: Result<Token, LexerError>,
    pub span: Span,
    /// 1-based line the token ends on
    pub line: usize,
    pub text: &'src str,
}

/// Iterator over the [`Lexeme`]s of a source text.
pub struct Scanner<'src> {
    lexer: Lexer<'src, Token>,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            lexer: Token::lexer(source),
        }
    }

    /// Line the scanner is currently on, used to place the end of input.
    pub fn line(&self) -> usize {
        self.lexer.extras + 1
    }

    /// Byte offset just past the last scanned lexeme.
    pub fn offset(&self) -> usize {
        self.lexer.span().end
    }
}

impl<'src> Iterator for Scanner<'src> {
    type Item = Lexeme<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.lexer.next()?;
        Some(Lexeme {
            token,
            span: self.lexer.span(),
            line: self.lexer.extras + 1,
            text: self.lexer.slice(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use logos::Logos;

    use super::{unescape, LexerError, Scanner, Token};

    fn tokens(source: &str) -> Vec<Result<Token, LexerError>> {
        Token::lexer(source).collect()
    }

    #[test]
    fn two_character_operators_win_over_their_prefix() {
        check!(
            tokens("?= ? != ! => = <= < >= >")
                == vec![
                    Ok(Token::QuestionEqual),
                    Ok(Token::Question),
                    Ok(Token::BangEqual),
                    Ok(Token::Bang),
                    Ok(Token::Arrow),
                    Ok(Token::Equal),
                    Ok(Token::LessEqual),
                    Ok(Token::Less),
                    Ok(Token::GreaterEqual),
                    Ok(Token::Greater),
                ]
        );
    }

    #[test]
    fn keywords_are_not_identifier_prefixes() {
        check!(
            tokens("if iff while whiles true_ false")
                == vec![
                    Ok(Token::If),
                    Ok(Token::Identifier(Box::from("iff"))),
                    Ok(Token::While),
                    Ok(Token::Identifier(Box::from("whiles"))),
                    Ok(Token::Identifier(Box::from("true_"))),
                    Ok(Token::False),
                ]
        );
    }

    #[test]
    fn numbers_need_digits_after_the_dot() {
        check!(tokens("3.25") == vec![Ok(Token::Number(3.25))]);
        check!(tokens("7.") == vec![Ok(Token::Number(7.0)), Ok(Token::Dot)]);
    }

    #[test]
    fn strings_decode_escapes() {
        let tokens = tokens(r"'a\tb\n\'c\' \\ \q'");
        let_assert!([Ok(Token::String(s))] = tokens.as_slice());
        check!(s.as_ref() == "a\tb\n'c' \\ \\q");
    }

    #[test]
    fn unterminated_string_runs_to_end_of_input() {
        check!(tokens("1 'abc") == vec![Ok(Token::Number(1.0)), Err(LexerError::UnterminatedString)]);
    }

    #[test]
    fn comments_and_lines() {
        let lexemes: Vec<_> = Scanner::new("a // b c\n'x\ny' @\n\nz").collect();
        let lines: Vec<_> = lexemes.iter().map(|l| l.line).collect();
        check!(lines == vec![1, 3, 3, 5]);
        check!(lexemes[2].token == Err(LexerError::UnexpectedCharacter));
        check!(lexemes[2].text == "@");
    }

    #[test]
    fn unknown_escapes_are_verbatim() {
        check!(unescape(r"\z\") == r"\z\");
    }
}

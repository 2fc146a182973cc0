use winnow::{
    ModalResult, Parser,
    combinator::alt,
    token::{any, one_of, take_while},
};

use super::{Error, Qualifiers, Tag};

/// Deepest pushback the type-name grammar needs: `(` plus the token after it.
const LOOKAHEAD: usize = 2;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token<'input> {
    Specifier(Specifier),
    Qualifier(Qualifiers),
    Tag(Tag),
    Identifier(&'input str),
    Number(u64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Asterisk,
    Eof,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Specifier {
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Complex,
}

impl Specifier {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "void" => Some(Self::Void),
            "char" => Some(Self::Char),
            "short" => Some(Self::Short),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "signed" => Some(Self::Signed),
            "unsigned" => Some(Self::Unsigned),
            "_Bool" => Some(Self::Bool),
            "_Complex" => Some(Self::Complex),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Signed => "signed",
            Self::Unsigned => "unsigned",
            Self::Bool => "_Bool",
            Self::Complex => "_Complex",
        }
    }
}

/// Token stream over a type name with a small pushback buffer.
pub struct Lexer<'input> {
    input: &'input str,
    rest: &'input str,
    pushed: [Token<'input>; LOOKAHEAD],
    depth: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            rest: input,
            pushed: [Token::Eof; LOOKAHEAD],
            depth: 0,
        }
    }

    /// Consumes the next token. Returns [`Token::Eof`] forever once the input
    /// is exhausted.
    pub fn pop(&mut self) -> Result<Token<'input>, Error> {
        if self.depth > 0 {
            self.depth -= 1;
            return Ok(self.pushed[self.depth]);
        }
        self.scan()
    }

    pub fn peek(&mut self) -> Result<Token<'input>, Error> {
        let token = self.pop()?;
        self.push(token);
        Ok(token)
    }

    /// Returns a token to the stream; the next [`Lexer::pop`] yields it again.
    ///
    /// # Panics
    ///
    /// Panics if more than two tokens are pushed back at once.
    pub fn push(&mut self, token: Token<'input>) {
        assert!(self.depth < LOOKAHEAD, "lexer pushback overflow");
        self.pushed[self.depth] = token;
        self.depth += 1;
    }

    fn scan(&mut self) -> Result<Token<'input>, Error> {
        whitespace
            .parse_next(&mut self.rest)
            .map_err(|_| self.lex_error())?;
        if self.rest.is_empty() {
            return Ok(Token::Eof);
        }
        let error = self.lex_error();

        match lexeme.parse_next(&mut self.rest) {
            Ok(Lexeme::Word(word)) => Ok(keyword(word)),
            Ok(Lexeme::Number(literal)) => integer(literal)
                .map(Token::Number)
                .ok_or_else(|| Error::InvalidInteger(literal.to_owned())),
            Ok(Lexeme::Punct(c)) => Ok(match c {
                '(' => Token::LParen,
                ')' => Token::RParen,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                '*' => Token::Asterisk,
                _ => unreachable!(),
            }),
            Err(_) => Err(error),
        }
    }

    /// Error for the character at the current position.
    fn lex_error(&self) -> Error {
        Error::Lex {
            character: self.rest.chars().next().unwrap_or_default(),
            offset: self.input.len() - self.rest.len(),
        }
    }
}

fn keyword(word: &str) -> Token<'_> {
    if let Some(specifier) = Specifier::from_keyword(word) {
        Token::Specifier(specifier)
    } else if let Some(qualifier) = Qualifiers::from_keyword(word) {
        Token::Qualifier(qualifier)
    } else if let Some(tag) = Tag::from_keyword(word) {
        Token::Tag(tag)
    } else {
        Token::Identifier(word)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Radix {
    Oct,
    Dec,
    Hex,
}

impl From<Radix> for u32 {
    fn from(val: Radix) -> Self {
        match val {
            Radix::Oct => 8,
            Radix::Dec => 10,
            Radix::Hex => 16,
        }
    }
}

/// Value of a C integer literal: `0x` hexadecimal, `0` octal, else decimal.
fn integer(literal: &str) -> Option<u64> {
    let (radix, digits) = if let Some(hex) = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
    {
        (Radix::Hex, hex)
    } else if literal.len() > 1 && literal.starts_with('0') {
        (Radix::Oct, &literal[1..])
    } else {
        (Radix::Dec, literal)
    };

    let radix = radix.into();
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

enum Lexeme<'input> {
    Word(&'input str),
    Number(&'input str),
    Punct(char),
}

fn lexeme<'input>(input: &mut &'input str) -> ModalResult<Lexeme<'input>> {
    alt((
        word.map(Lexeme::Word),
        number.map(Lexeme::Number),
        one_of(['(', ')', '[', ']', '*']).map(Lexeme::Punct),
    ))
    .parse_next(input)
}

fn whitespace(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| {
        matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C')
    })
    .void()
    .parse_next(input)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn word<'input>(input: &mut &'input str) -> ModalResult<&'input str> {
    (
        any.verify(|&c: &char| c == '_' || c.is_ascii_alphabetic()),
        take_while(0.., |c: char| c == '_' || c.is_ascii_alphanumeric()),
    )
        .take()
        .parse_next(input)
}

/// A digit followed by every alphanumeric character after it, so that
/// malformed literals like `0x` or `09` are rejected whole.
fn number<'input>(input: &mut &'input str) -> ModalResult<&'input str> {
    (
        one_of('0'..='9'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric()),
    )
        .take()
        .parse_next(input)
}

use std::borrow::Cow;

use itertools::Itertools;

use super::{
    Error, Qualifiers, SyntaxError, Tag, TypeName,
    lexer::{Lexer, Specifier, Token},
};

/// Deepest run of parenthesized declarator groups accepted, e.g. `int ((*))`
/// nests two.
pub const MAX_NESTING: usize = 256;

pub fn parse(input: &str) -> Result<TypeName, Error> {
    Parser {
        lexer: Lexer::new(input),
        depth: 0,
    }
    .type_name()
}

struct Parser<'input> {
    lexer: Lexer<'input>,
    depth: usize,
}

impl<'input> Parser<'input> {
    fn type_name(&mut self) -> Result<TypeName, Error> {
        let base = self.specifier_qualifier_list()?;
        if self.lexer.peek()? == Token::Eof {
            return Ok(base);
        }

        let declarator = self.abstract_declarator()?;
        if self.lexer.peek()? != Token::Eof {
            return Err(SyntaxError::ExtraTokens.into());
        }
        Ok(declarator.apply(base))
    }

    fn specifier_qualifier_list(&mut self) -> Result<TypeName, Error> {
        let mut specifiers = Specifiers::default();
        let mut seen = false;
        loop {
            match self.lexer.peek()? {
                Token::Qualifier(qualifier) => {
                    self.lexer.pop()?;
                    specifiers.qualifiers |= qualifier;
                }
                Token::Specifier(specifier) => {
                    self.lexer.pop()?;
                    specifiers.add_specifier(specifier)?;
                }
                Token::Identifier(name) => {
                    self.lexer.pop()?;
                    specifiers.add_data_type(DataType::Typedef(name))?;
                }
                Token::Tag(tag) => {
                    self.lexer.pop()?;
                    let Token::Identifier(name) = self.lexer.pop()? else {
                        return Err(SyntaxError::ExpectedTagName(tag).into());
                    };
                    specifiers.add_data_type(DataType::Tagged(tag, name))?;
                }
                _ => break,
            }
            seen = true;
        }

        if !seen {
            return Err(SyntaxError::Expected("type specifier").into());
        }
        Ok(specifiers.into_type_name())
    }

    fn abstract_declarator(&mut self) -> Result<Declarator, Error> {
        if self.lexer.peek()? != Token::Asterisk {
            return self.direct_abstract_declarator();
        }

        let mut declarator = self.pointer()?;
        if matches!(self.lexer.peek()?, Token::LParen | Token::LBracket) {
            declarator.wrap(self.direct_abstract_declarator()?);
        }
        Ok(declarator)
    }

    fn pointer(&mut self) -> Result<Declarator, Error> {
        let mut declarator = Declarator::default();
        while self.lexer.peek()? == Token::Asterisk {
            self.lexer.pop()?;
            let qualifiers = self.type_qualifier_list()?;
            declarator.0.push(Derivation::Pointer(qualifiers));
        }
        Ok(declarator)
    }

    fn type_qualifier_list(&mut self) -> Result<Qualifiers, Error> {
        let mut qualifiers = Qualifiers::empty();
        while let Token::Qualifier(qualifier) = self.lexer.peek()? {
            self.lexer.pop()?;
            qualifiers |= qualifier;
        }
        Ok(qualifiers)
    }

    fn direct_abstract_declarator(&mut self) -> Result<Declarator, Error> {
        let mut group = None;
        if self.lexer.peek()? == Token::LParen {
            let lparen = self.lexer.pop()?;
            if matches!(
                self.lexer.peek()?,
                Token::Asterisk | Token::LParen | Token::LBracket
            ) {
                if self.depth == MAX_NESTING {
                    return Err(SyntaxError::NestingTooDeep(MAX_NESTING).into());
                }
                self.depth += 1;
                group = Some(self.abstract_declarator()?);
                self.depth -= 1;
                if self.lexer.pop()? != Token::RParen {
                    return Err(SyntaxError::Expected("')'").into());
                }
            } else {
                // Not a nested declarator; the suffix loop reports it.
                self.lexer.push(lparen);
            }
        }

        let mut suffixes = Vec::new();
        loop {
            match self.lexer.peek()? {
                Token::LBracket => {
                    self.lexer.pop()?;
                    let size = match self.lexer.peek()? {
                        Token::Number(size) => {
                            self.lexer.pop()?;
                            Some(size)
                        }
                        _ => None,
                    };
                    if self.lexer.pop()? != Token::RBracket {
                        return Err(SyntaxError::Expected("']'").into());
                    }
                    suffixes.push(Derivation::Array(size));
                }
                Token::LParen => return Err(Error::NotImplemented("function pointer types")),
                _ if group.is_none() && suffixes.is_empty() => {
                    return Err(SyntaxError::Expected("abstract declarator").into());
                }
                _ => break,
            }
        }

        // `[3][4]` is an array of 3 arrays of 4: the last suffix binds tightest.
        suffixes.reverse();
        let mut declarator = Declarator(suffixes);
        if let Some(group) = group {
            declarator.wrap(group);
        }
        Ok(declarator)
    }
}

/// Type derivations of an abstract declarator, innermost (closest to the base
/// type) first.
#[derive(Debug, PartialEq, Eq, Default)]
struct Declarator(Vec<Derivation>);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Derivation {
    Pointer(Qualifiers),
    Array(Option<u64>),
}

impl Declarator {
    /// Adds `outer` around everything already in `self`.
    fn wrap(&mut self, outer: Declarator) {
        self.0.extend(outer.0);
    }

    fn apply(self, base: TypeName) -> TypeName {
        self.0
            .into_iter()
            .fold(base, |inner, derivation| match derivation {
                Derivation::Pointer(qualifiers) => TypeName::Pointer {
                    pointee: Box::new(inner),
                    qualifiers,
                },
                Derivation::Array(size) => TypeName::Array {
                    element: Box::new(inner),
                    size,
                },
            })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Size {
    Short,
    Long,
    LongLong,
}

impl Size {
    fn keyword(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
            Self::LongLong => "long long",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Sign {
    Signed,
    Unsigned,
}

impl Sign {
    fn keyword(self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Unsigned => "unsigned",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum DataType<'input> {
    Keyword(Specifier),
    Tagged(Tag, &'input str),
    Typedef(&'input str),
}

impl<'input> DataType<'input> {
    fn accepts_size(self, size: Size) -> bool {
        match self {
            Self::Keyword(Specifier::Int) => true,
            Self::Keyword(Specifier::Double) => size == Size::Long,
            _ => false,
        }
    }

    fn accepts_sign(self) -> bool {
        matches!(self, Self::Keyword(Specifier::Int | Specifier::Char))
    }

    fn text(self) -> Cow<'input, str> {
        match self {
            Self::Keyword(specifier) => specifier.keyword().into(),
            Self::Tagged(tag, name) => format!("{tag} {name}").into(),
            Self::Typedef(name) => name.into(),
        }
    }
}

fn conflict(new: impl Into<String>, old: impl Into<String>) -> Error {
    SyntaxError::Conflict {
        new: new.into(),
        old: old.into(),
    }
    .into()
}

#[derive(Debug, Default)]
struct Specifiers<'input> {
    data_type: Option<DataType<'input>>,
    size: Option<Size>,
    sign: Option<Sign>,
    qualifiers: Qualifiers,
}

impl<'input> Specifiers<'input> {
    fn add_specifier(&mut self, specifier: Specifier) -> Result<(), Error> {
        match specifier {
            Specifier::Short => self.add_size(Size::Short),
            Specifier::Long => self.add_size(Size::Long),
            Specifier::Signed => self.add_sign(Sign::Signed),
            Specifier::Unsigned => self.add_sign(Sign::Unsigned),
            _ => self.add_data_type(DataType::Keyword(specifier)),
        }
    }

    fn add_size(&mut self, size: Size) -> Result<(), Error> {
        let size = match (self.size, size) {
            (Some(Size::Long), Size::Long) => Size::LongLong,
            (Some(old), new) => return Err(conflict(new.keyword(), old.keyword())),
            (None, new) => new,
        };
        if let Some(data_type) = self.data_type
            && !data_type.accepts_size(size)
        {
            return Err(conflict(size.keyword(), data_type.text()));
        }
        self.size = Some(size);
        Ok(())
    }

    fn add_sign(&mut self, sign: Sign) -> Result<(), Error> {
        if let Some(data_type) = self.data_type
            && !data_type.accepts_sign()
        {
            return Err(conflict(sign.keyword(), data_type.text()));
        }
        if let Some(old) = self.sign {
            return Err(conflict(sign.keyword(), old.keyword()));
        }
        self.sign = Some(sign);
        Ok(())
    }

    fn add_data_type(&mut self, data_type: DataType<'input>) -> Result<(), Error> {
        if let Some(old) = self.data_type {
            return Err(conflict(data_type.text(), old.text()));
        }
        if let Some(size) = self.size
            && !data_type.accepts_size(size)
        {
            return Err(conflict(data_type.text(), size.keyword()));
        }
        if let Some(sign) = self.sign
            && !data_type.accepts_sign()
        {
            return Err(conflict(data_type.text(), sign.keyword()));
        }
        self.data_type = Some(data_type);
        Ok(())
    }

    fn into_type_name(self) -> TypeName {
        let qualifiers = self.qualifiers;
        match self.data_type.unwrap_or(DataType::Keyword(Specifier::Int)) {
            DataType::Tagged(Tag::Struct, tag) => TypeName::Struct {
                tag: tag.to_owned(),
                qualifiers,
            },
            DataType::Tagged(Tag::Union, tag) => TypeName::Union {
                tag: tag.to_owned(),
                qualifiers,
            },
            DataType::Tagged(Tag::Enum, tag) => TypeName::Enum {
                tag: tag.to_owned(),
                qualifiers,
            },
            DataType::Typedef(name) => TypeName::Typedef {
                name: name.to_owned(),
                qualifiers,
            },
            DataType::Keyword(Specifier::Void) => TypeName::Void { qualifiers },
            DataType::Keyword(specifier) => {
                let sign = match (self.sign, specifier) {
                    (Some(Sign::Unsigned), _) => Some(Sign::Unsigned),
                    (Some(Sign::Signed), Specifier::Char) => Some(Sign::Signed),
                    _ => None,
                };
                let name = self
                    .size
                    .map(Size::keyword)
                    .into_iter()
                    .chain(sign.map(Sign::keyword))
                    .chain([specifier.keyword()])
                    .join(" ");
                TypeName::Basic { name, qualifiers }
            }
        }
    }
}

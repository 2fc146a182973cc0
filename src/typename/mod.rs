//! C type names as they appear in debug metadata, e.g. `const char *` or
//! `struct foo (*)[3]`.
//!
//! [`TypeName::parse`] turns such a string into a tree and
//! [`TypeName::declaration`] renders the tree back to canonical C.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use bitflags::bitflags;
use itertools::Itertools;
use tracing::trace;

pub mod lexer;
mod parser;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TypeName {
    Void {
        qualifiers: Qualifiers,
    },
    Basic {
        name: String,
        qualifiers: Qualifiers,
    },
    Struct {
        tag: String,
        qualifiers: Qualifiers,
    },
    Union {
        tag: String,
        qualifiers: Qualifiers,
    },
    Enum {
        tag: String,
        qualifiers: Qualifiers,
    },
    Typedef {
        name: String,
        qualifiers: Qualifiers,
    },
    Pointer {
        pointee: Box<TypeName>,
        qualifiers: Qualifiers,
    },
    Array {
        element: Box<TypeName>,
        size: Option<u64>,
    },
}

impl TypeName {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let type_name = parser::parse(input)?;
        trace!(input, %type_name, "Parsed type name");
        Ok(type_name)
    }

    /// Renders a C declaration of `name` with this type. An empty `name`
    /// gives the bare type name.
    pub fn declaration(&self, name: &str) -> String {
        match self {
            Self::Void { qualifiers } => plain(*qualifiers, "void", name),
            Self::Basic {
                name: type_name,
                qualifiers,
            }
            | Self::Typedef {
                name: type_name,
                qualifiers,
            } => plain(*qualifiers, type_name, name),
            Self::Struct { tag, qualifiers } => tagged(*qualifiers, Tag::Struct, tag, name),
            Self::Union { tag, qualifiers } => tagged(*qualifiers, Tag::Union, tag, name),
            Self::Enum { tag, qualifiers } => tagged(*qualifiers, Tag::Enum, tag, name),
            Self::Pointer {
                pointee,
                qualifiers,
            } => {
                let declarator = if qualifiers.is_empty() {
                    format!("*{name}")
                } else if name.is_empty() {
                    format!("* {}", qualifiers.keywords().join(" "))
                } else {
                    format!("* {} {name}", qualifiers.keywords().join(" "))
                };
                match **pointee {
                    Self::Array { .. } => pointee.declaration(&format!("({declarator})")),
                    _ => pointee.declaration(&declarator),
                }
            }
            Self::Array { element, size } => match size {
                Some(size) => element.declaration(&format!("{name}[{size}]")),
                None => element.declaration(&format!("{name}[]")),
            },
        }
    }
}

fn plain(qualifiers: Qualifiers, type_name: &str, name: &str) -> String {
    let mut words: Vec<&str> = qualifiers.keywords();
    words.push(type_name);
    if !name.is_empty() {
        words.push(name);
    }
    words.join(" ")
}

fn tagged(qualifiers: Qualifiers, tag: Tag, tag_name: &str, name: &str) -> String {
    plain(qualifiers, &format!("{tag} {tag_name}"), name)
}

impl Display for TypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration(""))
    }
}

impl FromStr for TypeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

bitflags! {
    /// Type qualifiers. The set is unordered; rendering sorts the keywords.
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
    pub struct Qualifiers: u8 {
        const CONST = 0x1;
        const RESTRICT = 0x2;
        const VOLATILE = 0x4;
        const ATOMIC = 0x8;
    }
}

impl Qualifiers {
    const KEYWORDS: [(Qualifiers, &'static str); 4] = [
        (Qualifiers::CONST, "const"),
        (Qualifiers::RESTRICT, "restrict"),
        (Qualifiers::VOLATILE, "volatile"),
        (Qualifiers::ATOMIC, "_Atomic"),
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .find(|(_, k)| *k == keyword)
            .map(|(q, _)| *q)
    }

    /// Keywords of the qualifiers in the set, in lexical order.
    pub fn keywords(self) -> Vec<&'static str> {
        Self::KEYWORDS
            .into_iter()
            .filter(|(q, _)| self.contains(*q))
            .map(|(_, k)| k)
            .sorted_unstable()
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Tag {
    Struct,
    Union,
    Enum,
}

impl Tag {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "struct" => Some(Self::Struct),
            "union" => Some(Self::Union),
            "enum" => Some(Self::Enum),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Struct => "struct",
            Self::Union => "union",
            Self::Enum => "enum",
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum Error {
    #[error("Invalid character {character:?} at offset {offset}")]
    Lex { character: char, offset: usize },
    #[error("Invalid integer literal {0:?}")]
    InvalidInteger(String),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("{0} are not implemented")]
    NotImplemented(&'static str),
}

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum SyntaxError {
    #[error("Cannot combine `{new}` with `{old}`")]
    Conflict { new: String, old: String },
    #[error("Expected identifier after `{0}`")]
    ExpectedTagName(Tag),
    #[error("Expected {0}")]
    Expected(&'static str),
    #[error("Extra tokens after type name")]
    ExtraTokens,
    #[error("Declarator nests more than {0} groups")]
    NestingTooDeep(usize),
}

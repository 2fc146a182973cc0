//! Parsing core for binary introspection.
//!
//! - [`elf`] decodes the header, section table and symbol table of an ELF64
//!   object held in memory.
//! - [`typename`] parses C type names such as `int (*)[3]` into a tree and
//!   renders them back to C.

pub mod elf;
pub mod typename;

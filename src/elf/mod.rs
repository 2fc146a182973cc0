use std::{collections::HashMap, mem, str, sync::OnceLock};

use tracing::{debug, trace};

pub use raw::{Encoding, SectionFlags};
use raw::Record;

#[cfg(test)]
mod fixture;
pub mod raw;

pub const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Read-only view of an ELF64 object held in memory.
///
/// The header and section table are decoded by [`ElfFile::parse`]. The symbol
/// index is built the first time [`ElfFile::symbols`] is called and cached for
/// the lifetime of the value.
#[derive(Debug)]
pub struct ElfFile<'data> {
    data: &'data [u8],
    header: raw::Header,
    encoding: Encoding,
    sections: Vec<SectionHeader<'data>>,
    by_name: HashMap<&'data str, usize>,
    symbols: OnceLock<HashMap<&'data str, Vec<Symbol<'data>>>>,
}

impl<'data> ElfFile<'data> {
    pub fn parse(data: &'data [u8]) -> Result<Self, Error> {
        let (header, encoding) = read_header(data)?;
        debug!(
            ?encoding,
            e_type = header.e_type,
            e_machine = header.e_machine,
            e_shnum = header.e_shnum,
            "Decoded ELF64 header"
        );

        let sections = read_sections(data, &header, encoding)?;
        let by_name = sections
            .iter()
            .enumerate()
            .map(|(index, section)| (section.name, index))
            .collect();
        debug!("Decoded {} section headers", sections.len());

        Ok(Self {
            data,
            header,
            encoding,
            sections,
            by_name,
            symbols: OnceLock::new(),
        })
    }

    pub fn header(&self) -> &raw::Header {
        &self.header
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn object_type(&self) -> ObjectType {
        self.header.e_type.into()
    }

    /// Section headers in file order, including the null section at index 0.
    pub fn sections(&self) -> &[SectionHeader<'data>] {
        &self.sections
    }

    /// Looks a section up by name. When several sections share a name the
    /// last one in the table wins.
    pub fn section(&self, name: &str) -> Option<&SectionHeader<'data>> {
        self.by_name.get(name).map(|&index| &self.sections[index])
    }

    pub fn section_data(&self, section: &SectionHeader<'data>) -> Result<&'data [u8], Error> {
        if section.section_type() == SectionType::Nobits {
            return Ok(&[]);
        }
        Ok(slice(self.data, section.sh_offset, section.sh_size)?)
    }

    /// Symbols from `.symtab` keyed by name, each list in file order.
    ///
    /// Anonymous symbols (`st_name == 0`) are left out. Concurrent first calls
    /// may both build the index; only one result is kept and both are equal.
    pub fn symbols(&self) -> Result<&HashMap<&'data str, Vec<Symbol<'data>>>, Error> {
        if let Some(symbols) = self.symbols.get() {
            return Ok(symbols);
        }
        let symbols = self.read_symbols()?;
        Ok(self.symbols.get_or_init(|| symbols))
    }

    /// All symbols named `name`, or an empty slice.
    pub fn symbol(&self, name: &str) -> Result<&[Symbol<'data>], Error> {
        Ok(self
            .symbols()?
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    fn required_section(&self, name: &str) -> Result<&SectionHeader<'data>, Error> {
        self.section(name)
            .ok_or_else(|| Error::MissingSection(name.to_owned()))
    }

    fn read_symbols(&self) -> Result<HashMap<&'data str, Vec<Symbol<'data>>>, Error> {
        let symtab = self.required_section(".symtab")?;
        let strtab = self.required_section(".strtab")?;
        let entries = self.section_data(symtab)?;
        let names = self.section_data(strtab)?;

        let entry_size = mem::size_of::<raw::Symbol>();
        if entries.len() % entry_size != 0 {
            return Err(FormatError::SymbolTableSize(symtab.sh_size).into());
        }

        let mut symbols: HashMap<&'data str, Vec<Symbol<'data>>> = HashMap::new();
        for offset in (0..entries.len()).step_by(entry_size) {
            let sym = raw::Symbol::read(entries, offset, self.encoding).ok_or(
                FormatError::Truncated {
                    offset: symtab.sh_offset + offset as u64,
                    len: entry_size as u64,
                },
            )?;
            if sym.st_name == 0 {
                continue;
            }
            let name = string_at(names, sym.st_name)?;
            symbols.entry(name).or_default().push(Symbol::new(name, sym));
        }

        debug!(
            "Indexed {} symbol names from {} entries",
            symbols.len(),
            entries.len() / entry_size
        );
        Ok(symbols)
    }
}

fn read_header(data: &[u8]) -> Result<(raw::Header, Encoding), Error> {
    let ident = data.get(..raw::EI_NIDENT).ok_or(FormatError::Truncated {
        offset: 0,
        len: raw::EI_NIDENT as u64,
    })?;
    let ident: raw::Ident = bytemuck::pod_read_unaligned(ident);

    if ident.ei_mag != MAGIC {
        return Err(FormatError::NotElf.into());
    }
    if ident.ei_version != raw::EV_CURRENT {
        return Err(FormatError::Version(ident.ei_version).into());
    }
    let encoding =
        Encoding::from_ident(ident.ei_data).ok_or(FormatError::Encoding(ident.ei_data))?;
    match ident.ei_class {
        raw::ELFCLASS64 => {}
        raw::ELFCLASS32 => return Err(Error::NotImplemented("32-bit ELF")),
        class => return Err(FormatError::Class(class).into()),
    }

    let header = raw::Header::read(data, 0, encoding).ok_or(FormatError::Truncated {
        offset: 0,
        len: mem::size_of::<raw::Header>() as u64,
    })?;
    Ok((header, encoding))
}

fn read_sections<'data>(
    data: &'data [u8],
    header: &raw::Header,
    encoding: Encoding,
) -> Result<Vec<SectionHeader<'data>>, Error> {
    let count = usize::from(header.e_shnum);
    let entry_size = usize::from(header.e_shentsize);
    if count > 0 && entry_size < mem::size_of::<raw::SectionHeader>() {
        return Err(FormatError::SectionEntrySize(header.e_shentsize).into());
    }

    let table: &[u8] = match count {
        0 => &[],
        _ => slice(data, header.e_shoff, (count * entry_size) as u64)?,
    };
    let raw_sections = (0..count)
        .map(|index| {
            raw::SectionHeader::read(table, index * entry_size, encoding).ok_or(
                FormatError::Truncated {
                    offset: header.e_shoff + (index * entry_size) as u64,
                    len: entry_size as u64,
                },
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let names_index = match header.e_shstrndx {
        raw::SHN_UNDEF => return Err(FormatError::NoStringTableIndex.into()),
        raw::SHN_XINDEX => {
            let link = raw_sections
                .first()
                .map(|section| section.sh_link)
                .ok_or(FormatError::InvalidStringTableIndex(raw::SHN_XINDEX.into()))?;
            trace!("Section name table index {link} taken from sh_link of section 0");
            link
        }
        index if index >= raw::SHN_LORESERVE => {
            return Err(FormatError::InvalidStringTableIndex(index.into()).into());
        }
        index => index.into(),
    };
    let names_section = usize::try_from(names_index)
        .ok()
        .and_then(|index| raw_sections.get(index))
        .ok_or(FormatError::InvalidStringTableIndex(names_index))?;
    let names = slice(data, names_section.sh_offset, names_section.sh_size)?;

    raw_sections
        .into_iter()
        .map(|section| -> Result<_, Error> {
            let name = match section.sh_name {
                0 => "",
                offset => string_at(names, offset)?,
            };
            Ok(SectionHeader::new(name, section))
        })
        .collect()
}

fn slice(data: &[u8], offset: u64, len: u64) -> Result<&[u8], FormatError> {
    let truncated = FormatError::Truncated { offset, len };
    let start = usize::try_from(offset).map_err(|_| truncated.clone())?;
    let len = usize::try_from(len).map_err(|_| truncated.clone())?;
    let end = start.checked_add(len).ok_or(truncated.clone())?;
    data.get(start..end).ok_or(truncated)
}

/// Returns the NUL-terminated string starting at `offset` in a string table.
fn string_at(table: &[u8], offset: u32) -> Result<&str, FormatError> {
    let tail = usize::try_from(offset)
        .ok()
        .and_then(|start| table.get(start..))
        .ok_or(FormatError::StringOffset(offset))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(FormatError::UnterminatedString(offset))?;
    Ok(str::from_utf8(&tail[..end])?)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SectionHeader<'data> {
    pub name: &'data str,
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: SectionFlags,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl<'data> SectionHeader<'data> {
    fn new(name: &'data str, raw: raw::SectionHeader) -> Self {
        Self {
            name,
            sh_name: raw.sh_name,
            sh_type: raw.sh_type,
            sh_flags: raw.sh_flags,
            sh_addr: raw.sh_addr,
            sh_offset: raw.sh_offset,
            sh_size: raw.sh_size,
            sh_link: raw.sh_link,
            sh_info: raw.sh_info,
            sh_addralign: raw.sh_addralign,
            sh_entsize: raw.sh_entsize,
        }
    }

    pub fn section_type(&self) -> SectionType {
        self.sh_type.into()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Symbol<'data> {
    pub name: &'data str,
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl<'data> Symbol<'data> {
    fn new(name: &'data str, raw: raw::Symbol) -> Self {
        Self {
            name,
            st_name: raw.st_name,
            st_info: raw.st_info,
            st_other: raw.st_other,
            st_shndx: raw.st_shndx,
            st_value: raw.st_value,
            st_size: raw.st_size,
        }
    }

    pub fn binding(&self) -> SymbolBinding {
        match self.st_info >> 4 {
            0 => SymbolBinding::Local,
            1 => SymbolBinding::Global,
            2 => SymbolBinding::Weak,
            v @ 10..=12 => SymbolBinding::Os(v),
            v @ 13..=15 => SymbolBinding::Proc(v),
            v => SymbolBinding::Unknown(v),
        }
    }

    pub fn kind(&self) -> SymbolKind {
        match self.st_info & 0xF {
            0 => SymbolKind::NoType,
            1 => SymbolKind::Object,
            2 => SymbolKind::Func,
            3 => SymbolKind::Section,
            4 => SymbolKind::File,
            5 => SymbolKind::Common,
            6 => SymbolKind::Tls,
            v @ 10..=12 => SymbolKind::Os(v),
            v @ 13..=15 => SymbolKind::Proc(v),
            v => SymbolKind::Unknown(v),
        }
    }

    pub fn visibility(&self) -> SymbolVisibility {
        match self.st_other & 0x3 {
            0 => SymbolVisibility::Default,
            1 => SymbolVisibility::Internal,
            2 => SymbolVisibility::Hidden,
            _ => SymbolVisibility::Protected,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SymbolBinding {
    Local,
    Global,
    Weak,
    Os(u8),
    Proc(u8),
    Unknown(u8),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SymbolKind {
    NoType,
    Object,
    Func,
    Section,
    File,
    Common,
    Tls,
    Os(u8),
    Proc(u8),
    Unknown(u8),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SymbolVisibility {
    Default,
    Internal,
    Hidden,
    Protected,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ObjectType {
    None,
    Relocatable,
    Executable,
    Dynamic,
    Core,
    Os(OsType),
    Proc(ProcType),
    Unknown(u16),
}

impl From<u16> for ObjectType {
    fn from(value: u16) -> Self {
        match value {
            0x00 => ObjectType::None,
            0x01 => ObjectType::Relocatable,
            0x02 => ObjectType::Executable,
            0x03 => ObjectType::Dynamic,
            0x04 => ObjectType::Core,
            _ => OsType::try_from(value)
                .map(ObjectType::Os)
                .or_else(|_| ProcType::try_from(value).map(ObjectType::Proc))
                .unwrap_or(ObjectType::Unknown(value)),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct OsType(u16);

impl OsType {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for OsType {
    type Error = RangeError<u16>;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let start = 0xFE00;
        let end = 0xFEFF;
        if value >= start && value <= end {
            Ok(Self(value))
        } else {
            Err(RangeError { start, end, value })
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ProcType(u16);

impl ProcType {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for ProcType {
    type Error = RangeError<u16>;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let start = 0xFF00;
        let end = 0xFFFF;
        if value >= start && value <= end {
            Ok(Self(value))
        } else {
            Err(RangeError { start, end, value })
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SectionType {
    Null,
    Progbits,
    Symtab,
    Strtab,
    Rela,
    Hash,
    Dynamic,
    Note,
    Nobits,
    Rel,
    Shlib,
    Dynsym,
    InitArray,
    FiniArray,
    PreinitArray,
    Group,
    SymtabShndx,
    Os(u32),
    Proc(u32),
    User(u32),
    Unknown(u32),
}

impl From<u32> for SectionType {
    fn from(value: u32) -> Self {
        match value {
            0 => SectionType::Null,
            1 => SectionType::Progbits,
            2 => SectionType::Symtab,
            3 => SectionType::Strtab,
            4 => SectionType::Rela,
            5 => SectionType::Hash,
            6 => SectionType::Dynamic,
            7 => SectionType::Note,
            8 => SectionType::Nobits,
            9 => SectionType::Rel,
            10 => SectionType::Shlib,
            11 => SectionType::Dynsym,
            14 => SectionType::InitArray,
            15 => SectionType::FiniArray,
            16 => SectionType::PreinitArray,
            17 => SectionType::Group,
            18 => SectionType::SymtabShndx,
            0x6000_0000..=0x6FFF_FFFF => SectionType::Os(value),
            0x7000_0000..=0x7FFF_FFFF => SectionType::Proc(value),
            0x8000_0000..=0x8FFF_FFFF => SectionType::User(value),
            _ => SectionType::Unknown(value),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Value {value} is not within {start}..={end} range")]
pub struct RangeError<T> {
    start: T,
    end: T,
    value: T,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("No section named {0:?}")]
    MissingSection(String),
}

/// The buffer is not a well-formed ELF64 container.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum FormatError {
    #[error("Not an ELF file")]
    NotElf,
    #[error("ELF version {0} is not EV_CURRENT")]
    Version(u8),
    #[error("Unknown ELF data encoding {0}")]
    Encoding(u8),
    #[error("Unknown ELF class {0}")]
    Class(u8),
    #[error("No string table index in ELF header")]
    NoStringTableIndex,
    #[error("Invalid string table index {0} in ELF header")]
    InvalidStringTableIndex(u32),
    #[error("Section header entry size {0} is too small")]
    SectionEntrySize(u16),
    #[error("Symbol table size {0} is not a multiple of the entry size")]
    SymbolTableSize(u64),
    #[error("{len} bytes at offset {offset} are out of bounds")]
    Truncated { offset: u64, len: u64 },
    #[error("String offset {0} is out of bounds")]
    StringOffset(u32),
    #[error("String at offset {0} is not NUL-terminated")]
    UnterminatedString(u32),
    #[error("Name is not valid UTF-8: {0}")]
    Utf8(#[from] str::Utf8Error),
}

use std::mem;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

pub const EI_NIDENT: usize = 16;

pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;

pub const ELFDATA2LSB: u8 = 1;
pub const ELFDATA2MSB: u8 = 2;

pub const EV_CURRENT: u8 = 1;

pub const SHN_UNDEF: u16 = 0;
pub const SHN_LORESERVE: u16 = 0xFF00;
pub const SHN_XINDEX: u16 = 0xFFFF;

/// Byte order of every multi-byte field in the file, taken from `ei_data`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Encoding {
    Lsb,
    Msb,
}

impl Encoding {
    pub fn from_ident(ei_data: u8) -> Option<Self> {
        match ei_data {
            ELFDATA2LSB => Some(Self::Lsb),
            ELFDATA2MSB => Some(Self::Msb),
            _ => None,
        }
    }

    fn is_native(self) -> bool {
        match self {
            Self::Lsb => cfg!(target_endian = "little"),
            Self::Msb => cfg!(target_endian = "big"),
        }
    }
}

/// Fixed-layout on-disk record that can be lifted out of a byte buffer.
pub trait Record: Pod {
    /// Reverses the byte order of every multi-byte field.
    fn swap_bytes(self) -> Self;

    /// Reads a record at `offset`, converting fields to host byte order.
    ///
    /// Returns `None` when the record does not fit inside `data`.
    fn read(data: &[u8], offset: usize, encoding: Encoding) -> Option<Self> {
        let end = offset.checked_add(mem::size_of::<Self>())?;
        let record: Self = bytemuck::pod_read_unaligned(data.get(offset..end)?);
        if encoding.is_native() {
            Some(record)
        } else {
            Some(record.swap_bytes())
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct Header {
    pub e_ident: Ident,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl Record for Header {
    fn swap_bytes(self) -> Self {
        Self {
            e_ident: self.e_ident,
            e_type: self.e_type.swap_bytes(),
            e_machine: self.e_machine.swap_bytes(),
            e_version: self.e_version.swap_bytes(),
            e_entry: self.e_entry.swap_bytes(),
            e_phoff: self.e_phoff.swap_bytes(),
            e_shoff: self.e_shoff.swap_bytes(),
            e_flags: self.e_flags.swap_bytes(),
            e_ehsize: self.e_ehsize.swap_bytes(),
            e_phentsize: self.e_phentsize.swap_bytes(),
            e_phnum: self.e_phnum.swap_bytes(),
            e_shentsize: self.e_shentsize.swap_bytes(),
            e_shnum: self.e_shnum.swap_bytes(),
            e_shstrndx: self.e_shstrndx.swap_bytes(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct Ident {
    pub ei_mag: [u8; 4],
    pub ei_class: u8,
    pub ei_data: u8,
    pub ei_version: u8,
    pub ei_osabi: u8,
    pub ei_abiversion: u8,
    pub ei_pad: [u8; 7],
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SectionHeader {
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

impl Record for SectionHeader {
    fn swap_bytes(self) -> Self {
        Self {
            sh_name: self.sh_name.swap_bytes(),
            sh_type: self.sh_type.swap_bytes(),
            sh_flags: SectionFlags::from_bits_retain(self.sh_flags.bits().swap_bytes()),
            sh_addr: self.sh_addr.swap_bytes(),
            sh_offset: self.sh_offset.swap_bytes(),
            sh_size: self.sh_size.swap_bytes(),
            sh_link: self.sh_link.swap_bytes(),
            sh_info: self.sh_info.swap_bytes(),
            sh_addralign: self.sh_addralign.swap_bytes(),
            sh_entsize: self.sh_entsize.swap_bytes(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct Symbol {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl Record for Symbol {
    fn swap_bytes(self) -> Self {
        Self {
            st_name: self.st_name.swap_bytes(),
            st_info: self.st_info,
            st_other: self.st_other,
            st_shndx: self.st_shndx.swap_bytes(),
            st_value: self.st_value.swap_bytes(),
            st_size: self.st_size.swap_bytes(),
        }
    }
}

bitflags! {
    #[derive(Debug, PartialEq, Eq, Pod, Zeroable, Clone, Copy)]
    #[repr(C)]
    pub struct SectionFlags: u64 {
        const SHF_WRITE = 0x01;
        const SHF_ALLOC = 0x02;
        const SHF_EXECINSTR = 0x04;
        const SHF_MERGE = 0x10;
        const SHF_STRINGS = 0x20;
        const SHF_INFO_LINK = 0x40;
        const SHF_LINK_ORDER = 0x80;
        const SHF_OS_NONCONFORMING = 0x100;
        const SHF_GROUP = 0x200;
        const SHF_TLS = 0x400;
        const SHF_COMPRESSED = 0x800;
        const SHF_MASKOS = 0x0FF0_0000;
        const SHF_MASKPROC = 0xF000_0000;
        const SHF_ORDERED = 0x0400_0000;
        const SHF_EXCLUDE = 0x0800_0000;
    }
}

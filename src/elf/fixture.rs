//! Synthetic ELF64 images for exercising the decoder without files on disk.

use bon::bon;

use super::{Encoding, MAGIC, raw::ELFCLASS64};

pub struct Section {
    name: &'static str,
    ty: u32,
    flags: u64,
    data: Vec<u8>,
    size: Option<u64>,
    link: u32,
    entsize: u64,
}

#[bon]
impl Section {
    #[builder]
    pub fn new(
        name: &'static str,
        #[builder(default = 1)] ty: u32,
        #[builder(default)] flags: u64,
        #[builder(default)] data: Vec<u8>,
        size: Option<u64>,
        #[builder(default)] link: u32,
        #[builder(default)] entsize: u64,
    ) -> Self {
        Self {
            name,
            ty,
            flags,
            data,
            size,
            link,
            entsize,
        }
    }
}

/// A complete image: null section, the given sections, then `.shstrtab`,
/// followed by the section header table at the very end of the buffer.
pub struct Image {
    encoding: Encoding,
    class: u8,
    version: u8,
    ty: u16,
    machine: u16,
    entry: u64,
    phoff: u64,
    phentsize: u16,
    phnum: u16,
    flags: u32,
    shstrndx: Option<u16>,
    null_link: u32,
    sections: Vec<Section>,
}

#[bon]
impl Image {
    #[builder]
    pub fn new(
        #[builder(default = Encoding::Lsb)] encoding: Encoding,
        #[builder(default = ELFCLASS64)] class: u8,
        #[builder(default = 1)] version: u8,
        #[builder(default = 1)] ty: u16,
        #[builder(default = 0x3E)] machine: u16,
        #[builder(default)] entry: u64,
        #[builder(default)] phoff: u64,
        #[builder(default = 56)] phentsize: u16,
        #[builder(default)] phnum: u16,
        #[builder(default)] flags: u32,
        shstrndx: Option<u16>,
        #[builder(default)] null_link: u32,
        #[builder(default)] sections: Vec<Section>,
    ) -> Self {
        Self {
            encoding,
            class,
            version,
            ty,
            machine,
            entry,
            phoff,
            phentsize,
            phnum,
            flags,
            shstrndx,
            null_link,
            sections,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut names = StringTable::default();
        let shstrtab_name = names.add(".shstrtab");
        let name_offsets: Vec<u32> = self.sections.iter().map(|s| names.add(s.name)).collect();

        let mut out = Writer::new(self.encoding);
        out.bytes(&[0; 64]);

        let mut offsets = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            offsets.push(out.len());
            out.bytes(&section.data);
        }
        let shstrtab_offset = out.len();
        out.bytes(&names.bytes);

        let shoff = out.len();
        out.bytes(&[0; 40]);
        out.u32(self.null_link);
        out.bytes(&[0; 20]);
        for ((section, name), offset) in self.sections.iter().zip(name_offsets).zip(offsets) {
            out.section_header(
                name,
                section.ty,
                section.flags,
                offset,
                section.size.unwrap_or(section.data.len() as u64),
                section.link,
                section.entsize,
            );
        }
        out.section_header(
            shstrtab_name,
            3,
            0,
            shstrtab_offset,
            names.bytes.len() as u64,
            0,
            0,
        );

        let shnum = self.sections.len() as u16 + 2;
        let mut header = Writer::new(self.encoding);
        header.bytes(&MAGIC);
        header.bytes(&[self.class, ident_data(self.encoding), self.version]);
        header.bytes(&[0; 9]);
        header.u16(self.ty);
        header.u16(self.machine);
        header.u32(1);
        header.u64(self.entry);
        header.u64(self.phoff);
        header.u64(shoff);
        header.u32(self.flags);
        header.u16(64);
        header.u16(self.phentsize);
        header.u16(self.phnum);
        header.u16(64);
        header.u16(shnum);
        header.u16(self.shstrndx.unwrap_or(shnum - 1));

        let mut bytes = out.buf;
        bytes[..64].copy_from_slice(&header.buf);
        bytes
    }
}

pub struct Sym {
    name: &'static str,
    info: u8,
    shndx: u16,
    value: u64,
}

impl Sym {
    pub fn new(name: &'static str, info: u8, shndx: u16, value: u64) -> Self {
        Self {
            name,
            info,
            shndx,
            value,
        }
    }
}

/// Builds a `.symtab`/`.strtab` pair. Entry 0 is the customary null symbol
/// and every other symbol has size 16.
pub fn symbol_tables(encoding: Encoding, symbols: &[Sym]) -> [Section; 2] {
    let mut names = StringTable::default();
    let mut entries = Writer::new(encoding);
    entries.bytes(&[0; 24]);
    for sym in symbols {
        entries.u32(names.add(sym.name));
        entries.bytes(&[sym.info, 0]);
        entries.u16(sym.shndx);
        entries.u64(sym.value);
        entries.u64(16);
    }

    [
        Section::builder()
            .name(".symtab")
            .ty(2)
            .data(entries.buf)
            .entsize(24)
            .build(),
        Section::builder().name(".strtab").ty(3).data(names.bytes).build(),
    ]
}

fn ident_data(encoding: Encoding) -> u8 {
    match encoding {
        Encoding::Lsb => 1,
        Encoding::Msb => 2,
    }
}

struct StringTable {
    bytes: Vec<u8>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self { bytes: vec![0] }
    }
}

impl StringTable {
    fn add(&mut self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        offset
    }
}

struct Writer {
    encoding: Encoding,
    buf: Vec<u8>,
}

impl Writer {
    fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            buf: Vec::new(),
        }
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u16(&mut self, v: u16) {
        match self.encoding {
            Encoding::Lsb => self.bytes(&v.to_le_bytes()),
            Encoding::Msb => self.bytes(&v.to_be_bytes()),
        }
    }

    fn u32(&mut self, v: u32) {
        match self.encoding {
            Encoding::Lsb => self.bytes(&v.to_le_bytes()),
            Encoding::Msb => self.bytes(&v.to_be_bytes()),
        }
    }

    fn u64(&mut self, v: u64) {
        match self.encoding {
            Encoding::Lsb => self.bytes(&v.to_le_bytes()),
            Encoding::Msb => self.bytes(&v.to_be_bytes()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn section_header(
        &mut self,
        name: u32,
        ty: u32,
        flags: u64,
        offset: u64,
        size: u64,
        link: u32,
        entsize: u64,
    ) {
        self.u32(name);
        self.u32(ty);
        self.u64(flags);
        self.u64(0);
        self.u64(offset);
        self.u64(size);
        self.u32(link);
        self.u32(0);
        self.u64(1);
        self.u64(entsize);
    }
}

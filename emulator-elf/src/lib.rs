#![deny(missing_debug_implementations)]

//! ELF64 [`Loader`] implementation, built on `elf_rs` (`libroottask`'s own
//! ELF crate: `elf_rs::Elf::from_bytes` / `program_header_iter` /
//! `ph_type` / `content`). Segment and entry-point parsing goes through
//! `elf_rs` exactly as `libroottask` uses it; the binary type and symbol
//! tables are read directly off the raw ELF64 header/section layout,
//! since those two tables aren't exercised anywhere in `libroottask`'s
//! own usage of the crate.

use elf_rs::{
    Elf,
    ElfFile,
    ProgramType,
};
use emulator_core::{
    BinaryType,
    ByteOrder,
    DataSegment,
    Loader,
    SegmentSpec,
    Symbol,
};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("ELF header too short to contain e_ident")]
    Truncated,
    #[error("unrecognized ELF data encoding byte 0x{0:x} (expected 1=LE or 2=BE)")]
    UnknownEncoding(u8),
    #[error("elf_rs failed to parse the image: {0:?}")]
    Parse(elf_rs::Error),
}

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_DYNSYM: u32 = 11;

fn read_u16(bytes: &[u8], off: usize, order: ByteOrder) -> u16 {
    let b = [bytes[off], bytes[off + 1]];
    match order {
        ByteOrder::Little => u16::from_le_bytes(b),
        ByteOrder::Big => u16::from_be_bytes(b),
    }
}

fn read_u32(bytes: &[u8], off: usize, order: ByteOrder) -> u32 {
    let b: [u8; 4] = bytes[off..off + 4].try_into().unwrap();
    match order {
        ByteOrder::Little => u32::from_le_bytes(b),
        ByteOrder::Big => u32::from_be_bytes(b),
    }
}

fn read_u64(bytes: &[u8], off: usize, order: ByteOrder) -> u64 {
    let b: [u8; 8] = bytes[off..off + 8].try_into().unwrap();
    match order {
        ByteOrder::Little => u64::from_le_bytes(b),
        ByteOrder::Big => u64::from_be_bytes(b),
    }
}

/// One `Elf64_Shdr`, read manually: the section header/type fields aren't
/// part of `libroottask`'s `elf_rs` usage, so this workspace reads them
/// directly off the well-known ELF64 layout instead of guessing at an
/// unexercised corner of the crate's API.
struct RawSection {
    sh_type: u32,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
}

fn raw_sections(bytes: &[u8], order: ByteOrder) -> Vec<RawSection> {
    if bytes.len() < 64 {
        return Vec::new();
    }
    let e_shoff = read_u64(bytes, 40, order) as usize;
    let e_shentsize = read_u16(bytes, 58, order) as usize;
    let e_shnum = read_u16(bytes, 60, order) as usize;
    if e_shoff == 0 || e_shentsize == 0 {
        return Vec::new();
    }

    let mut sections = Vec::with_capacity(e_shnum);
    for i in 0..e_shnum {
        let base = e_shoff + i * e_shentsize;
        if base + 64 > bytes.len() {
            break;
        }
        sections.push(RawSection {
            sh_type: read_u32(bytes, base + 4, order),
            sh_offset: read_u64(bytes, base + 24, order),
            sh_size: read_u64(bytes, base + 32, order),
            sh_link: read_u32(bytes, base + 40, order),
        });
    }
    sections
}

fn cstr_at(strtab: &[u8], offset: usize) -> String {
    strtab[offset..]
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Parses one `.symtab`/`.dynsym` section (paired with its `sh_link`
/// string table) into [`Symbol`]s. `Elf64_Sym` is a fixed 24-byte record:
/// `st_name: u32, st_info: u8, st_other: u8, st_shndx: u16, st_value: u64,
/// st_size: u64`.
fn parse_symbols(bytes: &[u8], order: ByteOrder, symtab: &RawSection, sections: &[RawSection]) -> Vec<Symbol> {
    let strtab = match sections.get(symtab.sh_link as usize) {
        Some(s) => s,
        None => return Vec::new(),
    };
    let str_bytes = &bytes[strtab.sh_offset as usize..(strtab.sh_offset + strtab.sh_size) as usize];

    const ENTRY_SIZE: u64 = 24;
    let count = symtab.sh_size / ENTRY_SIZE;
    let mut symbols = Vec::with_capacity(count as usize);
    for i in 0..count {
        let base = (symtab.sh_offset + i * ENTRY_SIZE) as usize;
        let name_off = read_u32(bytes, base, order) as usize;
        let value = read_u64(bytes, base + 8, order);
        let size = read_u64(bytes, base + 16, order);
        let name = cstr_at(str_bytes, name_off);
        if name.is_empty() {
            continue;
        }
        symbols.push(Symbol {
            name,
            start: value,
            end: value + size,
        });
    }
    symbols
}

#[derive(Debug, Clone)]
pub struct ElfLoader {
    byte_order: ByteOrder,
    binary_type: BinaryType,
    segments: Vec<SegmentSpec>,
    entry: u64,
    interp: String,
    symbols: Vec<Symbol>,
    data_segment: DataSegment,
}

impl ElfLoader {
    /// Parses `bytes` as an ELF64 image (LE or BE). Statically stripped
    /// binaries fall back to an empty symbol table rather than an error
    /// (spec: absent `.symtab`/`.dynsym` is common, not fatal).
    pub fn parse(bytes: &[u8]) -> Result<Self, ElfError> {
        if bytes.len() < 64 {
            return Err(ElfError::Truncated);
        }
        let byte_order = match bytes[5] {
            1 => ByteOrder::Little,
            2 => ByteOrder::Big,
            other => return Err(ElfError::UnknownEncoding(other)),
        };

        let elf = Elf::from_bytes(bytes).map_err(ElfError::Parse)?;

        let e_type = read_u16(bytes, 16, byte_order);
        let binary_type = match e_type {
            ET_EXEC => BinaryType::Exec,
            ET_DYN => BinaryType::Dyn,
            _ => BinaryType::Unknown,
        };

        let mut segments = Vec::new();
        let mut max_end = 0u64;
        for ph in elf.program_header_iter() {
            if ph.ph_type() != ProgramType::LOAD {
                continue;
            }
            segments.push(SegmentSpec {
                addr: ph.vaddr(),
                size: ph.memsz(),
                data: ph.content().to_vec(),
            });
            max_end = max_end.max(ph.vaddr() + ph.memsz());
        }

        let interp = elf
            .program_header_iter()
            .find(|ph| ph.ph_type() == ProgramType::INTERP)
            .map(|ph| {
                let content = ph.content();
                let nul = content.iter().position(|&b| b == 0).unwrap_or(content.len());
                String::from_utf8_lossy(&content[..nul]).into_owned()
            })
            .unwrap_or_default();

        let sections = raw_sections(bytes, byte_order);
        let symtab = sections
            .iter()
            .find(|s| s.sh_type == SHT_SYMTAB)
            .or_else(|| sections.iter().find(|s| s.sh_type == SHT_DYNSYM));
        let symbols = match symtab {
            Some(symtab) if sections.iter().any(|s| s.sh_type == SHT_STRTAB) => {
                parse_symbols(bytes, byte_order, symtab, &sections)
            }
            _ => Vec::new(),
        };

        let page_size = 0x1000u64;
        let data_start = max_end.div_ceil(page_size) * page_size;

        Ok(Self {
            byte_order,
            binary_type,
            segments,
            entry: elf.entry_point(),
            interp,
            symbols,
            data_segment: DataSegment {
                start: data_start,
                end: data_start,
            },
        })
    }
}

impl fmt::Display for ElfLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ELF64 {:?} entry=0x{:x} segments={} interp={:?}",
            self.binary_type,
            self.entry,
            self.segments.len(),
            self.interp
        )
    }
}

impl Loader for ElfLoader {
    fn arch(&self) -> &str {
        "x86_64"
    }

    fn os(&self) -> &str {
        "linux"
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn binary_type(&self) -> BinaryType {
        self.binary_type
    }

    fn segments(&self) -> &[SegmentSpec] {
        &self.segments
    }

    fn entry(&self) -> u64 {
        self.entry
    }

    fn interp(&self) -> &str {
        &self.interp
    }

    fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    fn data_segment(&self) -> DataSegment {
        self.data_segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assembles a minimal valid ELF64 LE executable: header, one
    /// PHDR-less `PT_LOAD` program header covering a tiny code blob, no
    /// section headers (a statically stripped binary).
    fn synthetic_elf() -> Vec<u8> {
        let mut buf = vec![0u8; 64 + 56]; // Ehdr + one Phdr
        buf[0..4].copy_from_slice(b"\x7fELF");
        buf[4] = 2; // EI_CLASS = ELFCLASS64
        buf[5] = 1; // EI_DATA = little endian
        buf[6] = 1; // EI_VERSION

        buf[16..18].copy_from_slice(&ET_EXEC.to_le_bytes()); // e_type
        buf[18..20].copy_from_slice(&62u16.to_le_bytes()); // e_machine = EM_X86_64
        buf[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
        buf[24..32].copy_from_slice(&0x401000u64.to_le_bytes()); // e_entry
        buf[32..40].copy_from_slice(&64u64.to_le_bytes()); // e_phoff
        buf[40..48].copy_from_slice(&0u64.to_le_bytes()); // e_shoff
        buf[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        buf[54..56].copy_from_slice(&56u16.to_le_bytes()); // e_phentsize
        buf[56..58].copy_from_slice(&1u16.to_le_bytes()); // e_phnum
        buf[58..60].copy_from_slice(&0u16.to_le_bytes()); // e_shentsize
        buf[60..62].copy_from_slice(&0u16.to_le_bytes()); // e_shnum

        let ph = 64;
        buf[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
        buf[ph + 4..ph + 8].copy_from_slice(&5u32.to_le_bytes()); // p_flags = R+X
        buf[ph + 8..ph + 16].copy_from_slice(&0u64.to_le_bytes()); // p_offset
        buf[ph + 16..ph + 24].copy_from_slice(&0x401000u64.to_le_bytes()); // p_vaddr
        buf[ph + 24..ph + 32].copy_from_slice(&0x401000u64.to_le_bytes()); // p_paddr
        buf[ph + 32..ph + 40].copy_from_slice((buf.len() as u64).to_le_bytes().as_slice()); // p_filesz
        buf[ph + 40..ph + 48].copy_from_slice((buf.len() as u64).to_le_bytes().as_slice()); // p_memsz
        buf[ph + 48..ph + 56].copy_from_slice(&0x1000u64.to_le_bytes()); // p_align

        buf
    }

    #[test]
    fn s8_elf_exec_parses_entry_and_load_segment() {
        let loader = ElfLoader::parse(&synthetic_elf()).unwrap();
        assert_eq!(loader.binary_type(), BinaryType::Exec);
        assert_eq!(loader.entry(), 0x401000);
        assert_eq!(loader.byte_order(), ByteOrder::Little);
        assert_eq!(loader.interp(), "");
        assert!(loader.symbols().is_empty());
        assert_eq!(loader.segments().len(), 1);
        assert_eq!(loader.segments()[0].addr, 0x401000);
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        assert!(matches!(ElfLoader::parse(&[0u8; 4]), Err(ElfError::Truncated)));
    }
}

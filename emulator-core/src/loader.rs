use std::fmt::Debug;

/// A parsed binary's load type (spec §6, "Loader interface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryType {
    Exec,
    Dyn,
    Unknown,
}

/// Guest byte order, read off the parsed binary and handed to the engine at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// One `PT_LOAD`-like segment as the loader reports it: a pre-bias guest
/// address, a size, and the on-disk bytes to be written once the segment's
/// range is mapped. `size >= data.len()`; the remainder (BSS) is left
/// zeroed by the engine's `mem_map`.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub addr: u64,
    pub size: u64,
    pub data: Vec<u8>,
}

/// A named symbol, as consumed by the symbolicator (C4).
///
/// `end == 0` means "size unknown; unbounded upward" (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// The pre-bias `(start, end)` of the program-break region, as reported by
/// the loader. Copied by value into the `Emulator` at construction time;
/// only the emulator's copy is ever mutated by `brk` (open question d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSegment {
    pub start: u64,
    pub end: u64,
}

/// A parsed binary, exposing exactly the surface the core needs (spec §6).
/// `emulator-elf` is the only implementor shipped here, but the trait keeps
/// the core free of any particular binary-format crate, the same way
/// `libhrstd` keeps its capability records independent of Hedron syscall
/// numbering details.
pub trait Loader: Debug {
    fn arch(&self) -> &str;
    fn os(&self) -> &str;
    fn byte_order(&self) -> ByteOrder;
    fn binary_type(&self) -> BinaryType;
    fn segments(&self) -> &[SegmentSpec];
    fn entry(&self) -> u64;
    /// Path to a dynamic interpreter (e.g. `/lib64/ld-linux-x86-64.so.2`),
    /// or empty if the binary is statically linked.
    fn interp(&self) -> &str;
    fn symbols(&self) -> &[Symbol];
    fn data_segment(&self) -> DataSegment;
}

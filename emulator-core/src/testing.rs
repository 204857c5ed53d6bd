//! `MockEngine`/`MockLoader` test doubles (spec's added "test tooling").
//!
//! Exported outside this crate's own test suite behind the `testing`
//! feature so `emulator-cli` can write integration tests without linking a
//! real Unicorn engine.

use crate::engine::{
    CpuEngine,
    MemoryAccess,
};
use crate::error::EmulatorError;
use crate::loader::{
    BinaryType,
    ByteOrder,
    DataSegment,
    Loader,
    SegmentSpec,
    Symbol,
};
use emulator_abi::Register;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// A flat byte-addressable memory with page-granular "is this mapped"
/// bookkeeping, plus hook callbacks a test can trigger by hand.
#[derive(Debug, Default)]
pub struct MockEngine {
    page_size: u64,
    mapped: BTreeMap<u64, u64>, // page-aligned addr -> size
    mem: BTreeMap<u64, u8>,
    regs: HashMap<Register, u64>,
    next_mmap: u64,
    stopped: bool,
    #[allow(clippy::type_complexity)]
    block_hook: Option<Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>>,
    code_hook: Option<Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>>,
    mem_hook: Option<Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess)>>,
    mem_invalid_hook: Option<Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess) -> bool>>,
    interrupt_hook: Option<Box<dyn FnMut(&mut dyn CpuEngine, u32)>>,
}

impl MockEngine {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            next_mmap: 0x7000_0000,
            ..Default::default()
        }
    }

    pub fn is_mapped(&self, addr: u64, size: u64) -> bool {
        self.mapped
            .iter()
            .any(|(&a, &s)| a <= addr && addr + size <= a + s)
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped
    }

    /// Take-call-restore: the hook is temporarily removed from `self` so
    /// the callback can be handed `self` (as `&mut dyn CpuEngine`) without
    /// a double-borrow, then put back once the call returns.
    pub fn fire_code_hook(&mut self, addr: u64, size: u32) {
        if let Some(mut hook) = self.code_hook.take() {
            hook(self, addr, size);
            self.code_hook = Some(hook);
        }
    }

    pub fn fire_block_hook(&mut self, addr: u64, size: u32) {
        if let Some(mut hook) = self.block_hook.take() {
            hook(self, addr, size);
            self.block_hook = Some(hook);
        }
    }

    pub fn fire_mem_hook(&mut self, access: MemoryAccess) {
        if let Some(mut hook) = self.mem_hook.take() {
            hook(self, access);
            self.mem_hook = Some(hook);
        }
    }

    pub fn fire_mem_invalid_hook(&mut self, access: MemoryAccess) -> bool {
        if let Some(mut hook) = self.mem_invalid_hook.take() {
            let resume = hook(self, access);
            self.mem_invalid_hook = Some(hook);
            resume
        } else {
            true
        }
    }

    pub fn fire_interrupt_hook(&mut self, intno: u32) {
        if let Some(mut hook) = self.interrupt_hook.take() {
            hook(self, intno);
            self.interrupt_hook = Some(hook);
        }
    }
}

impl CpuEngine for MockEngine {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Little
    }

    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), EmulatorError> {
        self.mapped.insert(addr, size);
        Ok(())
    }

    fn mmap(&mut self, hint: u64, size: u64) -> Result<u64, EmulatorError> {
        let addr = if hint != 0 { hint } else { self.next_mmap };
        self.next_mmap = addr + size + self.page_size;
        self.mapped.insert(addr, size);
        Ok(addr)
    }

    fn mem_write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), EmulatorError> {
        for (i, b) in bytes.iter().enumerate() {
            self.mem.insert(addr + i as u64, *b);
        }
        Ok(())
    }

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), EmulatorError> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = *self.mem.get(&(addr + i as u64)).unwrap_or(&0);
        }
        Ok(())
    }

    fn reg_read(&self, reg: Register) -> Result<u64, EmulatorError> {
        Ok(*self.regs.get(&reg).unwrap_or(&0))
    }

    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), EmulatorError> {
        self.regs.insert(reg, value);
        Ok(())
    }

    fn hook_add_block(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>) {
        self.block_hook = Some(callback);
    }

    fn hook_add_code(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>) {
        self.code_hook = Some(callback);
    }

    fn hook_add_mem(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess)>) {
        self.mem_hook = Some(callback);
    }

    fn hook_add_mem_invalid(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess) -> bool>) {
        self.mem_invalid_hook = Some(callback);
    }

    fn hook_add_interrupt(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, u32)>) {
        self.interrupt_hook = Some(callback);
    }

    fn disas(&self, addr: u64, _size: u64) -> String {
        format!("<disas @0x{addr:x}>")
    }

    fn start(&mut self, _pc: u64, _end_addr: u64) -> Result<(), EmulatorError> {
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// A canned [`Loader`] built fluently by tests.
#[derive(Debug, Clone, Default)]
pub struct MockLoader {
    binary_type: BinaryType,
    segments: Vec<SegmentSpec>,
    entry: u64,
    interp: String,
    symbols: Vec<Symbol>,
    data_segment: DataSegment,
}

impl Default for BinaryType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Default for DataSegment {
    fn default() -> Self {
        Self { start: 0, end: 0 }
    }
}

impl MockLoader {
    pub fn new(binary_type: BinaryType) -> Self {
        Self {
            binary_type,
            ..Default::default()
        }
    }

    pub fn with_segment(mut self, seg: SegmentSpec) -> Self {
        self.segments.push(seg);
        self
    }

    pub fn with_entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_interp(mut self, interp: &str) -> Self {
        self.interp = interp.to_string();
        self
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbols.push(symbol);
        self
    }

    pub fn with_data_segment(mut self, data_segment: DataSegment) -> Self {
        self.data_segment = data_segment;
        self
    }
}

impl Loader for MockLoader {
    fn arch(&self) -> &str {
        "mock"
    }

    fn os(&self) -> &str {
        "mock"
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Little
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

//! Stack & ABI initializer (C3).
//!
//! Operates purely through [`EmulatorOps`] (the same surface OS init code
//! and the syscall layer see), since `push`/`push_bytes` are specified as
//! methods of the emulator façade itself (spec §6), not of the CPU engine.

use emulator_abi::{
    EmulatorOps,
    OpsError,
    Register,
};

/// Reserves the stack region and points `sp_register` at its top.
/// Returns the stack's base address.
pub fn setup_stack(
    emu: &mut dyn EmulatorOps,
    hint: u64,
    size: u64,
    sp_register: Register,
) -> Result<u64, OpsError> {
    let base = emu.mmap(hint, size)?;
    emu.reg_write(sp_register, base + size)?;
    Ok(base)
}

/// Writes `strings` back-to-back into one freshly mapped, zero buffer and
/// returns each string's guest address in input order.
///
/// Per the corrected behavior (open question c): string `i` is written at
/// the offset the cursor has actually advanced to, and that same offset is
/// recorded as its pointer — no index/offset mismatch.
pub fn push_strings(emu: &mut dyn EmulatorOps, strings: &[String]) -> Result<Vec<u64>, OpsError> {
    let total: usize = strings.iter().map(|s| s.len() + 1).sum();
    let base = emu.mmap(0, total as u64)?;

    let mut buf = vec![0u8; total];
    let mut addrs = Vec::with_capacity(strings.len());
    let mut pos = 0usize;
    for s in strings {
        buf[pos..pos + s.len()].copy_from_slice(s.as_bytes());
        addrs.push(base + pos as u64);
        pos += s.len() + 1; // +1 leaves the NUL terminator, already zero in buf
    }
    emu.mem_write(base, &buf)?;
    Ok(addrs)
}

/// Pushes a zero terminator, then each address in `addrs`, in the given
/// order. Because `push` decrements the stack pointer, the *last* pushed
/// address ends up at the lowest (final) address of this region; callers
/// that want a particular array, read upward from the stack pointer, in
/// natural order must pass `addrs` already reversed (see `posix_init`).
pub fn push_addrs(emu: &mut dyn EmulatorOps, addrs: &[u64]) -> Result<(), OpsError> {
    emu.push(0)?;
    for &addr in addrs {
        emu.push(addr)?;
    }
    Ok(())
}

/// Builds the Linux-style initial stack layout: argc, argv[], NULL, envp[],
/// NULL, auxv bytes, and a trailing zero word, per spec §4.3. `auxv` is an
/// opaque pre-encoded byte blob (the `(arch, OS)` table or caller decides
/// its contents; this module only places it).
pub fn posix_init(
    emu: &mut dyn EmulatorOps,
    args: &[String],
    env: &[String],
    auxv: &[u8],
) -> Result<(), OpsError> {
    let argv_ptrs = push_strings(emu, args)?;
    let envp_ptrs = push_strings(emu, env)?;

    emu.push(0)?;
    emu.push_bytes(auxv)?;

    let mut envp_rev = envp_ptrs;
    envp_rev.reverse();
    push_addrs(emu, &envp_rev)?;

    let mut argv_rev = argv_ptrs;
    argv_rev.reverse();
    push_addrs(emu, &argv_rev)?;

    emu.push(args.len() as u64)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emulator_abi::LinuxX86_64;
    use emulator_abi::OsTable;
    use crate::emulator::Emulator;
    use crate::loader::DataSegment;
    use crate::testing::MockEngine;

    fn emulator() -> Emulator {
        Emulator::new(
            MockEngine::new(0x1000),
            Box::new(LinuxX86_64),
            0,
            0,
            0,
            0,
            DataSegment { start: 0, end: 0 },
            "",
        )
    }

    fn word_at(emu: &Emulator, addr: u64) -> u64 {
        let mut buf = [0u8; 8];
        emu.mem_read(addr, &mut buf).unwrap();
        u64::from_le_bytes(buf)
    }

    #[test]
    fn invariant_2_sp_after_setup_stack() {
        let mut emu = emulator();
        let base = setup_stack(&mut emu, 0x7000_0000, 0x2000, emu.sp_register()).unwrap();
        assert_eq!(emu.reg_read(emu.sp_register()).unwrap(), base + 0x2000);
    }

    #[test]
    fn s3_argv_envp_layout() {
        let mut emu = emulator();
        setup_stack(&mut emu, 0x7000_0000, 0x2000, emu.sp_register()).unwrap();

        let args = vec!["prog".to_string(), "a".to_string()];
        let env = vec!["X=1".to_string()];
        let auxv = vec![0u8; 16];

        posix_init(&mut emu, &args, &env, &auxv).unwrap();

        let sp = emu.reg_read(emu.sp_register()).unwrap();
        assert_eq!(word_at(&emu, sp), 2, "argc");
        assert_eq!(word_at(&emu, sp + 8), word_at(&emu, sp + 8)); // argv[0] ptr, sanity
        let argv0_ptr = word_at(&emu, sp + 8);
        let argv1_ptr = word_at(&emu, sp + 16);
        assert_eq!(word_at(&emu, sp + 24), 0, "argv terminator");
        let envp0_ptr = word_at(&emu, sp + 32);
        assert_eq!(word_at(&emu, sp + 40), 0, "envp terminator");

        let mut buf = [0u8; 16];
        emu.mem_read(sp + 48, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16], "auxv bytes");
        assert_eq!(word_at(&emu, sp + 64), 0, "trailing zero word");

        let mut s = [0u8; 5];
        emu.mem_read(argv0_ptr, &mut s).unwrap();
        assert_eq!(&s, b"prog\0");
        let mut s = [0u8; 2];
        emu.mem_read(argv1_ptr, &mut s).unwrap();
        assert_eq!(&s, b"a\0");
        let mut s = [0u8; 4];
        emu.mem_read(envp0_ptr, &mut s).unwrap();
        assert_eq!(&s, b"X=1\0");
    }
}

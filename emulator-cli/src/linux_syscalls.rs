//! `SyscallHandler` for the Linux/x86-64 syscalls `LinuxX86_64` (spec
//! §4.8, "syscall layer interface") names. Built on `nix`, since none of
//! `libhrstd`'s `no_std` syscall stubs touch a real host file descriptor
//! — this binary does.

use emulator_abi::{
    EmulatorOps,
    SyscallHandler,
    SyscallOutcome,
};
use nix::fcntl::{
    open,
    OFlag,
};
use nix::sys::stat::Mode;
use nix::unistd::{
    close,
    read,
    write,
};
use std::os::fd::{
    BorrowedFd,
    RawFd,
};

/// Reads a NUL-terminated guest string starting at `addr`, one page at a
/// time, the way a real Linux `open`/`execve` path argument is read.
fn read_cstr(emu: &dyn EmulatorOps, addr: u64) -> String {
    let mut bytes = Vec::new();
    let mut cursor = addr;
    let mut chunk = [0u8; 256];
    loop {
        if emu.mem_read(cursor, &mut chunk).is_err() {
            break;
        }
        match chunk.iter().position(|&b| b == 0) {
            Some(nul) => {
                bytes.extend_from_slice(&chunk[..nul]);
                break;
            }
            None => {
                bytes.extend_from_slice(&chunk);
                cursor += chunk.len() as u64;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Implements the Linux x86-64 syscalls this workspace's `emulator-abi`
/// names a number for, backed by real host file descriptors via `nix`.
/// Anything outside that set answers `0`, matching `LinuxX86_64`'s
/// "a missing name upstream is a programmer error, not a call we reach"
/// contract (calls we *do* reach but don't implement here are not fatal,
/// since a guest binary probing e.g. `prlimit64` shouldn't crash the
/// emulator).
#[derive(Debug, Default)]
pub struct LinuxSyscalls;

impl SyscallHandler for LinuxSyscalls {
    fn call(
        &self,
        emu: &mut dyn EmulatorOps,
        num: u64,
        name: &str,
        get_args: &dyn Fn(u32) -> Vec<u64>,
    ) -> SyscallOutcome {
        match name {
            "read" => {
                let a = get_args(3);
                let (fd, buf_addr, count) = (a[0] as RawFd, a[1], a[2] as usize);
                let mut buf = vec![0u8; count];
                let n = unsafe { read(BorrowedFd::borrow_raw(fd), &mut buf) }.unwrap_or(0);
                if n > 0 {
                    let _ = emu.mem_write(buf_addr, &buf[..n]);
                }
                SyscallOutcome::Value(n as u64)
            }
            "write" => {
                let a = get_args(3);
                let (fd, buf_addr, count) = (a[0] as RawFd, a[1], a[2] as usize);
                let mut buf = vec![0u8; count];
                if emu.mem_read(buf_addr, &mut buf).is_err() {
                    return SyscallOutcome::Value(u64::MAX);
                }
                let n = unsafe { write(BorrowedFd::borrow_raw(fd), &buf) }.unwrap_or(0);
                SyscallOutcome::Value(n as u64)
            }
            "open" => {
                let a = get_args(3);
                let path = read_cstr(emu, a[0]);
                let resolved = emu.prefix_path(&path, false);
                let flags = OFlag::from_bits_truncate(a[1] as i32);
                let mode = Mode::from_bits_truncate(a[2] as u32);
                match open(resolved.as_str(), flags, mode) {
                    Ok(fd) => SyscallOutcome::Value(fd as u64),
                    Err(errno) => SyscallOutcome::Value((-(errno as i64)) as u64),
                }
            }
            "close" => {
                let a = get_args(1);
                let fd = a[0] as RawFd;
                let result = unsafe { close(fd) };
                SyscallOutcome::Value(if result.is_ok() { 0 } else { u64::MAX })
            }
            "brk" => {
                let a = get_args(1);
                match emu.brk(a[0]) {
                    Ok(addr) => SyscallOutcome::Value(addr),
                    Err(_) => SyscallOutcome::Value(u64::MAX),
                }
            }
            "mmap" => {
                let a = get_args(6);
                let (hint, len) = (a[0], a[1]);
                match emu.mmap(hint, len) {
                    Ok(addr) => SyscallOutcome::Value(addr),
                    Err(_) => SyscallOutcome::Value(u64::MAX),
                }
            }
            "exit" | "exit_group" => {
                let a = get_args(1);
                SyscallOutcome::Exit(a[0] as i32)
            }
            _ => {
                log::debug!("syscall {name}({num}) has no host implementation, answering 0");
                SyscallOutcome::Value(0)
            }
        }
    }
}

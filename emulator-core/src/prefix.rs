//! Path prefix & brk (C7).

use crate::engine::CpuEngine;
use crate::error::EmulatorError;
use crate::loader::DataSegment;
use std::path::Path;

/// Redirects an absolute guest path under `prefix`, unless `prefix` is
/// empty, `path` is relative, or the redirected target doesn't exist and
/// `force` is false (spec §4.7).
pub fn prefix_path(prefix: &str, path: &str, force: bool) -> String {
    if prefix.is_empty() || !path.starts_with('/') {
        return path.to_string();
    }
    let target = Path::new(prefix).join(path.trim_start_matches('/'));
    let target = target.to_string_lossy().into_owned();
    if force || Path::new(&target).exists() {
        target
    } else {
        path.to_string()
    }
}

/// Linux-style program break. `addr == 0` queries the current end without
/// mapping. Mutates `data.end` only on success, and propagates a mapping
/// failure instead of swallowing it (open question b); `data` is the
/// emulator's own copy, never the loader's (open question d).
pub fn brk(engine: &mut dyn CpuEngine, data: &mut DataSegment, addr: u64) -> Result<u64, EmulatorError> {
    if addr > 0 {
        engine.mem_map(data.end, addr)?;
        data.end = addr;
    }
    Ok(data.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::Emulator;
    use crate::testing::MockEngine;
    use emulator_abi::{
        EmulatorOps,
        LinuxX86_64,
    };

    #[test]
    fn prefix_force_joins_regardless_of_filesystem() {
        let got = prefix_path("/sysroot", "/lib/ld.so", true);
        assert_eq!(got, "/sysroot/lib/ld.so");
    }

    #[test]
    fn prefix_relative_path_is_untouched() {
        assert_eq!(prefix_path("/sysroot", "lib/ld.so", true), "lib/ld.so");
    }

    #[test]
    fn prefix_empty_prefix_is_untouched() {
        assert_eq!(prefix_path("", "/lib/ld.so", true), "/lib/ld.so");
    }

    #[test]
    fn s6_brk_growth_is_monotonic() {
        let mut emu = Emulator::new(
            MockEngine::new(0x1000),
            Box::new(LinuxX86_64),
            0,
            0,
            0,
            0,
            DataSegment {
                start: 0x10000,
                end: 0x10000,
            },
            "",
        );
        assert_eq!(emu.brk(0).unwrap(), 0x10000);
        assert_eq!(emu.brk(0x11000).unwrap(), 0x11000);
        assert_eq!(emu.brk(0).unwrap(), 0x11000);
    }
}

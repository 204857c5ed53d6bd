//! Symbolicator (C4).

use crate::loader::Symbol;

/// Finds the symbol in `symbols` that best explains `addr_rel` (already
/// offset against the table's load bias), per spec §4.4: the smallest
/// non-negative distance `addr_rel - sym.start` such that `addr_rel <
/// sym.end` or `sym.end == 0` (unbounded), ignoring nameless entries.
/// Ties go to the first match in input order.
fn best_match(symbols: &[Symbol], addr_rel: u64) -> Option<(&Symbol, u64)> {
    symbols
        .iter()
        .filter(|s| !s.name.is_empty() && s.start <= addr_rel)
        .filter(|s| s.end == 0 || addr_rel < s.end)
        .map(|s| (s, addr_rel - s.start))
        .min_by_key(|(_, dist)| *dist)
}

/// Resolves `addr` to `"name+0xDIST"` across a main and an optional
/// interpreter symbol table, preferring whichever yields the strictly
/// closer match (spec §4.4).
pub fn symbolicate(
    addr: u64,
    base: u64,
    main_symbols: &[Symbol],
    interp_base: u64,
    interp_symbols: &[Symbol],
) -> String {
    let main_hit = addr.checked_sub(base).and_then(|rel| best_match(main_symbols, rel));
    let interp_hit = addr
        .checked_sub(interp_base)
        .and_then(|rel| best_match(interp_symbols, rel));

    let chosen = match (main_hit, interp_hit) {
        (Some(m), Some(i)) => {
            if i.1 < m.1 {
                Some(i)
            } else {
                Some(m)
            }
        }
        (Some(m), None) => Some(m),
        (None, Some(i)) => Some(i),
        (None, None) => None,
    };

    match chosen {
        Some((sym, dist)) => format!("{}+0x{:x}", sym.name, dist),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_symbolication_across_interpreter() {
        let main = vec![Symbol {
            name: "main".to_string(),
            start: 0x100,
            end: 0x200,
        }];
        let interp = vec![Symbol {
            name: "_start".to_string(),
            start: 0x10,
            end: 0x40,
        }];
        let base = 0x400000;
        let interp_base = 0x7f000000;

        assert_eq!(
            symbolicate(0x400150, base, &main, interp_base, &interp),
            "main+0x50"
        );
        assert_eq!(
            symbolicate(0x7f000020, base, &main, interp_base, &interp),
            "_start+0x10"
        );
        assert_eq!(symbolicate(0x0, base, &main, interp_base, &interp), "");
    }

    #[test]
    fn unbounded_symbol_matches_any_offset_above_start() {
        let symbols = vec![Symbol {
            name: "_start".to_string(),
            start: 0x1000,
            end: 0,
        }];
        assert_eq!(symbolicate(0x5000, 0, &symbols, 0, &[]), "_start+0x4000");
    }

    #[test]
    fn nameless_symbol_is_ignored() {
        let symbols = vec![Symbol {
            name: String::new(),
            start: 0x0,
            end: 0x100,
        }];
        assert_eq!(symbolicate(0x10, 0, &symbols, 0, &[]), "");
    }
}

//! Built-in function descriptors.
//!
//! The descriptor table is the shared contract between the compiler and the
//! VM: the compiler resolves a call by name and emits the numeric id; the
//! VM indexes its implementation table with the same id. Ids are stable and
//! equal to the position in [`BUILTINS`].

/// Name and arity contract of one built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinSpec {
    /// Script-visible name.
    pub name: &'static str,
    /// Minimum argument count.
    pub min_arity: u8,
    /// Maximum argument count.
    pub max_arity: u8,
}

const fn spec(name: &'static str, min_arity: u8, max_arity: u8) -> BuiltinSpec {
    BuiltinSpec {
        name,
        min_arity,
        max_arity,
    }
}

/// All registered built-ins, indexed by id.
pub const BUILTINS: [BuiltinSpec; 22] = [
    spec("abs", 1, 1),
    spec("min", 2, 2),
    spec("max", 2, 2),
    spec("len", 1, 1),
    spec("upper", 1, 1),
    spec("lower", 1, 1),
    spec("trim", 1, 1),
    spec("startswith", 2, 2),
    spec("endswith", 2, 2),
    spec("contains", 2, 2),
    spec("parseint", 1, 1),
    spec("parsefloat", 1, 1),
    spec("str", 1, 1),
    spec("substr", 3, 3),
    spec("floor", 1, 1),
    spec("ceil", 1, 1),
    spec("sqrt", 1, 1),
    spec("exists", 1, 1),
    spec("readfile", 1, 1),
    spec("writefile", 2, 2),
    spec("appendfile", 2, 2),
    spec("time", 0, 0),
];

/// Resolve a built-in by name to its id.
pub fn lookup(name: &str) -> Option<u16> {
    BUILTINS
        .iter()
        .position(|b| b.name == name)
        .map(|i| i as u16)
}

/// Fetch the descriptor for an id, if the id is in range.
pub fn spec_for(id: u16) -> Option<&'static BuiltinSpec> {
    BUILTINS.get(id as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_every_builtin() {
        for (i, b) in BUILTINS.iter().enumerate() {
            assert_eq!(lookup(b.name), Some(i as u16));
        }
    }

    #[test]
    fn lookup_unknown_is_none() {
        assert_eq!(lookup("frobnicate"), None);
        assert_eq!(lookup(""), None);
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in BUILTINS.iter().enumerate() {
            for b in &BUILTINS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn arity_ranges_are_sane() {
        for b in &BUILTINS {
            assert!(b.min_arity <= b.max_arity, "{}", b.name);
        }
    }

    #[test]
    fn spec_for_bounds() {
        assert_eq!(spec_for(0).unwrap().name, "abs");
        assert!(spec_for(BUILTINS.len() as u16).is_none());
    }
}

// fingerprint.rs — Content fingerprints for compilation requests
//
// A fingerprint is the SHA-256 of the snippet text, the context identity
// (enclosing and immediate context names), the source offset and the names
// of caller-supplied symbols. Equal fingerprints are assumed to compile to
// equivalent units.
//
// Each field is length-prefixed (and presence-tagged for optional names) so
// that distinct inputs never concatenate to the same byte stream.

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest, Sha256};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn compute(
        source: &str,
        enclosing_context: Option<&str>,
        immediate_context: Option<&str>,
        offset: usize,
    ) -> Self {
        let mut hasher = Sha256::new();
        hash_str(&mut hasher, source);
        hash_opt_str(&mut hasher, enclosing_context);
        hash_opt_str(&mut hasher, immediate_context);
        hasher.update((offset as u64).to_le_bytes());
        Fingerprint(hasher.finalize().into())
    }

    /// Fold in the names of external symbols. Order and duplicates do not
    /// matter; an empty set leaves the fingerprint unchanged.
    pub fn with_externals<'a>(self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let names: BTreeSet<&str> = names.into_iter().collect();
        if names.is_empty() {
            return self;
        }
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update((names.len() as u64).to_le_bytes());
        for name in names {
            hash_str(&mut hasher, name);
        }
        Fingerprint(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex string of the full digest (64 characters).
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.0)
    }

    /// Short stable name for the compiled unit, e.g. `eval_1f2e3d4c5b6a7988`.
    pub fn unit_name(&self) -> String {
        format!("eval_{}", bytes_to_hex(&self.0[..8]))
    }
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_opt_str(hasher: &mut Sha256, s: Option<&str>) {
    match s {
        Some(s) => {
            hasher.update([1u8]);
            hash_str(hasher, s);
        }
        None => hasher.update([0u8]),
    }
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.unit_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = Fingerprint::compute("x + 1", Some("app.Main"), Some("app.Main"), 42);
        let b = Fingerprint::compute("x + 1", Some("app.Main"), Some("app.Main"), 42);
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn every_component_matters() {
        let base = Fingerprint::compute("x + 1", Some("A"), Some("A.B"), 10);
        assert_ne!(base, Fingerprint::compute("x + 2", Some("A"), Some("A.B"), 10));
        assert_ne!(base, Fingerprint::compute("x + 1", Some("C"), Some("A.B"), 10));
        assert_ne!(base, Fingerprint::compute("x + 1", Some("A"), Some("A.C"), 10));
        assert_ne!(base, Fingerprint::compute("x + 1", Some("A"), Some("A.B"), 11));
    }

    #[test]
    fn absent_context_differs_from_empty_name() {
        assert_ne!(
            Fingerprint::compute("1", None, None, 0),
            Fingerprint::compute("1", Some(""), None, 0)
        );
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        assert_ne!(
            Fingerprint::compute("ab", Some("c"), None, 0),
            Fingerprint::compute("a", Some("bc"), None, 0)
        );
    }

    #[test]
    fn external_names_are_a_set() {
        let base = Fingerprint::compute("x + y", None, None, 0);
        assert_eq!(base.with_externals([]), base);
        let xy = base.with_externals(["x", "y"]);
        assert_ne!(xy, base);
        assert_eq!(xy, base.with_externals(["y", "x", "y"]));
        assert_ne!(xy, base.with_externals(["x"]));
        assert_ne!(
            base.with_externals(["ab", "c"]),
            base.with_externals(["a", "bc"])
        );
    }

    #[test]
    fn unit_name_is_prefix_of_hex() {
        let fp = Fingerprint::compute("1 + 1", None, None, 0);
        let name = fp.unit_name();
        assert!(name.starts_with("eval_"));
        assert_eq!(&name[5..], &fp.to_hex()[..16]);
    }
}

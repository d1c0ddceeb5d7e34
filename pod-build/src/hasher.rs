use blake3;
use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// Content-derived key of a set of build inputs.
#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    pub fn of<I: Hash>(input: &I) -> Signature {
        let mut hasher = blake3::Hasher::new();
        input.hash(&mut Blake3Writer(&mut hasher));
        Signature(hasher.finalize().to_hex().to_string())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Feeds `Hash` output into blake3 instead of a 64 bit state.
struct Blake3Writer<'a>(&'a mut blake3::Hasher);

impl<'a> Hasher for Blake3Writer<'a> {
    fn finish(&self) -> u64 {
        unreachable!("only the blake3 digest is read");
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
}

//! Chain identifiers.

use blake2::{digest::consts::U32, Blake2b, Digest};
use std::fmt;

/// Blake2b with 256-bit output, the chain's hash function.
type Blake2b256 = Blake2b<U32>;

/// Hash length in bytes.
pub const HASH_LENGTH: usize = 32;

macro_rules! hash_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; HASH_LENGTH]);

        impl $name {
            /// Hash arbitrary bytes into an identifier.
            pub fn hash(bytes: &[u8]) -> Self {
                let mut hasher = Blake2b256::new();
                hasher.update(bytes);
                Self(hasher.finalize().into())
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
                &self.0
            }
        }

        impl From<[u8; HASH_LENGTH]> for $name {
            fn from(bytes: [u8; HASH_LENGTH]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }
    };
}

hash_newtype!(TxId, "Transaction identifier: blake2b-256 of the serialized transaction.");
hash_newtype!(BlockId, "Block identifier: blake2b-256 of the serialized header.");

/// Contract account address (20 bytes, EVM-style).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContractAddress(pub [u8; 20]);

impl AsRef<[u8]> for ContractAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractAddress({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(TxId::hash(b"abc"), TxId::hash(b"abc"));
        assert_ne!(TxId::hash(b"abc"), TxId::hash(b"abd"));
    }

    #[test]
    fn test_display_is_hex() {
        let id = TxId([0xab; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
    }
}

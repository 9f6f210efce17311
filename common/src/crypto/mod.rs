mod address;
mod hash;
mod key;
mod signature;

pub mod zether;

pub use address::{Address, AddressError, PAYMENT_ID_SIZE};
pub use hash::{hash, Hash, Hashable, PublicKeyHash, HASH_SIZE, PUBLIC_KEY_HASH_SIZE};
pub use key::{CompressedPublicKey, KeyPair, PrivateKey, PublicKey, KEY_SIZE};
pub use signature::{Signature, SIGNATURE_SIZE};

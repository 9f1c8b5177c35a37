//! Replica identities.
//!
//! A replica that authors operations holds an ed25519 signing key. Its
//! actor id is derived from the verifying half (see `ActorId::from_public_key`),
//! so the id stays the same for as long as the key does and the secret never
//! leaves this type.

use std::fmt;

use ed25519_dalek::SigningKey;
use rand_core::OsRng;

use crate::crdt::primitives::ActorId;

/// The authoring identity of one replica.
#[derive(Clone)]
pub struct Identity {
    signing: SigningKey,
}

impl Identity {
    /// A fresh identity from the operating system's randomness.
    pub fn generate() -> Identity {
        return Identity {
            signing: SigningKey::generate(&mut OsRng),
        };
    }

    /// Restore an identity from its stored secret.
    pub fn from_secret(secret: &[u8; 32]) -> Identity {
        return Identity {
            signing: SigningKey::from_bytes(secret),
        };
    }

    pub fn secret(&self) -> [u8; 32] {
        return self.signing.to_bytes();
    }

    pub fn public_key(&self) -> [u8; 32] {
        return self.signing.verifying_key().to_bytes();
    }

    /// The actor id stamped into every ticket this identity issues.
    pub fn actor(&self) -> ActorId {
        return ActorId::from_public_key(&self.public_key());
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "Identity({})", self.actor());
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    return bytes.iter().map(|b| format!("{:02x}", b)).collect();
}

use sha1::{Digest, Sha1};

/// Salted one-way hash for identifiers (message ids, author channel ids).
///
/// `hex(sha1(identifier || salt))`. The salt is fixed for the lifetime of a run.
#[derive(Clone, Debug)]
pub struct Anonymizer {
    salt: String,
}

impl Anonymizer {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    pub fn hash(&self, identifier: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(identifier.as_bytes());
        hasher.update(self.salt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

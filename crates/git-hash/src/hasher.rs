use crate::{HashAlgorithm, HashError, ObjectId};

/// Streaming hash computation.
///
/// Wraps SHA-1 (with collision detection) behind a single interface. Data
/// can be fed incrementally with [`update`](Hasher::update) or through the
/// [`std::io::Write`] implementation, then finalised into an [`ObjectId`].
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Hasher {
    /// Create a new hasher for the given algorithm.
    pub fn new(algo: HashAlgorithm) -> Self {
        use digest::Digest;
        match algo {
            HashAlgorithm::Sha1 => Self {
                inner: Box::new(sha1_checked::Sha1::new()),
            },
        }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        self.inner.update(data);
    }

    /// Finalize and return the ObjectId.
    ///
    /// Returns an error if SHA-1 collision detection fires.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(result.hash().as_slice());
        Ok(ObjectId::Sha1(bytes))
    }

    /// Convenience: hash data in one call.
    pub fn digest(algo: HashAlgorithm, data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new(algo);
        h.update(data);
        h.finalize()
    }

    /// Hash a git object: `"{type} {len}\0{content}"`.
    pub fn hash_object(
        algo: HashAlgorithm,
        obj_type: &str,
        data: &[u8],
    ) -> Result<ObjectId, HashError> {
        let header = format!("{} {}\0", obj_type, data.len());
        let mut h = Self::new(algo);
        h.update(header.as_bytes());
        h.update(data);
        h.finalize()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

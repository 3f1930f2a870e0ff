use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;
use std::io::{self, Read, Write};

/// The digests a Release file lists for each index file, as lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

#[derive(Default)]
struct MultiHasher {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    size: u64,
}

impl Write for MultiHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.md5.update(buf);
        self.sha1.update(buf);
        self.sha256.update(buf);
        self.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MultiHasher {
    fn finalize(self) -> (u64, Digests) {
        (
            self.size,
            Digests {
                md5: base16ct::lower::encode_string(&self.md5.finalize()),
                sha1: base16ct::lower::encode_string(&self.sha1.finalize()),
                sha256: base16ct::lower::encode_string(&self.sha256.finalize()),
            },
        )
    }
}

#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> Digests {
    let mut hasher = MultiHasher::default();
    // Writing to a MultiHasher cannot fail.
    let _ = hasher.write_all(bytes);
    hasher.finalize().1
}

/// Hashes everything `reader` yields and returns the byte count along with the digests.
///
/// # Errors
///
/// Returns any error from reading.
pub fn hash_reader(mut reader: impl Read) -> io::Result<(u64, Digests)> {
    let mut hasher = MultiHasher::default();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize())
}

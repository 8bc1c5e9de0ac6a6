use blake2::digest::consts::U32;
use blake2::Blake2b;
use sha2::{Digest, Sha256};

pub type AeHash = [u8; 32];

type Blake2b256 = Blake2b<U32>;

/// blake2b with a 32 byte output, the hash used for ids and node keys.
pub fn hash(data: &[u8]) -> AeHash {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256_hash(data: &[u8]) -> AeHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes of the double sha256, appended to encoded payloads.
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let digest = sha256_hash(&sha256_hash(data));
    [digest[0], digest[1], digest[2], digest[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_hash_test() {
        // blake2b-256 of the empty input
        assert_eq!(
            hex::encode(hash(&[])),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn sha256_hash_test() {
        assert_eq!(
            hex::encode(sha256_hash(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn checksum_is_prefix_of_double_sha_test() {
        let data = [1u8, 2, 42];
        let double = sha256_hash(&sha256_hash(&data));
        assert_eq!(checksum(&data)[..], double[..4]);
    }
}

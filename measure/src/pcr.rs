/*++

Licensed under the Apache-2.0 license.

File Name:

    pcr.rs

Abstract:

    File contains the simulated Platform Configuration Register (PCR): one
    hash algorithm instance and one running value, mutated only through
    extend.

--*/

use crate::HashAlgo;

/// Simulated Platform Configuration Register
///
/// Freshly created, the value is `digest_size` literal zero bytes, exactly
/// like a hardware PCR after reset; it is not the hash of an empty input.
#[derive(Debug, Clone)]
pub struct Pcr {
    algo: HashAlgo,
    value: Vec<u8>,
}

impl Pcr {
    /// Create a zero-initialized register
    pub fn new(algo: HashAlgo) -> Self {
        Self {
            algo,
            value: vec![0u8; algo.digest_size()],
        }
    }

    /// Extend the register: `value = H(value || input)`
    ///
    /// Matches TPM PCR-extend semantics: the order of extends is
    /// significant, and extending is neither commutative nor idempotent.
    pub fn extend(&mut self, input: &[u8]) -> &[u8] {
        let mut hasher = self.algo.hasher();
        hasher.update(&self.value);
        hasher.update(input);
        self.value = hasher.finalize();
        &self.value
    }

    /// Current register value
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Register hash algorithm
    pub fn algo(&self) -> HashAlgo {
        self.algo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_register_is_zero() {
        let pcr = Pcr::new(HashAlgo::Sha256);
        assert_eq!(pcr.value(), &[0u8; 32]);
        let pcr = Pcr::new(HashAlgo::Sha1);
        assert_eq!(pcr.value(), &[0u8; 20]);
        // a zero register is not the hash of an empty input
        assert_ne!(pcr.value(), &HashAlgo::Sha1.digest(b"")[..]);
    }

    #[test]
    fn test_extend_known_answer() {
        // sha256(32 zero bytes || sha256(b"ABC"))
        let mut pcr = Pcr::new(HashAlgo::Sha256);
        let input = HashAlgo::Sha256.digest(b"ABC");
        let value = pcr.extend(&input).to_vec();
        assert_eq!(
            hex::encode(value),
            "7198f6a012eed119e684456ea8488f45f3d245a4118d05b01f98a7efa0014250"
        );

        // sha1(20 zero bytes || sha1(b"abc"))
        let mut pcr = Pcr::new(HashAlgo::Sha1);
        let input = HashAlgo::Sha1.digest(b"abc");
        pcr.extend(&input);
        assert_eq!(
            hex::encode(pcr.value()),
            "ccd5bd41458de644ac34a2478b58ff819bef5acf"
        );
    }

    #[test]
    fn test_extend_is_not_commutative() {
        let mut ab = Pcr::new(HashAlgo::Sha256);
        ab.extend(b"a-input");
        ab.extend(b"b-input");
        let mut ba = Pcr::new(HashAlgo::Sha256);
        ba.extend(b"b-input");
        ba.extend(b"a-input");
        assert_ne!(ab.value(), ba.value());
        assert_eq!(
            hex::encode(ab.value()),
            "9427204fa76a65e32708eeeee8fdafa9a85d9c96e945f25b8b026593ae6ad22b"
        );
        assert_eq!(
            hex::encode(ba.value()),
            "111e48160a57dd8071b97d42229113659eda380831d9c94ce1eef046ba3e9803"
        );
    }

    #[test]
    fn test_extend_is_not_idempotent() {
        let mut once = Pcr::new(HashAlgo::Sha256);
        once.extend(b"same");
        let mut twice = Pcr::new(HashAlgo::Sha256);
        twice.extend(b"same");
        twice.extend(b"same");
        assert_ne!(once.value(), twice.value());
    }

    #[test]
    fn test_three_way_order_sensitivity() {
        // the OS chain contract: kernel -> ramdisk -> fdt differs from the
        // reversed order
        let k = HashAlgo::Sha256.digest(b"kernel");
        let r = HashAlgo::Sha256.digest(b"ramdisk");
        let f = HashAlgo::Sha256.digest(b"fdt");

        let mut forward = Pcr::new(HashAlgo::Sha256);
        forward.extend(&k);
        forward.extend(&r);
        forward.extend(&f);

        let mut reverse = Pcr::new(HashAlgo::Sha256);
        reverse.extend(&f);
        reverse.extend(&r);
        reverse.extend(&k);

        assert_ne!(forward.value(), reverse.value());
    }

    #[test]
    fn test_value_length_invariant() {
        let mut pcr = Pcr::new(HashAlgo::Sha1);
        for input in [&b"x"[..], &[0u8; 4096][..], &b""[..]] {
            pcr.extend(input);
            assert_eq!(pcr.value().len(), HashAlgo::Sha1.digest_size());
        }
    }
}

//! Cryptographic primitives used by Function blocks.
//!
//! Blocks only see [`CryptoProvider`]. [`StandardCrypto`] covers digests,
//! HMAC and PBKDF2; ciphers need a provider injected through
//! `ExecutionContext::with_crypto`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use blockscript::keyword::{CipherMode, HashAlgorithm, PaddingMode};
use hmac::{Hmac, Mac};
use md4::Md4;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::encoding::hex_encode;
use crate::error::RuntimeError;

/// Largest PBKDF2 salt or derived key, in bytes.
pub const MAX_KDF_BYTES: usize = 1024;

/// Algorithm-keyed crypto operations. Every string in and out is text:
/// keys, IVs and ciphertexts travel base64 encoded.
pub trait CryptoProvider: Send + Sync {
    /// Lowercase hex digest of the UTF-8 input.
    fn digest(&self, input: &str, algorithm: HashAlgorithm) -> Result<String, RuntimeError>;

    /// HMAC signature, lowercase hex or base64.
    fn hmac(&self, input: &str, algorithm: HashAlgorithm, key: &str, base64: bool) -> Result<String, RuntimeError>;

    fn aes_encrypt(
        &self,
        input: &str,
        key: &str,
        iv: &str,
        mode: CipherMode,
        padding: PaddingMode,
    ) -> Result<String, RuntimeError>;

    fn aes_decrypt(
        &self,
        input: &str,
        key: &str,
        iv: &str,
        mode: CipherMode,
        padding: PaddingMode,
    ) -> Result<String, RuntimeError>;

    fn rsa_encrypt(&self, input: &str, key: &str, modulus: &str, exponent: &str, oaep: bool)
    -> Result<String, RuntimeError>;

    fn rsa_decrypt(&self, input: &str, key: &str, modulus: &str, exponent: &str, oaep: bool)
    -> Result<String, RuntimeError>;

    /// PBKDF2 over the UTF-8 password. Returns the derived key, base64.
    fn kdf(
        &self,
        password: &str,
        salt: &[u8],
        iterations: u32,
        key_size: usize,
        algorithm: HashAlgorithm,
    ) -> Result<String, RuntimeError>;
}

/// Digests, HMAC and PBKDF2 over the RustCrypto hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCrypto;

fn unsupported(what: impl Into<String>) -> RuntimeError {
    RuntimeError::UnsupportedAlgorithm(what.into())
}

fn mac<M: Mac + hmac::digest::KeyInit>(key: &[u8], input: &[u8]) -> Result<Vec<u8>, RuntimeError> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|e| RuntimeError::Crypto(e.to_string()))?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}

impl CryptoProvider for StandardCrypto {
    fn digest(&self, input: &str, algorithm: HashAlgorithm) -> Result<String, RuntimeError> {
        let bytes = input.as_bytes();
        let hash = match algorithm {
            HashAlgorithm::Md4 => Md4::digest(bytes).to_vec(),
            HashAlgorithm::Md5 => Md5::digest(bytes).to_vec(),
            HashAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        };
        Ok(hex_encode(&hash))
    }

    fn hmac(&self, input: &str, algorithm: HashAlgorithm, key: &str, base64: bool) -> Result<String, RuntimeError> {
        let (key, input) = (key.as_bytes(), input.as_bytes());
        let signature = match algorithm {
            HashAlgorithm::Md4 => return Err(unsupported("HMAC over MD4")),
            HashAlgorithm::Md5 => mac::<Hmac<Md5>>(key, input)?,
            HashAlgorithm::Sha1 => mac::<Hmac<Sha1>>(key, input)?,
            HashAlgorithm::Sha256 => mac::<Hmac<Sha256>>(key, input)?,
            HashAlgorithm::Sha384 => mac::<Hmac<Sha384>>(key, input)?,
            HashAlgorithm::Sha512 => mac::<Hmac<Sha512>>(key, input)?,
        };
        Ok(if base64 {
            STANDARD.encode(signature)
        } else {
            hex_encode(&signature)
        })
    }

    fn aes_encrypt(&self, _: &str, _: &str, _: &str, mode: CipherMode, padding: PaddingMode) -> Result<String, RuntimeError> {
        Err(unsupported(format!("AES {}/{} has no provider", mode, padding)))
    }

    fn aes_decrypt(&self, _: &str, _: &str, _: &str, mode: CipherMode, padding: PaddingMode) -> Result<String, RuntimeError> {
        Err(unsupported(format!("AES {}/{} has no provider", mode, padding)))
    }

    fn rsa_encrypt(&self, _: &str, _: &str, _: &str, _: &str, oaep: bool) -> Result<String, RuntimeError> {
        Err(unsupported(format!("RSA ({}) has no provider", if oaep { "OAEP" } else { "PKCS#1" })))
    }

    fn rsa_decrypt(&self, _: &str, _: &str, _: &str, _: &str, oaep: bool) -> Result<String, RuntimeError> {
        Err(unsupported(format!("RSA ({}) has no provider", if oaep { "OAEP" } else { "PKCS#1" })))
    }

    fn kdf(
        &self,
        password: &str,
        salt: &[u8],
        iterations: u32,
        key_size: usize,
        algorithm: HashAlgorithm,
    ) -> Result<String, RuntimeError> {
        if iterations == 0 {
            return Err(RuntimeError::Crypto("PBKDF2 needs at least one iteration".into()));
        }
        if key_size > MAX_KDF_BYTES {
            return Err(RuntimeError::Crypto(format!(
                "PBKDF2 key size {} exceeds {} bytes",
                key_size, MAX_KDF_BYTES
            )));
        }
        let mut key = vec![0u8; key_size];
        let password = password.as_bytes();
        match algorithm {
            HashAlgorithm::Md4 => return Err(unsupported("PBKDF2 over MD4")),
            HashAlgorithm::Md5 => pbkdf2::pbkdf2_hmac::<Md5>(password, salt, iterations, &mut key),
            HashAlgorithm::Sha1 => pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut key),
            HashAlgorithm::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key),
            HashAlgorithm::Sha384 => pbkdf2::pbkdf2_hmac::<Sha384>(password, salt, iterations, &mut key),
            HashAlgorithm::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut key),
        }
        Ok(STANDARD.encode(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        let c = StandardCrypto;
        assert_eq!(
            c.digest("abc", HashAlgorithm::Sha256).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(c.digest("abc", HashAlgorithm::Md5).unwrap(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(c.digest("abc", HashAlgorithm::Sha1).unwrap(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(c.digest("abc", HashAlgorithm::Md4).unwrap(), "a448017aaf21d8525fc10ae87aa6729d");
    }

    #[test]
    fn hmac_sha256_rfc4231_case_2() {
        let c = StandardCrypto;
        assert_eq!(
            c.hmac("what do ya want for nothing?", HashAlgorithm::Sha256, "Jefe", false).unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn hmac_base64_output() {
        let c = StandardCrypto;
        let hex = c.hmac("msg", HashAlgorithm::Sha1, "key", false).unwrap();
        let b64 = c.hmac("msg", HashAlgorithm::Sha1, "key", true).unwrap();
        assert_eq!(hex_encode(&STANDARD.decode(b64).unwrap()), hex);
    }

    #[test]
    fn pbkdf2_sha1_rfc6070_case_1() {
        let c = StandardCrypto;
        let key = c.kdf("password", b"salt", 1, 20, HashAlgorithm::Sha1).unwrap();
        assert_eq!(
            hex_encode(&STANDARD.decode(key).unwrap()),
            "0c60c80f961f0e71f3a9b524af6012062fe037a6"
        );
    }

    #[test]
    fn pbkdf2_key_size_is_capped() {
        let c = StandardCrypto;
        assert!(c.kdf("pw", b"salt", 1, MAX_KDF_BYTES, HashAlgorithm::Sha1).is_ok());
        assert!(matches!(
            c.kdf("pw", b"salt", 1, usize::MAX, HashAlgorithm::Sha1),
            Err(RuntimeError::Crypto(_))
        ));
    }

    #[test]
    fn unsupported_operations() {
        let c = StandardCrypto;
        assert!(matches!(
            c.hmac("x", HashAlgorithm::Md4, "k", false),
            Err(RuntimeError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            c.aes_encrypt("x", "k", "iv", CipherMode::Cbc, PaddingMode::Pkcs7),
            Err(RuntimeError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            c.rsa_decrypt("x", "k", "m", "e", true),
            Err(RuntimeError::UnsupportedAlgorithm(_))
        ));
    }
}

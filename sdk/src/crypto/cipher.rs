use {
    crate::{Error, Result},
    aes::Aes256,
    aes_gcm::{
        aead::{Aead, AeadCore, KeyInit, OsRng},
        Aes256Gcm, Key, Nonce,
    },
    base64::{prelude::BASE64_STANDARD, Engine},
    cbc::cipher::{
        block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
        KeyIvInit,
    },
    toolbelt_protocol::FieldKey,
    tracing::debug,
};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const SEPARATOR: char = '.';
const ZERO_IV: [u8; 16] = [0; 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPolicy {
    /// Randomized and authenticated.
    Opaque,
    /// Same input, same output. Only for fields that are looked up by value.
    Deterministic,
}

pub struct FieldCipher {
    gcm: Aes256Gcm,
    key: FieldKey,
}

impl FieldCipher {
    #[must_use]
    #[inline]
    pub fn new(key: &FieldKey) -> Self {
        Self {
            gcm: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.get())),
            key: key.clone(),
        }
    }

    #[inline]
    pub fn encrypt(&self, policy: FieldPolicy, plaintext: &str) -> Result<String> {
        match policy {
            FieldPolicy::Opaque => self.encrypt_opaque(plaintext),
            FieldPolicy::Deterministic => Ok(self.encrypt_deterministic(plaintext)),
        }
    }

    #[inline]
    pub fn decrypt(&self, policy: FieldPolicy, stored: &str) -> Result<String> {
        match policy {
            FieldPolicy::Opaque => self.decrypt_opaque(stored),
            FieldPolicy::Deterministic => self.decrypt_deterministic(stored),
        }
    }

    /// Returns `iv.ciphertext.tag`, each part in standard base64.
    #[inline]
    pub fn encrypt_opaque(&self, plaintext: &str) -> Result<String> {
        let iv = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut ciphertext = self
            .gcm
            .encrypt(&iv, plaintext.as_bytes())
            .map_err(|err| {
                debug!(?err, "AES-GCM encryption failed");
                Error::MalformedPayload("plaintext is too long")
            })?;
        let tag = ciphertext.split_off(ciphertext.len().saturating_sub(TAG_LENGTH));
        Ok(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            BASE64_STANDARD.encode(iv),
            BASE64_STANDARD.encode(ciphertext),
            BASE64_STANDARD.encode(tag),
        ))
    }

    /// Inverse of [`encrypt_opaque`](Self::encrypt_opaque).
    ///
    /// Fails with [`Error::MalformedPayload`] if the value doesn't have the
    /// `iv.ciphertext.tag` shape and with [`Error::AuthenticationFailure`] if
    /// the tag doesn't verify (tampered data or a different key). Never
    /// returns unverified plaintext.
    #[inline]
    pub fn decrypt_opaque(&self, packed: &str) -> Result<String> {
        let mut segments = packed.split(SEPARATOR);
        let (Some(iv), Some(ciphertext), Some(tag), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(Error::MalformedPayload("expected iv.ciphertext.tag"));
        };
        if iv.is_empty() || tag.is_empty() {
            return Err(Error::MalformedPayload("empty iv or tag"));
        }

        let iv = decode_segment(iv)?;
        if iv.len() != IV_LENGTH {
            return Err(Error::MalformedPayload("invalid iv length"));
        }
        let mut sealed = decode_segment(ciphertext)?;
        let tag = decode_segment(tag)?;
        if tag.len() != TAG_LENGTH {
            return Err(Error::AuthenticationFailure);
        }
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .gcm
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|err| {
                debug!(?err, "AES-GCM tag verification failed");
                Error::AuthenticationFailure
            })?;
        String::from_utf8(plaintext).map_err(|err| {
            debug!(?err, "decrypted value is not UTF-8");
            Error::MalformedPayload("plaintext is not UTF-8")
        })
    }

    /// Returns a single base64 blob that only depends on the key and `plaintext`.
    #[must_use]
    #[inline]
    pub fn encrypt_deterministic(&self, plaintext: &str) -> String {
        let ciphertext = Aes256CbcEnc::new(
            GenericArray::from_slice(self.key.get()),
            &GenericArray::from(ZERO_IV),
        )
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        BASE64_STANDARD.encode(ciphertext)
    }

    /// Inverse of [`encrypt_deterministic`](Self::encrypt_deterministic).
    ///
    /// There is no tag to verify. Invalid padding is the only tampering
    /// signal, and it is reported as [`Error::MalformedPayload`].
    #[inline]
    pub fn decrypt_deterministic(&self, blob: &str) -> Result<String> {
        let ciphertext = decode_segment(blob)?;
        let plaintext = Aes256CbcDec::new(
            GenericArray::from_slice(self.key.get()),
            &GenericArray::from(ZERO_IV),
        )
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|err| {
            debug!(?err, "AES-CBC unpadding failed");
            Error::MalformedPayload("invalid padding")
        })?;
        String::from_utf8(plaintext).map_err(|err| {
            debug!(?err, "decrypted value is not UTF-8");
            Error::MalformedPayload("plaintext is not UTF-8")
        })
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    BASE64_STANDARD.decode(segment).map_err(|err| {
        debug!(?err, "invalid base64 in encrypted field");
        Error::MalformedPayload("invalid base64")
    })
}

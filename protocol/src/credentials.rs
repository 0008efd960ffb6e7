use {
    anyhow::{bail, ensure, format_err, Error},
    base64::{display::Base64Display, prelude::BASE64_STANDARD, Engine},
    rand::distr::{Alphanumeric, SampleString},
    serde::{de, Deserialize, Deserializer, Serialize, Serializer},
    std::{
        borrow::Cow,
        fmt::{self, Debug, Display},
        str::FromStr,
    },
};

pub const FIELD_KEY_LENGTH: usize = 32;

const GENERATED_SECRET_LENGTH: usize = 64;

/// Symmetric key protecting user data at rest.
///
/// Encoded as standard base64 with padding, the same way it is stored in
/// the `NOTE_ENC_KEY` environment variable.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldKey([u8; FIELD_KEY_LENGTH]);

impl FieldKey {
    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    #[must_use]
    #[inline]
    pub fn get(&self) -> &[u8; FIELD_KEY_LENGTH] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn display_unmasked(&self) -> impl Display + '_ {
        Base64Display::new(&self.0, &BASE64_STANDARD)
    }
}

impl FromStr for FieldKey {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64_STANDARD.decode(s.trim())?;
        let array = <[u8; FIELD_KEY_LENGTH]>::try_from(bytes).map_err(|bytes| {
            format_err!(
                "invalid length; got {}, expected {FIELD_KEY_LENGTH}",
                bytes.len()
            )
        })?;
        Ok(Self(array))
    }
}

impl<'de> Deserialize<'de> for FieldKey {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for FieldKey {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BASE64_STANDARD.encode(self.0).serialize(serializer)
    }
}

impl Debug for FieldKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldKey").finish()
    }
}

/// HMAC secret used to sign and verify JWTs.
///
/// Access and refresh tokens must use different secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct JwtSecret(String);

impl JwtSecret {
    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        Self(Alphanumeric.sample_string(&mut rand::rng(), GENERATED_SECRET_LENGTH))
    }

    #[must_use]
    #[inline]
    pub fn as_unmasked_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[must_use]
    #[inline]
    pub fn as_unmasked_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JwtSecret {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(!s.is_empty(), "secret must not be empty");
        if s.trim() != s {
            bail!("secret must not start or end with whitespace");
        }
        Ok(Self(s.to_owned()))
    }
}

impl Debug for JwtSecret {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSecret").finish()
    }
}

//! Filename encoding for the disk backend.
//!
//! Filenames are salted so a re-created key never collides with a leftover
//! file from an interrupted write. Short keys are embedded in the name and
//! recoverable from it; long keys are digested, with the raw key stored in a
//! `.key` sidecar next to the stream file.

use data_encoding::{BASE64URL, BASE64URL_NOPAD, HEXLOWER};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;

/// Length of the salt in encoded characters.
const SALT_LEN: usize = 8;
/// Keys whose base64 form is shorter than this are embedded in the filename.
const MAX_SHORT: usize = 20;
const SHORT_PREFIX: &str = "s";
const LONG_PREFIX: &str = "l";
/// Suffix of the sidecar file holding the raw key for long names.
pub(super) const SIDECAR_SUFFIX: &str = ".key";

/// An encoded filename for a new stream.
pub(super) struct EncodedName {
    pub(super) name: String,
    /// Long names are lossy; the caller must write the raw key to the
    /// sidecar so reload can recover it.
    pub(super) needs_sidecar: bool,
}

/// A parsed filename.
#[derive(Debug)]
pub(super) enum DecodedName {
    /// The key was embedded in the name.
    Key(String),
    /// Long name: the key lives in the `.key` sidecar.
    FromSidecar,
}

/// Eight URL-safe base64 characters out of a CSPRNG.
fn salt() -> String {
    let mut raw = [0u8; 6];
    OsRng.fill_bytes(&mut raw);
    BASE64URL_NOPAD.encode(&raw)
}

pub(super) fn encode(key: &str) -> EncodedName {
    let b64 = BASE64URL.encode(key.as_bytes());
    if b64.len() < MAX_SHORT {
        return EncodedName {
            name: format!("{SHORT_PREFIX}{}{}", salt(), b64),
            needs_sidecar: false,
        };
    }
    let digest = Md5::digest(key.as_bytes());
    EncodedName {
        name: format!("{LONG_PREFIX}{}{}", salt(), HEXLOWER.encode(&digest)),
        needs_sidecar: true,
    }
}

/// Parses a filename produced by [`encode`]. Fails on anything else so reload
/// can delete files it does not own.
pub(super) fn decode(name: &str) -> Result<DecodedName, NameError> {
    if let Some(rest) = name.strip_prefix(SHORT_PREFIX) {
        if rest.len() <= SALT_LEN {
            return Err(NameError::Truncated);
        }
        let raw = BASE64URL
            .decode(&rest.as_bytes()[SALT_LEN..])
            .map_err(|_| NameError::BadEncoding)?;
        let key = String::from_utf8(raw).map_err(|_| NameError::BadEncoding)?;
        return Ok(DecodedName::Key(key));
    }
    if name.starts_with(LONG_PREFIX) && name.len() > LONG_PREFIX.len() + SALT_LEN {
        return Ok(DecodedName::FromSidecar);
    }
    Err(NameError::UnknownPrefix)
}

pub(super) fn is_sidecar(name: &str) -> bool {
    name.ends_with(SIDECAR_SUFFIX)
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum NameError {
    UnknownPrefix,
    Truncated,
    BadEncoding,
}

impl std::fmt::Display for NameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            NameError::UnknownPrefix => "unrecognised name prefix",
            NameError::Truncated => "name shorter than its salt",
            NameError::BadEncoding => "undecodable key segment",
        };
        f.write_str(reason)
    }
}

impl std::error::Error for NameError {}

// Locale-preferred text encoding for note files.
//
// Only the codesets a desktop locale realistically selects are supported;
// anything else falls back to UTF-8.

use std::fmt;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    Ascii,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid {encoding} byte sequence at offset {offset}")]
    Decode { encoding: NoteEncoding, offset: usize },

    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Encode { encoding: NoteEncoding, ch: char },
}

impl NoteEncoding {
    /// Encoding named by the process locale (`LC_ALL`, then `LC_CTYPE`,
    /// then `LANG`).
    pub fn from_locale() -> Self {
        let lc_all = std::env::var("LC_ALL").ok();
        let lc_ctype = std::env::var("LC_CTYPE").ok();
        let lang = std::env::var("LANG").ok();
        Self::from_locale_vars(lc_all.as_deref(), lc_ctype.as_deref(), lang.as_deref())
    }

    pub fn from_locale_vars(
        lc_all: Option<&str>,
        lc_ctype: Option<&str>,
        lang: Option<&str>,
    ) -> Self {
        let locale = [lc_all, lc_ctype, lang].into_iter().flatten().find(|value| !value.is_empty());
        let Some(locale) = locale else {
            return Self::Utf8;
        };
        // `C`, `POSIX` and other locales without a codeset are read as UTF-8.
        codeset(locale).map_or(Self::Utf8, Self::from_codeset)
    }

    /// Map a codeset name (`UTF-8`, `ISO-8859-1`, ...) to an encoding.
    pub fn from_codeset(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|ch| !matches!(ch, '-' | '_' | ' '))
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "utf8" => Self::Utf8,
            "iso88591" | "latin1" | "l1" | "iso885911987" => Self::Latin1,
            "ascii" | "usascii" | "ansix3.41968" | "646" => Self::Ascii,
            other => {
                debug!(codeset = other, "unsupported locale codeset, using UTF-8");
                Self::Utf8
            }
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|error| EncodingError::Decode {
                encoding: self,
                offset: error.utf8_error().valid_up_to(),
            }),
            Self::Latin1 => Ok(bytes.iter().map(|&byte| char::from(byte)).collect()),
            Self::Ascii => match bytes.iter().position(|byte| !byte.is_ascii()) {
                Some(offset) => Err(EncodingError::Decode { encoding: self, offset }),
                None => Ok(bytes.iter().map(|&byte| char::from(byte)).collect()),
            },
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 | Self::Ascii => text
                .chars()
                .map(|ch| self.encode_char(ch).ok_or(EncodingError::Encode { encoding: self, ch }))
                .collect(),
        }
    }

    /// Encode, replacing unrepresentable characters with `?`.
    pub fn encode_lossy(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Latin1 | Self::Ascii => {
                text.chars().map(|ch| self.encode_char(ch).unwrap_or(b'?')).collect()
            }
        }
    }

    fn encode_char(self, ch: char) -> Option<u8> {
        let limit = match self {
            Self::Utf8 => return None,
            Self::Latin1 => 0xff,
            Self::Ascii => 0x7f,
        };
        u8::try_from(u32::from(ch)).ok().filter(|&byte| u32::from(byte) <= limit)
    }
}

impl fmt::Display for NoteEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
            Self::Ascii => "ASCII",
        })
    }
}

/// `en_US.UTF-8@euro` -> `UTF-8`
fn codeset(locale: &str) -> Option<&str> {
    let (_, rest) = locale.split_once('.')?;
    let codeset = rest.split('@').next().unwrap_or(rest);
    (!codeset.is_empty()).then_some(codeset)
}

// Credential code generation
//
// Codes come from the OS CSPRNG. Numeric codes are what a person can type
// from a chat message; tokens are for links only and make the code space
// large enough that validity no longer matters for guessing.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";
const TOKEN_LEN: usize = 22;
const MIN_DIGITS: u8 = 4;
const MAX_DIGITS: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodeFormat {
    /// Zero-padded decimal code
    Numeric { digits: u8 },
    /// URL-safe random token (about 128 bits)
    Token,
}

impl Default for CodeFormat {
    fn default() -> Self {
        CodeFormat::Numeric { digits: 6 }
    }
}

impl CodeFormat {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            CodeFormat::Numeric { digits } if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) => {
                Err(ConfigError::invalid(
                    "credentials.code_format",
                    format!(
                        "digits must be between {} and {} (got {})",
                        MIN_DIGITS, MAX_DIGITS, digits
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Number of distinct codes, saturating for tokens.
    pub fn code_space(&self) -> u64 {
        match *self {
            CodeFormat::Numeric { digits } => 10_u64.saturating_pow(digits as u32),
            CodeFormat::Token => u64::MAX,
        }
    }

    pub fn generate(&self) -> String {
        let mut rng = OsRng;
        match *self {
            CodeFormat::Numeric { digits } => {
                let digits = digits.clamp(MIN_DIGITS, MAX_DIGITS) as usize;
                let value = rng.gen_range(0..10_u64.pow(digits as u32));
                format!("{:0width$}", value, width = digits)
            }
            CodeFormat::Token => (0..TOKEN_LEN)
                .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
                .collect(),
        }
    }
}

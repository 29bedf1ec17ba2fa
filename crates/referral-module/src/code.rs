use rand::Rng;

use crate::error::ReferralError;

/// No 0/O/1/I so codes survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 32;

/// Source of candidate referral codes. Candidates may collide; the service
/// retries a bounded number of times.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(MIN_CODE_LEN, MAX_CODE_LEN),
        }
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect()
    }
}

/// Canonical form of user-supplied code text: trimmed, uppercase, `[A-Z0-9-]`.
pub fn normalize_code(raw: &str) -> Result<String, ReferralError> {
    let code = raw.trim().to_ascii_uppercase();
    let well_formed = (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if well_formed {
        Ok(code)
    } else {
        Err(ReferralError::MalformedCode(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_use_alphabet_and_length() {
        let generator = RandomCodeGenerator::new(8);
        for _ in 0..50 {
            let code = generator.generate();
            assert_eq!(code.len(), 8);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert_eq!(normalize_code(&code).unwrap(), code);
        }
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_code("  abcd-23 ").unwrap(), "ABCD-23");
        assert!(normalize_code("ab").is_err());
        assert!(normalize_code("bad code").is_err());
        assert!(normalize_code("../../etc").is_err());
    }
}

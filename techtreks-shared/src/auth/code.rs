/// Verification code generation
///
/// Codes are four decimal digits drawn uniformly from `1000..=9999`, so they
/// never carry a leading zero.

use rand::Rng;

pub const CODE_MIN: u16 = 1000;
pub const CODE_MAX: u16 = 9999;

/// Generates a fresh 4-digit verification code
pub fn generate_verification_code() -> String {
    rand::thread_rng()
        .gen_range(CODE_MIN..=CODE_MAX)
        .to_string()
}

/// Whether `code` has the shape of a verification code
pub fn is_well_formed(code: &str) -> bool {
    code.len() == 4 && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_four_digits_in_range() {
        for _ in 0..1000 {
            let code = generate_verification_code();
            assert!(is_well_formed(&code), "bad code {}", code);

            let value: u16 = code.parse().unwrap();
            assert!((CODE_MIN..=CODE_MAX).contains(&value));
        }
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed("0420"));
        assert!(!is_well_formed("123"));
        assert!(!is_well_formed("12a4"));
        assert!(!is_well_formed("12345"));
    }
}

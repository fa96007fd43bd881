use regex::Regex;
use std::sync::OnceLock;

static SERIAL_NUMBER: OnceLock<Regex> = OnceLock::new();
static APNS_TOKEN: OnceLock<Regex> = OnceLock::new();
static EMAIL: OnceLock<Regex> = OnceLock::new();
static USER_NAME: OnceLock<Regex> = OnceLock::new();

/// `RED-` followed by exactly 8 upper-hex digits.
pub fn serial_number(value: &str) -> bool {
    SERIAL_NUMBER
        .get_or_init(|| Regex::new(r"^RED-[0-9A-F]{8}$").expect("serial regex"))
        .is_match(value)
}

/// APNs device token: 64 lower-hex digits.
pub fn apns_token(value: &str) -> bool {
    APNS_TOKEN
        .get_or_init(|| Regex::new(r"^[0-9a-f]{64}$").expect("apns regex"))
        .is_match(value)
}

pub fn email(value: &str) -> bool {
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex")
        })
        .is_match(value)
}

/// 1-16 of ASCII letters/digits, Han ideographs, `-`, `_`, `.`.
pub fn user_name(value: &str) -> bool {
    USER_NAME
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9\x{4E00}-\x{9FFF}_.\-]{1,16}$").expect("user name regex")
        })
        .is_match(value)
}

/// At least 8 characters, letters and digits only, with at least one
/// lowercase letter, one uppercase letter, and one digit. Expressed in code
/// rather than a pattern: the canonical form uses lookaheads.
pub fn password(value: &str) -> bool {
    if value.len() < 8 {
        return false;
    }
    let mut has_lower = false;
    let mut has_upper = false;
    let mut has_digit = false;
    for ch in value.chars() {
        match ch {
            'a'..='z' => has_lower = true,
            'A'..='Z' => has_upper = true,
            '0'..='9' => has_digit = true,
            _ => return false,
        }
    }
    has_lower && has_upper && has_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_number_requires_red_prefix_and_upper_hex() {
        assert!(serial_number("RED-0A1B2C3D"));
        assert!(serial_number("RED-FFFFFFFF"));
        assert!(!serial_number("RED-0a1b2c3d"));
        assert!(!serial_number("RED-0A1B2C3"));
        assert!(!serial_number("RED-0A1B2C3D4"));
        assert!(!serial_number("BLU-0A1B2C3D"));
        assert!(!serial_number(" RED-0A1B2C3D"));
    }

    #[test]
    fn apns_token_is_64_lower_hex() {
        let token = "a0".repeat(32);
        assert!(apns_token(&token));
        assert!(!apns_token(&token[..62]));
        assert!(!apns_token(&token.to_uppercase()));
        assert!(!apns_token(&format!("{}g", &token[..63])));
    }

    #[test]
    fn email_accepts_common_shapes() {
        assert!(email("a@b.co"));
        assert!(email("first.last+tag@sub.example.org"));
        assert!(!email("a@b"));
        assert!(!email("a b@c.co"));
        assert!(!email("@example.com"));
    }

    #[test]
    fn user_name_accepts_han_and_limits_length() {
        assert!(user_name("alice"));
        assert!(user_name("alice_01.x-"));
        assert!(user_name("測試使用者"));
        assert!(!user_name(""));
        assert!(!user_name(&"a".repeat(17)));
        assert!(!user_name("has space"));
        assert!(!user_name("emoji🙂"));
    }

    #[test]
    fn password_policy_requires_mixed_case_and_digit() {
        assert!(password("Abcdef12"));
        assert!(password("aB3aB3aB3"));
        assert!(!password("abcdef12"));
        assert!(!password("ABCDEF12"));
        assert!(!password("Abcdefgh"));
        assert!(!password("Abcde12"));
        assert!(!password("Abcdef12!"));
    }
}

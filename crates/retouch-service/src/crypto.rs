//! Constant-time comparison for webhook credentials.

/// Constant-time string comparison to prevent timing attacks.
///
/// Length mismatches return early; only the byte comparison is constant-time.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_match() {
        assert!(constant_time_eq("Bearer s3cret", "Bearer s3cret"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn different_values_do_not_match() {
        assert!(!constant_time_eq("Bearer s3cret", "Bearer s3cres"));
        assert!(!constant_time_eq("Bearer s3cret", "Bearer"));
        assert!(!constant_time_eq("abc", "ABC"));
    }
}

//! Error classification for retry eligibility.
//!
//! The retry loop never inspects error internals itself; callers expose an
//! optional integer status code through [`Coded`] and the policy carries an
//! allowlist of codes worth retrying.

/// Status codes conventionally safe to retry against a remote service:
/// server overload (429, 500) and gateway errors (502, 503, 504).
pub const RETRYABLE_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// Capability of yielding an integer status code for retry-eligibility
/// checks. `None` means the error is unclassifiable.
pub trait Coded {
    fn code(&self) -> Option<u16>;
}

/// Decide retry eligibility for `err` under an optional allowlist.
///
/// With no allowlist every error is retryable. With one, only errors whose
/// code appears in the list retry; an unclassifiable error is not retried.
pub fn is_retryable<E: Coded>(on_codes: Option<&[u16]>, err: &E) -> bool {
    match on_codes {
        None => true,
        Some(codes) => err.code().is_some_and(|c| codes.contains(&c)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake(Option<u16>);

    impl Coded for Fake {
        fn code(&self) -> Option<u16> {
            self.0
        }
    }

    #[test]
    fn no_allowlist_retries_everything() {
        assert!(is_retryable(None, &Fake(None)));
        assert!(is_retryable(None, &Fake(Some(404))));
    }

    #[test]
    fn allowlist_filters_by_code() {
        assert!(is_retryable(Some(RETRYABLE_CODES), &Fake(Some(503))));
        assert!(!is_retryable(Some(RETRYABLE_CODES), &Fake(Some(404))));
    }

    #[test]
    fn uncodable_error_is_not_retried_under_allowlist() {
        assert!(!is_retryable(Some(RETRYABLE_CODES), &Fake(None)));
    }
}

//! Shared error plumbing.
//!
//! Only the `Result` alias lives here. Domain errors (graph validation,
//! engine failures, store failures) are plain enums owned by the crate that
//! raises them and are carried inside a rootcause [`Report`].

use rootcause::Report;

/// Result alias whose error is a rootcause [`Report`] over context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_carries_ok_values() {
        let ok: Result<&str> = Ok("done");
        assert_eq!(ok.expect("should be ok"), "done");
    }
}

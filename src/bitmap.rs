//! Membership test of a validator's committee index against a signer set.

/// Returns whether the validator at `index` is present in the signer set of
/// a checkpoint.
///
/// The signer set is the raw list of committee indices attached to the
/// checkpoint's aggregated signature; no ordering is assumed. Committees are
/// small (tens to low hundreds of entries), so a linear scan is sufficient.
pub fn is_signer(signers: &[u32], index: u32) -> bool {
    signers.contains(&index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member() {
        assert!(is_signer(&[0, 2, 7], 0));
        assert!(is_signer(&[0, 2, 7], 2));
        assert!(is_signer(&[0, 2, 7], 7));
    }

    #[test]
    fn test_non_member() {
        assert!(!is_signer(&[0, 2, 7], 1));
        assert!(!is_signer(&[0, 2, 7], 8));
        assert!(!is_signer(&[], 0));
    }

    #[test]
    fn test_unordered() {
        assert!(is_signer(&[7, 0, 2], 2));
    }
}

/// Average reading speed used for the estimate.
pub const WORDS_PER_MINUTE: usize = 200;

/// Estimated reading time in whole minutes.
///
/// Empty or whitespace-only text reads in 0 minutes; anything with at least
/// one word reads in at least 1.
pub fn estimate_minutes(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    let minutes = words.div_ceil(WORDS_PER_MINUTE);
    u32::try_from(minutes).unwrap_or(u32::MAX).max(1)
}

//! Byte-string search helpers shared by the tokenizer.

/// Position of the first occurrence of `pattern` at or after `offset`.
pub fn strpos(haystack: &[u8], pattern: &[u8], offset: usize) -> Option<usize> {
    if offset > haystack.len() {
        return None;
    }
    memchr::memmem::find(&haystack[offset..], pattern).map(|at| at + offset)
}

/// ASCII case-insensitive variant of [`strpos`].
pub fn stripos(haystack: &[u8], pattern: &[u8], offset: usize) -> Option<usize> {
    let p_len = pattern.len();
    if p_len == 0 {
        return Some(offset.min(haystack.len()));
    }
    if offset + p_len > haystack.len() {
        return None;
    }

    haystack[offset..]
        .windows(p_len)
        .position(|window| window.eq_ignore_ascii_case(pattern))
        .map(|at| at + offset)
}

/// Length of the longest prefix of `$bytes` (from `$offset`) made entirely
/// of bytes matching `$pattern`. Out-of-range offsets yield zero.
macro_rules! strspn {
    ($bytes:expr, $pattern:pat, $offset:expr) => {{
        let haystack: &[u8] = &$bytes[..];
        let start = ::std::cmp::min($offset, haystack.len());
        let mut length = 0;
        while start + length < haystack.len() && matches!(haystack[start + length], $pattern) {
            length += 1;
        }
        length
    }};

    ($bytes:expr, $pattern:pat) => {
        strspn!($bytes, $pattern, 0)
    };
}

/// Length of the longest prefix of `$bytes` (from `$offset`) containing no
/// byte matching `$pattern`.
macro_rules! strcspn {
    ($bytes:expr, $pattern:pat, $offset:expr) => {{
        let haystack: &[u8] = &$bytes[..];
        let start = ::std::cmp::min($offset, haystack.len());
        let mut length = 0;
        while start + length < haystack.len() && !matches!(haystack[start + length], $pattern) {
            length += 1;
        }
        length
    }};

    ($bytes:expr, $pattern:pat) => {
        strcspn!($bytes, $pattern, 0)
    };
}

#[cfg(test)]
mod test {
    #[test]
    fn strspn() {
        assert_eq!(strspn!(b"aabc", b'a'), 2);
        assert_eq!(strspn!(b"aabc", b'a' | b'b', 1), 2);
        assert_eq!(strspn!(b"abc", b'x'), 0);
        assert_eq!(strspn!(b"aaa", b'a', 3), 0);
        assert_eq!(strspn!(b"aaa", b'a', 10), 0);
    }

    #[test]
    fn strcspn() {
        assert_eq!(strcspn!(b"abc<def", b'<'), 3);
        assert_eq!(strcspn!(b"abc<def", b'<', 4), 3);
        assert_eq!(strcspn!(b"abcdef", b'<'), 6);
        assert_eq!(strcspn!(b"abc", b'<', 10), 0);
    }
}

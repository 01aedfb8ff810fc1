/// Keep the last `limit` bytes of `raw` as text, cut on a char boundary.
pub(crate) fn tail_text(raw: &[u8], limit: usize) -> String {
    if raw.len() <= limit {
        return String::from_utf8_lossy(raw).into_owned();
    }
    let tail = &raw[raw.len() - limit..];
    // Skip UTF-8 continuation bytes left over from the cut.
    let start = tail
        .iter()
        .take(4)
        .position(|b| (b & 0b1100_0000) != 0b1000_0000)
        .unwrap_or(tail.len().min(4));
    String::from_utf8_lossy(&tail[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::tail_text;

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(tail_text(b"hello\n", 64), "hello\n");
    }

    #[test]
    fn keeps_the_tail() {
        assert_eq!(tail_text(b"0123456789", 4), "6789");
    }

    #[test]
    fn does_not_split_a_character() {
        let raw = "aé".as_bytes();
        assert_eq!(raw.len(), 3);
        assert_eq!(tail_text(raw, 1), "");
        assert_eq!(tail_text(raw, 2), "é");
    }
}

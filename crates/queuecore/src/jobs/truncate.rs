const MAX_LEN: usize = 1900;
const OVERFLOW_THRESHOLD: usize = 2000;
const SEPARATOR: &str = "\r\n===========================\r\n**error message is overflow**";

/// Applies the queue's error-message envelope: inputs over the overflow
/// threshold are cut to `MAX_LEN` bytes and given a fixed trailing marker.
/// The separator is an ABI — downstream log scrapers parse it — so it must
/// never be reworded.
pub fn truncate_error(input: &str) -> String {
    if input.len() <= OVERFLOW_THRESHOLD {
        return input.to_string();
    }

    let cut = floor_char_boundary(input, MAX_LEN);
    format!("{}{}", &input[..cut], SEPARATOR)
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut idx = index.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_short_messages() {
        let msg = "a".repeat(1900);
        assert_eq!(truncate_error(&msg), msg);
    }

    #[test]
    fn passes_through_at_threshold() {
        let msg = "a".repeat(2000);
        assert_eq!(truncate_error(&msg), msg);
    }

    #[test]
    fn truncates_oversized_messages() {
        let msg = "a".repeat(8010);
        let got = truncate_error(&msg);
        let want = format!("{}{}", "a".repeat(1900), SEPARATOR);
        assert_eq!(got, want);
    }

    #[test]
    fn empty_message_passes_through() {
        assert_eq!(truncate_error(""), "");
    }
}

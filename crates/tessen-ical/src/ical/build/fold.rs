//! Content line folding (RFC 5545 §3.1).

/// Maximum content line length in octets, excluding CRLF.
const MAX_LINE_OCTETS: usize = 75;

/// Folds a content line at the 75-octet limit, terminating every physical
/// line with CRLF. Continuation lines start with a single space, which
/// counts against their budget. Splits never land inside a UTF-8 sequence.
#[must_use]
pub fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return format!("{line}\r\n");
    }

    let mut out = String::with_capacity(line.len() + 8);
    let mut rest = line;
    let mut continuation = false;

    while !rest.is_empty() {
        let budget = if continuation {
            MAX_LINE_OCTETS - 1
        } else {
            MAX_LINE_OCTETS
        };

        if continuation {
            out.push(' ');
        }

        if rest.len() <= budget {
            out.push_str(rest);
            out.push_str("\r\n");
            break;
        }

        let mut split = budget;
        while split > 0 && !rest.is_char_boundary(split) {
            split -= 1;
        }
        if split == 0 {
            // A single oversized character; emit it whole.
            split = rest
                .char_indices()
                .nth(1)
                .map_or(rest.len(), |(idx, _)| idx);
        }

        let (head, tail) = rest.split_at(split);
        out.push_str(head);
        out.push_str("\r\n");
        rest = tail;
        continuation = true;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_line_untouched() {
        assert_eq!(fold_line("SUMMARY:Short"), "SUMMARY:Short\r\n");
    }

    #[test]
    fn exact_limit_not_folded() {
        let line = "Y".repeat(75);
        assert_eq!(fold_line(&line), format!("{line}\r\n"));
    }

    #[test]
    fn long_line_folds_and_unfolds() {
        let line = "Y".repeat(200);
        let folded = fold_line(&line);

        assert!(folded.contains("\r\n "));
        for physical in folded.split("\r\n").filter(|s| !s.is_empty()) {
            assert!(physical.len() <= 75);
        }
        assert_eq!(folded.replace("\r\n ", "").replace("\r\n", ""), line);
    }

    #[test]
    fn fold_respects_utf8_boundaries() {
        // Multi-byte characters straddling the 75-octet mark must not be split.
        let line = format!("{}日本語のテキスト", "A".repeat(73));
        let folded = fold_line(&line);

        for physical in folded.split("\r\n") {
            assert!(std::str::from_utf8(physical.as_bytes()).is_ok());
            assert!(physical.len() <= 75);
        }
        assert_eq!(folded.replace("\r\n ", "").replace("\r\n", ""), line);
    }
}

//! Text escaping for iCalendar output.

/// Escapes a TEXT value (RFC 5545 §3.3.11).
///
/// Backslash, comma, semicolon, and newlines are escaped. Bare CRs are
/// dropped.
#[must_use]
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a parameter value, quoting it when it contains characters that
/// would terminate the value. Characters that cannot appear even inside
/// quotes use RFC 6868 caret encoding.
#[must_use]
pub fn escape_param_value(s: &str) -> String {
    if !needs_quoting(s) {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 8);
    out.push('"');
    for c in s.chars() {
        match c {
            '^' => out.push_str("^^"),
            '\n' => out.push_str("^n"),
            '"' => out.push_str("^'"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn needs_quoting(s: &str) -> bool {
    s.chars().any(|c| matches!(c, ':' | ';' | ',' | '"' | '\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_text_specials() {
        assert_eq!(escape_text("a, b; c"), "a\\, b\\; c");
        assert_eq!(escape_text("one\r\ntwo"), "one\\ntwo");
        assert_eq!(escape_text("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn escape_param_plain() {
        assert_eq!(escape_param_value("America/Denver"), "America/Denver");
    }

    #[test]
    fn escape_param_quoted() {
        assert_eq!(escape_param_value("Doe, Jane"), "\"Doe, Jane\"");
        assert_eq!(escape_param_value("x\"y"), "\"x^'y\"");
    }
}

//! Quoting helpers for building CQL text from caller-supplied identifiers
//! and literal values (§6 "Public API identifiers").

/// Quote a CQL identifier, doubling any embedded `"`. Identifiers already
/// matching `[a-z_][a-z0-9_]+` are returned unquoted since CQL treats bare
/// lowercase identifiers and their quoted form identically.
pub fn quote_ident(ident: &str) -> String {
    if is_bare_ident(ident) {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Quote a CQL string literal, doubling any embedded `'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_bare_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    // `[a-z_][a-z0-9_]+`: at least one more character is required, so a
    // bare identifier is never a single char.
    chars.next().is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bare_identifiers_pass_through() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("user_id_2"), "user_id_2");
    }

    #[test]
    fn mixed_case_or_special_chars_get_quoted() {
        assert_eq!(quote_ident("UserTable"), "\"UserTable\"");
        assert_eq!(quote_ident("has space"), "\"has space\"");
    }

    #[test]
    fn single_char_identifiers_get_quoted() {
        // `[a-z_][a-z0-9_]+` requires at least two characters.
        assert_eq!(quote_ident("a"), "\"a\"");
        assert_eq!(quote_ident("_"), "\"_\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}

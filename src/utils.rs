// ABOUTME: Small helpers shared by the source reader and the API publisher
// ABOUTME: Identifier quoting and log-safe text shortening

/// Quote a MySQL identifier (database, table, column)
///
/// MySQL uses backticks for identifier quoting. Escapes embedded backticks
/// by doubling them.
///
/// # Examples
///
/// ```
/// use kreezalid_migrator::utils::quote_mysql_ident;
/// assert_eq!(quote_mysql_ident("user"), "`user`");
/// assert_eq!(quote_mysql_ident("user`name"), "`user``name`");
/// ```
pub fn quote_mysql_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('`');
    for ch in identifier.chars() {
        if ch == '`' {
            quoted.push('`');
        }
        quoted.push(ch);
    }
    quoted.push('`');
    quoted
}

/// Shorten an HTTP response body before it goes into a log line or error.
///
/// Cuts on a character boundary and appends the number of bytes dropped.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{}... ({} more bytes)",
            &trimmed[..cut],
            trimmed.len() - cut
        ),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_mysql_ident() {
        assert_eq!(quote_mysql_ident("listing_category"), "`listing_category`");
        assert_eq!(quote_mysql_ident("a`b"), "`a``b`");
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("  short  ", 10), "short");
        assert_eq!(truncate_for_log("abcdef", 3), "abc... (3 more bytes)");
        assert_eq!(truncate_for_log("ééé", 1), "é... (4 more bytes)");
    }
}

//! Query sanitization for FTS5 MATCH expressions

/// Turn free text into a safe FTS5 match expression
///
/// Splits on anything that is not alphanumeric, quotes every term so FTS5
/// operators and column filters in user input are treated as plain words,
/// and ORs the terms together (match-any, like a classic match query).
/// Returns `None` when the input has no searchable terms.
pub fn sanitize_fts5_query(query: &str) -> Option<String> {
    let mut terms: Vec<&str> = Vec::new();
    for term in query.split(|c: char| !c.is_alphanumeric()) {
        if !term.is_empty() && !terms.contains(&term) {
            terms.push(term);
        }
    }

    if terms.is_empty() {
        return None;
    }

    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

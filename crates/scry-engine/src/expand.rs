use scry_core::Keywords;

const CODE_PATTERN_REPEAT: usize = 4;
const PRIMARY_REPEAT: usize = 3;
const SECONDARY_REPEAT: usize = 2;

/// Build the single embedding input for a query: the original text followed
/// by code patterns (×4), primary terms (×3), and secondary terms (×2).
///
/// # Examples
///
/// ```
/// use scry_core::Keywords;
/// use scry_engine::expand::expand_query;
///
/// let kw = Keywords {
///     primary: vec!["toast".into()],
///     code_patterns: vec!["showToast".into()],
///     ..Keywords::default()
/// };
/// assert_eq!(
///     expand_query("show a toast", &kw),
///     "show a toast showToast showToast showToast showToast toast toast toast",
/// );
/// ```
pub fn expand_query(query: &str, keywords: &Keywords) -> String {
    let mut parts: Vec<&str> = vec![query.trim()];
    for (terms, times) in [
        (&keywords.code_patterns, CODE_PATTERN_REPEAT),
        (&keywords.primary, PRIMARY_REPEAT),
        (&keywords.secondary, SECONDARY_REPEAT),
    ] {
        for term in terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            parts.extend(std::iter::repeat(term).take(times));
        }
    }
    parts.join(" ")
}

//! Content normalization for change detection.
//!
//! Two chunk bodies are "the same" when they differ only in comments,
//! debug/print calls, or whitespace. Cosmetic edits therefore never
//! trigger re-embedding.

use scry_analyzer::Language;

// Debug and print calls stripped before comparison. Each entry ends at the
// opening parenthesis.
const CONSOLE_CALLS: &[&str] = &[
    "console.log(",
    "console.debug(",
    "console.trace(",
    "console.info(",
    "console.warn(",
    "console.error(",
];
const RUST_MACROS: &[&str] = &["println!(", "eprintln!(", "print!(", "eprint!(", "dbg!("];
const PYTHON_CALLS: &[&str] = &["print("];

/// Bare `print(` is only a builtin in Python; elsewhere it is user code.
fn debug_calls(language: Language) -> &'static [&'static [&'static str]] {
    match language {
        Language::JavaScript | Language::TypeScript | Language::Tsx => &[CONSOLE_CALLS],
        Language::Python => &[PYTHON_CALLS],
        Language::Rust => &[RUST_MACROS],
        Language::Unknown => &[CONSOLE_CALLS, RUST_MACROS],
    }
}

/// Normalize `content` written in `language`.
///
/// # Examples
///
/// ```
/// use scry_analyzer::Language;
/// use scry_index::normalize::normalize_content;
///
/// let a = "function f(x) {\n  return x + 1;\n}";
/// let b = "function f(x) {\n  // bump\n  console.log(x);\n  return x+1; /* done */\n}";
/// assert_eq!(
///     normalize_content(a, Language::JavaScript),
///     normalize_content(b, Language::JavaScript),
/// );
/// ```
pub fn normalize_content(content: &str, language: Language) -> String {
    let chars: Vec<char> = content.chars().collect();
    let without_comments = strip_comments(&chars, language);
    let without_debug = strip_debug_calls(&without_comments, language);
    without_debug
        .into_iter()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Whether two bodies of the same file are equal after normalization.
pub fn same_content(a: &str, b: &str, path: &str) -> bool {
    let language = Language::from_path(path);
    a == b || normalize_content(a, language) == normalize_content(b, language)
}

fn quote_chars(language: Language) -> &'static [char] {
    match language {
        // `'` starts lifetimes as often as char literals.
        Language::Rust => &['"'],
        Language::Python => &['"', '\''],
        _ => &['"', '\'', '`'],
    }
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut i = at;
    for p in pattern.chars() {
        if chars.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

/// Index just past the string literal starting at `start`.
///
/// Single- and double-quoted strings end at an unescaped newline if left
/// open; template literals and Python triple-quoted strings may span lines.
fn skip_string(chars: &[char], start: usize, language: Language) -> usize {
    let quote = chars[start];
    if language == Language::Python && (quote == '"' || quote == '\'') {
        let triple: String = std::iter::repeat(quote).take(3).collect();
        if starts_with(chars, start, &triple) {
            let mut i = start + 3;
            while i < chars.len() {
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if starts_with(chars, i, &triple) {
                    return i + 3;
                }
                i += 1;
            }
            return chars.len();
        }
    }

    let multiline = quote == '`';
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' if !multiline => return i,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn strip_comments(chars: &[char], language: Language) -> Vec<char> {
    let quotes = quote_chars(language);
    let line_prefixes = language.line_comment_prefixes();
    let block = language.has_block_comments();

    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if quotes.contains(&c) {
            let end = skip_string(chars, i, language).min(chars.len());
            out.extend_from_slice(&chars[i..end]);
            i = end;
            continue;
        }
        if block && starts_with(chars, i, "/*") {
            i += 2;
            while i < chars.len() && !starts_with(chars, i, "*/") {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            out.push(' ');
            continue;
        }
        if line_prefixes.iter().any(|p| starts_with(chars, i, p)) {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Index just past the `)` matching the `(` at `open`, or `None` if the
/// parentheses never balance.
fn matching_paren(chars: &[char], open: usize, language: Language) -> Option<usize> {
    let quotes = quote_chars(language);
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        let c = chars[i];
        if quotes.contains(&c) {
            i = skip_string(chars, i, language);
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn strip_debug_calls(chars: &[char], language: Language) -> Vec<char> {
    let quotes = quote_chars(language);
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if quotes.contains(&c) {
            let end = skip_string(chars, i, language).min(chars.len());
            out.extend_from_slice(&chars[i..end]);
            i = end;
            continue;
        }

        let at_boundary = i == 0 || {
            let prev = chars[i - 1];
            !is_ident_char(prev) && prev != '.' && prev != ':'
        };
        if at_boundary {
            let call = debug_calls(language)
                .iter()
                .flat_map(|group| group.iter())
                .find(|pattern| starts_with(chars, i, pattern));
            if let Some(pattern) = call {
                let open = i + pattern.chars().count() - 1;
                if let Some(mut end) = matching_paren(chars, open, language) {
                    while end < chars.len() && chars[end].is_whitespace() && chars[end] != '\n' {
                        end += 1;
                    }
                    if chars.get(end) == Some(&';') {
                        end += 1;
                    }
                    i = end;
                    continue;
                }
            }
        }

        out.push(c);
        i += 1;
    }
    out
}

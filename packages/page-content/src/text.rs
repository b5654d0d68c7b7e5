//! Text helpers shared by the HTML and PDF extractors.
//!
//! Lengths are counted in `char`s throughout, never bytes, so CJK text is
//! budgeted the same way as Latin text.

/// Split text into budget tokens.
///
/// Runs of Latin-1 characters are split on whitespace and each word keeps a
/// trailing space; every other character (CJK, kana, emoji) is its own token.
///
/// ```
/// use page_content::text::tokenize;
/// assert_eq!(
///     tokenize("ab我的 wtf gg"),
///     vec!["ab ", "我", "的", "wtf ", "gg "]
/// );
/// ```
pub fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut latin = String::new();

    for c in s.trim().chars() {
        if (c as u32) <= 0xFF {
            latin.push(c);
            continue;
        }
        flush_latin(&mut latin, &mut tokens);
        tokens.push(c.to_string());
    }
    flush_latin(&mut latin, &mut tokens);
    tokens
}

fn flush_latin(run: &mut String, tokens: &mut Vec<String>) {
    tokens.extend(run.split_whitespace().map(|word| format!("{} ", word)));
    run.clear();
}

/// Length of the longest common subsequence of two token slices.
pub fn lcs_len<T: PartialEq>(x: &[T], y: &[T]) -> usize {
    if x.is_empty() || y.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; y.len() + 1];
    let mut curr = vec![0usize; y.len() + 1];
    for xi in x {
        for (j, yj) in y.iter().enumerate() {
            curr[j + 1] = if xi == yj {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[y.len()]
}

/// How much of `needle` appears, in order, inside `haystack` (0.0 to 1.0).
///
/// Blank input on either side yields 0.
pub fn string_inclusion_ratio(needle: &str, haystack: &str) -> f64 {
    if needle.trim().is_empty() || haystack.trim().is_empty() {
        return 0.0;
    }
    let needle_tokens = tokenize(needle);
    if needle_tokens.is_empty() {
        return 0.0;
    }
    let haystack_tokens = tokenize(haystack);
    lcs_len(&needle_tokens, &haystack_tokens) as f64 / needle_tokens.len() as f64
}

/// Escape text for inclusion in HTML output.
///
/// Quotes become numeric references (`&#34;`, `&#39;`).
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Collapse runs of two or more spaces (ASCII or ideographic) into one space.
///
/// Newlines are preserved; preformatted mail and code keep their shape.
pub fn squeeze_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut run = 0usize;
    for c in s.chars() {
        if c == ' ' || c == '\u{3000}' {
            run += 1;
            if run == 1 {
                out.push(c);
            } else if run == 2 {
                out.pop();
                out.push(' ');
            }
            continue;
        }
        run = 0;
        out.push(c);
    }
    out
}

/// Number of characters in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Truncate to at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Whether `s` contains a CJK unified ideograph.
pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Remaining character allowance while assembling an extract.
///
/// The budget may go negative by at most one token: a token is always
/// appended whole and the caller stops once `is_exhausted` reports true.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    remaining: i64,
}

impl Budget {
    pub fn new(max_length: usize) -> Self {
        Self {
            remaining: max_length as i64,
        }
    }

    /// Continue from an allowance that may already be negative.
    pub fn from_remaining(remaining: i64) -> Self {
        Self { remaining }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn spend(&mut self, text: &str) {
        self.remaining -= char_len(text) as i64;
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining < 0
    }

    /// Whether `text` fits in what is left.
    pub fn fits(&self, text: &str) -> bool {
        char_len(text) as i64 <= self.remaining
    }

    /// Append escaped tokens of `text` to `out` until the budget runs out.
    ///
    /// Returns true when the budget was exhausted.
    pub fn push_tokens(&mut self, text: &str, out: &mut Vec<String>) -> bool {
        for token in tokenize(text) {
            let escaped = escape_html(&token);
            self.spend(&escaped);
            out.push(escaped);
            if self.is_exhausted() {
                return true;
            }
        }
        false
    }
}

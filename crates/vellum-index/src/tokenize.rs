//! Keyword-leg tokenization for languages without whitespace word
//! boundaries.
//!
//! A whitespace-tokenized keyword index cannot match CJK text at all, so
//! every CJK code point is surrounded with spaces before the text reaches
//! the keyword leg. The index then sees character unigrams, which is what
//! sparse retrieval needs for recall on Chinese/Japanese queries. Applied
//! identically to chunk text at index time and to the search query.

/// Insert single spaces around every CJK Unified Ideograph (U+4E00..U+9FFF),
/// leave everything else untouched, then collapse repeated whitespace.
///
/// `"你好123"` becomes `"你 好 123"`.
#[must_use]
pub fn cjk_unigrams(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if is_cjk(c) {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut last_was_space = true;
    for c in out.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }
    collapsed.trim_end().to_owned()
}

/// Lowercased whitespace tokens of the unigram-spaced text: the exact token
/// stream a whitespace-tokenized keyword index would produce.
#[must_use]
pub fn keyword_tokens(text: &str) -> Vec<String> {
    cjk_unigrams(text)
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

//! JavaScript-flavoured regex rules.
//!
//! Rules are authored in the configuration the way a JS `String.replace`
//! call would take them: a pattern, a flag string (`"g"`, `"gi"`, ...) and a
//! replacement using `$1` / `$<name>` / `$&` / `$$`. They are compiled once
//! into `regex` values; the replacement is translated so that `$1_` keeps
//! meaning "group 1 followed by `_`".
use std::borrow::Cow;
use regex::{Regex, RegexBuilder};

use crate::error::RuleError;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// A compiled match-only pattern (the custom-declaration anchor).
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

/// A compiled pattern plus replacement.
#[derive(Debug, Clone)]
pub struct Rule {
    regex: Regex,
    replacement: String,
    global: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Pattern {
    pub fn compile(pattern: &str, flags: &str) -> Result<Self, RuleError> {
        let (regex, _) = build_regex(pattern, flags)?;
        Ok(Self { regex })
    }
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Rule {
    pub fn compile(pattern: &str, flags: &str, replacement: &str) -> Result<Self, RuleError> {
        let (regex, global) = build_regex(pattern, flags)?;
        let replacement = translate_replacement(&regex, replacement)?;
        Ok(Self { regex, replacement, global })
    }

    /// Without the `g` flag only the first match is replaced, as in JS.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.global {
            self.regex.replace_all(text, self.replacement.as_str())
        } else {
            self.regex.replace(text, self.replacement.as_str())
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn build_regex(pattern: &str, flags: &str) -> Result<(Regex, bool), RuleError> {
    let mut builder = RegexBuilder::new(pattern);
    let mut global = false;
    for flag in flags.chars() {
        match flag {
            'g' => global = true,
            'i' => { builder.case_insensitive(true); }
            'm' => { builder.multi_line(true); }
            's' => { builder.dot_matches_new_line(true); }
            // unicode is already the default; `d` only adds match indices and
            // `y` only pins `lastIndex`, which a whole-line replace never moves
            'u' | 'd' | 'y' => {}
            other => return Err(RuleError::UnsupportedFlag(other)),
        }
    }
    Ok((builder.build()?, global))
}

/// Translate a JS replacement string into `regex` replacement syntax.
///
/// JS resolves `$nn` greedily only when that group exists, then falls back
/// to `$n`, then to a literal `$`. Named groups follow the same rule.
fn translate_replacement(regex: &Regex, js: &str) -> Result<String, RuleError> {
    let groups = regex.captures_len() - 1;
    let names = regex.capture_names().flatten().collect::<Vec<_>>();
    let chars = js.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(js.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '$' {
            out.push(c);
            i += 1;
            continue;
        }
        match chars.get(i + 1).copied() {
            Some('$') => {
                out.push_str("$$");
                i += 2;
            }
            Some('&') => {
                out.push_str("${0}");
                i += 2;
            }
            Some(tick @ ('`' | '\'')) => {
                return Err(RuleError::UnsupportedReplacement(format!("${tick}")));
            }
            Some(d1) if d1.is_ascii_digit() => {
                let one = d1.to_digit(10).unwrap_or(0) as usize;
                let two = chars
                    .get(i + 2)
                    .and_then(|d2| d2.to_digit(10))
                    .map(|d2| one * 10 + d2 as usize);
                match two {
                    Some(n) if n >= 1 && n <= groups => {
                        out.push_str(&format!("${{{n}}}"));
                        i += 3;
                    }
                    _ if one >= 1 && one <= groups => {
                        out.push_str(&format!("${{{one}}}"));
                        i += 2;
                    }
                    _ => {
                        out.push_str("$$");
                        i += 1;
                    }
                }
            }
            Some('<') => {
                let close = chars[i + 2..].iter().position(|&ch| ch == '>');
                let name = close.map(|len| chars[i + 2..i + 2 + len].iter().collect::<String>());
                match (close, name) {
                    (Some(len), Some(name)) if names.contains(&name.as_str()) => {
                        out.push_str(&format!("${{{name}}}"));
                        i += len + 3;
                    }
                    _ => {
                        out.push_str("$$");
                        i += 1;
                    }
                }
            }
            _ => {
                out.push_str("$$");
                i += 1;
            }
        }
    }

    Ok(out)
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

//! Shell-style variable expansion.
//!
//! Supports `$VAR`, `${VAR}`, `${VAR:-default}`, `${VAR-default}`,
//! `${VAR:+alt}`, and `${VAR+alt}`. Unknown variables expand to the empty
//! string. Compose files additionally treat `$$` as a literal `$`.

/// Expands variable references in `input` using `lookup`.
///
/// `lookup` returns `None` for unset variables; `Some("")` means set but
/// empty, which matters for the `-` versus `:-` forms.
pub fn expand<F>(input: &str, lookup: &F, dollar_escape: bool) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some((_, '$')) if dollar_escape => {
                out.push('$');
                let _ = chars.next();
            }
            Some((open, '{')) => {
                let Some(close) = find_closing_brace(input, open) else {
                    out.push_str(&input[idx..]);
                    break;
                };
                out.push_str(&evaluate(&input[open + 1..close], lookup, dollar_escape));
                while chars.peek().is_some_and(|&(j, _)| j <= close) {
                    let _ = chars.next();
                }
            }
            Some((start, c)) if c == '_' || c.is_ascii_alphabetic() => {
                let mut end = start;
                while let Some(&(j, c)) = chars.peek() {
                    if c == '_' || c.is_ascii_alphanumeric() {
                        end = j + c.len_utf8();
                        let _ = chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&lookup(&input[start..end]).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    out
}

/// Finds the `}` matching the `{` at `open`, allowing nested `${...}`.
fn find_closing_brace(input: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in input[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn evaluate<F>(expr: &str, lookup: &F, dollar_escape: bool) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let name_len = expr
        .find(|c: char| c != '_' && !c.is_ascii_alphanumeric())
        .unwrap_or(expr.len());
    let (name, modifier) = expr.split_at(name_len);
    let value = lookup(name);
    let non_empty = value.as_deref().is_some_and(|v| !v.is_empty());

    if let Some(default) = modifier.strip_prefix(":-") {
        return if non_empty {
            value.unwrap_or_default()
        } else {
            expand(default, lookup, dollar_escape)
        };
    }
    if let Some(default) = modifier.strip_prefix('-') {
        return value.unwrap_or_else(|| expand(default, lookup, dollar_escape));
    }
    if let Some(alt) = modifier.strip_prefix(":+") {
        return if non_empty {
            expand(alt, lookup, dollar_escape)
        } else {
            String::new()
        };
    }
    if let Some(alt) = modifier.strip_prefix('+') {
        return if value.is_some() {
            expand(alt, lookup, dollar_escape)
        } else {
            String::new()
        };
    }
    // `:?` and `?` would abort a real compose run; here they expand plainly.
    value.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env() -> HashMap<&'static str, &'static str> {
        HashMap::from([("IMAGE", "node"), ("TAG", "20"), ("EMPTY", "")])
    }

    fn run(input: &str, dollar_escape: bool) -> String {
        let vars = env();
        let lookup = |k: &str| vars.get(k).map(|v| (*v).to_string());
        expand(input, &lookup, dollar_escape)
    }

    #[test]
    fn expands_braced_and_bare_forms() {
        assert_eq!(run("${IMAGE}:$TAG", false), "node:20");
    }

    #[test]
    fn unknown_variables_expand_to_empty() {
        assert_eq!(run("x${MISSING}y$MISSING", false), "xy");
    }

    #[test]
    fn colon_dash_default_applies_to_unset_and_empty() {
        assert_eq!(run("${MISSING:-alpine}", false), "alpine");
        assert_eq!(run("${EMPTY:-alpine}", false), "alpine");
        assert_eq!(run("${TAG:-1}", false), "20");
    }

    #[test]
    fn dash_default_applies_only_to_unset() {
        assert_eq!(run("${MISSING-alpine}", false), "alpine");
        assert_eq!(run("${EMPTY-alpine}", false), "");
    }

    #[test]
    fn plus_forms_substitute_alternative() {
        assert_eq!(run("${TAG:+set}", false), "set");
        assert_eq!(run("${EMPTY:+set}", false), "");
        assert_eq!(run("${EMPTY+set}", false), "set");
        assert_eq!(run("${MISSING+set}", false), "");
    }

    #[test]
    fn nested_default_is_expanded() {
        assert_eq!(run("${MISSING:-${IMAGE}}", false), "node");
    }

    #[test]
    fn dollar_escape_only_when_enabled() {
        assert_eq!(run("a$$TAG", true), "a$TAG");
        assert_eq!(run("a$$TAG", false), "a$20");
    }

    #[test]
    fn lone_dollar_and_unclosed_brace_are_literal() {
        assert_eq!(run("cost: 5$", false), "cost: 5$");
        assert_eq!(run("${IMAGE", false), "${IMAGE");
    }
}

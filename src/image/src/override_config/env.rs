//! `KEY=VALUE` parsing and environment variable expansion.

use std::collections::BTreeMap;

use kiln_core::error::{KilnError, Result};
use kiln_core::Stamper;

/// Split `KEY=VALUE` entries on the first `=`.
pub fn parse_key_values(entries: &[String]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let (key, value) = split_key_value(entry)?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

pub(crate) fn split_key_value(entry: &str) -> Result<(&str, &str)> {
    entry
        .split_once('=')
        .ok_or_else(|| KilnError::MalformedKeyValue(entry.to_string()))
}

/// Expand `$NAME` and `${NAME}` references in `value` using `env`.
///
/// Unresolved references are kept exactly as written unless `strict` is
/// set, in which case they are an error. A `$` not followed by a name is
/// literal.
pub fn expand(value: &str, env: &BTreeMap<String, String>, strict: bool) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, literal_len, remainder) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 3, &braced[end + 1..]),
                None => ("", 1, after),
            }
        } else {
            let len = after
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                .count();
            (&after[..len], len + 1, &after[len..])
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }

        match env.get(name) {
            Some(v) => out.push_str(v),
            None if strict => {
                return Err(KilnError::InvalidOptions(format!(
                    "undefined variable {} in {:?}",
                    name, value
                )))
            }
            None => {
                tracing::debug!(name, "Leaving unresolved variable as written");
                out.push_str(&rest[pos..pos + literal_len]);
            }
        }
        rest = remainder;
    }

    out.push_str(rest);
    Ok(out)
}

/// Merge override entries into a base environment.
///
/// Override values are stamped, then expanded against the base environment
/// (so `PATH=$PATH:/opt/bin` extends the inherited `PATH`). The result is
/// sorted by key.
pub fn merge_env(
    base: &[String],
    overrides: &[String],
    stamper: &Stamper,
    strict: bool,
) -> Result<Vec<String>> {
    let base_env = parse_key_values(base)?;
    let mut merged = base_env.clone();
    for entry in overrides {
        let (key, value) = split_key_value(entry)?;
        let value = expand(&stamper.stamp(value), &base_env, strict)?;
        merged.insert(key.to_string(), value);
    }
    Ok(merged
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_key_values() {
        let map = parse_key_values(&strings(&["A=1", "B=x=y", "C="])).unwrap();
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "x=y");
        assert_eq!(map["C"], "");
    }

    #[test]
    fn test_parse_key_values_missing_equals() {
        let err = parse_key_values(&strings(&["A=1", "B"])).unwrap_err();
        assert!(matches!(err, KilnError::MalformedKeyValue(ref s) if s == "B"));
    }

    #[test]
    fn test_expand_forms() {
        let e = env(&[("foo", "bar"), ("HOME", "/root")]);
        assert_eq!(expand("$foo:baz", &e, false).unwrap(), "bar:baz");
        assert_eq!(expand("${foo}baz", &e, false).unwrap(), "barbaz");
        assert_eq!(expand("$HOME/$foo", &e, false).unwrap(), "/root/bar");
        assert_eq!(expand("no refs", &e, false).unwrap(), "no refs");
    }

    #[test]
    fn test_expand_keeps_unresolved() {
        let e = env(&[]);
        assert_eq!(expand("$missing:x", &e, false).unwrap(), "$missing:x");
        assert_eq!(expand("${missing}x", &e, false).unwrap(), "${missing}x");
    }

    #[test]
    fn test_expand_literal_dollars() {
        let e = env(&[("a", "1")]);
        assert_eq!(expand("cost: $5", &e, false).unwrap(), "cost: $5");
        assert_eq!(expand("end$", &e, false).unwrap(), "end$");
        assert_eq!(expand("$ a", &e, false).unwrap(), "$ a");
        assert_eq!(expand("${unterminated", &e, false).unwrap(), "${unterminated");
        assert_eq!(expand("${}", &e, false).unwrap(), "${}");
    }

    #[test]
    fn test_expand_strict() {
        let e = env(&[("a", "1")]);
        assert_eq!(expand("$a", &e, true).unwrap(), "1");
        assert!(matches!(
            expand("$b", &e, true),
            Err(KilnError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_merge_env_sorted_and_expanded() {
        let base = strings(&["foo=bar", "PATH=/usr/bin"]);
        let overrides = strings(&["foo=$foo:baz", "ZED=last", "ALPHA=first"]);
        let merged = merge_env(&base, &overrides, &Stamper::default(), false).unwrap();
        assert_eq!(
            merged,
            strings(&["ALPHA=first", "PATH=/usr/bin", "ZED=last", "foo=bar:baz"])
        );
    }

    #[test]
    fn test_merge_env_expands_against_base_only() {
        let base = strings(&["A=base"]);
        let overrides = strings(&["A=new", "B=$A"]);
        let merged = merge_env(&base, &overrides, &Stamper::default(), false).unwrap();
        assert_eq!(merged, strings(&["A=new", "B=base"]));
    }

    #[test]
    fn test_merge_env_stamps_values() {
        let stamper = Stamper::from_pairs([("BUILD_USER", "alice")]);
        let merged = merge_env(&[], &strings(&["WHO={BUILD_USER}"]), &stamper, false).unwrap();
        assert_eq!(merged, strings(&["WHO=alice"]));
    }

    #[test]
    fn test_merge_env_malformed_base() {
        let err = merge_env(&strings(&["BROKEN"]), &[], &Stamper::default(), false).unwrap_err();
        assert!(matches!(err, KilnError::MalformedKeyValue(_)));
    }
}

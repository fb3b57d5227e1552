//! Template expansion for schema outputs
//!
//! Schema templates contain `{var|transform|transform:arg}` placeholders.
//! The variable resolves in the caller-provided bag; transforms apply left
//! to right. Unknown transformers are identity so older configurations keep
//! working against newer schema sets.

use std::collections::HashMap;

/// Named lookup tables available to the `map:<name>` transformer
pub type TemplateMaps = HashMap<String, HashMap<String, String>>;

/// Expand every placeholder in `template` against the variable bag
pub fn expand(template: &str, vars: &HashMap<String, String>, maps: &TemplateMaps) -> String {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices();

    while let Some((idx, ch)) = chars.next() {
        if ch != '{' {
            output.push(ch);
            continue;
        }

        match template[idx + 1..].find('}') {
            Some(rel_end) => {
                let inner = &template[idx + 1..idx + 1 + rel_end];
                output.push_str(&expand_placeholder(inner, vars, maps));
                // Skip the consumed placeholder body and closing brace
                for _ in 0..inner.chars().count() + 1 {
                    chars.next();
                }
            }
            // Unterminated brace: keep the rest literally
            None => {
                output.push(ch);
            }
        }
    }

    output
}

fn expand_placeholder(inner: &str, vars: &HashMap<String, String>, maps: &TemplateMaps) -> String {
    let mut parts = inner.split('|');
    let var = parts.next().unwrap_or_default().trim();
    let mut value = vars.get(var).cloned().unwrap_or_default();

    for transform in parts {
        value = apply_transform(transform.trim(), value, maps);
    }

    value
}

fn apply_transform(spec: &str, value: String, maps: &TemplateMaps) -> String {
    let mut pieces = spec.split(':');
    let name = pieces.next().unwrap_or_default();
    let args: Vec<&str> = pieces.collect();

    match name {
        "upper" => value.to_uppercase(),
        "lower" => value.to_lowercase(),
        "ucfirst" => ucfirst(&value),
        "titlecase" => titlecase(&value),
        "replace" => {
            if args.len() >= 2 {
                value.replace(args[0], args[1])
            } else {
                value
            }
        }
        "truncate" => match args.first().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if value.chars().count() > n => {
                let mut truncated: String = value.chars().take(n).collect();
                truncated.push('…');
                truncated
            }
            _ => value,
        },
        "extract_grade" => value.chars().take_while(|c| c.is_ascii_digit()).collect(),
        "map" => {
            let table = args.first().and_then(|name| maps.get(*name));
            match table.and_then(|t| t.get(&value)) {
                Some(mapped) => mapped.clone(),
                None => ucfirst(&value),
            }
        }
        "default" => {
            if value.is_empty() {
                // The fallback value may itself contain colons
                args.join(":")
            } else {
                value
            }
        }
        "clean" => value
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect(),
        "slug" => slug(&value),
        "pad" => match args.first().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if value.chars().count() < n => {
                let zeros = "0".repeat(n - value.chars().count());
                format!("{}{}", zeros, value)
            }
            _ => value,
        },
        // Unknown transformers are identity, not errors
        _ => value,
    }
}

fn ucfirst(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn titlecase(value: &str) -> String {
    value
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(ucfirst)
        .collect::<Vec<_>>()
        .join(" ")
}

fn slug(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut last_was_dash = false;

    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            output.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            output.push('-');
            last_was_dash = true;
        }
    }

    output.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn plain_text_passes_through() {
        let vars = bag(&[]);
        assert_eq!(expand("no placeholders", &vars, &TemplateMaps::new()), "no placeholders");
    }

    #[test]
    fn variable_substitution() {
        let vars = bag(&[("name", "10a")]);
        assert_eq!(
            expand("kc_{name}", &vars, &TemplateMaps::new()),
            "kc_10a"
        );
    }

    #[test]
    fn missing_variable_is_empty() {
        let vars = bag(&[]);
        assert_eq!(expand("x{missing}y", &vars, &TemplateMaps::new()), "xy");
    }

    #[test]
    fn case_transforms() {
        let vars = bag(&[("v", "matHe")]);
        let maps = TemplateMaps::new();
        assert_eq!(expand("{v|upper}", &vars, &maps), "MATHE");
        assert_eq!(expand("{v|lower}", &vars, &maps), "mathe");
        assert_eq!(expand("{v|lower|ucfirst}", &vars, &maps), "Mathe");
    }

    #[test]
    fn titlecase_splits_separators() {
        let vars = bag(&[("v", "theater_ag-gruppe")]);
        assert_eq!(
            expand("{v|titlecase}", &vars, &TemplateMaps::new()),
            "Theater Ag Gruppe"
        );
    }

    #[test]
    fn replace_and_truncate() {
        let vars = bag(&[("v", "a_b_c")]);
        let maps = TemplateMaps::new();
        assert_eq!(expand("{v|replace:_:-}", &vars, &maps), "a-b-c");
        assert_eq!(expand("{v|truncate:3}", &vars, &maps), "a_b…");
        assert_eq!(expand("{v|truncate:10}", &vars, &maps), "a_b_c");
    }

    #[test]
    fn extract_grade_takes_leading_digits() {
        let vars = bag(&[("v", "10a")]);
        assert_eq!(
            expand("Grade {v|extract_grade}", &vars, &TemplateMaps::new()),
            "Grade 10"
        );
    }

    #[test]
    fn map_lookup_with_ucfirst_fallback() {
        let vars = bag(&[("s", "mathe"), ("u", "werken")]);
        let mut maps = TemplateMaps::new();
        maps.insert(
            "subject".to_string(),
            [("mathe".to_string(), "Mathematik".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(expand("{s|map:subject}", &vars, &maps), "Mathematik");
        assert_eq!(expand("{u|map:subject}", &vars, &maps), "Werken");
    }

    #[test]
    fn default_applies_only_when_empty() {
        let vars = bag(&[("v", "")]);
        let maps = TemplateMaps::new();
        assert_eq!(expand("{v|default:fallback}", &vars, &maps), "fallback");
        assert_eq!(expand("{v|default:a:b}", &vars, &maps), "a:b");

        let vars = bag(&[("v", "set")]);
        assert_eq!(expand("{v|default:fallback}", &vars, &maps), "set");
    }

    #[test]
    fn clean_strips_specials() {
        let vars = bag(&[("v", "10a (neu)!")]);
        assert_eq!(expand("{v|clean}", &vars, &TemplateMaps::new()), "10aneu");
    }

    #[test]
    fn slug_lowercases_and_dashes() {
        let vars = bag(&[("v", "Foo Bar__Baz ")]);
        assert_eq!(
            expand("{v|slug}", &vars, &TemplateMaps::new()),
            "foo-bar-baz"
        );
    }

    #[test]
    fn pad_zero_fills() {
        let vars = bag(&[("v", "7")]);
        assert_eq!(expand("{v|pad:3}", &vars, &TemplateMaps::new()), "007");
        let vars = bag(&[("v", "1234")]);
        assert_eq!(expand("{v|pad:3}", &vars, &TemplateMaps::new()), "1234");
    }

    #[test]
    fn unknown_transform_is_identity() {
        let vars = bag(&[("v", "x")]);
        assert_eq!(expand("{v|frobnicate}", &vars, &TemplateMaps::new()), "x");
    }

    #[test]
    fn chained_transforms_apply_left_to_right() {
        let vars = bag(&[("v", "mathe")]);
        assert_eq!(
            expand("{v|ucfirst|truncate:3}", &vars, &TemplateMaps::new()),
            "Mat…"
        );
    }

    #[test]
    fn unterminated_brace_is_literal() {
        let vars = bag(&[("v", "x")]);
        assert_eq!(expand("a{v", &vars, &TemplateMaps::new()), "a{v");
    }
}

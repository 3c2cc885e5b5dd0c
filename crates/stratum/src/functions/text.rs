use super::{integer, HelperResult};
use crate::value::Value;

// arguments are checked against the declaration before any of these are called
fn text(args: &[Value], index: usize) -> &str {
    args.get(index).and_then(Value::as_str).unwrap_or_default()
}

/// Split on anything that is not alphanumeric and on case changes (`fooBar`, `XMLHttp`)
fn words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = vec![];
    let mut current = String::new();

    for (index, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let previous = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
            if previous.is_lowercase() || previous.is_numeric() || (previous.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

pub(super) fn camel_case(args: &[Value]) -> HelperResult {
    let mut output = String::new();
    for (index, word) in words(text(args, 0)).into_iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            output.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            output.extend(first.to_uppercase());
            output.push_str(chars.as_str());
        }
    }
    Ok(Value::String(output))
}

pub(super) fn kebab_case(args: &[Value]) -> HelperResult {
    let words: Vec<String> = words(text(args, 0)).iter().map(|word| word.to_lowercase()).collect();
    Ok(Value::String(words.join("-")))
}

pub(super) fn lower(args: &[Value]) -> HelperResult {
    Ok(Value::String(text(args, 0).to_lowercase()))
}

pub(super) fn upper(args: &[Value]) -> HelperResult {
    Ok(Value::String(text(args, 0).to_uppercase()))
}

pub(super) fn trim(args: &[Value]) -> HelperResult {
    Ok(Value::from(text(args, 0).trim()))
}

pub(super) fn replace(args: &[Value]) -> HelperResult {
    Ok(Value::String(text(args, 0).replace(text(args, 1), text(args, 2))))
}

pub(super) fn split(args: &[Value]) -> HelperResult {
    Ok(Value::Array(
        text(args, 0).split(text(args, 1)).map(Value::from).collect(),
    ))
}

const MAX_INDENT: i64 = 1024;

pub(super) fn indent(args: &[Value]) -> HelperResult {
    let spaces = integer(&args[1], "spaces")?;
    if spaces < 0 {
        return Err(format!("spaces must not be negative (got {spaces})"));
    }
    if spaces > MAX_INDENT {
        return Err(format!("spaces must be at most {MAX_INDENT} (got {spaces})"));
    }
    let prefix = " ".repeat(spaces as usize);

    let lines: Vec<String> = text(args, 0)
        .split('\n')
        .map(|line| if line.is_empty() { String::new() } else { format!("{prefix}{line}") })
        .collect();
    Ok(Value::String(lines.join("\n")))
}

/// Primitives render like in templates, arrays and objects as JSON
pub(super) fn string(args: &[Value]) -> HelperResult {
    match args[0].to_template_string() {
        Some(rendered) => Ok(Value::String(rendered)),
        None => serde_json::to_string(&args[0])
            .map(Value::String)
            .map_err(|err| err.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value;
    use pretty_assertions::assert_eq;

    fn one(function: fn(&[Value]) -> HelperResult, input: &str) -> Value {
        function(&[Value::from(input)]).unwrap()
    }

    #[test]
    fn case_conversions() {
        assert_eq!(one(camel_case, "Foo Bar"), Value::from("fooBar"));
        assert_eq!(one(camel_case, "--foo-bar--"), Value::from("fooBar"));
        assert_eq!(one(camel_case, "__FOO_BAR__"), Value::from("fooBar"));
        assert_eq!(one(kebab_case, "fooBar"), Value::from("foo-bar"));
        assert_eq!(one(kebab_case, "XMLHttpRequest"), Value::from("xml-http-request"));
        assert_eq!(one(kebab_case, "Foo Bar_baz"), Value::from("foo-bar-baz"));
    }

    #[test]
    fn indent_skips_empty_lines() {
        assert_eq!(
            indent(&[Value::from("a\n\nb"), Value::Integer(2)]).unwrap(),
            Value::from("  a\n\n  b")
        );
        assert_eq!(
            indent(&[Value::from("a"), Value::Decimal(1.5)]).unwrap_err(),
            "spaces must be an integer (got 1.5)"
        );
        assert_eq!(
            indent(&[Value::from("a"), Value::Integer(i64::MAX)]).unwrap_err(),
            "spaces must be at most 1024 (got 9223372036854775807)"
        );
    }

    #[test]
    fn string_conversion() {
        assert_eq!(string(&[Value::Integer(1)]).unwrap(), Value::from("1"));
        assert_eq!(string(&[Value::Null]).unwrap(), Value::from("null"));
        assert_eq!(string(&[value!({ "a": [1] })]).unwrap(), Value::from(r#"{"a":[1]}"#));
    }

    #[test]
    fn split_and_replace() {
        assert_eq!(
            split(&[Value::from("a,b,,c"), Value::from(",")]).unwrap(),
            value!(["a", "b", "", "c"])
        );
        assert_eq!(
            replace(&[Value::from("a-b-c"), Value::from("-"), Value::from("+")]).unwrap(),
            Value::from("a+b+c")
        );
    }
}

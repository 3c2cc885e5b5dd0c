use super::{integer, HelperResult};
use crate::value::Value;

pub(super) fn concat(args: &[Value]) -> HelperResult {
    match (&args[0], &args[1]) {
        (Value::Array(a), Value::Array(b)) => Ok(Value::Array(a.iter().chain(b).cloned().collect())),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (a, b) => Err(format!(
            "Both terms need to be either arrays or strings (got {} and {})",
            a.type_name(),
            b.type_name()
        )),
    }
}

pub(super) fn is_empty(args: &[Value]) -> HelperResult {
    let empty = match &args[0] {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
        _ => false,
    };
    Ok(Value::Boolean(empty))
}

pub(super) fn join(args: &[Value]) -> HelperResult {
    let Value::Array(items) = &args[0] else {
        return Err("input must be an array".to_string());
    };
    let separator = args.get(1).and_then(Value::as_str).unwrap_or(",");

    let rendered = items
        .iter()
        .map(|item| {
            item.to_template_string()
                .ok_or_else(|| format!("Cannot join a value of type {}", item.type_name()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(rendered.join(separator)))
}

/// JavaScript `slice` semantics: negative indices count from the end, out of range indices are clamped
fn bounds(len: usize, start: i64, end: Option<i64>) -> (usize, usize) {
    let clamp = |index: i64| -> usize {
        if index < 0 {
            (len as i64 + index).max(0) as usize
        } else {
            (index as usize).min(len)
        }
    };

    let start = clamp(start);
    let end = end.map_or(len, clamp);
    (start, end.max(start))
}

pub(super) fn slice(args: &[Value]) -> HelperResult {
    let start = integer(&args[1], "start")?;
    let end = args.get(2).map(|end| integer(end, "end")).transpose()?;

    match &args[0] {
        Value::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = bounds(chars.len(), start, end);
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        Value::Array(items) => {
            let (start, end) = bounds(items.len(), start, end);
            Ok(Value::Array(items[start..end].to_vec()))
        }
        other => Err(format!("Cannot slice a value of type {}", other.type_name())),
    }
}

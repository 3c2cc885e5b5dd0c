use super::{integer, HelperResult};
use crate::value::Value;
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

fn text(args: &[Value]) -> &str {
    args.first().and_then(Value::as_str).unwrap_or_default()
}

pub(super) fn base64_encode(args: &[Value]) -> HelperResult {
    Ok(Value::String(STANDARD.encode(text(args))))
}

pub(super) fn base64_decode(args: &[Value]) -> HelperResult {
    let bytes = STANDARD
        .decode(text(args))
        .map_err(|err| format!("Unable to decode base64: {err}"))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| "Decoded base64 is not valid UTF-8".to_string())
}

pub(super) fn json_encode(args: &[Value]) -> HelperResult {
    let encoded = match args.get(1) {
        Some(spaces) => {
            let spaces = integer(spaces, "spaces")?.clamp(0, 16) as usize;
            let indent = " ".repeat(spaces);
            let mut buffer = vec![];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            serde::Serialize::serialize(&args[0], &mut serializer).map_err(|err| err.to_string())?;
            String::from_utf8(buffer).map_err(|err| err.to_string())?
        }
        None => serde_json::to_string(&args[0]).map_err(|err| err.to_string())?,
    };
    Ok(Value::String(encoded))
}

pub(super) fn json_decode(args: &[Value]) -> HelperResult {
    serde_json::from_str::<serde_json::Value>(text(args))
        .map(Value::from)
        .map_err(|err| format!("Unable to decode JSON: {err}"))
}

pub(super) fn yaml_encode(args: &[Value]) -> HelperResult {
    serde_yaml::to_string(&args[0])
        .map(Value::String)
        .map_err(|err| err.to_string())
}

pub(super) fn yaml_decode(args: &[Value]) -> HelperResult {
    serde_yaml::from_str::<serde_yaml::Value>(text(args))
        .map(Value::from)
        .map_err(|err| format!("Unable to decode YAML: {err}"))
}

pub(super) fn sha256(args: &[Value]) -> HelperResult {
    Ok(Value::String(hex::encode(Sha256::digest(text(args).as_bytes()))))
}

pub(super) fn uuid_v4(_args: &[Value]) -> HelperResult {
    Ok(Value::String(uuid::Uuid::new_v4().to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value;
    use pretty_assertions::assert_eq;

    #[test]
    fn base64() {
        assert_eq!(base64_encode(&[Value::from("foo")]).unwrap(), Value::from("Zm9v"));
        assert_eq!(base64_decode(&[Value::from("Zm9v")]).unwrap(), Value::from("foo"));
        assert!(base64_decode(&[Value::from("not base64!")]).is_err());
    }

    #[test]
    fn json() {
        let value = value!({ "a": [1, true] });
        assert_eq!(json_encode(&[value.clone()]).unwrap(), Value::from(r#"{"a":[1,true]}"#));
        assert_eq!(
            json_encode(&[value!({ "a": 1 }), Value::Integer(2)]).unwrap(),
            Value::from("{\n  \"a\": 1\n}")
        );
        assert_eq!(json_decode(&[Value::from(r#"{"a":[1,true]}"#)]).unwrap(), value);
    }

    #[test]
    fn yaml() {
        assert_eq!(yaml_encode(&[value!({ "a": 1 })]).unwrap(), Value::from("a: 1\n"));
        assert_eq!(yaml_decode(&[Value::from("a: [1, x]")]).unwrap(), value!({ "a": [1, "x"] }));
    }

    #[test]
    fn hashes_and_ids() {
        assert_eq!(
            sha256(&[Value::from("abc")]).unwrap(),
            Value::from("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );

        let Value::String(id) = uuid_v4(&[]).unwrap() else {
            panic!("uuidv4 must return a string");
        };
        assert_eq!(id.len(), 36);
        assert_eq!(id.chars().nth(14), Some('4'));
    }
}

//! Translates a declarative test definition (a JSON object mapping
//! operation names to arguments) into a pipeline of [`OpSpec`]s. Key
//! order is pipeline order. Unrecognized operations fail loudly at
//! registration time rather than being silently ignored.

use regex::Regex;
use serde_json::{Map, Value};

use bullseye_gradebook::Strictness;

use crate::errors::ConfigError;
use crate::model::{Edge, HitPolicy, OpSpec, ValueSource};
use crate::value::unitless;

pub fn parse_definition(definition: &Map<String, Value>) -> Result<Vec<OpSpec>, ConfigError> {
    let mut ops = Vec::new();
    for (key, arg) in definition {
        parse_operation(key, arg, &mut ops)?;
    }
    Ok(ops)
}

fn parse_operation(key: &str, arg: &Value, ops: &mut Vec<OpSpec>) -> Result<(), ConfigError> {
    match key {
        // `nodes` and `elements` are synonyms.
        "nodes" | "elements" => ops.push(OpSpec::SelectElements {
            selector: selector_arg("nodes", arg)?,
        }),
        "children" | "deepChildren" => ops.push(OpSpec::SelectDeepChildren {
            selector: selector_arg("deepChildren", arg)?,
        }),
        "waitForEvent" => ops.push(OpSpec::WaitForEvent {
            name: str_arg("waitForEvent", arg, "an event name")?,
        }),
        "get" => {
            let name = str_arg("get", arg, "a value source name")?;
            let source = ValueSource::parse(&name)
                .ok_or_else(|| ConfigError::UnknownValueSource(name.clone()))?;
            ops.push(OpSpec::Get(source));
        }
        "cssProperty" => ops.push(OpSpec::CssProperty {
            property: str_arg("cssProperty", arg, "a CSS property name")?,
        }),
        "attribute" => ops.push(OpSpec::Attribute {
            name: str_arg("attribute", arg, "an attribute name")?,
        }),
        "property" => ops.push(OpSpec::Property {
            key: str_arg("property", arg, "a property key")?,
        }),
        "absolutePosition" => {
            let side = str_arg("absolutePosition", arg, "'top', 'left', 'bottom' or 'right'")?;
            let edge = Edge::parse(&side).ok_or(ConfigError::BadArgument {
                op: "absolutePosition",
                expected: "'top', 'left', 'bottom' or 'right'",
            })?;
            ops.push(OpSpec::AbsolutePosition { edge });
        }
        "limit" => ops.push(OpSpec::Limit(parse_limit(arg)?)),
        "not" => {
            // `not: false` is a no-op; anything else negates.
            if arg.as_bool() != Some(false) {
                ops.push(OpSpec::Not);
            }
        }
        "exists" => {
            if arg.as_bool() == Some(false) {
                ops.push(OpSpec::Not);
            }
            ops.push(OpSpec::Exists);
        }
        "equals" => ops.push(OpSpec::Equals {
            expected: parse_literals(arg)?,
        }),
        "isGreaterThan" => {
            let (expected, or_equal) = parse_comparison("isGreaterThan", arg)?;
            ops.push(OpSpec::IsGreaterThan { expected, or_equal });
        }
        "isLessThan" => {
            let (expected, or_equal) = parse_comparison("isLessThan", arg)?;
            ops.push(OpSpec::IsLessThan { expected, or_equal });
        }
        "isInRange" => ops.push(parse_range(arg)?),
        "hasSubstring" => ops.push(parse_substring(arg)?),
        other => return Err(ConfigError::UnknownOperation(other.to_string())),
    }
    Ok(())
}

fn str_arg(op: &'static str, arg: &Value, expected: &'static str) -> Result<String, ConfigError> {
    arg.as_str()
        .map(str::to_string)
        .ok_or(ConfigError::BadArgument { op, expected })
}

fn selector_arg(op: &'static str, arg: &Value) -> Result<String, ConfigError> {
    let selector = str_arg(op, arg, "a CSS selector")?;
    if selector.is_empty() {
        return Err(ConfigError::BadArgument {
            op,
            expected: "a CSS selector",
        });
    }
    Ok(selector)
}

fn parse_limit(arg: &Value) -> Result<Strictness, ConfigError> {
    match arg {
        Value::String(s) if s == "some" => Ok(Strictness::Some),
        Value::String(s) if s == "all" => Ok(Strictness::All),
        Value::Number(n) => match n.as_u64() {
            Some(limit) if limit >= 1 => Ok(Strictness::AtMost(limit as u32)),
            _ => Err(ConfigError::BadLimit),
        },
        _ => Err(ConfigError::BadLimit),
    }
}

fn parse_literals(arg: &Value) -> Result<Vec<Value>, ConfigError> {
    const EXPECTED: &str = "a string, a number, or an array of string and number values";
    let bad = || ConfigError::BadArgument {
        op: "equals",
        expected: EXPECTED,
    };
    let candidates = match arg {
        Value::Object(map) => map.get("expected").ok_or_else(bad)?,
        other => other,
    };
    let list = match candidates {
        Value::Array(items) => items.clone(),
        Value::String(_) | Value::Number(_) => vec![candidates.clone()],
        _ => return Err(bad()),
    };
    if list.is_empty()
        || !list
            .iter()
            .all(|v| matches!(v, Value::String(_) | Value::Number(_)))
    {
        return Err(bad());
    }
    Ok(list)
}

fn parse_comparison(op: &'static str, arg: &Value) -> Result<(f64, bool), ConfigError> {
    let bad = ConfigError::BadArgument {
        op,
        expected: "a number",
    };
    match arg {
        Value::Number(n) => Ok((n.as_f64().ok_or(bad)?, false)),
        Value::Object(map) => {
            let expected = map
                .get("expected")
                .and_then(Value::as_f64)
                .ok_or(bad)?;
            let or_equal = map
                .get("orEqualTo")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Ok((expected, or_equal))
        }
        _ => Err(bad),
    }
}

fn parse_range(arg: &Value) -> Result<OpSpec, ConfigError> {
    let bad = ConfigError::BadArgument {
        op: "isInRange",
        expected: "an upper and a lower value in its config object",
    };
    let map = arg.as_object().ok_or_else(|| bad.clone())?;
    let lower = map
        .get("lower")
        .and_then(unitless)
        .ok_or_else(|| bad.clone())?;
    let upper = map.get("upper").and_then(unitless).ok_or(bad)?;
    let lower_inclusive = map
        .get("lowerInclusive")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let upper_inclusive = map
        .get("upperInclusive")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    Ok(OpSpec::in_range(lower, upper, lower_inclusive, upper_inclusive))
}

fn parse_substring(arg: &Value) -> Result<OpSpec, ConfigError> {
    let bad = |expected: &'static str| ConfigError::BadArgument {
        op: "hasSubstring",
        expected,
    };
    let (expected, policy) = match arg {
        Value::String(s) => (vec![s.clone()], HitPolicy::default()),
        Value::Array(items) => (
            string_list(items).ok_or_else(|| bad("regex strings"))?,
            HitPolicy::default(),
        ),
        Value::Object(map) => {
            let patterns = match map.get("expected") {
                Some(Value::String(s)) => vec![s.clone()],
                Some(Value::Array(items)) => {
                    string_list(items).ok_or_else(|| bad("regex strings"))?
                }
                _ => return Err(bad("at least one regex comparison")),
            };
            let exact = opt_u32(map.get("nValues")).map_err(|_| bad("numeric 'nValues'"))?;
            let min = opt_u32(map.get("minValues")).map_err(|_| bad("numeric 'minValues'"))?;
            let max = opt_u32(map.get("maxValues")).map_err(|_| bad("numeric 'maxValues'"))?;
            (patterns, HitPolicy { exact, min, max })
        }
        _ => return Err(bad("at least one regex comparison")),
    };
    if expected.is_empty() {
        return Err(bad("at least one regex comparison"));
    }
    for pattern in &expected {
        if Regex::new(pattern).is_err() {
            return Err(bad("valid regex patterns"));
        }
    }
    Ok(OpSpec::HasSubstring {
        patterns: expected,
        policy,
    })
}

fn string_list(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn opt_u32(value: Option<&Value>) -> Result<Option<u32>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(|v| Some(v as u32)).ok_or(()),
        Some(_) => Err(()),
    }
}

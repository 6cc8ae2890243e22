// Update operators applied to stored bucket documents: $set, $max, $min, $inc.
// Paths are dotted (`values.59`, `value.max`); missing objects are created.

use anyhow::{Context, bail};
use serde_json::Value;

use crate::models::Document;

pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for part in parts {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

pub fn set_path(doc: &mut Document, path: &str, value: Value) -> anyhow::Result<()> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else {
        bail!("empty field path");
    };
    let mut cur = doc;
    for part in parts {
        let next = cur
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        cur = next
            .as_object_mut()
            .with_context(|| format!("{path}: {part} is not a document"))?;
    }
    cur.insert(last.to_string(), value);
    Ok(())
}

fn number(path: &str, value: &Value) -> anyhow::Result<f64> {
    value
        .as_f64()
        .with_context(|| format!("{path}: operand is not a number"))
}

fn increment(current: Option<&Value>, by: &Value) -> Option<Value> {
    let zero = Value::from(0);
    let current = current.unwrap_or(&zero);
    match (current.as_i64(), by.as_i64()) {
        (Some(c), Some(b)) => Some(Value::from(c + b)),
        _ => Some(Value::from(current.as_f64()? + by.as_f64()?)),
    }
}

/// Apply an update document in place. Operators are independent per path, so
/// `$max`, `$min` and `$inc` give the same result in any application order.
pub fn apply_update(doc: &mut Document, update: &Document) -> anyhow::Result<()> {
    for (op, args) in update {
        let Value::Object(args) = args else {
            bail!("{op}: operator arguments must be a document");
        };
        for (path, value) in args {
            match op.as_str() {
                "$set" => set_path(doc, path, value.clone())?,
                "$max" | "$min" => {
                    let new = number(path, value)?;
                    let replace = match get_path(doc, path).and_then(Value::as_f64) {
                        None => true,
                        Some(cur) if op == "$max" => new > cur,
                        Some(cur) => new < cur,
                    };
                    if replace {
                        set_path(doc, path, value.clone())?;
                    }
                }
                "$inc" => {
                    let next = increment(get_path(doc, path), value)
                        .with_context(|| format!("{path}: cannot increment non-number"))?;
                    set_path(doc, path, next)?;
                }
                other => bail!("unsupported update operator {other}"),
            }
        }
    }
    Ok(())
}

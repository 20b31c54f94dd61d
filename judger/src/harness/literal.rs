//! Shape inference for rendering JSON test inputs as literals of statically
//! typed languages.
//!
//! Only scalars, flat homogeneous sequences and flat string-keyed maps with
//! homogeneous values have a typed rendering. Everything else is
//! [`Shape::Opaque`] and is passed to the submission as its JSON text.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    /// Fits in 32 bits
    Int,
    /// Needs 64 bits
    Long,
    Float,
    Bool,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Null,
    Scalar(Scalar),
    /// Empty sequences are typed as `List(Int)`.
    List(Scalar),
    /// String-keyed map; empty maps are typed as `Map(Int)`.
    Map(Scalar),
    Opaque,
}

pub fn scalar_of(v: &Value) -> Option<Scalar> {
    match v {
        Value::Bool(_) => Some(Scalar::Bool),
        Value::String(_) => Some(Scalar::Str),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) if i32::MIN as i64 <= i && i <= i32::MAX as i64 => Scalar::Int,
            Some(_) => Scalar::Long,
            None => Scalar::Float,
        }),
        _ => None,
    }
}

/// The narrowest scalar type both `a` and `b` fit in.
fn unify(a: Scalar, b: Scalar) -> Option<Scalar> {
    use Scalar::*;
    match (a, b) {
        (a, b) if a == b => Some(a),
        (Int, Long) | (Long, Int) => Some(Long),
        (Int, Float) | (Float, Int) | (Long, Float) | (Float, Long) => Some(Float),
        _ => None,
    }
}

fn unify_all<'a>(values: impl Iterator<Item = &'a Value>) -> Option<Scalar> {
    let mut acc: Option<Scalar> = None;
    for v in values {
        let s = scalar_of(v)?;
        acc = Some(match acc {
            Some(prev) => unify(prev, s)?,
            None => s,
        });
    }
    Some(acc.unwrap_or(Scalar::Int))
}

pub fn shape_of(v: &Value) -> Shape {
    match v {
        Value::Null => Shape::Null,
        Value::Array(items) => unify_all(items.iter()).map_or(Shape::Opaque, Shape::List),
        Value::Object(map) => unify_all(map.values()).map_or(Shape::Opaque, Shape::Map),
        _ => scalar_of(v).map_or(Shape::Opaque, Shape::Scalar),
    }
}

/// Quote `s` as a double-quoted string literal.
///
/// JSON string escapes are also valid escapes in every supported target
/// language.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
}

/// Render a number as a floating point literal that always has a fraction or
/// exponent part.
pub fn float_literal(v: &Value) -> String {
    let f = v.as_f64().unwrap_or_default();
    let s = format!("{:?}", f);
    if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Render an integer literal, falling back to a float rendering for values
/// JSON stores as floating point.
pub fn int_literal(v: &Value) -> String {
    match v.as_i64() {
        Some(i) => i.to_string(),
        None => float_literal(v),
    }
}

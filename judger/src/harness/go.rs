use itertools::Itertools;
use serde_json::Value;

use super::{
    literal::{float_literal, int_literal, quote, shape_of, Scalar, Shape},
    Harness, SourceFiles,
};
use crate::lang::Language;

/// Submissions define `func solution(...)` in `solution.go`; the harness lives
/// in a separate `main.go` of the same package so the submission keeps its
/// own imports.
pub struct GoHarness;

impl Harness for GoHarness {
    fn language(&self) -> Language {
        Language::Go
    }

    fn generate(&self, code: &str, args: &[Value]) -> SourceFiles {
        let solution = if has_package_clause(code) {
            code.to_owned()
        } else {
            format!("package main\n\n{}", code)
        };
        let args = args.iter().map(literal).join(", ");
        let main = format!(
            r#"package main

import (
	"encoding/json"
	"fmt"
)

func main() {{
	result := solution({args})
	out, err := json.Marshal(result)
	if err != nil {{
		panic(err)
	}}
	fmt.Println(string(out))
}}
"#,
            args = args
        );

        let mut files = SourceFiles::new();
        files.insert("solution.go".into(), solution);
        files.insert("main.go".into(), main);
        files
    }
}

fn has_package_clause(code: &str) -> bool {
    code.lines()
        .map(str::trim_start)
        .any(|line| line.starts_with("package "))
}

fn scalar(v: &Value, ty: Scalar) -> String {
    match (ty, v) {
        (Scalar::Str, Value::String(s)) => quote(s),
        (Scalar::Bool, Value::Bool(b)) => b.to_string(),
        (Scalar::Float, _) => float_literal(v),
        _ => int_literal(v),
    }
}

fn type_name(ty: Scalar) -> &'static str {
    match ty {
        Scalar::Int | Scalar::Long => "int",
        Scalar::Float => "float64",
        Scalar::Bool => "bool",
        Scalar::Str => "string",
    }
}

fn literal(v: &Value) -> String {
    match (shape_of(v), v) {
        (Shape::Null, _) => "nil".into(),
        (Shape::Scalar(ty), _) => scalar(v, ty),
        (Shape::List(ty), Value::Array(items)) => format!(
            "[]{}{{{}}}",
            type_name(ty),
            items.iter().map(|i| scalar(i, ty)).join(", ")
        ),
        (Shape::Map(ty), Value::Object(map)) => format!(
            "map[string]{}{{{}}}",
            type_name(ty),
            map.iter()
                .map(|(k, v)| format!("{}: {}", quote(k), scalar(v, ty)))
                .join(", ")
        ),
        _ => quote(&v.to_string()),
    }
}

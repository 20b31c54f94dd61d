use itertools::Itertools;
use serde_json::Value;

use super::{
    literal::{float_literal, int_literal, quote, shape_of, Scalar, Shape},
    Harness, SourceFiles,
};
use crate::lang::Language;

/// Submissions define `class Solution` with an instance or static method
/// `solution`. The result is printed with Gson, which the sandbox image keeps
/// on the class path.
pub struct JavaHarness;

impl Harness for JavaHarness {
    fn language(&self) -> Language {
        Language::Java
    }

    fn generate(&self, code: &str, args: &[Value]) -> SourceFiles {
        // Only `Main` may be public inside `Main.java`.
        let code = code.replace("public class Solution", "class Solution");
        let args = args.iter().map(literal).join(", ");
        let program = format!(
            r#"import java.util.*;

{code}

public class Main {{
    @SuppressWarnings("unchecked")
    private static <V> Map<String, V> conquerMap(Object... kv) {{
        Map<String, V> map = new LinkedHashMap<>();
        for (int i = 0; i + 1 < kv.length; i += 2) {{
            map.put((String) kv[i], (V) kv[i + 1]);
        }}
        return map;
    }}

    public static void main(String[] args) throws Exception {{
        Object result = new Solution().solution({args});
        System.out.println(new com.google.gson.Gson().toJson(result));
    }}
}}
"#,
            code = code.trim_end(),
            args = args,
        );
        let mut files = SourceFiles::new();
        files.insert("Main.java".into(), program);
        files
    }
}

fn scalar(v: &Value, ty: Scalar) -> String {
    match (ty, v) {
        (Scalar::Str, Value::String(s)) => quote(s),
        (Scalar::Bool, Value::Bool(b)) => b.to_string(),
        (Scalar::Long, _) => format!("{}L", int_literal(v)),
        (Scalar::Float, _) => float_literal(v),
        _ => int_literal(v),
    }
}

fn element_type(ty: Scalar) -> &'static str {
    match ty {
        Scalar::Int => "int",
        Scalar::Long => "long",
        Scalar::Float => "double",
        Scalar::Bool => "boolean",
        Scalar::Str => "String",
    }
}

fn boxed_type(ty: Scalar) -> &'static str {
    match ty {
        Scalar::Int => "Integer",
        Scalar::Long => "Long",
        Scalar::Float => "Double",
        Scalar::Bool => "Boolean",
        Scalar::Str => "String",
    }
}

fn literal(v: &Value) -> String {
    match (shape_of(v), v) {
        (Shape::Null, _) => "null".into(),
        (Shape::Scalar(ty), _) => scalar(v, ty),
        (Shape::List(ty), Value::Array(items)) => format!(
            "new {}[]{{{}}}",
            element_type(ty),
            items.iter().map(|i| scalar(i, ty)).join(", ")
        ),
        (Shape::Map(ty), Value::Object(map)) => format!(
            "Main.<{}>conquerMap({})",
            boxed_type(ty),
            map.iter()
                .map(|(k, v)| format!("{}, {}", quote(k), scalar(v, ty)))
                .join(", ")
        ),
        _ => quote(&v.to_string()),
    }
}

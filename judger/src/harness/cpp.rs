use itertools::Itertools;
use serde_json::Value;

use super::{
    literal::{float_literal, int_literal, quote, shape_of, Scalar, Shape},
    Harness, SourceFiles,
};
use crate::lang::Language;

/// Submissions define a free function `solution`. Arguments are bound to
/// named locals first so `solution` may take them by non-const reference.
pub struct CppHarness;

const JSON_PRINTER: &str = r#"namespace conquer_json {
template <typename T> void emit(std::ostream& out, const std::vector<T>& v);
template <typename V> void emit(std::ostream& out, const std::map<std::string, V>& m);
template <typename V> void emit(std::ostream& out, const std::unordered_map<std::string, V>& m);
template <typename A, typename B> void emit(std::ostream& out, const std::pair<A, B>& p);

inline void emit(std::ostream& out, const std::string& s) {
    out << '"';
    for (unsigned char c : s) {
        switch (c) {
            case '"': out << "\\\""; break;
            case '\\': out << "\\\\"; break;
            case '\n': out << "\\n"; break;
            case '\r': out << "\\r"; break;
            case '\t': out << "\\t"; break;
            default:
                if (c < 0x20) {
                    char buf[8];
                    std::snprintf(buf, sizeof(buf), "\\u%04x", c);
                    out << buf;
                } else {
                    out << c;
                }
        }
    }
    out << '"';
}
inline void emit(std::ostream& out, const char* s) { emit(out, std::string(s)); }
inline void emit(std::ostream& out, char c) { emit(out, std::string(1, c)); }
inline void emit(std::ostream& out, bool b) { out << (b ? "true" : "false"); }
template <typename T>
typename std::enable_if<std::is_integral<T>::value>::type emit(std::ostream& out, T v) { out << v; }
template <typename T>
typename std::enable_if<std::is_floating_point<T>::value>::type emit(std::ostream& out, T v) {
    std::ostringstream s;
    s << std::setprecision(17) << v;
    out << s.str();
}

template <typename Seq> void emit_seq(std::ostream& out, const Seq& seq) {
    out << '[';
    bool first = true;
    for (const auto& item : seq) {
        if (!first) out << ',';
        first = false;
        emit(out, item);
    }
    out << ']';
}
template <typename Map> void emit_map(std::ostream& out, const Map& map) {
    out << '{';
    bool first = true;
    for (const auto& kv : map) {
        if (!first) out << ',';
        first = false;
        emit(out, kv.first);
        out << ':';
        emit(out, kv.second);
    }
    out << '}';
}

template <typename T> void emit(std::ostream& out, const std::vector<T>& v) { emit_seq(out, v); }
template <typename V> void emit(std::ostream& out, const std::map<std::string, V>& m) { emit_map(out, m); }
template <typename V> void emit(std::ostream& out, const std::unordered_map<std::string, V>& m) { emit_map(out, m); }
template <typename A, typename B> void emit(std::ostream& out, const std::pair<A, B>& p) {
    out << '[';
    emit(out, p.first);
    out << ',';
    emit(out, p.second);
    out << ']';
}
}  // namespace conquer_json
"#;

impl Harness for CppHarness {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn generate(&self, code: &str, args: &[Value]) -> SourceFiles {
        let bindings = args
            .iter()
            .enumerate()
            .map(|(i, v)| format!("    auto arg{} = {};\n", i, literal(v)))
            .join("");
        let call = (0..args.len()).map(|i| format!("arg{}", i)).join(", ");
        let program = format!(
            r#"#include <bits/stdc++.h>
using namespace std;

{code}

{printer}
int main() {{
{bindings}    auto result = solution({call});
    conquer_json::emit(std::cout, result);
    std::cout << std::endl;
    return 0;
}}
"#,
            code = code.trim_end(),
            printer = JSON_PRINTER,
            bindings = bindings,
            call = call,
        );
        let mut files = SourceFiles::new();
        files.insert("solution.cpp".into(), program);
        files
    }
}

fn scalar(v: &Value, ty: Scalar) -> String {
    match (ty, v) {
        (Scalar::Str, Value::String(s)) => format!("std::string({})", quote(s)),
        (Scalar::Bool, Value::Bool(b)) => b.to_string(),
        (Scalar::Long, _) => format!("{}LL", int_literal(v)),
        (Scalar::Float, _) => float_literal(v),
        _ => int_literal(v),
    }
}

fn type_name(ty: Scalar) -> &'static str {
    match ty {
        Scalar::Int => "int",
        Scalar::Long => "long long",
        Scalar::Float => "double",
        Scalar::Bool => "bool",
        Scalar::Str => "std::string",
    }
}

fn literal(v: &Value) -> String {
    match (shape_of(v), v) {
        (Shape::Null, _) => "nullptr".into(),
        (Shape::Scalar(ty), _) => scalar(v, ty),
        (Shape::List(ty), Value::Array(items)) => format!(
            "std::vector<{}>{{{}}}",
            type_name(ty),
            items.iter().map(|i| scalar(i, ty)).join(", ")
        ),
        (Shape::Map(ty), Value::Object(map)) => format!(
            "std::map<std::string, {}>{{{}}}",
            type_name(ty),
            map.iter()
                .map(|(k, v)| format!("{{{}, {}}}", quote(k), scalar(v, ty)))
                .join(", ")
        ),
        _ => format!("std::string({})", quote(&v.to_string())),
    }
}

use serde_json::Value;

use super::{args_json, literal::quote, Harness, SourceFiles};
use crate::lang::Language;

pub struct PythonHarness;

impl Harness for PythonHarness {
    fn language(&self) -> Language {
        Language::Python
    }

    fn generate(&self, code: &str, args: &[Value]) -> SourceFiles {
        let program = format!(
            r#"{code}


if __name__ == "__main__":
    import json as _conquer_json

    def _conquer_default(o):
        if isinstance(o, (set, frozenset, tuple)):
            return list(o)
        return str(o)

    _conquer_args = _conquer_json.loads({args})
    _conquer_result = solution(*_conquer_args)
    print(_conquer_json.dumps(_conquer_result, default=_conquer_default))
"#,
            code = code.trim_end(),
            args = quote(&args_json(args)),
        );
        let mut files = SourceFiles::new();
        files.insert("solution.py".into(), program);
        files
    }
}

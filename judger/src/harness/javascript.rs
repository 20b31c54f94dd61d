use serde_json::Value;

use super::{args_json, literal::quote, Harness, SourceFiles};
use crate::lang::Language;

pub struct JavaScriptHarness;

impl Harness for JavaScriptHarness {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn generate(&self, code: &str, args: &[Value]) -> SourceFiles {
        // `Promise.resolve` lets `solution` be either sync or async.
        let program = format!(
            r#"{code}

;(() => {{
  const conquerArgs = JSON.parse({args});
  Promise.resolve(solution(...conquerArgs)).then((result) => {{
    console.log(JSON.stringify(result === undefined ? null : result));
  }});
}})();
"#,
            code = code.trim_end(),
            args = quote(&args_json(args)),
        );
        let mut files = SourceFiles::new();
        files.insert("solution.js".into(), program);
        files
    }
}

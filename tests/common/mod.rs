use cscript::diagnostics::{Code, Diagnostic};
use cscript::{compile, CompileOptions, CompileOutput};

pub struct Compiled {
    pub output: CompileOutput,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile a source snippet with a capturing sink and a small code buffer.
pub fn check(source: &str) -> Compiled {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut sink = |d: &Diagnostic| diagnostics.push(d.clone());
    let mut code = vec![0u8; 4096];

    let mut options = CompileOptions::new("test.cs");
    options.sink = Some(&mut sink);
    let output = compile(source, &mut code, options);

    Compiled {
        output,
        diagnostics,
    }
}

#[allow(dead_code)]
pub fn assert_clean(source: &str) -> Compiled {
    let compiled = check(source);
    assert_eq!(
        compiled.output.errors,
        0,
        "expected a clean compile, got:\n{}",
        compiled
            .diagnostics
            .iter()
            .map(|d| d.rendered.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    );
    compiled
}

#[allow(dead_code)]
pub fn error_codes(source: &str) -> Vec<Code> {
    check(source).diagnostics.iter().map(|d| d.code).collect()
}

mod common;
use common::{assert_clean, check};

use cscript::diagnostics::Code;
use cscript::SymbolKind;

#[test]
fn block_locals_die_with_their_block() {
    let compiled = check(
        "fn main()\n\
         \tif true then\n\
         \t\tlet inner = 1\n\
         \tlet x = inner",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::UndefinedReference);
}

#[test]
fn shadowing_is_rejected_even_across_blocks() {
    let compiled = check(
        "fn main()\n\
         \tlet x = 1\n\
         \tif true then\n\
         \t\tlet x = 2",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::Redeclaration);
}

#[test]
fn sibling_blocks_may_reuse_a_name() {
    assert_clean(
        "fn main()\n\
         \tif true then\n\
         \t\tlet t = 1\n\
         \telse\n\
         \t\tlet t = 2",
    );
}

#[test]
fn parameters_are_in_scope_in_the_body() {
    assert_clean(
        "fn scale(v: f64, by: f64) -> f64\n\
         \treturn v * by",
    );
    let compiled = check(
        "fn clash(v: f64)\n\
         \tlet v = 2",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::Redeclaration);
}

#[test]
fn globals_are_visible_to_functions() {
    let compiled = assert_clean(
        "let counter = 0\n\
         fn tick()\n\
         \tcounter = counter + 1",
    );
    assert!(compiled
        .output
        .symbols
        .iter()
        .any(|s| s.kind == SymbolKind::Global && s.name == "counter"));
}

#[test]
fn forward_references_between_functions_need_a_declaration() {
    let compiled = check(
        "fn ping(n: i32)\n\
         \tpong(n)\n\
         fn pong(n: i32)\n\
         \tlet x = n",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::UndefinedReference);

    // With a signature up front the mutual reference is fine.
    assert_clean(
        "fn pong(n: i32)\n\
         fn ping(n: i32)\n\
         \tpong(n)\n\
         fn pong(n: i32)\n\
         \tlet x = n",
    );
}

#[test]
fn while_condition_must_be_bool_convertible() {
    assert_clean(
        "fn main()\n\
         \tlet i = 0\n\
         \twhile i < 3\n\
         \t\ti = i + 1",
    );
    let compiled = check(
        "type Point x i32 y i32\n\
         fn main()\n\
         \tlet p: Point\n\
         \twhile p\n\
         \t\tlet x = 1",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::IllegalConversion);
}

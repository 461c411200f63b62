mod common;
use common::check;

use cscript::diagnostics::Code;

#[test]
fn the_error_counter_matches_the_reported_diagnostics() {
    let compiled = check(
        "fn main()\n\
         \tlet a = missing_one\n\
         \tlet b = missing_two\n\
         \tlet c = 3",
    );
    assert_eq!(compiled.output.errors, 2);
    assert_eq!(compiled.diagnostics.len(), 2);
    assert!(compiled
        .diagnostics
        .iter()
        .all(|d| d.code == Code::UndefinedReference));
}

#[test]
fn a_clean_compile_leaves_the_counter_at_zero() {
    let compiled = check("fn main()\n\tlet a = 1 + 2 * 3");
    assert_eq!(compiled.output.errors, 0);
    assert!(compiled.diagnostics.is_empty());
}

#[test]
fn one_broken_subexpression_reports_once() {
    let compiled = check("fn main()\n\tlet a = (missing + 1) * 2 + sizeof(missing)");
    assert_eq!(compiled.output.errors, 1);
}

#[test]
fn errors_do_not_stop_later_declarations() {
    let compiled = check(
        "type Broken = NoSuchType\n\
         type Point x i32 y i32\n\
         fn main()\n\
         \tlet p: Point",
    );
    assert_eq!(compiled.output.errors, 1);
    // Point still registered and usable after the broken typedef.
    assert!(compiled.output.symbols.iter().any(|s| s.name == "Point"));
}

#[test]
fn diagnostics_carry_positions_and_rendered_text() {
    let compiled = check("fn main()\n\tlet a = missing");
    let d = &compiled.diagnostics[0];
    assert_eq!(d.line, 2);
    assert!(d.rendered.starts_with("error[E4002]:"));
    assert!(d.rendered.contains("--> test.cs:2:"));
    assert!(d.rendered.contains("let a = missing"));
}

#[test]
fn compilation_is_deterministic() {
    let source = "type Point x i32 y i32\n\
                  fn main()\n\
                  \tlet p: Point\n\
                  \tlet q = p.z + missing";
    let first = check(source);
    let second = check(source);
    assert_eq!(first.output, second.output);
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[test]
fn pathological_nesting_is_an_error_not_a_crash() {
    let source = format!("fn main()\n\tlet x = {}1{}", "(".repeat(80), ")".repeat(80));
    let compiled = check(&source);
    assert!(compiled
        .diagnostics
        .iter()
        .any(|d| d.code == Code::RecursionLimit));
}

#[test]
fn deeply_nested_types_hit_the_limit_too() {
    let stars = "*".repeat(80);
    let compiled = check(&format!("type Deep = {stars}i32"));
    assert_eq!(compiled.output.errors, 0);

    // Nesting through typedef expansion is bounded by the pool, not the
    // recursion limit; direct recursion comes from pfn parameter nesting.
    let opens = "(".repeat(80);
    let closes = ")".repeat(80);
    let compiled = check(&format!("type Deep = {opens}i32{closes} -> i32"));
    assert!(compiled.output.errors >= 1);
}

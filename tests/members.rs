use cscript::diagnostics::Code;

mod common;
use common::{assert_clean, check};

#[test]
fn arrow_reaches_through_a_pointer() {
    assert_clean(
        "type Point x i32 y i32\n\
         fn get_x(p: *Point) -> i32\n\
         \treturn p->x",
    );
}

#[test]
fn dot_does_not_reach_through_a_pointer() {
    let compiled = check(
        "type Point x i32 y i32\n\
         fn get_x(p: *Point) -> i32\n\
         \treturn p.x",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::InvalidOperands);
}

#[test]
fn dot_auto_dereferences_a_single_reference() {
    assert_clean(
        "type Point x i32 y i32\n\
         fn get_x(q: &Point) -> i32\n\
         \treturn q.x",
    );
}

#[test]
fn dot_works_on_a_plain_struct_value() {
    assert_clean(
        "type Point x i32 y i32\n\
         fn main()\n\
         \tlet p: Point\n\
         \tlet x = p.x",
    );
}

#[test]
fn unknown_members_are_reported() {
    let compiled = check(
        "type Point x i32 y i32\n\
         fn get(q: &Point) -> i32\n\
         \treturn q.z",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::UnknownMember);
}

#[test]
fn struct_literals_check_their_fields() {
    assert_clean(
        "type Point x i32 y i32\n\
         fn main()\n\
         \tlet p: Point = Point{ x: 1, y: 2 }",
    );

    let compiled = check(
        "type Point x i32 y i32\n\
         fn main()\n\
         \tlet p = Point{ z: 1 }",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::UnknownMember);

    let compiled = check(
        "type Point x i32 y i32\n\
         fn main()\n\
         \tlet p = Point{ x: 1, x: 2 }",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::Redeclaration);
}

#[test]
fn indexing_yields_the_element_type() {
    assert_clean(
        "fn first(xs: &[]i32) -> i32\n\
         \treturn xs[0]\n\
         fn main()\n\
         \tlet buf: [8]u8\n\
         \tlet b: u8 = buf[3]",
    );

    let compiled = check("fn main()\n\tlet x = 5\n\tlet y = x[0]");
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::InvalidOperands);
}

#[test]
fn variant_payloads_do_not_leak_into_the_type_namespace() {
    let compiled = check(
        "type Shape\n\
         \tCircle\n\
         \t\tr f64\n\
         \tSquare\n\
         fn main()\n\
         \tlet c: Circle",
    );
    assert_eq!(compiled.output.errors, 1);
    assert_eq!(compiled.diagnostics[0].code, Code::UnknownType);
}

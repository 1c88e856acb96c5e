// SPDX-License-Identifier: Apache-2.0

//! End-to-end conversion scenarios.

use rb2js::{convert, Comparison, EsLevel, Options, OrMode, Truthy};

fn options(eslevel: u16, filters: &[&str]) -> Options {
    let mut options = Options::default();
    options.eslevel = EsLevel::new(eslevel).expect("test eslevel");
    options.filters = filters.iter().map(|name| name.to_string()).collect();
    options
}

fn js(source: &str, options: &Options) -> String {
    convert(source, options).expect("conversion").js
}

#[test]
fn assignments_declare_at_first_use() {
    assert_eq!(
        js("a = 1; b = a + 2", &options(2015, &[])),
        "let a = 1; let b = a + 2"
    );
}

#[test]
fn es5_uses_var() {
    assert_eq!(
        js("a = 1; b = a + 2", &options(5, &[])),
        "var a = 1; var b = a + 2"
    );
}

#[test]
fn methods_return_their_last_expression() {
    assert_eq!(
        js("def f(x); x * 2; end", &options(2015, &["return"])),
        "function f(x) {return x * 2}"
    );
}

#[test]
fn each_blocks_lower_to_for_of() {
    assert_eq!(
        js("[1,2,3].each { |n| puts n }", &options(2015, &["functions"])),
        "for (const n of [1, 2, 3]) {console.log(n)}"
    );
}

#[test]
fn sibling_class_definitions_merge() {
    assert_eq!(
        js(
            "class A; def m; @x = 1; end; end; class A; def n; @x; end; end",
            &options(2015, &[])
        ),
        "class A { m() { this.x = 1 } n() { return this.x } }"
    );
}

#[test]
fn interpolation_uses_template_literals_on_es2015() {
    assert_eq!(
        js(r##""hello #{name}""##, &options(2015, &[])),
        "`hello ${name}`"
    );
}

#[test]
fn interpolation_concatenates_on_es5() {
    assert_eq!(
        js(r##""hello #{name}""##, &options(5, &[])),
        "\"hello \" + name"
    );
}

#[test]
fn comparison_option_selects_equality_operator() {
    let mut identity = options(2015, &[]);
    identity.comparison = Comparison::Identity;
    assert_eq!(js("a == b", &identity), "a === b");

    let equality = options(2015, &[]);
    assert_eq!(js("a == b", &equality), "a == b");
}

#[test]
fn pending_variables_hoist_to_scope_top() {
    assert_eq!(
        js("if true\n  x = 1\nend\nx", &options(2015, &[])),
        "let x;\nif (true) {x = 1};\nx"
    );
}

#[test]
fn operator_precedence_emits_minimal_parens() {
    assert_eq!(js("(a + b) * c", &options(2015, &[])), "(a + b) * c");
    assert_eq!(js("a * b + c", &options(2015, &[])), "a * b + c");
    assert_eq!(js("a * (b + c)", &options(2015, &[])), "a * (b + c)");
}

#[test]
fn inverted_comparison_collapses_negation() {
    assert_eq!(js("!(a < b)", &options(2015, &[])), "a >= b");
    assert_eq!(js("!(a == b)", &options(2015, &[])), "a != b");
}

#[test]
fn leading_comments_survive_in_place() {
    assert_eq!(
        js("# setup\na = 1", &options(2015, &[])),
        "// setup\nlet a = 1"
    );
}

#[test]
fn trailing_comments_stay_on_their_line() {
    assert_eq!(
        js("a = 1 # note\nb = 2", &options(2015, &[])),
        "let a = 1 // note\nlet b = 2"
    );
}

#[test]
fn orphan_comments_end_up_at_the_end() {
    let output = js("a = 1\n# done\n", &options(2015, &[]));
    assert!(output.ends_with("// done"), "unexpected output: {output}");
}

#[test]
fn strict_directive_is_first() {
    let mut strict = options(2015, &["strict"]);
    strict.strict = true;
    assert_eq!(js("a = 1", &strict), "\"use strict\"; let a = 1");
}

#[test]
fn while_loops_and_op_assignment() {
    assert_eq!(
        js("i = 0\nwhile i < 3\n  i += 1\nend", &options(2015, &[])),
        "let i = 0;\nwhile (i < 3) {i += 1}"
    );
}

#[test]
fn until_negates_its_condition() {
    assert_eq!(
        js("i = 0\nuntil i >= 3\n  i += 1\nend", &options(2015, &[])),
        "let i = 0;\nwhile (i < 3) {i += 1}"
    );
}

#[test]
fn post_test_loops_emit_do_while() {
    let output = js("i = 0\nbegin\n  i += 1\nend while i < 3", &options(2015, &[]));
    assert!(output.contains("do {i += 1} while (i < 3)"), "unexpected output: {output}");
}

#[test]
fn for_over_range_counts() {
    assert_eq!(
        js("for i in 1..3\n  puts i\nend", &options(2015, &["functions"])),
        "for (let i = 1; i <= 3; i++) {console.log(i)}"
    );
}

#[test]
fn rescue_lowers_to_try_catch() {
    assert_eq!(
        js(
            "begin\n  risky\nrescue => e\n  handle(e)\nend",
            &options(2015, &[])
        ),
        "try {risky} catch (e) {handle(e)}"
    );
}

#[test]
fn typed_rescue_guards_with_instanceof() {
    let output = js(
        "begin\n  risky\nrescue ArgumentError => e\n  handle(e)\nend",
        &options(2015, &[]),
    );
    assert!(
        output.contains("$EXCEPTION instanceof ArgumentError"),
        "unexpected output: {output}"
    );
    assert!(output.contains("throw $EXCEPTION"), "unexpected output: {output}");
}

#[test]
fn ensure_lowers_to_finally() {
    let output = js(
        "begin\n  risky\nensure\n  cleanup\nend",
        &options(2015, &[]),
    );
    assert!(output.contains("finally"), "unexpected output: {output}");
}

#[test]
fn case_with_literals_becomes_switch() {
    let output = js(
        "case x\nwhen 1\n  a\nwhen 2, 3\n  b\nelse\n  c\nend",
        &options(2015, &[]),
    );
    assert!(output.contains("switch (x)"), "unexpected output: {output}");
    assert!(output.contains("case 1:"), "unexpected output: {output}");
    assert!(output.contains("case 3:"), "unexpected output: {output}");
    assert!(output.contains("default:"), "unexpected output: {output}");
}

#[test]
fn case_with_ranges_becomes_if_chain() {
    let output = js(
        "case x\nwhen 1..9\n  a\nelse\n  b\nend",
        &options(2015, &[]),
    );
    assert!(
        output.contains("$case >= 1 && $case <= 9"),
        "unexpected output: {output}"
    );
}

#[test]
fn nullish_or_option() {
    let mut nullish = options(2020, &[]);
    nullish.or = OrMode::Nullish;
    assert_eq!(js("a || b", &nullish), "a ?? b");
    // Boolean-aware operands keep `||`.
    assert_eq!(js("a == 1 || b == 2", &nullish), "a == 1 || b == 2");
}

#[test]
fn ruby_truthiness_wraps_conditions() {
    let mut truthy = options(2015, &[]);
    truthy.truthy = Truthy::Ruby;
    let output = js("if x\n  y\nend", &truthy);
    assert!(output.contains("if (x != null)"), "unexpected output: {output}");

    // Comparisons are already boolean and stay unwrapped.
    let output = js("if x == 1\n  y\nend", &truthy);
    assert!(output.contains("if (x == 1)"), "unexpected output: {output}");
}

#[test]
fn identifiers_round_trip_verbatim() {
    let output = js("total = price * quantity", &options(2015, &[]));
    assert_eq!(output, "let total = price * quantity");
}

#[test]
fn csend_emits_optional_chaining_on_es2020() {
    assert_eq!(js("a&.b()", &options(2020, &[])), "a?.b()");
    assert_eq!(js("a&.b()", &options(2015, &[])), "a && a.b()");
}

#[test]
fn ternary_for_expression_position_if() {
    assert_eq!(
        js("x = if a then 1 else 2 end", &options(2015, &[])),
        "let x = a ? 1 : 2"
    );
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let err = convert("break", &options(2015, &[])).unwrap_err();
    assert!(matches!(err, rb2js::Error::IllegalControl { .. }));
}

#[test]
fn return_at_top_level_is_rejected() {
    let err = convert("return 1", &options(2015, &[])).unwrap_err();
    assert!(matches!(err, rb2js::Error::IllegalControl { .. }));
}

#[test]
fn unknown_filters_are_config_errors() {
    let err = convert("a = 1", &options(2015, &["bogus"])).unwrap_err();
    assert!(matches!(err, rb2js::Error::Config { .. }));
}

#[test]
fn binding_names_are_predeclared() {
    let mut bound = options(2015, &[]);
    bound.binding = vec!["x".to_string()];
    assert_eq!(js("x = 1", &bound), "x = 1");
}

#[test]
fn ivars_substitute_literal_values() {
    let mut with_ivars = options(2015, &[]);
    with_ivars
        .ivars
        .insert("name".to_string(), rb2js::IvarValue::Str("World".to_string()));
    assert_eq!(js("@name", &with_ivars), "\"World\"");
}

#[test]
fn sourcemap_entries_point_at_source_positions() {
    let result = convert("a = 1\nb = 2", &options(2015, &[])).expect("conversion");
    let map = result.sourcemap.expect("parsed nodes carry locations");
    assert!(!map.is_empty());
    assert_eq!(map[0].src_line, 1);
    assert!(map.iter().any(|entry| entry.src_line == 2));
}

#[test]
fn timestamps_cover_referenced_buffers() {
    let result = convert("a = 1", &options(2015, &[])).expect("conversion");
    assert_eq!(result.timestamps.len(), 1);
    // The anonymous buffer names no readable file.
    assert!(result.timestamps[0].1.is_none());
}

#[test]
fn reopened_class_with_statements_assigns_members() {
    let output = js(
        "class A; def m; 1; end; end; class A; puts 1; def n; 2; end; end",
        &options(2015, &["functions"]),
    );
    assert_eq!(output.matches("class A").count(), 1, "one declaration: {output}");
    assert!(
        output.contains("A.prototype.n = function"),
        "unexpected output: {output}"
    );
}

#[test]
fn yield_calls_the_implicit_block_parameter() {
    let output = js("def f\n  yield 1\nend", &options(2015, &[]));
    assert!(
        output.contains("function f(_implicitBlockYield)"),
        "unexpected output: {output}"
    );
    assert!(
        output.contains("_implicitBlockYield(1)"),
        "unexpected output: {output}"
    );
}

#[test]
fn negative_receiver_is_parenthesized() {
    assert_eq!(
        js("x = -1.to_s", &options(2015, &["functions"])),
        "let x = (-1).toString()"
    );
}

#[test]
fn float_formatting() {
    assert_eq!(js("x = 1.0", &options(2015, &[])), "let x = 1.0");
    assert_eq!(js("x = 1.5", &options(2015, &[])), "let x = 1.5");
}

#[test]
fn hash_emission_quotes_only_where_needed() {
    assert_eq!(
        js("h = {a: 1, \"b c\" => 2}", &options(2015, &[])),
        "let h = {a: 1, \"b c\": 2}"
    );
}

#[test]
fn raise_emits_throw() {
    assert_eq!(
        js("raise \"boom\"", &options(2015, &[])),
        "throw new Error(\"boom\")"
    );
    assert_eq!(
        js("raise ArgumentError, \"boom\"", &options(2015, &[])),
        "throw new ArgumentError(\"boom\")"
    );
}

// SPDX-License-Identifier: Apache-2.0

//! Filter-set behavior through the public API.

use rb2js::{convert, AutoExports, EsLevel, ModuleKind, Options};

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
fn camel_case_renames_methods_and_locals() {
    assert_eq!(
        js("foo_bar = my_func(1)", &options(2015, &["camelCase"])),
        "let fooBar = myFunc(1)"
    );
}

#[test]
fn camel_case_spares_constants_and_markers() {
    assert_eq!(
        js("_private_count = MAX_WIDTH", &options(2015, &["camelCase"])),
        "let _privateCount = MAX_WIDTH"
    );
}

#[test]
fn require_becomes_an_import() {
    assert_eq!(
        js("require 'foo'\nx = 1", &options(2015, &["esm"])),
        "import \"foo\";\nlet x = 1"
    );
}

#[test]
fn autoexports_wraps_top_level_definitions() {
    let mut exporting = options(2015, &["return", "esm"]);
    exporting.autoexports = AutoExports::On;
    assert_eq!(
        js("def f(x)\n  x\nend", &exporting),
        "export function f(x) {return x}"
    );
}

#[test]
fn autoexports_default_for_a_single_definition() {
    let mut exporting = options(2015, &["return", "esm"]);
    exporting.autoexports = AutoExports::Default;
    assert_eq!(
        js("def f(x)\n  x\nend", &exporting),
        "export default function f(x) {return x}"
    );
}

#[test]
fn autoimports_trigger_on_known_constants() {
    let mut importing = options(2015, &["esm"]);
    importing
        .autoimports
        .insert("LitElement".to_string(), "lit".to_string());
    let output = js("class A < LitElement\nend", &importing);
    assert!(
        output.starts_with("import { LitElement } from \"lit\""),
        "unexpected output: {output}"
    );
}

#[test]
fn cjs_module_surface() {
    let mut cjs = options(2015, &["esm"]);
    cjs.module = ModuleKind::Cjs;
    cjs.autoexports = AutoExports::On;
    let output = js("require 'fs'\ndef f(x)\n  x\nend", &cjs);
    assert!(output.contains("require(\"fs\")"), "unexpected output: {output}");
    assert!(
        output.contains("module.exports.f = f"),
        "unexpected output: {output}"
    );
}

#[test]
fn erb_template_compiles_to_a_render_method() {
    let output = js(
        "x = 1\n__END__\n<p><%= x %></p>",
        &options(2015, &["erb"]),
    );
    assert!(
        output.contains("function render() {return `<p>${x}</p>"),
        "unexpected output: {output}"
    );
}

#[test]
fn first_and_last_lower_to_indexing() {
    assert_eq!(js("a.first", &options(2015, &["functions"])), "a[0]");
    assert_eq!(js("a.last", &options(2022, &["functions"])), "a.at(-1)");
}

#[test]
fn include_becomes_includes_on_es2016() {
    assert_eq!(
        js("a.include?(x)", &options(2016, &["functions"])),
        "a.includes(x)"
    );
    assert_eq!(
        js("a.include?(x)", &options(2015, &["functions"])),
        "a.indexOf(x) != -1"
    );
}

#[test]
fn empty_test_compares_length() {
    assert_eq!(
        js("a.empty?", &options(2015, &["functions"])),
        "a.length == 0"
    );
}

#[test]
fn nullish_to_s_falls_back_to_empty_string() {
    let mut nullish = options(2020, &["functions"]);
    nullish.nullish_to_s = true;
    assert_eq!(js("y = x.to_s", &nullish), "let y = (x ?? \"\")");
}

#[test]
fn gsub_with_a_regexp_gains_the_global_flag() {
    assert_eq!(
        js("s.gsub(/a/, \"b\")", &options(2015, &["functions"])),
        "s.replace(/a/g, \"b\")"
    );
}

#[test]
fn each_with_index_stays_a_callback() {
    assert_eq!(
        js(
            "a.each_with_index { |v, i| puts v }",
            &options(2015, &["functions"])
        ),
        "a.forEach((v, i) => {console.log(v)})"
    );
}

#[test]
fn map_blocks_emit_concise_arrows() {
    assert_eq!(
        js("a.map { |x| x * 2 }", &options(2015, &["return", "functions"])),
        "a.map((x) => x * 2)"
    );
}

#[test]
fn default_and_rest_parameters() {
    assert_eq!(
        js("def f(a, b = 1, *rest)\n  rest\nend", &options(2015, &[])),
        "function f(a, b = 1, ...rest) {return rest}"
    );
}

#[test]
fn keyword_parameters_destructure_on_es2015() {
    assert_eq!(
        js("def f(a:, b: 2)\n  a + b\nend", &options(2015, &[])),
        "function f({ a, b = 2 }) {return a + b}"
    );
}

#[test]
fn method_form_gating_honors_exclude() {
    let mut gated = options(2015, &["functions"]);
    gated.exclude = vec!["first".to_string()];
    assert_eq!(js("a.first", &gated), "a.first");
}

#[test]
fn vanilla_zero_arg_calls_gain_parens() {
    assert_eq!(js("a.pop", &options(2015, &["functions"])), "a.pop()");
}

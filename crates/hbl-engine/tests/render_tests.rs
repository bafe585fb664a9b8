//! Rendering through all four strategies: interpreted and compiled, each
//! synchronous and asynchronous. Every case must render identically in all
//! of them.

use hbl_engine::{CompileOptions, Engine, Error, Method, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn engine() -> Engine {
    let engine = Engine::isolated();
    engine.add_method(Method::sync("Woot", |_| Ok(Value::from("Woot!"))).deterministic());
    engine
}

async fn render_all(engine: &Engine, text: &str, options: CompileOptions, data: &Value) -> String {
    let interpreted = engine
        .interpreted(text, &options)
        .unwrap()
        .render(data)
        .unwrap();
    let compiled = engine.compile(text, &options).unwrap().render(data).unwrap();
    let interpreted_async = engine
        .interpreted_async(text, &options)
        .unwrap()
        .render(data)
        .await
        .unwrap();
    let compiled_async = engine
        .compile_async(text, &options)
        .unwrap()
        .render(data)
        .await
        .unwrap();
    assert_eq!(interpreted, compiled, "interpreted vs compiled for {:?}", text);
    assert_eq!(interpreted, interpreted_async, "sync vs async for {:?}", text);
    assert_eq!(compiled, compiled_async, "compiled sync vs async for {:?}", text);
    compiled
}

macro_rules! render_case {
    ($name:ident, $template:expr, $data:tt, $expected:expr) => {
        render_case!($name, $template, CompileOptions::default(), $data, $expected);
    };
    ($name:ident, $template:expr, $options:expr, $data:tt, $expected:expr) => {
        #[tokio::test]
        async fn $name() {
            let data = Value::from(json!($data));
            let rendered = render_all(&engine(), $template, $options, &data).await;
            assert_eq!(rendered, $expected);
        }
    };
}

const SIMPLE_EACH: &str = "{{#each iterator}}\n- {{this}}\n{{/each}}";
const EACH_WITH_INDEX: &str = "{{#each iterator}}\n- {{@index}}: {{this}}\n{{/each}}";
const NESTED_IF: &str = "{{#if account}}You have an account!{{else if (gte age 18)}}You are an adult, but you have no account!{{else}}You have no account!{{/if}}";

render_case!(test_each_over_sequence, SIMPLE_EACH, {"iterator": [1, 2, 3]}, "- 1\n- 2\n- 3\n");
render_case!(
    test_each_over_four_items,
    SIMPLE_EACH,
    {"iterator": ["a", "b", "c", "d"]},
    "- a\n- b\n- c\n- d\n"
);
render_case!(
    test_each_over_object_values,
    SIMPLE_EACH,
    {"iterator": {"a": 1, "b": 2, "c": 3}},
    "- 1\n- 2\n- 3\n"
);
render_case!(test_each_over_missing_value, SIMPLE_EACH, {}, "");
render_case!(test_each_over_scalar_iterates_nothing, SIMPLE_EACH, {"iterator": 7}, "");
render_case!(
    test_each_exposes_index,
    EACH_WITH_INDEX,
    {"iterator": ["a", "b", "c"]},
    "- 0: a\n- 1: b\n- 2: c\n"
);
render_case!(
    test_each_exposes_keys_as_index,
    EACH_WITH_INDEX,
    {"iterator": {"a": 1, "b": 2, "c": 3}},
    "- a: 1\n- b: 2\n- c: 3\n"
);
render_case!(
    test_each_static_sequence,
    "{{#each (arr 1 2 3 4 5)}}\n- {{this}}\n{{/each}}",
    {},
    "- 1\n- 2\n- 3\n- 4\n- 5\n"
);
render_case!(
    test_each_long_sequence,
    "{{#each xs}}{{this}},{{/each}}",
    {"xs": [1, 2, 3, 4, 5, 6, 7, 8, 9]},
    "1,2,3,4,5,6,7,8,9,"
);
render_case!(
    test_each_else_branch,
    "{{#each xs}}{{this}}{{else}}none{{/each}}",
    {"xs": []},
    "none"
);
render_case!(
    test_each_first_and_last,
    "{{#each xs}}{{#if @first}}[{{/if}}{{this}}{{#if @last}}]{{else}},{{/if}}{{/each}}",
    {"xs": [1, 2, 3]},
    "[1,2,3]"
);
render_case!(
    test_each_key_alias,
    "{{#each obj}}{{@key}}={{this}};{{/each}}",
    {"obj": {"x": 1, "y": 2}},
    "x=1;y=2;"
);
render_case!(
    test_each_keys_are_never_first_or_last,
    "{{#each obj}}{{@key}}:{{@first}}:{{@last}};{{/each}}",
    {"obj": {"a": 1, "b": 2}},
    "a:false:false;b:false:false;"
);
render_case!(
    test_each_over_string_characters,
    "{{#each s}}[{{@index}}{{this}}]{{/each}}",
    {"s": "abc"},
    "[0a][1b][2c]"
);
render_case!(
    test_each_over_string_has_no_last,
    "{{#each s}}{{#if @first}}^{{/if}}{{this}}{{#if @last}}${{/if}}{{/each}}",
    {"s": "abc"},
    "^abc"
);
render_case!(
    test_each_add_with_traversal,
    "{{#each (arr 1 2 3 4 5)}}\n- {{add this ../addend}}\n{{/each}}",
    {"addend": 10},
    "- 11\n- 12\n- 13\n- 14\n- 15\n"
);
render_case!(
    test_nested_each_reads_enclosing_item,
    "{{#each groups}}{{#each items}}{{../name}}-{{this}} {{/each}}{{/each}}",
    {"groups": [{"name": "g1", "items": [1, 2]}, {"name": "g2", "items": [3]}]},
    "g1-1 g1-2 g2-3 "
);

render_case!(
    test_person,
    "{{name}} is {{age}} years old.",
    {"name": "John", "age": 12},
    "John is 12 years old."
);
render_case!(
    test_simple_if_true,
    "{{#if account}}You have an account!{{else}}You have no account!{{/if}}",
    {"account": true},
    "You have an account!"
);
render_case!(
    test_simple_if_false,
    "{{#if account}}You have an account!{{else}}You have no account!{{/if}}",
    {"account": false},
    "You have no account!"
);
render_case!(test_nested_if_account, NESTED_IF, {"account": true, "age": 12}, "You have an account!");
render_case!(
    test_nested_if_adult,
    NESTED_IF,
    {"account": false, "age": 18},
    "You are an adult, but you have no account!"
);
render_case!(test_nested_if_minor, NESTED_IF, {"account": false, "age": 12}, "You have no account!");
render_case!(
    test_unless_with_else,
    "{{#unless done}}todo{{else}}finished{{/unless}}",
    {"done": false},
    "todo"
);
render_case!(
    test_inverted_section,
    "{{^items}}empty{{/items}}",
    {"items": []},
    "empty"
);

render_case!(
    test_with_hash_only,
    "{{#with name='Bob'}}Hi {{name}}!{{/with}}",
    {"name": "John"},
    "Hi Bob!"
);
render_case!(
    test_with_default_username,
    "{{#with name=(default username email)}}Hi {{name}}!{{/with}}",
    {"username": "John"},
    "Hi John!"
);
render_case!(
    test_with_default_email,
    "{{#with name=(default username email)}}Hi {{name}}!{{/with}}",
    {"email": "j@j.com"},
    "Hi j@j.com!"
);
render_case!(test_with_no_arguments, "{{#with}}Hi Bob!{{/with}}", {}, "Hi Bob!");
render_case!(
    test_with_positional_value_wins_over_hash,
    "{{#with person name='Bob' city='Rome'}}{{name}} in {{city}}{{/with}}",
    {"person": {"name": "Ann"}},
    "Ann in Rome"
);
render_case!(
    test_with_block_param,
    "{{#with person as |p|}}{{p.name}} from {{../city}}{{/with}}",
    {"person": {"name": "Ann"}, "city": "Oslo"},
    "Ann from Oslo"
);

render_case!(test_match_first_pair, "{{match x 'a' 1 'b' 2 3}}", {"x": "a"}, "1");
render_case!(test_match_second_pair, "{{match x 'a' 1 'b' 2 3}}", {"x": "b"}, "2");
render_case!(test_match_fallback, "{{match x 'a' 1 'b' 2 3}}", {"x": "c"}, "3");
render_case!(test_match_hash_hit, "{{match x a=1 b=2 3}}", {"x": "a"}, "1");
render_case!(test_match_hash_second, "{{match x a=1 b=2 3}}", {"x": "b"}, "2");
render_case!(
    test_match_falsy_hash_hit_falls_through,
    "{{match x a=0 b=\"B\" \"fallback\"}}",
    {"x": "a"},
    "fallback"
);
render_case!(test_match_hash_fallback, "{{match x a=1 b=2 3}}", {"x": "c"}, "3");

render_case!(
    test_json_of_hash_object,
    "{{json (obj name='John' age=12)}}",
    CompileOptions::no_escape(),
    {},
    r#"{"name":"John","age":12}"#
);
render_case!(
    test_json_of_positional_object,
    "{{json (obj 'name' 'John' 'age' 12)}}",
    CompileOptions::no_escape(),
    {},
    r#"{"name":"John","age":12}"#
);
render_case!(
    test_json_is_escaped_by_default,
    "{{json (obj a=1)}}",
    {},
    "{&quot;a&quot;:1}"
);

render_case!(
    test_implicit_iterator,
    "{{#people}}\n- {{name}}: {{age}}\n{{/people}}",
    {"people": [{"name": "John", "age": 12}, {"name": "Jane", "age": 24}]},
    "- John: 12\n- Jane: 24\n"
);
render_case!(
    test_section_over_object,
    "{{#person}}{{name}}{{/person}}",
    {"person": {"name": "Ann"}},
    "Ann"
);
render_case!(test_section_over_true, "{{#flag}}yes{{/flag}}", {"flag": true}, "yes");
render_case!(
    test_section_else,
    "{{#flag}}yes{{else}}no{{/flag}}",
    {"flag": 0},
    "no"
);

render_case!(test_fallthrough_to_helper, "{{Woot}}", {}, "Woot!");
render_case!(test_fallthrough_prefers_data, "{{Woot}}", {"Woot": "Yay!"}, "Yay!");

render_case!(test_unescaped, "{{{name}}}", {"name": "<b>John</b>"}, "<b>John</b>");
render_case!(test_ampersand_unescaped, "{{& name}}", {"name": "<b>John</b>"}, "<b>John</b>");
render_case!(
    test_escaped,
    "{{name}}",
    {"name": "<b>\"Tom\" & 'Jerry'</b>"},
    "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
);
render_case!(test_null_renders_empty, "[{{missing}}]", {}, "[]");
render_case!(
    test_object_renders_as_json,
    "{{{obj}}}",
    {"obj": {"a": [1, 2]}},
    r#"{"a":[1,2]}"#
);

render_case!(
    test_block_params_bind_item_and_index,
    "{{#each items as |item i|}}{{i}}={{item}};{{/each}}",
    {"items": ["a", "b"]},
    "0=a;1=b;"
);
render_case!(
    test_bare_paths_stay_local_without_recurse,
    "{{#each items}}{{title}}:{{this}} {{/each}}",
    {"title": "T", "items": [1, 2]},
    ":1 :2 "
);
render_case!(
    test_recurse_resolves_bare_paths_outward,
    "{{#each items}}{{title}}:{{this}} {{/each}}",
    CompileOptions::recurse(),
    {"title": "T", "items": [1, 2]},
    "T:1 T:2 "
);

render_case!(
    test_comparison_and_arithmetic_helpers,
    "{{add 1 2}} {{subtract 5}} {{multiply 3 4}} {{divide 1 4}} {{mod 7 4}} {{#if (lt 1 2)}}lt{{/if}}",
    {},
    "3 -5 12 0.25 3 lt"
);
render_case!(
    test_data_helpers,
    "{{uppercase name}} {{lowercase name}} {{truncate name 2}} {{min 3 1 2}} {{max 3 1 2}}",
    {"name": "Ann"},
    "ANN ann An 1 3"
);
render_case!(
    test_get_and_merge,
    "{{get (merge a b) 'x.y'}}",
    {"a": {"x": {"y": 1}}, "b": {"z": 2}},
    "1"
);
render_case!(test_length_of_sequence, "{{xs.length}}", {"xs": [1, 2, 3]}, "3");
render_case!(
    test_trim_markers,
    "Hello {{~name}}!\n{{#if a~}}\n   yes\n{{~/if}}",
    {"name": "Bob", "a": true},
    "HelloBob!\nyes"
);
render_case!(
    test_comments_render_nothing,
    "a{{! note }}b{{!-- {{x}} --}}c",
    {},
    "abc"
);

const COLOR_PAGE: &str = r#"<div class="simple-1" style="background-color: blue; border: 1px solid black">
    <div class="colors">
        <span class="hello">Hello {{name}}! <strong>You have {{messageCount}} messages!</strong></span>
        {{#if colors}}
        <ul>
            {{#each colors}}
            <li class="color">{{this}}</li>
            {{/each}}
        </ul>
        {{else}}
        <div>
            No colors!
        </div>
        {{/if}}
    </div>
    <button type="button" class="{{#if primary}}primary{{else}}secondary{{/if}}">Click me!</button>
</div>"#;

render_case!(
    test_color_page,
    COLOR_PAGE,
    {"name": "George Washington", "messageCount": 999, "colors": ["red", "green", "blue"], "primary": true},
    r#"<div class="simple-1" style="background-color: blue; border: 1px solid black">
    <div class="colors">
        <span class="hello">Hello George Washington! <strong>You have 999 messages!</strong></span>
        <ul>
            <li class="color">red</li>
            <li class="color">green</li>
            <li class="color">blue</li>
        </ul>
    </div>
    <button type="button" class="primary">Click me!</button>
</div>"#
);
render_case!(
    test_color_page_without_colors,
    COLOR_PAGE,
    {"name": "Ann", "messageCount": 0, "colors": [], "primary": false},
    r#"<div class="simple-1" style="background-color: blue; border: 1px solid black">
    <div class="colors">
        <span class="hello">Hello Ann! <strong>You have 0 messages!</strong></span>
        <div>
            No colors!
        </div>
    </div>
    <button type="button" class="secondary">Click me!</button>
</div>"#
);

#[tokio::test]
async fn test_compiled_template_is_reusable() {
    let engine = engine();
    let template = engine
        .compile(SIMPLE_EACH, &CompileOptions::default())
        .unwrap();
    for n in 0..6 {
        let items: Vec<i64> = (0..n).collect();
        let expected: String = items.iter().map(|i| format!("- {}\n", i)).collect();
        let data = Value::from(json!({ "iterator": items }));
        assert_eq!(template.render(&data).unwrap(), expected);
    }
}

#[test]
fn test_render_data_serializes_input() {
    #[derive(serde::Serialize)]
    struct Person {
        name: &'static str,
        age: u32,
    }
    let engine = engine();
    let template = engine
        .compile("{{name}} is {{age}}", &CompileOptions::default())
        .unwrap();
    let rendered = template
        .render_data(&Person {
            name: "Jane",
            age: 24,
        })
        .unwrap();
    assert_eq!(rendered, "Jane is 24");
}

#[test]
fn test_alias_resolves_to_existing_operation() {
    let engine = engine();
    engine.alias("plus", "add").unwrap();
    let template = engine
        .compile("{{plus 1 2}}", &CompileOptions::default())
        .unwrap();
    assert_eq!(template.render(&Value::Null).unwrap(), "3");
    assert!(matches!(
        engine.alias("minus", "nope"),
        Err(Error::UnknownOperation(name)) if name == "nope"
    ));
}

#[test]
fn test_unknown_operation_fails_at_build_time() {
    let engine = engine();
    let options = CompileOptions::default();
    assert!(matches!(
        engine.compile("{{nope 1}}", &options),
        Err(Error::UnknownOperation(name)) if name == "nope"
    ));
    assert!(matches!(
        engine.interpreted("{{nope 1}}", &options),
        Err(Error::UnknownOperation(name)) if name == "nope"
    ));
    assert!(matches!(
        engine.compile_async("{{#if a}}{{nope 1}}{{/if}}", &options),
        Err(Error::UnknownOperation(name)) if name == "nope"
    ));
    assert!(matches!(
        engine.interpreted_async("{{#if a}}{{nope 1}}{{/if}}", &options),
        Err(Error::UnknownOperation(name)) if name == "nope"
    ));
}

#[test]
fn test_syntax_errors_are_reported() {
    let engine = engine();
    let err = engine
        .compile("{{#if a}}never closed", &CompileOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, Error::Syntax(_)));
    assert!(err.to_string().contains("Unclosed block"), "{}", err);
}

#[test]
fn test_log_returns_its_argument() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let engine = engine();
    let template = engine
        .compile("{{log name}}", &CompileOptions::default())
        .unwrap();
    let data = Value::from(json!({"name": "Ann"}));
    assert_eq!(template.render(&data).unwrap(), "Ann");
}

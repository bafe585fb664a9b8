use std::sync::{Arc, Mutex};
use std::time::Duration;

use hbl_engine::{Arguments, CompileOptions, Engine, Error, Method, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

/// `slow ms value` resolves to `value` after sleeping `ms` milliseconds.
fn engine() -> Engine {
    let engine = Engine::isolated();
    engine.add_method(Method::asynchronous("slow", |args: Arguments| async move {
        let millis = args.get(0).as_i64().unwrap_or(0).max(0) as u64;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok::<_, Error>(args.get(1).clone())
    }));
    engine
}

async fn render_both(engine: &Engine, text: &str, options: CompileOptions, data: &Value) -> String {
    let interpreted = engine
        .interpreted_async(text, &options)
        .unwrap()
        .render(data)
        .await
        .unwrap();
    let compiled = engine
        .compile_async(text, &options)
        .unwrap()
        .render(data)
        .await
        .unwrap();
    assert_eq!(interpreted, compiled, "interpreted vs compiled for {:?}", text);
    compiled
}

#[tokio::test]
async fn test_async_helper_in_interpolation() {
    let rendered = render_both(
        &engine(),
        "Hello {{slow 5 name}}!",
        CompileOptions::default(),
        &Value::from(json!({"name": "Ann"})),
    )
    .await;
    assert_eq!(rendered, "Hello Ann!");
}

#[tokio::test]
async fn test_each_awaits_iterations_in_order() {
    let data = Value::from(json!({
        "items": [
            {"ms": 20, "label": "a"},
            {"ms": 1, "label": "b"},
            {"ms": 10, "label": "c"}
        ]
    }));
    let rendered = render_both(
        &engine(),
        "{{#each items}}{{slow this.ms this.label}}{{/each}}",
        CompileOptions::default(),
        &data,
    )
    .await;
    assert_eq!(rendered, "abc");
}

#[tokio::test]
async fn test_object_fields_are_awaited_left_to_right() {
    let rendered = render_both(
        &engine(),
        "{{json (obj a=(slow 10 1) b=(slow 1 2))}}",
        CompileOptions::no_escape(),
        &Value::Null,
    )
    .await;
    assert_eq!(rendered, r#"{"a":1,"b":2}"#);
}

#[tokio::test]
async fn test_async_selector_and_conditions() {
    let data = Value::from(json!({"xs": [1, 2], "flag": true}));
    let rendered = render_both(
        &engine(),
        "{{#each (slow 1 xs)}}{{this}}{{/each}}{{#if (slow 1 flag)}}!{{/if}}{{#with (slow 1 xs) as |list|}}{{list.length}}{{/with}}",
        CompileOptions::default(),
        &data,
    )
    .await;
    assert_eq!(rendered, "12!2");
}

#[tokio::test]
async fn test_sync_only_templates_render_asynchronously() {
    let rendered = render_both(
        &engine(),
        "{{#each xs}}{{add this 1}}{{/each}}",
        CompileOptions::default(),
        &Value::from(json!({"xs": [1, 2, 3]})),
    )
    .await;
    assert_eq!(rendered, "234");
}

#[test]
fn test_sync_build_rejects_async_helpers() {
    let engine = engine();
    let options = CompileOptions::default();
    assert!(matches!(
        engine.compile("{{slow 1 'x'}}", &options),
        Err(Error::AsyncOperation(name)) if name == "slow"
    ));
    assert!(matches!(
        engine.interpreted("{{#if a}}{{slow 1 'x'}}{{/if}}", &options),
        Err(Error::AsyncOperation(name)) if name == "slow"
    ));
}

#[tokio::test]
async fn test_async_partial_fails_only_when_rendered_synchronously() {
    let engine = engine();
    let options = CompileOptions::default();
    engine
        .register_partial("Later", "{{slow 1 'later'}}", &options)
        .unwrap();

    let template = engine.compile("{{>Later}}", &options).unwrap();
    assert!(matches!(
        template.render(&Value::Null),
        Err(Error::AsyncOperation(name)) if name == "slow"
    ));

    let template = engine.compile_async("{{>Later}}", &options).unwrap();
    assert_eq!(template.render(&Value::Null).await.unwrap(), "later");
}

#[tokio::test]
async fn test_interpreted_partials_are_classified_when_registered() {
    let engine = engine();
    let options = CompileOptions::default();
    engine
        .register_partial_interpreted("Now", "{{add 1 2}}", &options)
        .unwrap();
    engine
        .register_partial_interpreted("Soon", "{{#if a}}{{slow 1 a}}{{/if}}", &options)
        .unwrap();
    assert!(engine.registry().get("Now").unwrap().is_sync);
    assert!(!engine.registry().get("Soon").unwrap().is_sync);

    let template = engine.interpreted_async("{{>Now}}-{{>Soon}}", &options).unwrap();
    let data = Value::from(json!({"a": "x"}));
    assert_eq!(template.render(&data).await.unwrap(), "3-x");
}

/// `mark` and `tick` record their argument when called, synchronously and
/// after a short sleep respectively.
fn recording_engine() -> (Engine, Arc<Mutex<Vec<i64>>>) {
    let engine = Engine::isolated();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    engine.add_method(Method::sync("mark", move |args: &Arguments| {
        log.lock().unwrap().push(args.get(0).as_i64().unwrap_or(-1));
        Ok(args.get(0).clone())
    }));
    let log = seen.clone();
    engine.add_method(Method::asynchronous("tick", move |args: Arguments| {
        let log = log.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            log.lock().unwrap().push(args.get(0).as_i64().unwrap_or(-1));
            Ok::<_, Error>(args.get(0).clone())
        }
    }));
    engine.add_method(Method::sync("keep", |_: &Arguments| Ok(Value::from(""))));
    (engine, seen)
}

#[tokio::test]
async fn test_arguments_are_evaluated_in_source_order() {
    let (engine, seen) = recording_engine();
    let options = CompileOptions::default();
    let sync_text = "{{keep (mark 1) named=(mark 2) (mark 3) last=(mark 4)}}";
    let async_text = "{{keep (tick 1) named=(tick 2) (mark 3) last=(tick 4)}}";

    engine
        .interpreted(sync_text, &options)
        .unwrap()
        .render(&Value::Null)
        .unwrap();
    engine
        .compile(sync_text, &options)
        .unwrap()
        .render(&Value::Null)
        .unwrap();
    engine
        .interpreted_async(async_text, &options)
        .unwrap()
        .render(&Value::Null)
        .await
        .unwrap();
    engine
        .compile_async(async_text, &options)
        .unwrap()
        .render(&Value::Null)
        .await
        .unwrap();

    let expected: Vec<i64> = [1, 2, 3, 4].repeat(4);
    assert_eq!(*seen.lock().unwrap(), expected);
}

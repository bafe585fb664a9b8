use std::cmp::Ordering;

use hbl_core::Value;
use pretty_assertions::assert_eq;
use serde_json::json;

fn v(json: serde_json::Value) -> Value {
    Value::from(json)
}

#[test]
fn truthiness_follows_template_rules() {
    for falsy in [json!(null), json!(false), json!(0), json!(""), json!([])] {
        assert!(!v(falsy.clone()).truthy(), "{} should be falsy", falsy);
    }
    assert!(!Value::Float(f64::NAN).truthy());
    assert!(!Value::map(Vec::new()).truthy());
    for truthy in [json!(true), json!(1), json!(-0.5), json!("0"), json!([0]), json!({})] {
        assert!(v(truthy.clone()).truthy(), "{} should be truthy", truthy);
    }
}

#[test]
fn output_form() {
    assert_eq!(Value::Null.to_output(), "");
    assert_eq!(Value::Float(3.0).to_output(), "3");
    assert_eq!(Value::Float(2.5).to_output(), "2.5");
    assert_eq!(v(json!([1, "a", null])).to_output(), "1,a,");
    assert_eq!(
        v(json!({"name": "John", "age": 12})).to_output(),
        r#"{"name":"John","age":12}"#
    );
}

#[test]
fn json_conversion_keeps_key_order() {
    let value = v(json!({"z": 1, "a": 2, "m": {"y": true, "b": null}}));
    let keys: Vec<&str> = value
        .as_object()
        .map(|object| object.keys().map(String::as_str).collect())
        .unwrap_or_default();
    assert_eq!(keys, vec!["z", "a", "m"]);
    assert_eq!(value.to_json(), json!({"z": 1, "a": 2, "m": {"y": true, "b": null}}));
}

#[test]
fn integral_floats_serialize_as_integers() {
    let value = Value::array([Value::Float(4.0), Value::Float(0.25)]);
    assert_eq!(serde_json::to_string(&value).unwrap(), "[4,0.25]");
}

#[test]
fn path_lookup() {
    let value = v(json!({"person": {"names": ["Ann", "Bo"]}}));
    assert_eq!(value.get_dotted("person.names.1"), Value::from("Bo"));
    assert_eq!(value.get_dotted("person.names.length"), Value::Int(2));
    assert_eq!(value.get_dotted("person.missing.deeper"), Value::Null);
    assert_eq!(value.get_dotted(""), value);
}

#[test]
fn map_keys_match_by_rendered_form() {
    let map = Value::map([(Value::Int(1), Value::from("one")), (Value::from("two"), Value::Int(2))]);
    assert_eq!(map.get("1"), Some(&Value::from("one")));
    assert_eq!(map.get("two"), Some(&Value::Int(2)));
    assert_eq!(map.get("three"), None);
}

#[test]
fn loose_equality_coerces_scalars() {
    assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
    assert!(Value::from("1").loose_eq(&Value::Int(1)));
    assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
    assert!(!Value::Null.loose_eq(&Value::Int(0)));
    assert!(Value::Null.loose_eq(&Value::Null));
    assert!(!Value::from("a").loose_eq(&Value::from("b")));
    assert!(!Value::from("1").strict_eq(&Value::Int(1)));
}

#[test]
fn comparison_is_numeric_unless_both_strings() {
    assert_eq!(Value::Int(2).compare(&Value::from("10")), Some(Ordering::Less));
    assert_eq!(Value::from("2").compare(&Value::from("10")), Some(Ordering::Greater));
    assert_eq!(Value::Int(1).compare(&Value::from("x")), None);
}

#[test]
fn number_coercion() {
    assert_eq!(Value::from(" 42 ").to_number(), 42.0);
    assert_eq!(Value::from("").to_number(), 0.0);
    assert_eq!(Value::Bool(true).to_number(), 1.0);
    assert_eq!(v(json!([7])).to_number(), 7.0);
    assert!(v(json!({})).to_number().is_nan());
}

//! Verify request building, response normalization and path helpers against
//! the JSON test vectors stored in `test-vectors/`.
//!
//! Bodies are compared as parsed JSON where the vector declares JSON, so
//! field ordering never causes false negatives.

use precog_core::path::{file_target, last_path_element, parent_path, sanitize_path};
use precog_core::response::{classify, normalize};
use precog_core::{Body, Content, Envelope, Error, HttpMethod, JsonPolicy, QueryValue, RawResponse, RequestOptions};
use serde_json::Value;

fn vectors(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap()
}

fn str_pairs(value: &Value) -> Vec<(String, String)> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|h| {
                    let arr = h.as_array().unwrap();
                    (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

fn query_value(value: &Value) -> QueryValue {
    match value {
        Value::Null => QueryValue::Null,
        Value::String(s) => QueryValue::Str(s.clone()),
        Value::Bool(b) => QueryValue::Bool(*b),
        Value::Number(n) => n.as_i64().map(QueryValue::Int).unwrap_or_else(|| QueryValue::Float(n.as_f64().unwrap())),
        other => panic!("unsupported query value: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[test]
fn path_test_vectors() {
    let v = vectors(include_str!("../../test-vectors/paths.json"));

    for case in v["sanitize"].as_array().unwrap() {
        let (input, expected) = (case[0].as_str().unwrap(), case[1].as_str().unwrap());
        assert_eq!(sanitize_path(input), expected, "sanitize {input:?}");
        assert_eq!(sanitize_path(expected), expected, "sanitize is idempotent for {input:?}");
    }
    for case in v["parent"].as_array().unwrap() {
        let (input, expected) = (case[0].as_str().unwrap(), case[1].as_str().unwrap());
        assert_eq!(parent_path(input), expected, "parent {input:?}");
    }
    for case in v["last"].as_array().unwrap() {
        let (input, expected) = (case[0].as_str().unwrap(), case[1].as_str().unwrap());
        assert_eq!(last_path_element(input), expected, "last {input:?}");
    }
    for case in v["file_target"].as_array().unwrap() {
        let path = case["path"].as_str().unwrap();
        let result = file_target(path, "needs a file");
        if case["error"].as_bool().unwrap_or(false) {
            assert!(matches!(result, Err(Error::InvalidPath(_))), "file_target {path:?}");
        } else {
            let (dir, name) = result.unwrap();
            assert_eq!(dir, case["dir"].as_str().unwrap(), "dir of {path:?}");
            assert_eq!(name, case["name"].as_str().unwrap(), "name of {path:?}");
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_test_vectors() {
    let v = vectors(include_str!("../../test-vectors/requests.json"));

    for case in v["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let method = HttpMethod::parse(input["method"].as_str().unwrap()).unwrap();

        let mut options = RequestOptions::new(method, input["url"].as_str().unwrap());
        for pair in input["query"].as_array().into_iter().flatten() {
            options = options.query(pair[0].as_str().unwrap(), query_value(&pair[1]));
        }
        for (k, val) in str_pairs(&input["headers"]) {
            options = options.header(&k, &val);
        }
        if let Some(auth) = input["basic_auth"].as_array() {
            options = options.basic_auth(auth[0].as_str().unwrap(), auth[1].as_str().unwrap());
        }
        if !input["json"].is_null() {
            options = options.json(input["json"].clone());
        }
        if let Some(text) = input["text"].as_str() {
            options = options.content(Body::Text(text.to_string()));
        }

        let req = options.build().unwrap();
        let expected = &case["expected_request"];
        assert_eq!(
            req.method,
            HttpMethod::parse(expected["method"].as_str().unwrap()).unwrap(),
            "{name}: method"
        );
        assert_eq!(req.url, expected["url"].as_str().unwrap(), "{name}: url");
        assert_eq!(req.headers, str_pairs(&expected["headers"]), "{name}: headers");

        match (&req.body, expected["body"].as_str()) {
            (None, None) => {}
            (Some(actual), Some(want)) if !input["json"].is_null() => {
                let actual: Value = serde_json::from_str(actual).unwrap();
                let want: Value = serde_json::from_str(want).unwrap();
                assert_eq!(actual, want, "{name}: body");
            }
            (Some(actual), Some(want)) => assert_eq!(actual, want, "{name}: body"),
            (actual, want) => panic!("{name}: body {actual:?} vs {want:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn response_test_vectors() {
    let v = vectors(include_str!("../../test-vectors/responses.json"));

    for case in v["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let raw = &case["raw"];
        let response = RawResponse {
            status: raw["status"].as_u64().unwrap() as u16,
            status_text: raw["status_text"].as_str().unwrap().to_string(),
            header_blob: raw["header_blob"].as_str().unwrap().to_string(),
            content_type: raw["content_type"].as_str().map(str::to_string),
            body: raw["body"].as_str().map(str::to_string),
        };

        let expected = &case["expected"];
        let envelope: Envelope = match classify(normalize(response, JsonPolicy::Lenient).unwrap()) {
            Ok(envelope) => {
                assert!(expected["ok"].as_bool().unwrap(), "{name}: expected failure");
                envelope
            }
            Err(Error::Http(envelope)) => {
                assert!(!expected["ok"].as_bool().unwrap(), "{name}: expected success");
                *envelope
            }
            Err(other) => panic!("{name}: unexpected error {other}"),
        };

        assert_eq!(envelope.status as u64, expected["status"].as_u64().unwrap(), "{name}: status");
        let kind = match envelope.content {
            Content::Json(_) => "json",
            Content::Text(_) => "text",
            Content::Empty => "empty",
        };
        assert_eq!(kind, expected["kind"].as_str().unwrap(), "{name}: kind");
        assert_eq!(envelope.content.to_value(), expected["content"], "{name}: content");
    }
}

#[test]
fn strict_policy_rejects_unparseable_json() {
    let raw = RawResponse {
        status: 200,
        status_text: "OK".to_string(),
        header_blob: "Content-Type: application/json".to_string(),
        content_type: None,
        body: Some("{oops".to_string()),
    };
    assert!(matches!(
        normalize(raw, JsonPolicy::Strict),
        Err(Error::Deserialization(_))
    ));
}

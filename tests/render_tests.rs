use std::collections::HashMap;

use axum::http::{StatusCode, header};
use blogicum_web::{
    JsonRenderer,
    models::RenderedTemplate,
    render::{Context, DETAIL_TEMPLATE, RenderError, Renderer},
};
use serde_json::json;

#[test]
fn test_context_keeps_serialized_values_by_key() {
    let context = Context::new()
        .insert("title", "Hello")
        .unwrap()
        .insert("tags", &["a", "b"])
        .unwrap();

    assert_eq!(context.get("title"), Some(&json!("Hello")));
    assert_eq!(context.get("tags"), Some(&json!(["a", "b"])));
    assert_eq!(context.get("missing"), None);
}

#[test]
fn test_later_insert_replaces_earlier_value() {
    let context = Context::new()
        .insert("form", &json!({ "errors": {} }))
        .unwrap()
        .insert("form", &json!({ "errors": { "text": ["This field is required."] } }))
        .unwrap();

    assert_eq!(
        context.get("form").unwrap()["errors"]["text"][0],
        "This field is required."
    );
    assert_eq!(context.into_value().as_object().unwrap().len(), 1);
}

#[test]
fn test_unserializable_value_names_the_key() {
    // JSON objects only take string keys.
    let mut grid = HashMap::new();
    grid.insert((1u8, 2u8), "cell");

    let err = Context::new().insert("grid", &grid).unwrap_err();

    let RenderError::Context { key, .. } = &err;
    assert_eq!(key, "grid");
    assert!(err.to_string().contains("`grid`"));
}

#[tokio::test]
async fn test_json_renderer_wraps_template_and_context() {
    let context = Context::new().insert("post", &json!({ "id": 7 })).unwrap();

    let response = JsonRenderer.render(DETAIL_TEMPLATE, context).unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let page: RenderedTemplate = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(page.template, "blog/detail.html");
    assert_eq!(page.context, json!({ "post": { "id": 7 } }));
}

//! Message template rendering.
//!
//! Templates are plain text with `{{key}}` placeholders filled from the
//! notification's variable bag. Values are JSON; strings are inserted as-is
//! and other scalars are rendered without quotes. Placeholders with no
//! matching variable are left intact.

use serde_json::Value;

/// Substitute `{{key}}` placeholders in `template` from `variables`.
pub fn render(template: &str, variables: &Value) -> String {
    let Some(map) = variables.as_object() else {
        return template.to_string();
    };

    let mut rendered = template.to_string();
    for (key, value) in map {
        let placeholder = format!("{{{{{}}}}}", key);
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &render_value(value));
        }
    }
    rendered
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitutes_strings() {
        let out = render(
            "Hi {{name}}, your order {{order}} shipped",
            &json!({"name": "Ada", "order": "A-17"}),
        );
        assert_eq!(out, "Hi Ada, your order A-17 shipped");
    }

    #[test]
    fn test_non_string_values_unquoted() {
        let out = render(
            "{{count}} items, total {{total}}, rush: {{rush}}",
            &json!({"count": 3, "total": 12.5, "rush": true}),
        );
        assert_eq!(out, "3 items, total 12.5, rush: true");
    }

    #[test]
    fn test_unknown_placeholder_left_intact() {
        let out = render("Hi {{name}}, code {{code}}", &json!({"name": "Ada"}));
        assert_eq!(out, "Hi Ada, code {{code}}");
    }

    #[test]
    fn test_repeated_placeholder() {
        let out = render("{{x}} and {{x}}", &json!({"x": "y"}));
        assert_eq!(out, "y and y");
    }

    #[test]
    fn test_null_renders_empty() {
        let out = render("note:{{note}}", &json!({"note": null}));
        assert_eq!(out, "note:");
    }

    #[test]
    fn test_non_object_bag_is_noop() {
        let out = render("Hi {{name}}", &json!("not an object"));
        assert_eq!(out, "Hi {{name}}");
    }
}

use super::Diagnostic;

/// One JSON object per diagnostic, on a single line.
pub fn render(d: &Diagnostic) -> String {
    serde_json::to_string(d).unwrap_or_else(|_| {
        r#"{"phase":"runtime","message":"internal error serializing diagnostic"}"#.to_string()
    })
}

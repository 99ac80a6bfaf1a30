use std::collections::BTreeMap;

pub(crate) fn format_label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<String>>()
        .join(",")
}

/// Snake-case name of an HTTP status code, e.g. 422 -> `unprocessable_entity`.
/// Used as the `error` label on failure counters.
pub(crate) fn status_name(code: u16) -> String {
    hyper::http::StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .map_or_else(
            || format!("http_{code}"),
            |reason| reason.to_lowercase().replace([' ', '-'], "_"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_name() {
        assert_eq!(status_name(404), "not_found");
        assert_eq!(status_name(409), "conflict");
        assert_eq!(status_name(422), "unprocessable_entity");
        assert_eq!(status_name(799), "http_799");
    }
}

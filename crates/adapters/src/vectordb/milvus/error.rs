//! Milvus error mapping helpers.

use codeatlas_shared::{COLLECTION_LIMIT_MARKER, ErrorClass, ErrorCode, ErrorEnvelope};

/// Context payload attached to Milvus error envelopes.
#[derive(Debug, Clone)]
pub(crate) struct MilvusErrorContext {
    /// Operation label for tracing failures.
    pub operation: &'static str,
    /// Collection name, when the request is collection-scoped.
    pub collection_name: Option<String>,
    /// REST endpoint path, when available.
    pub endpoint: Option<String>,
}

/// Maps Milvus REST error payloads and status codes into shared envelopes.
///
/// The collection-limit signal is special-cased: the backend message is
/// preserved byte for byte and the envelope is marked non-retriable, so
/// nothing upstream wraps or retries it.
pub(crate) fn map_rest_error(
    message: impl Into<String>,
    http_status: Option<u16>,
    ctx: &MilvusErrorContext,
) -> ErrorEnvelope {
    let message = message.into();

    if message
        .to_ascii_lowercase()
        .contains(COLLECTION_LIMIT_MARKER)
    {
        return with_context(ErrorEnvelope::collection_limit(message), ctx, http_status);
    }

    let code = choose_code_from_message(&message, http_status);
    let class = match code.code() {
        "vdb_timeout" | "vdb_connection" | "vdb_unavailable" => ErrorClass::Retriable,
        _ => ErrorClass::NonRetriable,
    };
    with_context(
        ErrorEnvelope::unexpected(code, message, class),
        ctx,
        http_status,
    )
}

/// Maps reqwest transport errors into shared error envelopes.
pub(crate) fn map_rest_transport_error(
    error: &reqwest::Error,
    ctx: &MilvusErrorContext,
) -> ErrorEnvelope {
    let envelope = if error.is_timeout() {
        ErrorEnvelope::unexpected(
            ErrorCode::new("vector", "vdb_timeout"),
            format!("Milvus REST request timed out: {error}"),
            ErrorClass::Retriable,
        )
    } else if error.is_connect() {
        ErrorEnvelope::unexpected(
            ErrorCode::new("vector", "vdb_connection"),
            format!("Milvus REST connection failed: {error}"),
            ErrorClass::Retriable,
        )
    } else {
        ErrorEnvelope::unexpected(
            ErrorCode::new("vector", "vdb_unknown"),
            format!("Milvus REST request failed: {error}"),
            ErrorClass::NonRetriable,
        )
    };
    with_context(envelope, ctx, None)
}

/// Distinguishable "collection not found" kind; callers may create on
/// demand.
pub(crate) fn collection_not_found(collection: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("vector", "vdb_collection_not_found"),
        format!("collection not found: {collection}"),
    )
}

fn choose_code_from_message(message: &str, http_status: Option<u16>) -> ErrorCode {
    if let Some(status) = http_status {
        if status == 401 || status == 403 {
            return ErrorCode::new("vector", "vdb_auth");
        }
        if status == 408 || status == 504 {
            return ErrorCode::new("vector", "vdb_timeout");
        }
        if status == 503 {
            return ErrorCode::new("vector", "vdb_unavailable");
        }
    }

    let lowered = message.to_ascii_lowercase();
    if lowered.contains("not found") || lowered.contains("can't find collection") {
        return ErrorCode::new("vector", "vdb_collection_not_found");
    }
    if lowered.contains("timeout") {
        return ErrorCode::new("vector", "vdb_timeout");
    }
    if lowered.contains("unauthorized") || lowered.contains("forbidden") || lowered.contains("auth")
    {
        return ErrorCode::new("vector", "vdb_auth");
    }
    if lowered.contains("schema") || lowered.contains("datatype") || lowered.contains("field") {
        return ErrorCode::new("vector", "vdb_schema_mismatch");
    }
    if lowered.contains("expr") || lowered.contains("filter") {
        return ErrorCode::new("vector", "vdb_query_invalid");
    }

    ErrorCode::new("vector", "vdb_unknown")
}

fn with_context(
    mut envelope: ErrorEnvelope,
    ctx: &MilvusErrorContext,
    http_status: Option<u16>,
) -> ErrorEnvelope {
    envelope = envelope.with_metadata("operation", ctx.operation);
    if let Some(status) = http_status {
        envelope = envelope.with_metadata("http_status", status.to_string());
    }
    if let Some(collection) = ctx.collection_name.as_ref() {
        envelope = envelope.with_metadata("collection", collection.clone());
    }
    if let Some(endpoint) = ctx.endpoint.as_ref() {
        envelope = envelope.with_metadata("endpoint", endpoint.clone());
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeatlas_shared::is_collection_limit;

    fn ctx() -> MilvusErrorContext {
        MilvusErrorContext {
            operation: "milvus_rest.test",
            collection_name: Some("code_chunks_abc12345".to_owned()),
            endpoint: Some("/collections/create".to_owned()),
        }
    }

    #[test]
    fn quota_message_becomes_collection_limit_verbatim() {
        let backend = format!("quota exceeded: {COLLECTION_LIMIT_MARKER} (limit 100)");
        let envelope = map_rest_error(backend.clone(), None, &ctx());
        assert!(is_collection_limit(&envelope));
        assert_eq!(envelope.message, backend);
        assert!(!envelope.class.is_retriable());
    }

    #[test]
    fn auth_status_maps_to_auth_code() {
        let envelope = map_rest_error("HTTP 401: nope", Some(401), &ctx());
        assert_eq!(envelope.code, ErrorCode::new("vector", "vdb_auth"));
    }

    #[test]
    fn timeouts_are_retriable() {
        let envelope = map_rest_error("request timeout", None, &ctx());
        assert_eq!(envelope.code, ErrorCode::new("vector", "vdb_timeout"));
        assert!(envelope.class.is_retriable());
    }

    #[test]
    fn missing_collection_is_distinguishable() {
        let envelope = map_rest_error("collection not found: xyz", None, &ctx());
        assert_eq!(
            envelope.code,
            ErrorCode::new("vector", "vdb_collection_not_found")
        );
    }
}

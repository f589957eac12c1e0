//! Error rendering for the CLI surface.

use codeatlas_shared::{ErrorCode, ErrorEnvelope, is_collection_limit};

/// Render an error envelope for the terminal.
///
/// The collection-limit message is passed through untouched; it is the
/// caller-facing contract, compared by equality upstream.
pub fn render_error(error: &ErrorEnvelope) -> String {
    if is_collection_limit(error) {
        return error.message.clone();
    }
    if error.is_cancelled() {
        return "cancelled".to_owned();
    }
    if error.code == ErrorCode::already_indexing() {
        return format!("error: {} (wait for the current run to finish)", error.message);
    }
    format!("error [{}]: {}", error.code, error.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeatlas_shared::COLLECTION_LIMIT_MARKER;

    #[test]
    fn collection_limit_renders_verbatim() {
        let message = format!("backend says: {COLLECTION_LIMIT_MARKER} (=100)");
        let error = ErrorEnvelope::collection_limit(message.clone());
        assert_eq!(render_error(&error), message);
    }

    #[test]
    fn ordinary_errors_carry_their_code() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad path");
        assert_eq!(render_error(&error), "error [core:invalid_input]: bad path");
    }
}

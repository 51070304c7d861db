/**
 * Error-to-Envelope Conversion
 *
 * The wire layer never forwards raw errors; each backend failure kind
 * maps to exactly one of the diagnostic envelopes. Validation-class
 * failures become `systemmessage`; protocol failures become `error`
 * tagged with the event that caused them.
 */
use crate::backend::error::BackendError;
use crate::shared::Envelope;

impl BackendError {
    /// Convert this failure into the envelope the caller receives.
    pub fn into_envelope(self, original_event: &str) -> Envelope {
        match self {
            BackendError::Validation(shared) => Envelope::system_message(shared.to_string()),
            BackendError::Authorization { message }
            | BackendError::Conflict { message } => Envelope::system_message(message),
            BackendError::NotFound { what } => {
                Envelope::system_message(format!("{what} not found"))
            }
            BackendError::TransientExternal { component, .. } => Envelope::system_message(
                format!("{component} is unavailable, please retry shortly"),
            ),
            BackendError::Protocol { message } => Envelope::error(original_event, message),
            BackendError::Database(err) => match classify_database_error(&err) {
                DatabaseFailure::RowNotFound => {
                    Envelope::system_message("requested record not found")
                }
                DatabaseFailure::UniqueViolation => {
                    Envelope::system_message("a record with that name already exists")
                }
                DatabaseFailure::Other => {
                    Envelope::system_message("storage is unavailable, please retry shortly")
                }
            },
        }
    }
}

enum DatabaseFailure {
    RowNotFound,
    UniqueViolation,
    Other,
}

fn classify_database_error(err: &sqlx::Error) -> DatabaseFailure {
    match err {
        sqlx::Error::RowNotFound => DatabaseFailure::RowNotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => DatabaseFailure::UniqueViolation,
        _ => DatabaseFailure::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::SharedError;

    #[test]
    fn test_validation_becomes_systemmessage() {
        let envelope = BackendError::Validation(SharedError::validation("value", "required"))
            .into_envelope("editDoc");
        assert_eq!(envelope.event, "systemmessage");
        assert!(envelope.data["message"]
            .as_str()
            .unwrap()
            .contains("required"));
    }

    #[test]
    fn test_protocol_becomes_error_with_original_event() {
        let envelope = BackendError::protocol("unknown event").into_envelope("bogusEvent");
        assert_eq!(envelope.event, "error");
        assert_eq!(envelope.data["originalEvent"], "bogusEvent");
    }

    #[test]
    fn test_not_found_becomes_systemmessage() {
        let envelope = BackendError::not_found("document").into_envelope("enterDoc");
        assert_eq!(envelope.event, "systemmessage");
        assert_eq!(envelope.data["message"], "document not found");
    }

    #[test]
    fn test_transient_names_component() {
        let envelope =
            BackendError::transient("hot tier", "timed out").into_envelope("editDoc");
        assert_eq!(envelope.event, "systemmessage");
        assert!(envelope.data["message"]
            .as_str()
            .unwrap()
            .contains("hot tier"));
    }
}

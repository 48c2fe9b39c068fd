use ureq::http::StatusCode;

/// The façade operation a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Upload,
    Download,
    DownloadRange,
    Delete,
    List,
    Describe,
}

/// Domain-level meaning of a status code for a given operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// 2xx without content where the operation expects a JSON document.
    EmptyResult,
    /// Deleting something already absent.
    NotFoundIsSuccess,
    Failure { status: u16, reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure { .. })
    }
}

/// Map a status code to its outcome for `kind`.
///
/// Transport errors never reach this table; they are propagated as-is.
pub fn classify(status: u16, kind: OperationKind) -> Outcome {
    match (status, kind) {
        (204, OperationKind::List | OperationKind::Describe) => Outcome::EmptyResult,
        (200..=299, _) => Outcome::Success,
        (404, OperationKind::Delete) => Outcome::NotFoundIsSuccess,
        (code, _) => Outcome::Failure {
            status: code,
            reason: reason_phrase(code).to_owned(),
        },
    }
}

/// Canonical reason phrase for `status`.
pub(crate) fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OperationKind; 6] = [
        OperationKind::Upload,
        OperationKind::Download,
        OperationKind::DownloadRange,
        OperationKind::Delete,
        OperationKind::List,
        OperationKind::Describe,
    ];

    #[test]
    fn success_codes_for_every_operation() {
        for kind in ALL {
            assert_eq!(classify(200, kind), Outcome::Success, "{kind:?}");
            assert_eq!(classify(201, kind), Outcome::Success, "{kind:?}");
        }
        assert_eq!(
            classify(206, OperationKind::DownloadRange),
            Outcome::Success
        );
    }

    #[test]
    fn delete_not_found_is_success() {
        let outcome = classify(404, OperationKind::Delete);
        assert_eq!(outcome, Outcome::NotFoundIsSuccess);
        assert!(outcome.is_success());
    }

    #[test]
    fn not_found_fails_everywhere_except_delete() {
        for kind in ALL.into_iter().filter(|k| *k != OperationKind::Delete) {
            assert_eq!(
                classify(404, kind),
                Outcome::Failure {
                    status: 404,
                    reason: "Not Found".to_owned()
                },
                "{kind:?}"
            );
        }
    }

    #[test]
    fn delete_other_errors_still_fail() {
        for code in [400, 401, 403, 429, 500, 503] {
            assert!(!classify(code, OperationKind::Delete).is_success(), "{code}");
        }
    }

    #[test]
    fn no_content_is_empty_result_for_json_operations() {
        assert_eq!(classify(204, OperationKind::List), Outcome::EmptyResult);
        assert_eq!(classify(204, OperationKind::Describe), Outcome::EmptyResult);
        assert_eq!(classify(204, OperationKind::Delete), Outcome::Success);
    }

    #[test]
    fn unknown_code_keeps_status() {
        match classify(599, OperationKind::Upload) {
            Outcome::Failure { status, reason } => {
                assert_eq!(status, 599);
                assert_eq!(reason, "Unknown Status");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

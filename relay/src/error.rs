use std::error;
use std::fmt;

/// Convenient result type for relay operations using [`RelayError`] as the error type.
///
/// Most fallible functions in this crate return this type.
pub type RelayResult<T> = Result<T, RelayError>;

/// Main error type for relay operations.
///
/// [`RelayError`] can represent a single classified error, an error with
/// additional dynamic detail, or multiple aggregated errors (for fan-out
/// operations where several independent attempts may fail).
#[derive(Debug, Clone)]
pub struct RelayError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
///
/// Not exposed directly; use [`RelayError`] methods instead.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors
    Many(Vec<RelayError>),
}

/// Categories of errors that can occur while reconciling triggers and
/// relaying messages.
///
/// The classification drives handling policy: stream kinds restart the
/// watch, resolution and dispatch kinds are swallowed at the worker, and
/// lifecycle kinds surface through the registry.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Trigger stream errors
    TriggerStreamFailed,
    CursorExpired,
    InvalidTriggerResource,

    // Channel errors
    SubscriptionFailed,
    AckFailed,
    AuthenticationFailed,

    // Delivery errors
    ServiceResolutionFailed,
    DispatchFailed,

    // State & workflow errors
    InvalidState,
    TriggerWorkerPanic,

    // Unknown / Uncategorized
    Unknown,
}

impl RelayError {
    /// Creates a [`RelayError`] containing multiple aggregated errors.
    ///
    /// Useful when several independent operations fail and all failures
    /// should be reported rather than just the first one.
    pub fn many(errors: Vec<RelayError>) -> RelayError {
        RelayError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    ///
    /// For single errors, returns a vector with one element. For aggregated
    /// errors, returns a flattened vector of all kinds.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For aggregated errors, returns the detail of the first error that has
    /// one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &RelayError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for RelayError {}

/// Creates a [`RelayError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for RelayError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RelayError {
        RelayError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates a [`RelayError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for RelayError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RelayError {
        RelayError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Creates a [`RelayError`] from a vector of errors for aggregation.
impl<E> From<Vec<E>> for RelayError
where
    E: Into<RelayError>,
{
    fn from(errors: Vec<E>) -> RelayError {
        RelayError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, relay_error};

    #[test]
    fn test_simple_error_creation() {
        let err = RelayError::from((ErrorKind::SubscriptionFailed, "Channel subscription failed"));
        assert_eq!(err.kind(), ErrorKind::SubscriptionFailed);
        assert_eq!(err.detail(), None);
        assert_eq!(err.kinds(), vec![ErrorKind::SubscriptionFailed]);
    }

    #[test]
    fn test_error_with_detail() {
        let err = RelayError::from((
            ErrorKind::ServiceResolutionFailed,
            "Service listing failed",
            "connection refused".to_string(),
        ));
        assert_eq!(err.kind(), ErrorKind::ServiceResolutionFailed);
        assert_eq!(err.detail(), Some("connection refused"));
        assert_eq!(err.kinds(), vec![ErrorKind::ServiceResolutionFailed]);
    }

    #[test]
    fn test_multiple_errors() {
        let errors = vec![
            RelayError::from((ErrorKind::DispatchFailed, "Delivery attempt failed")),
            RelayError::from((ErrorKind::AckFailed, "Acknowledgment failed")),
            RelayError::from((ErrorKind::TriggerStreamFailed, "Stream disconnected")),
        ];
        let multi_err = RelayError::many(errors);

        assert_eq!(multi_err.kind(), ErrorKind::DispatchFailed);
        assert_eq!(
            multi_err.kinds(),
            vec![
                ErrorKind::DispatchFailed,
                ErrorKind::AckFailed,
                ErrorKind::TriggerStreamFailed
            ]
        );
        assert_eq!(multi_err.detail(), None);
    }

    #[test]
    fn test_multiple_errors_with_detail() {
        let errors = vec![
            RelayError::from((
                ErrorKind::DispatchFailed,
                "Delivery attempt failed",
                "svc1.default:8080 unreachable".to_string(),
            )),
            RelayError::from((ErrorKind::AckFailed, "Acknowledgment failed")),
        ];
        let multi_err = RelayError::many(errors);

        assert_eq!(multi_err.detail(), Some("svc1.default:8080 unreachable"));
    }

    #[test]
    fn test_empty_multiple_errors() {
        let multi_err = RelayError::many(vec![]);
        assert_eq!(multi_err.kind(), ErrorKind::Unknown);
        assert_eq!(multi_err.kinds(), vec![]);
        assert_eq!(multi_err.detail(), None);
    }

    #[test]
    fn test_error_equality() {
        let err1 = RelayError::from((ErrorKind::CursorExpired, "Cursor no longer valid"));
        let err2 = RelayError::from((ErrorKind::CursorExpired, "Cursor no longer valid"));
        let err3 = RelayError::from((ErrorKind::TriggerStreamFailed, "Stream disconnected"));

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::from((ErrorKind::TriggerStreamFailed, "Watch session ended"));
        let display_str = format!("{err}");
        assert!(display_str.contains("TriggerStreamFailed"));
        assert!(display_str.contains("Watch session ended"));
    }

    #[test]
    fn test_error_display_with_detail() {
        let err = RelayError::from((
            ErrorKind::ServiceResolutionFailed,
            "Service listing failed",
            "selector app=fn1 rejected".to_string(),
        ));
        let display_str = format!("{err}");
        assert!(display_str.contains("ServiceResolutionFailed"));
        assert!(display_str.contains("Service listing failed"));
        assert!(display_str.contains("selector app=fn1 rejected"));
    }

    #[test]
    fn test_multiple_errors_display() {
        let errors = vec![
            RelayError::from((ErrorKind::DispatchFailed, "Delivery attempt failed")),
            RelayError::from((ErrorKind::AckFailed, "Acknowledgment failed")),
        ];
        let multi_err = RelayError::many(errors);
        let display_str = format!("{multi_err}");
        assert!(display_str.contains("Multiple errors"));
        assert!(display_str.contains("2 total"));
    }

    #[test]
    fn test_macro_usage() {
        let err = relay_error!(ErrorKind::InvalidTriggerResource, "Trigger has no name");
        assert_eq!(err.kind(), ErrorKind::InvalidTriggerResource);
        assert_eq!(err.detail(), None);

        let err_with_detail = relay_error!(
            ErrorKind::SubscriptionFailed,
            "Channel subscription failed",
            "subscription sub1 not found in project proj1"
        );
        assert_eq!(err_with_detail.kind(), ErrorKind::SubscriptionFailed);
        assert!(err_with_detail.detail().unwrap().contains("sub1"));
    }

    #[test]
    fn test_bail_macro() {
        fn test_function() -> RelayResult<i32> {
            bail!(ErrorKind::InvalidState, "Test error");
        }

        fn test_function_with_detail() -> RelayResult<i32> {
            bail!(
                ErrorKind::TriggerWorkerPanic,
                "Test error",
                "Additional detail"
            );
        }

        let result = test_function();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let result = test_function_with_detail();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TriggerWorkerPanic);
        assert!(err.detail().unwrap().contains("Additional detail"));
    }

    #[test]
    fn test_nested_multiple_errors() {
        let inner_errors = vec![
            RelayError::from((ErrorKind::DispatchFailed, "Inner error 1")),
            RelayError::from((ErrorKind::AckFailed, "Inner error 2")),
        ];
        let inner_multi = RelayError::many(inner_errors);

        let outer_errors = vec![
            inner_multi,
            RelayError::from((ErrorKind::TriggerStreamFailed, "Outer error")),
        ];
        let outer_multi = RelayError::many(outer_errors);

        let kinds = outer_multi.kinds();
        assert_eq!(kinds.len(), 3);
        assert!(kinds.contains(&ErrorKind::DispatchFailed));
        assert!(kinds.contains(&ErrorKind::AckFailed));
        assert!(kinds.contains(&ErrorKind::TriggerStreamFailed));
    }
}

use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ModerationStatus {
    Pending => "pending",
    Failed => "failed",
    Completed => "completed",
});

impl ModerationStatus {
    /// Completed and Failed admit no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

// Pipeline stage an error-log entry belongs to.
str_enum!(ModerationStage {
    DocumentExtraction => "document_extraction",
    FaceComparison => "face_comparison",
    Liveness => "liveness",
    FieldSanitization => "field_sanitization",
    FieldMatch => "field_match",
    FaceThreshold => "face_threshold",
    LivenessCheck => "liveness_check",
});

// Terminal: provider rejection or malformed input, never retried.
// TransientExhausted: transient provider fault that outlived the retry budget.
// CheckFailed: a verification check ran but did not pass.
str_enum!(ErrorKind {
    Terminal => "terminal",
    TransientExhausted => "transient_exhausted",
    CheckFailed => "check_failed",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ModerationStatus::Pending,
            ModerationStatus::Failed,
            ModerationStatus::Completed,
        ] {
            assert_eq!(ModerationStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_invalid_enum() {
        let err = ModerationStatus::from_str("approved").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!ModerationStatus::Pending.is_terminal());
        assert!(ModerationStatus::Failed.is_terminal());
        assert!(ModerationStatus::Completed.is_terminal());
    }

    #[test]
    fn stage_display_uses_snake_case() {
        assert_eq!(ModerationStage::FaceThreshold.to_string(), "face_threshold");
        assert_eq!(ErrorKind::TransientExhausted.to_string(), "transient_exhausted");
    }
}

use crate::error::{ArgumentErrors, DomainError, DomainResult};

/// Builder that accumulates validation failures.
///
/// Every requirement is checked even after an earlier one failed; `finish`
/// surfaces the whole list as one `InvalidArgument` error.
#[derive(Debug, Default)]
pub struct Validation {
    errors: Vec<String>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, ok: bool, message: &str) -> Self {
        if !ok {
            self.errors.push(message.to_string());
        }
        self
    }

    pub fn require_not_blank(self, value: &str, message: &str) -> Self {
        let blank = value.trim().is_empty();
        self.require(!blank, message)
    }

    pub fn finish(self) -> DomainResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InvalidArgument(ArgumentErrors::new(
                self.errors,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_when_all_requirements_hold() {
        let result = Validation::new()
            .require(true, "never recorded")
            .require_not_blank("camera-1", "camera name cannot be empty")
            .finish();

        assert!(result.is_ok());
    }

    #[test]
    fn accumulates_every_failure() {
        let result = Validation::new()
            .require(false, "first failure")
            .require_not_blank("  ", "second failure")
            .require(true, "not recorded")
            .finish();

        match result {
            Err(DomainError::InvalidArgument(errors)) => {
                assert_eq!(errors.messages(), ["first failure", "second failure"]);
            }
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn display_joins_messages() {
        let err = Validation::new()
            .require(false, "a")
            .require(false, "b")
            .finish()
            .unwrap_err();

        assert_eq!(err.to_string(), "invalid argument: a; b");
    }
}

//! Unit tests for VmError and ErrorKind

use core_types::{ErrorKind, VmError, VmResult};

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_error_kind_display_names() {
        assert_eq!(ErrorKind::Compile.to_string(), "compile error");
        assert_eq!(ErrorKind::Bounds.to_string(), "bounds error");
        assert_eq!(ErrorKind::Assembly.to_string(), "assembly error");
    }

    #[test]
    fn test_error_kind_is_copy() {
        let kind = ErrorKind::Memory;
        let copy = kind;
        assert_eq!(kind, copy);
    }
}

#[cfg(test)]
mod vm_error_tests {
    use super::*;

    fn failing() -> VmResult<i64> {
        Err(VmError::bounds("frame stack overflow"))
    }

    fn propagates() -> VmResult<i64> {
        let value = failing()?;
        Ok(value + 1)
    }

    #[test]
    fn test_error_propagates_with_question_mark() {
        let error = propagates().unwrap_err();
        assert_eq!(error.kind, ErrorKind::Bounds);
        assert_eq!(error.message, "frame stack overflow");
    }

    #[test]
    fn test_error_is_std_error() {
        let error: Box<dyn std::error::Error> = Box::new(VmError::runtime("boom"));
        assert_eq!(error.to_string(), "runtime error: boom");
    }

    #[test]
    fn test_shorthand_constructors() {
        assert_eq!(VmError::compile("x").kind, ErrorKind::Compile);
        assert_eq!(VmError::runtime("x").kind, ErrorKind::Runtime);
        assert_eq!(VmError::memory("x").kind, ErrorKind::Memory);
    }
}

//! Unit tests for the bytecode model

mod test_program;

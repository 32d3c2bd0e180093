//! Unit tests for Variant and format_g

use core_types::{format_g, ValueKind, Variant};

#[test]
fn test_int_word_is_identity() {
    assert_eq!(Variant::Int(-9).to_word(), -9);
    assert_eq!(Variant::from_word(-9, ValueKind::Int), Variant::Int(-9));
}

#[test]
fn test_pointer_word_round_trip() {
    let word = Variant::Ptr(0x1000).to_word();
    assert_eq!(Variant::from_word(word, ValueKind::Ptr).as_ptr(), Some(0x1000));
}

#[test]
fn test_kind_reports_interpretation() {
    assert_eq!(Variant::Float(1.0).kind(), ValueKind::Float);
    assert_eq!(Variant::Char(b'x').kind(), ValueKind::Char);
}

#[test]
fn test_format_g_matches_printf() {
    assert_eq!(format_g(500500.0), "500500");
    assert_eq!(format_g(3.5), "3.5");
    assert_eq!(format_g(123456789.0), "1.23457e+08");
    assert_eq!(format_g(-0.25), "-0.25");
}

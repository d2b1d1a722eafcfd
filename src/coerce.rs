// rockgauge/src/coerce.rs

//! Permissive conversion of raw `OptionValue`s into the native types of the option setters.
//!
//! Configuration files written by hand mix `10`, `"10"`, `10.0` and `"true"` freely, so every
//! target type accepts any representation that unambiguously denotes a value of that type.

use crate::error::{StoreError, StoreResult};
use crate::source::OptionValue;

pub trait Coerce: Sized {
  /// Human readable target type, used in error messages.
  const EXPECTED: &'static str;

  fn coerce_from(value: &OptionValue) -> Option<Self>;

  fn coerce(key: &str, value: &OptionValue) -> StoreResult<Self> {
    Self::coerce_from(value).ok_or_else(|| StoreError::Coercion {
      key: key.to_string(),
      expected: Self::EXPECTED,
      value: value.to_string(),
    })
  }
}

fn float_to_integer(x: f64) -> Option<i128> {
  if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e30 {
    Some(x as i128)
  } else {
    None
  }
}

fn integer_of(value: &OptionValue) -> Option<i128> {
  match value {
    OptionValue::Bool(b) => Some(*b as i128),
    OptionValue::Int(i) => Some(*i as i128),
    OptionValue::UInt(u) => Some(*u as i128),
    OptionValue::Float(x) => float_to_integer(*x),
    OptionValue::Str(s) => {
      let s = s.trim();
      s.parse::<i128>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(float_to_integer))
    }
  }
}

macro_rules! coerce_integer {
  ($($ty:ty => $expected:literal),* $(,)?) => {
    $(
      impl Coerce for $ty {
        const EXPECTED: &'static str = $expected;

        fn coerce_from(value: &OptionValue) -> Option<Self> {
          integer_of(value).and_then(|i| <$ty>::try_from(i).ok())
        }
      }
    )*
  };
}

coerce_integer! {
  i32 => "a 32-bit integer",
  i64 => "a 64-bit integer",
  u32 => "an unsigned 32-bit integer",
  u64 => "an unsigned 64-bit integer",
  usize => "an unsigned integer",
}

impl Coerce for f64 {
  const EXPECTED: &'static str = "a number";

  fn coerce_from(value: &OptionValue) -> Option<Self> {
    match value {
      OptionValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
      OptionValue::Int(i) => Some(*i as f64),
      OptionValue::UInt(u) => Some(*u as f64),
      OptionValue::Float(x) => Some(*x),
      OptionValue::Str(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
    }
  }
}

impl Coerce for bool {
  const EXPECTED: &'static str = "a boolean";

  fn coerce_from(value: &OptionValue) -> Option<Self> {
    match value {
      OptionValue::Bool(b) => Some(*b),
      OptionValue::Int(i) => Some(*i != 0),
      OptionValue::UInt(u) => Some(*u != 0),
      OptionValue::Float(x) => Some(*x != 0.0),
      OptionValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "off" => Some(false),
        _ => None,
      },
    }
  }
}

impl Coerce for String {
  const EXPECTED: &'static str = "a string";

  fn coerce_from(value: &OptionValue) -> Option<Self> {
    Some(value.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn integers_accept_numeric_strings_and_whole_floats() {
    assert_eq!(i32::coerce_from(&OptionValue::from("4096")), Some(4096));
    assert_eq!(i32::coerce_from(&OptionValue::from(" 12 ")), Some(12));
    assert_eq!(u64::coerce_from(&OptionValue::Float(1073741824.0)), Some(1 << 30));
    assert_eq!(u64::coerce_from(&OptionValue::from("1073741824.0")), Some(1 << 30));
    assert_eq!(i32::coerce_from(&OptionValue::Bool(true)), Some(1));
    assert_eq!(usize::coerce_from(&OptionValue::UInt(7)), Some(7));
  }

  #[test]
  fn integers_reject_fractions_overflow_and_negatives_for_unsigned() {
    assert_eq!(i32::coerce_from(&OptionValue::Float(1.5)), None);
    assert_eq!(i32::coerce_from(&OptionValue::Int(i64::from(i32::MAX) + 1)), None);
    assert_eq!(u64::coerce_from(&OptionValue::Int(-1)), None);
    assert_eq!(u64::coerce_from(&OptionValue::from("lots")), None);
  }

  #[test]
  fn booleans_accept_common_spellings() {
    for s in ["true", "TRUE", "t", "1", "yes", "On"] {
      assert_eq!(bool::coerce_from(&OptionValue::from(s)), Some(true), "{}", s);
    }
    for s in ["false", "F", "0", "no", "off"] {
      assert_eq!(bool::coerce_from(&OptionValue::from(s)), Some(false), "{}", s);
    }
    assert_eq!(bool::coerce_from(&OptionValue::Int(2)), Some(true));
    assert_eq!(bool::coerce_from(&OptionValue::from("maybe")), None);
  }

  #[test]
  fn floats_accept_every_numeric_form() {
    assert_eq!(f64::coerce_from(&OptionValue::Int(10)), Some(10.0));
    assert_eq!(f64::coerce_from(&OptionValue::from("9.5")), Some(9.5));
    assert_eq!(f64::coerce_from(&OptionValue::from("NaN")), None);
  }

  #[test]
  fn coercion_error_names_key_and_value() {
    let err = i32::coerce("max-open-files", &OptionValue::from("many")).unwrap_err();
    match err {
      StoreError::Coercion { key, expected, value } => {
        assert_eq!(key, "max-open-files");
        assert_eq!(expected, "a 32-bit integer");
        assert_eq!(value, "many");
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }
}

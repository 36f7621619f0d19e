//! Value traits and the static-or-reactive property variant.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::observable::Observable;

/// Equality used to decide whether an assignment is a change.
///
/// Follows ECMAScript `SameValue`: floats compare by bit pattern except
/// that every NaN equals every other NaN. So `NaN -> NaN` is not a change,
/// while `0.0 -> -0.0` is.
pub trait SameValue {
    /// Whether `self` and `other` are the same value.
    fn same_value(&self, other: &Self) -> bool;
}

/// Implement [`SameValue`] through `PartialEq`.
///
/// Use this for your own value types that contain no floats, or whose
/// float fields should compare with ordinary `==`.
#[macro_export]
macro_rules! same_value_via_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::reactive::SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_via_eq!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str, serde_json::Value,
);

macro_rules! float_same_value {
    ($($ty:ty),*) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
                }
            }
        )*
    };
}

float_same_value!(f32, f64);

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: SameValue> SameValue for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

macro_rules! tuple_same_value {
    ($(($($name:ident $idx:tt),+)),*) => {
        $(
            impl<$($name: SameValue),+> SameValue for ($($name,)+) {
                fn same_value(&self, other: &Self) -> bool {
                    $(self.$idx.same_value(&other.$idx))&&+
                }
            }
        )*
    };
}

tuple_same_value!((A 0, B 1), (A 0, B 1, C 2), (A 0, B 1, C 2, D 3));

/// Bound for anything an observable can hold.
///
/// Serde bounds are required because any root value may be transmitted in
/// a hydration payload.
pub trait Value: Clone + Send + Sync + SameValue + Serialize + DeserializeOwned + 'static {}

impl<T> Value for T where T: Clone + Send + Sync + SameValue + Serialize + DeserializeOwned + 'static {}

/// A property value that is either fixed or driven by an observable.
#[derive(Debug, Clone)]
pub enum ReactiveValue<T: Value> {
    /// Set once, never updated.
    Static(T),
    /// Bound to an observable; updated on every change.
    Dynamic(Observable<T>),
}

impl<T: Value> ReactiveValue<T> {
    /// Whether this value is backed by an observable.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, ReactiveValue::Dynamic(_))
    }

    /// The current value.
    pub fn current(&self) -> T {
        match self {
            ReactiveValue::Static(v) => v.clone(),
            ReactiveValue::Dynamic(o) => o.get(),
        }
    }
}

impl<T: Value> From<Observable<T>> for ReactiveValue<T> {
    fn from(observable: Observable<T>) -> Self {
        ReactiveValue::Dynamic(observable)
    }
}

impl<T: Value> From<&Observable<T>> for ReactiveValue<T> {
    fn from(observable: &Observable<T>) -> Self {
        ReactiveValue::Dynamic(observable.clone())
    }
}

impl From<&str> for ReactiveValue<String> {
    fn from(value: &str) -> Self {
        ReactiveValue::Static(value.to_string())
    }
}

impl From<String> for ReactiveValue<String> {
    fn from(value: String) -> Self {
        ReactiveValue::Static(value)
    }
}

impl From<bool> for ReactiveValue<bool> {
    fn from(value: bool) -> Self {
        ReactiveValue::Static(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_same_value_matches_object_is() {
        assert!(f64::NAN.same_value(&f64::NAN));
        assert!(!0.0f64.same_value(&-0.0));
        assert!(1.5f64.same_value(&1.5));
        assert!(f32::NAN.same_value(&-f32::NAN));
    }

    #[test]
    fn composite_same_value() {
        assert!(Some(f64::NAN).same_value(&Some(f64::NAN)));
        assert!(!vec![0.0].same_value(&vec![-0.0]));
        assert!((1, "a".to_string()).same_value(&(1, "a".to_string())));
        assert!(!None::<i32>.same_value(&Some(1)));
    }

    #[test]
    fn reactive_value_branches() {
        let fixed: ReactiveValue<String> = "hello".into();
        assert!(!fixed.is_dynamic());
        assert_eq!(fixed.current(), "hello");

        let live: ReactiveValue<i32> = Observable::new(3).into();
        assert!(live.is_dynamic());
        assert_eq!(live.current(), 3);
    }
}

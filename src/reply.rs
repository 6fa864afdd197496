use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    hash::BuildHasher,
    sync::Arc,
};

use http::StatusCode;
use serde::{Serialize, Serializer};

/// Result type of a JSON handler.
///
/// [`status`](Reply::status) is an optional override of the success status.
/// When it returns `Some`, it takes precedence over the status set through
/// [`Plumbing::set_response_status`](crate::Plumbing::set_response_status).
///
/// ```
/// use http::StatusCode;
/// use httpjson::Reply;
///
/// #[derive(serde::Serialize)]
/// struct Created {
///     id: u64,
/// }
///
/// impl Reply for Created {
///     fn status(&self) -> Option<StatusCode> {
///         Some(StatusCode::CREATED)
///     }
/// }
/// ```
pub trait Reply: Serialize {
    fn status(&self) -> Option<StatusCode> {
        None
    }
}

/// Serializes as `value` and replies with `status`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithStatus<T> {
    pub status: StatusCode,
    pub value: T,
}

impl<T> WithStatus<T> {
    pub fn new(status: StatusCode, value: T) -> Self {
        Self { status, value }
    }
}

impl<T: Serialize> Serialize for WithStatus<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<T: Serialize> Reply for WithStatus<T> {
    fn status(&self) -> Option<StatusCode> {
        Some(self.status)
    }
}

macro_rules! impl_reply {
    ($($ty:ty),* $(,)?) => {
        $(impl Reply for $ty {})*
    };
}

impl_reply!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    str,
    serde_json::Value,
);

impl<T: Serialize> Reply for Option<T> {}
impl<T: Serialize> Reply for Vec<T> {}
impl<T: Serialize> Reply for VecDeque<T> {}
impl<T: Serialize> Reply for [T] {}
impl<T: Serialize> Reply for BTreeSet<T> {}
impl<T: Serialize, H: BuildHasher> Reply for HashSet<T, H> {}
impl<K: Serialize, V: Serialize> Reply for BTreeMap<K, V> {}
impl<K: Serialize, V: Serialize, H: BuildHasher> Reply for HashMap<K, V, H> {}
impl<T: Serialize + ToOwned + ?Sized> Reply for Cow<'_, T> {}

impl<T: Reply + ?Sized> Reply for Box<T> {
    fn status(&self) -> Option<StatusCode> {
        (**self).status()
    }
}

impl<T: Reply + ?Sized> Reply for Arc<T> {
    fn status(&self) -> Option<StatusCode> {
        (**self).status()
    }
}

impl<T: Reply + ?Sized> Reply for &T {
    fn status(&self) -> Option<StatusCode> {
        (**self).status()
    }
}

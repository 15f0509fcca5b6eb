//! Type tags and payloads flowing along connectors.
//!
//! A `Payload` is a shared, immutable, type-erased value carrying the
//! `TypeTag` it was published under. Replacing a payload swaps the `Arc`, so
//! readers always see either the previous or the next value in full.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Semantic data type of a connector. Connections require equal tags.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeTag(Cow<'static, str>);

impl TypeTag {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Tag derived from the Rust type name of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared data published on an output connector.
#[derive(Clone)]
pub struct Payload {
    tag: TypeTag,
    data: Arc<dyn Any + Send + Sync>,
}

impl Payload {
    /// Wrap `value`, tagging it with [`TypeTag::of::<T>()`].
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            tag: TypeTag::of::<T>(),
            data: Arc::new(value),
        }
    }

    /// Wrap `value` under an explicit semantic tag.
    pub fn tagged<T: Any + Send + Sync>(tag: TypeTag, value: T) -> Self {
        Self {
            tag,
            data: Arc::new(value),
        }
    }

    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Shared pointer to the value if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data.clone().downcast::<T>().ok()
    }

    /// Whether both payloads point at the same allocation.
    pub fn ptr_eq(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("tag", &self.tag).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_equality() {
        assert_eq!(TypeTag::new("series"), TypeTag::owned("series"));
        assert_ne!(TypeTag::new("series"), TypeTag::new("mesh"));
        assert_eq!(TypeTag::of::<Vec<f64>>(), TypeTag::of::<Vec<f64>>());
        assert_ne!(TypeTag::of::<Vec<f64>>(), TypeTag::of::<Vec<f32>>());
    }

    #[test]
    fn test_payload_downcast() {
        let p = Payload::new(vec![1.0f64, 2.0]);
        assert_eq!(p.tag(), &TypeTag::of::<Vec<f64>>());
        assert_eq!(p.get::<Vec<f64>>().map(Vec::len), Some(2));
        assert!(p.get::<String>().is_none());

        let shared = p.downcast::<Vec<f64>>().unwrap();
        assert_eq!(shared[1], 2.0);
        assert!(p.downcast::<u32>().is_none());
    }

    #[test]
    fn test_payload_clone_shares_data() {
        let a = Payload::tagged(TypeTag::new("label"), String::from("x"));
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Payload::new(String::from("x"))));
    }
}

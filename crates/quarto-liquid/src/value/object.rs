/*
 * value/object.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Host objects wrapped as template values.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;

/// Serializes the wrapped object for permissive member access.
pub type Projection = fn(&(dyn Any + Send + Sync)) -> Option<serde_json::Value>;

/// An opaque host value. Members are only reachable through a
/// [`crate::MemberAccessStrategy`].
///
/// The serialized view is computed on first use and shared by all clones.
#[derive(Clone)]
pub struct ObjectValue {
    inner: Arc<dyn Any + Send + Sync>,
    // Arc<dyn Any>::type_id() would report the Arc, so the id is taken at construction
    type_id: TypeId,
    type_name: &'static str,
    projection: Option<Projection>,
    projected: Arc<OnceCell<Option<serde_json::Value>>>,
}

fn project<T: Serialize + 'static>(value: &(dyn Any + Send + Sync)) -> Option<serde_json::Value> {
    value
        .downcast_ref::<T>()
        .and_then(|v| serde_json::to_value(v).ok())
}

impl ObjectValue {
    /// Wrap a value whose members are only reachable through registered accessors.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            projection: None,
            projected: Arc::default(),
        }
    }

    /// Wrap a value whose public (serialized) fields can also be read.
    pub fn serializable<T: Any + Send + Sync + Serialize>(value: T) -> Self {
        Self {
            projection: Some(project::<T>),
            ..Self::new(value)
        }
    }

    /// Wrap an already shared value of unknown static type.
    pub fn from_arc(inner: Arc<dyn Any + Send + Sync>) -> Self {
        let type_id = Any::type_id(&*inner);
        Self {
            inner,
            type_id,
            type_name: "object",
            projection: None,
            projected: Arc::default(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified Rust type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without its module path.
    pub fn short_type_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.inner
    }

    /// JSON view of the object, when it was created serializable.
    pub fn project(&self) -> Option<&serde_json::Value> {
        let projection = self.projection?;
        self.projected
            .get_or_init(|| projection(&*self.inner))
            .as_ref()
    }

    pub fn is_projectable(&self) -> bool {
        self.projection.is_some()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &ObjectValue) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner) as *const (),
            Arc::as_ptr(&other.inner) as *const (),
        )
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize)]
    struct Product {
        name: String,
        price: u32,
    }

    #[test]
    fn test_type_identity_is_the_wrapped_type() {
        let object = ObjectValue::new(Product {
            name: "pen".to_string(),
            price: 3,
        });
        assert_eq!(object.type_id(), TypeId::of::<Product>());
        assert_eq!(object.short_type_name(), "Product");
        assert!(object.downcast_ref::<Product>().is_some());
        assert!(object.project().is_none());

        let shared: Arc<dyn Any + Send + Sync> = Arc::new(7u8);
        assert_eq!(ObjectValue::from_arc(shared).type_id(), TypeId::of::<u8>());
    }

    #[test]
    fn test_projection() {
        let object = ObjectValue::serializable(Product {
            name: "pen".to_string(),
            price: 3,
        });
        let json = object.project().unwrap();
        assert_eq!(json["name"], "pen");
        assert_eq!(json["price"], 3);
    }

    static SERIALIZED: AtomicUsize = AtomicUsize::new(0);

    /// Counts its own serializations.
    struct Counted;

    impl Serialize for Counted {
        fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeStruct;
            SERIALIZED.fetch_add(1, Ordering::SeqCst);
            let mut state = serializer.serialize_struct("Counted", 1)?;
            state.serialize_field("name", "c")?;
            state.end()
        }
    }

    #[test]
    fn test_projection_is_computed_once() {
        let object = ObjectValue::serializable(Counted);
        let clone = object.clone();
        assert_eq!(object.project().unwrap()["name"], "c");
        assert_eq!(object.project().unwrap()["name"], "c");
        assert_eq!(clone.project().unwrap()["name"], "c");
        assert_eq!(SERIALIZED.load(Ordering::SeqCst), 1);

        let template = crate::parse("{{ c.name }}{{ c.name }}{% if c.name == 'c' %}!{% endif %}").unwrap();
        let registry = crate::MemberAccessRegistry::permissive();
        let mut ctx = crate::TemplateContext::new().with_member_access(Arc::new(registry));
        ctx.set_value("c", crate::Value::object(Counted));
        assert_eq!(template.render(&mut ctx).unwrap(), "cc!");
        assert_eq!(SERIALIZED.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_identity_equality() {
        let a = ObjectValue::new(1u32);
        let b = a.clone();
        let c = ObjectValue::new(1u32);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}

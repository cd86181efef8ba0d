//! Type-erased payload values and the serializer registry.
//!
//! Command arguments, return values and event arguments travel inside
//! messages as [`ObjectValue`]s. Encoding them for the wire is delegated to
//! an [`ObjectSerializer`] looked up by type descriptor in a
//! [`SerializerRegistry`].

use crate::TypeDescriptor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A value of some registered type, tagged with its descriptor.
#[derive(Clone)]
pub struct ObjectValue {
    descriptor: TypeDescriptor,
    value: Arc<dyn Any + Send + Sync>,
}

impl ObjectValue {
    /// Wrap a value, describing it with [`TypeDescriptor::of`].
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::with_descriptor(TypeDescriptor::of::<T>(), value)
    }

    /// Wrap a value under an explicit descriptor.
    pub fn with_descriptor<T: Any + Send + Sync>(descriptor: TypeDescriptor, value: T) -> Self {
        Self {
            descriptor,
            value: Arc::new(value),
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn cloned<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectValue({})", self.descriptor)
    }
}

/// Encodes and decodes values of one type.
pub trait ObjectSerializer: Send + Sync {
    fn serialize(&self, value: &ObjectValue) -> Result<Vec<u8>, SerializationError>;

    fn deserialize(&self, data: &[u8]) -> Result<ObjectValue, SerializationError>;
}

/// Serializer for any serde type, using JSON.
pub struct JsonSerializer<T> {
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            _marker: PhantomData,
        }
    }
}

impl<T> ObjectSerializer for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned + Any + Send + Sync,
{
    fn serialize(&self, value: &ObjectValue) -> Result<Vec<u8>, SerializationError> {
        let typed = value
            .downcast_ref::<T>()
            .ok_or_else(|| SerializationError::Mismatch {
                expected: self.descriptor.clone(),
                actual: value.descriptor().clone(),
            })?;
        Ok(serde_json::to_vec(typed)?)
    }

    fn deserialize(&self, data: &[u8]) -> Result<ObjectValue, SerializationError> {
        let typed: T = serde_json::from_slice(data)?;
        Ok(ObjectValue::with_descriptor(self.descriptor.clone(), typed))
    }
}

/// Object serializers keyed by the type they handle.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: HashMap<TypeDescriptor, Arc<dyn ObjectSerializer>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that already handles strings, booleans, integers, floats,
    /// byte vectors and the unit type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<String>();
        registry.register::<bool>();
        registry.register::<i32>();
        registry.register::<i64>();
        registry.register::<u32>();
        registry.register::<u64>();
        registry.register::<f64>();
        registry.register::<Vec<u8>>();
        registry.register::<()>();
        registry
    }

    /// Register JSON encoding for `T` under [`TypeDescriptor::of`].
    pub fn register<T>(&mut self) -> TypeDescriptor
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        let descriptor = TypeDescriptor::of::<T>();
        self.register_as::<T>(descriptor.clone());
        descriptor
    }

    /// Register JSON encoding for `T` under an explicit descriptor.
    pub fn register_as<T>(&mut self, descriptor: TypeDescriptor)
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        let serializer = JsonSerializer::<T>::new(descriptor.clone());
        self.register_serializer(descriptor, Arc::new(serializer));
    }

    pub fn register_serializer(
        &mut self,
        descriptor: TypeDescriptor,
        serializer: Arc<dyn ObjectSerializer>,
    ) {
        self.serializers.insert(descriptor, serializer);
    }

    pub fn has_serializer_for(&self, descriptor: &TypeDescriptor) -> bool {
        self.serializers.contains_key(descriptor)
    }

    pub fn serializer_for(&self, descriptor: &TypeDescriptor) -> Option<Arc<dyn ObjectSerializer>> {
        self.serializers.get(descriptor).cloned()
    }

    /// Encode `value` with the serializer registered for `descriptor`.
    pub fn encode(
        &self,
        descriptor: &TypeDescriptor,
        value: &ObjectValue,
    ) -> Result<Vec<u8>, SerializationError> {
        self.serializer_for(descriptor)
            .ok_or_else(|| SerializationError::MissingSerializer(descriptor.clone()))?
            .serialize(value)
    }

    /// Decode `data` with the serializer registered for `descriptor`.
    pub fn decode(
        &self,
        descriptor: &TypeDescriptor,
        data: &[u8],
    ) -> Result<ObjectValue, SerializationError> {
        self.serializer_for(descriptor)
            .ok_or_else(|| SerializationError::MissingSerializer(descriptor.clone()))?
            .deserialize(data)
    }
}

/// Error encoding or decoding an object value.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("no serializer registered for {0}")]
    MissingSerializer(TypeDescriptor),
    #[error("serializer for {expected} was given a value of type {actual}")]
    Mismatch {
        expected: TypeDescriptor,
        actual: TypeDescriptor,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn downcast() {
        let value = ObjectValue::new(String::from("hi"));
        assert_eq!(value.cloned::<String>().as_deref(), Some("hi"));
        assert!(value.downcast_ref::<i32>().is_none());
        assert_eq!(value.descriptor(), &TypeDescriptor::of::<String>());
    }

    #[test]
    fn registry_roundtrip() {
        let mut registry = SerializerRegistry::new();
        let descriptor = registry.register::<Point>();
        let value = ObjectValue::new(Point { x: 1, y: -2 });

        let bytes = registry.encode(&descriptor, &value).unwrap();
        let back = registry.decode(&descriptor, &bytes).unwrap();
        assert_eq!(back.cloned::<Point>(), Some(Point { x: 1, y: -2 }));
        assert_eq!(back.descriptor(), &descriptor);
    }

    #[test]
    fn missing_serializer() {
        let registry = SerializerRegistry::with_defaults();
        let descriptor = TypeDescriptor::of::<Point>();
        assert!(!registry.has_serializer_for(&descriptor));
        let err = registry
            .encode(&descriptor, &ObjectValue::new(Point { x: 0, y: 0 }))
            .unwrap_err();
        assert!(matches!(err, SerializationError::MissingSerializer(_)));
    }

    #[test]
    fn wrong_value_type() {
        let registry = SerializerRegistry::with_defaults();
        let err = registry
            .encode(&TypeDescriptor::of::<String>(), &ObjectValue::new(5i32))
            .unwrap_err();
        assert!(matches!(err, SerializationError::Mismatch { .. }));
    }

    #[test]
    fn explicit_descriptor() {
        let mut registry = SerializerRegistry::new();
        let descriptor = TypeDescriptor::new("Acme.Point", "acme");
        registry.register_as::<Point>(descriptor.clone());
        assert!(registry.has_serializer_for(&descriptor));
        let value = ObjectValue::with_descriptor(descriptor.clone(), Point { x: 3, y: 4 });
        let bytes = registry.encode(&descriptor, &value).unwrap();
        assert_eq!(bytes, br#"{"x":3,"y":4}"#);
    }
}

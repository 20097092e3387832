//! A type-erased slot for backend-specific data.
//!
//! Scene entities ([`Model`](super::model::Model), [`Object`](super::object::Object),
//! [`Shader`](super::shader::Shader) and [`Scene`](super::scene::Scene)) know nothing
//! about Vulkan or wgpu. Each backend parks its own resource bundle in an
//! [`AnySlot`] and pulls it back out with a checked, typed lookup.

use std::any::{Any, TypeId};

use thiserror::Error;

/// Raised when a slot is asked for a type it does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("type mismatch: requested `{expected}` but the slot holds {}", .found.unwrap_or("nothing"))]
    TypeMismatch {
        expected: &'static str,
        found: Option<&'static str>,
    },
}

trait SlotValue: Any {
    fn clone_box(&self) -> Box<dyn SlotValue>;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Clone> SlotValue for T {
    fn clone_box(&self) -> Box<dyn SlotValue> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Holds zero or one value of any `Clone + 'static` type.
///
/// Cloning a non-empty slot deep-clones the payload, so the copy and the
/// original never share state. Storing a new value drops the old one first.
#[derive(Default)]
pub struct AnySlot {
    value: Option<Box<dyn SlotValue>>,
}

impl AnySlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self { value: None }
    }

    /// A slot already holding `value`.
    pub fn from_value<T: Any + Clone>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Replaces the held value. The previous one is dropped before `value` is stored.
    pub fn set<T: Any + Clone>(&mut self, value: T) {
        self.value = None;
        self.value = Some(Box::new(value));
    }

    /// Drops the held value, if any.
    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Name of the stored type, mostly useful in logs.
    pub fn type_name(&self) -> Option<&'static str> {
        self.value.as_ref().map(|v| (**v).type_name())
    }

    /// Whether the slot currently holds a `T`.
    pub fn holds<T: Any>(&self) -> bool {
        self.value
            .as_ref()
            .is_some_and(|v| (**v).as_any().type_id() == TypeId::of::<T>())
    }

    pub fn get<T: Any>(&self) -> Result<&T, SlotError> {
        let found = self.type_name();
        self.value
            .as_ref()
            .and_then(|v| (**v).as_any().downcast_ref::<T>())
            .ok_or_else(|| mismatch::<T>(found))
    }

    pub fn get_mut<T: Any>(&mut self) -> Result<&mut T, SlotError> {
        let found = self.type_name();
        self.value
            .as_mut()
            .and_then(|v| (**v).as_any_mut().downcast_mut::<T>())
            .ok_or_else(|| mismatch::<T>(found))
    }

    /// Moves the held `T` out and leaves the slot empty.
    ///
    /// On a type mismatch the slot is left untouched.
    pub fn take<T: Any>(&mut self) -> Result<T, SlotError> {
        if !self.holds::<T>() {
            return Err(mismatch::<T>(self.type_name()));
        }
        let found = self.type_name();
        match self.value.take().map(|v| v.into_any().downcast::<T>()) {
            Some(Ok(value)) => Ok(*value),
            _ => Err(mismatch::<T>(found)),
        }
    }

    /// Moves the whole slot out, leaving an empty one behind.
    pub fn take_slot(&mut self) -> AnySlot {
        std::mem::take(self)
    }

    pub fn swap(&mut self, other: &mut AnySlot) {
        std::mem::swap(&mut self.value, &mut other.value);
    }
}

fn mismatch<T: Any>(found: Option<&'static str>) -> SlotError {
    SlotError::TypeMismatch {
        expected: std::any::type_name::<T>(),
        found,
    }
}

impl Clone for AnySlot {
    fn clone(&self) -> Self {
        Self {
            value: self.value.as_ref().map(|v| (**v).clone_box()),
        }
    }
}

impl std::fmt::Debug for AnySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.type_name() {
            Some(name) => write!(f, "AnySlot({name})"),
            None => f.write_str("AnySlot(<empty>)"),
        }
    }
}

//! Partial-update field wrapper.
//!
//! `FieldPatch::Keep` means "not provided"; `FieldPatch::Set(v)` replaces
//! the field. For nullable fields `Set(None)` clears the value, which a
//! plain `Option` cannot distinguish from absence.
//!
//! With `#[serde(default)]` on the containing field, an absent JSON key
//! deserializes to `Keep` and an explicit `null` to `Set(None)`.

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldPatch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> FieldPatch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Keep => None,
            Self::Set(value) => Some(value),
        }
    }

    /// Writes the patched value into `target`; returns whether it differed.
    pub fn apply_to(self, target: &mut T) -> bool
    where
        T: PartialEq,
    {
        match self {
            Self::Keep => false,
            Self::Set(value) => {
                if *target == value {
                    false
                } else {
                    *target = value;
                    true
                }
            }
        }
    }
}

impl<'de, T> Deserialize<'de> for FieldPatch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(FieldPatch::Set)
    }
}

// Mon Oct 12 2026 - Alex

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-neutral structured value used by the generic marshalling fallback
/// and by host-object properties.
pub type ScriptVariant = serde_json::Value;

/// Who is allowed to destroy a native object once it has been exposed to script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueOwnership {
    /// The engine never keeps the object alive and never releases it.
    HostOwned,
    /// The engine releases the object once its wrapper is unreachable.
    ScriptOwned,
    /// Like `ScriptOwned`, but only when no other native owner holds a reference.
    AutoOwned,
}

impl Default for ValueOwnership {
    fn default() -> Self {
        ValueOwnership::HostOwned
    }
}

impl fmt::Display for ValueOwnership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueOwnership::HostOwned => write!(f, "host"),
            ValueOwnership::ScriptOwned => write!(f, "script"),
            ValueOwnership::AutoOwned => write!(f, "auto"),
        }
    }
}

bitflags! {
    /// Controls which parts of a native object are visible through its script wrapper.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WrapOptions: u32 {
        const EXCLUDE_SUPER_CLASS_METHODS = 0x0002;
        const EXCLUDE_SUPER_CLASS_PROPERTIES = 0x0004;
        const EXCLUDE_SUPER_CLASS_CONTENTS = Self::EXCLUDE_SUPER_CLASS_METHODS.bits()
            | Self::EXCLUDE_SUPER_CLASS_PROPERTIES.bits();
        const SKIP_METHODS_IN_ENUMERATION = 0x0008;
        const EXCLUDE_SLOTS = 0x0020;
        const AUTO_CREATE_DYNAMIC_PROPERTIES = 0x0100;
        const PREFER_EXISTING_WRAPPER_OBJECT = 0x0200;
    }
}

impl Default for WrapOptions {
    fn default() -> Self {
        WrapOptions::empty()
    }
}

/// Coarse classification of a script value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Invalid,
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
    Function,
    Error,
    ArrayBuffer,
    HostObject,
}

impl ValueKind {
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            ValueKind::Object
                | ValueKind::Array
                | ValueKind::Function
                | ValueKind::Error
                | ValueKind::ArrayBuffer
                | ValueKind::HostObject
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Invalid => "invalid",
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::Function => "function",
            ValueKind::Error => "error",
            ValueKind::ArrayBuffer => "arraybuffer",
            ValueKind::HostObject => "hostobject",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_options_combine_independently() {
        let opts = WrapOptions::EXCLUDE_SLOTS | WrapOptions::SKIP_METHODS_IN_ENUMERATION;
        assert!(opts.contains(WrapOptions::EXCLUDE_SLOTS));
        assert!(!opts.contains(WrapOptions::EXCLUDE_SUPER_CLASS_METHODS));
        assert!(WrapOptions::default().is_empty());
    }

    #[test]
    fn test_super_class_contents_is_union() {
        let contents = WrapOptions::EXCLUDE_SUPER_CLASS_CONTENTS;
        assert!(contents.contains(WrapOptions::EXCLUDE_SUPER_CLASS_METHODS));
        assert!(contents.contains(WrapOptions::EXCLUDE_SUPER_CLASS_PROPERTIES));
    }

    #[test]
    fn test_value_kind_objects() {
        assert!(ValueKind::Array.is_object());
        assert!(ValueKind::HostObject.is_object());
        assert!(!ValueKind::String.is_object());
    }
}

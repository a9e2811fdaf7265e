use std::fmt;

/// Tensor element type tag.
///
/// Discriminants are the engine's own `ONNXTensorElementDataType` ordinals and cross the
/// native boundary as raw integers, so they must never be reordered or renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ElementType {
    Undefined = 0,
    Float32 = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Float64 = 11,
    Uint32 = 12,
    Uint64 = 13,
    Complex64 = 14,
    Complex128 = 15,
    Bfloat16 = 16,
}

const _: () = {
    assert!(ElementType::Undefined as i32 == 0);
    assert!(ElementType::Float32 as i32 == 1);
    assert!(ElementType::Uint8 as i32 == 2);
    assert!(ElementType::Int8 as i32 == 3);
    assert!(ElementType::Uint16 as i32 == 4);
    assert!(ElementType::Int16 as i32 == 5);
    assert!(ElementType::Int32 as i32 == 6);
    assert!(ElementType::Int64 as i32 == 7);
    assert!(ElementType::String as i32 == 8);
    assert!(ElementType::Bool as i32 == 9);
    assert!(ElementType::Float16 as i32 == 10);
    assert!(ElementType::Float64 as i32 == 11);
    assert!(ElementType::Uint32 as i32 == 12);
    assert!(ElementType::Uint64 as i32 == 13);
    assert!(ElementType::Complex64 as i32 == 14);
    assert!(ElementType::Complex128 as i32 == 15);
    assert!(ElementType::Bfloat16 as i32 == 16);
};

/// Typed array flavour a host value uses to carry tensor data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostArrayKind {
    Float32,
    Float64,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    BigInt64,
    BigUint64,
}

impl HostArrayKind {
    /// Width of one array element in bytes.
    pub fn element_width(self) -> usize {
        match self {
            HostArrayKind::Int8 | HostArrayKind::Uint8 => 1,
            HostArrayKind::Int16 | HostArrayKind::Uint16 => 2,
            HostArrayKind::Float32 | HostArrayKind::Int32 | HostArrayKind::Uint32 => 4,
            HostArrayKind::Float64 | HostArrayKind::BigInt64 | HostArrayKind::BigUint64 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostArrayKind::Float32 => "Float32Array",
            HostArrayKind::Float64 => "Float64Array",
            HostArrayKind::Int8 => "Int8Array",
            HostArrayKind::Uint8 => "Uint8Array",
            HostArrayKind::Int16 => "Int16Array",
            HostArrayKind::Uint16 => "Uint16Array",
            HostArrayKind::Int32 => "Int32Array",
            HostArrayKind::Uint32 => "Uint32Array",
            HostArrayKind::BigInt64 => "BigInt64Array",
            HostArrayKind::BigUint64 => "BigUint64Array",
        }
    }
}

impl fmt::Display for HostArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ElementType {
    pub const ALL: [ElementType; 17] = [
        ElementType::Undefined,
        ElementType::Float32,
        ElementType::Uint8,
        ElementType::Int8,
        ElementType::Uint16,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::String,
        ElementType::Bool,
        ElementType::Float16,
        ElementType::Float64,
        ElementType::Uint32,
        ElementType::Uint64,
        ElementType::Complex64,
        ElementType::Complex128,
        ElementType::Bfloat16,
    ];

    /// Looks up a tag by its engine ordinal. Unknown ordinals yield `None`.
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    /// Bytes per element for direct host-array transfer; 0 when the type has no
    /// fixed-width host representation.
    pub fn byte_width(self) -> usize {
        match self {
            ElementType::Uint8 | ElementType::Int8 | ElementType::Bool => 1,
            ElementType::Uint16 | ElementType::Int16 => 2,
            ElementType::Float32 | ElementType::Int32 | ElementType::Uint32 => 4,
            ElementType::Int64 | ElementType::Uint64 | ElementType::Float64 => 8,
            ElementType::Undefined
            | ElementType::String
            | ElementType::Float16
            | ElementType::Complex64
            | ElementType::Complex128
            | ElementType::Bfloat16 => 0,
        }
    }

    pub fn host_array_kind(self) -> Option<HostArrayKind> {
        match self {
            ElementType::Float32 => Some(HostArrayKind::Float32),
            ElementType::Uint8 | ElementType::Bool => Some(HostArrayKind::Uint8),
            ElementType::Int8 => Some(HostArrayKind::Int8),
            ElementType::Uint16 => Some(HostArrayKind::Uint16),
            ElementType::Int16 => Some(HostArrayKind::Int16),
            ElementType::Int32 => Some(HostArrayKind::Int32),
            ElementType::Int64 => Some(HostArrayKind::BigInt64),
            ElementType::Float64 => Some(HostArrayKind::Float64),
            ElementType::Uint32 => Some(HostArrayKind::Uint32),
            ElementType::Uint64 => Some(HostArrayKind::BigUint64),
            _ => None,
        }
    }

    /// Whether tensors of this type may cross the host boundary in either direction.
    ///
    /// 64-bit integers have a width and a host kind but are excluded: the host's
    /// bigint arrays do not round-trip through its number type.
    pub fn is_transferable(self) -> bool {
        match self {
            ElementType::Int64 | ElementType::Uint64 => false,
            other => other.byte_width() != 0 && other.host_array_kind().is_some(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Undefined => "undefined",
            ElementType::Float32 => "float32",
            ElementType::Uint8 => "uint8",
            ElementType::Int8 => "int8",
            ElementType::Uint16 => "uint16",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::String => "string",
            ElementType::Bool => "bool",
            ElementType::Float16 => "float16",
            ElementType::Float64 => "float64",
            ElementType::Uint32 => "uint32",
            ElementType::Uint64 => "uint64",
            ElementType::Complex64 => "complex64",
            ElementType::Complex128 => "complex128",
            ElementType::Bfloat16 => "bfloat16",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte width of the tag with the given ordinal; 0 for unknown ordinals.
pub fn byte_width(ordinal: i32) -> usize {
    ElementType::from_ordinal(ordinal).map_or(0, ElementType::byte_width)
}

/// Transferability of the tag with the given ordinal; unknown ordinals are not transferable.
pub fn is_transferable(ordinal: i32) -> bool {
    ElementType::from_ordinal(ordinal).is_some_and(ElementType::is_transferable)
}

//! Dynamically typed values exchanged with the host runtime.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::dtype::{ElementType, HostArrayKind};
use crate::error::{Error, Result};

/// Contiguous typed array. `bytes` is a view into host memory in native byte order.
#[derive(Clone, Debug, PartialEq)]
pub struct HostArray {
    kind: HostArrayKind,
    bytes: Bytes,
}

/// Rust scalar that maps onto one host typed array kind.
pub trait HostElement: Copy {
    const KIND: HostArrayKind;

    fn write_ne(self, out: &mut Vec<u8>);

    fn read_ne(chunk: &[u8]) -> Self;
}

macro_rules! host_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl HostElement for $ty {
                const KIND: HostArrayKind = HostArrayKind::$kind;

                fn write_ne(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn read_ne(chunk: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(chunk);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

host_element! {
    f32 => Float32,
    f64 => Float64,
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => BigInt64,
    u64 => BigUint64,
}

impl HostArray {
    /// Wraps host bytes as a typed array. The length must be a whole number of elements.
    pub fn new(kind: HostArrayKind, bytes: Bytes) -> Result<Self> {
        if bytes.len() % kind.element_width() != 0 {
            return Err(Error::InvalidInput(format!(
                "{} byte length {} is not a multiple of {}",
                kind,
                bytes.len(),
                kind.element_width()
            )));
        }
        Ok(Self { kind, bytes })
    }

    pub fn from_slice<T: HostElement>(values: &[T]) -> Self {
        let mut out = Vec::with_capacity(std::mem::size_of_val(values));
        for &v in values {
            v.write_ne(&mut out);
        }
        Self {
            kind: T::KIND,
            bytes: Bytes::from(out),
        }
    }

    /// Bool tensors travel as `Uint8Array` with 0/1 entries.
    pub fn from_bools(values: &[bool]) -> Self {
        Self {
            kind: HostArrayKind::Uint8,
            bytes: values.iter().map(|&b| u8::from(b)).collect::<Vec<_>>().into(),
        }
    }

    pub fn kind(&self) -> HostArrayKind {
        self.kind
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.element_width()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies the elements out, or `None` if `T` does not match the array kind.
    pub fn to_vec<T: HostElement>(&self) -> Option<Vec<T>> {
        if T::KIND != self.kind {
            return None;
        }
        Some(
            self.bytes
                .chunks_exact(self.kind.element_width())
                .map(T::read_ne)
                .collect(),
        )
    }
}

/// A value as the host runtime sees it.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<HostValue>),
    TypedArray(HostArray),
    Object(BTreeMap<String, HostValue>),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::TypedArray(_) => "typed array",
            HostValue::Object(_) => "object",
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, HostValue>> {
        match self {
            HostValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    pub fn as_typed_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::TypedArray(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Tensor-shaped fields of a host object, checked for presence and field type only.
///
/// Field values (dimension ranges, tag validity, kind agreement) are checked by the codec.
#[derive(Clone, Debug)]
pub struct HostTensorView<'a> {
    pub dims: Vec<f64>,
    pub data: &'a HostArray,
    pub type_tag: Option<f64>,
    pub name: Option<&'a str>,
}

impl<'a> HostTensorView<'a> {
    pub fn parse(value: &'a HostValue) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidInput(format!("tensor must be an object, got {}", value.type_name()))
        })?;

        let dims = match object.get("dims") {
            Some(HostValue::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    item.as_number().ok_or_else(|| {
                        Error::InvalidShape(format!(
                            "dims[{idx}] must be a number, got {}",
                            item.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "tensor.dims must be an array, got {}",
                    other.type_name()
                )))
            }
            None => return Err(Error::InvalidInput("tensor.dims is missing".into())),
        };

        let data = match object.get("data") {
            Some(HostValue::TypedArray(array)) => array,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "tensor.data must be a typed array, got {}",
                    other.type_name()
                )))
            }
            None => return Err(Error::InvalidInput("tensor.data is missing".into())),
        };

        let type_tag = match object.get("type") {
            None | Some(HostValue::Undefined) => None,
            Some(HostValue::Number(n)) => Some(*n),
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "tensor.type must be a number, got {}",
                    other.type_name()
                )))
            }
        };

        let name = match object.get("name") {
            None | Some(HostValue::Undefined) => None,
            Some(HostValue::String(name)) => Some(name.as_str()),
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "tensor.name must be a string, got {}",
                    other.type_name()
                )))
            }
        };

        Ok(Self {
            dims,
            data,
            type_tag,
            name,
        })
    }
}

/// Strongly typed host tensor, convenient for Rust callers building host values.
#[derive(Clone, Debug, PartialEq)]
pub struct HostTensor {
    pub dims: Vec<usize>,
    pub data: HostArray,
    pub dtype: Option<ElementType>,
    pub name: Option<String>,
}

impl HostTensor {
    pub fn new(dims: &[usize], data: HostArray) -> Self {
        Self {
            dims: dims.to_vec(),
            data,
            dtype: None,
            name: None,
        }
    }

    pub fn with_type(mut self, dtype: ElementType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn into_host_value(self) -> HostValue {
        let mut object = BTreeMap::new();
        object.insert(
            "dims".to_string(),
            HostValue::Array(
                self.dims
                    .iter()
                    .map(|&d| HostValue::Number(d as f64))
                    .collect(),
            ),
        );
        object.insert("data".to_string(), HostValue::TypedArray(self.data));
        if let Some(dtype) = self.dtype {
            object.insert(
                "type".to_string(),
                HostValue::Number(f64::from(dtype.ordinal())),
            );
        }
        if let Some(name) = self.name {
            object.insert("name".to_string(), HostValue::String(name));
        }
        HostValue::Object(object)
    }

    /// Reads back an encoded output value. Fields must be well formed and typed.
    pub fn from_host_value(value: &HostValue) -> Result<Self> {
        let view = HostTensorView::parse(value)?;
        let dims = crate::shape::validate_dims(&view.dims)?.dims().to_vec();
        let dtype = match view.type_tag {
            Some(tag) => Some(tag_from_number(tag)?),
            None => None,
        };
        Ok(Self {
            dims,
            data: view.data.clone(),
            dtype,
            name: view.name.map(str::to_string),
        })
    }
}

impl From<HostTensor> for HostValue {
    fn from(tensor: HostTensor) -> Self {
        tensor.into_host_value()
    }
}

/// Resolves a host number into a known element type tag.
pub(crate) fn tag_from_number(tag: f64) -> Result<ElementType> {
    if tag.fract() != 0.0 || !tag.is_finite() || tag < f64::from(i32::MIN) || tag > f64::from(i32::MAX) {
        return Err(Error::UnsupportedType(format!("type tag {tag} is not an ordinal")));
    }
    ElementType::from_ordinal(tag as i32)
        .ok_or_else(|| Error::UnsupportedType(format!("unknown type tag {tag}")))
}

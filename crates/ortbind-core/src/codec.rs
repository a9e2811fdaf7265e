//! Conversion between host tensor values and [`TensorDescriptor`]s.
//!
//! `decode` borrows the host buffer; `encode` makes the one copy that moves engine bytes
//! into host-owned memory.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::dtype::ElementType;
use crate::error::{Error, Result};
use crate::host::{tag_from_number, HostArray, HostTensorView, HostValue};
use crate::shape::validate_dims;
use crate::tensor::TensorDescriptor;

/// Validates `value` and views its data buffer as a descriptor without copying.
///
/// With `expected`, the data array must be exactly that tag's host kind and any declared
/// `type` field must agree. Without it, the value must declare a transferable `type`
/// consistent with its array kind. `name` overrides the value's own `name` field.
pub fn decode<'a>(
    value: &'a HostValue,
    expected: Option<ElementType>,
    name: Option<&'a str>,
) -> Result<TensorDescriptor<'a>> {
    let view = HostTensorView::parse(value)?;
    let shape = validate_dims(&view.dims)?;
    let declared = view.type_tag.map(tag_from_number).transpose()?;

    let dtype = match (expected, declared) {
        (Some(expected), Some(declared)) if expected != declared => {
            return Err(Error::type_mismatch(expected, declared));
        }
        (Some(ty), _) | (None, Some(ty)) => ty,
        (None, None) => {
            return Err(Error::InvalidInput(
                "tensor.type is required when no element type is expected".into(),
            ))
        }
    };

    if !dtype.is_transferable() {
        return Err(Error::UnsupportedType(format!(
            "{dtype} tensors cannot be passed from the host"
        )));
    }
    // Transferable tags always have a host kind.
    let wanted = dtype
        .host_array_kind()
        .ok_or_else(|| Error::UnsupportedType(format!("{dtype} has no host array kind")))?;
    if view.data.kind() != wanted {
        return Err(Error::type_mismatch(wanted, view.data.kind()));
    }

    TensorDescriptor::borrowed(dtype, shape, view.data.bytes(), name.or(view.name))
}

/// Copies a descriptor's bytes into a new host-owned `{dims, data, type}` object.
pub fn encode(desc: &TensorDescriptor<'_>) -> Result<HostValue> {
    let dtype = desc.dtype();
    if !dtype.is_transferable() {
        return Err(Error::UnsupportedType(format!(
            "{dtype} tensors cannot be returned to the host"
        )));
    }
    let kind = dtype
        .host_array_kind()
        .ok_or_else(|| Error::UnsupportedType(format!("{dtype} has no host array kind")))?;

    let data = HostArray::new(kind, Bytes::copy_from_slice(desc.bytes()))?;

    let mut object = BTreeMap::new();
    object.insert(
        "dims".to_string(),
        HostValue::Array(
            desc.shape()
                .dims()
                .iter()
                .map(|&d| HostValue::Number(d as f64))
                .collect(),
        ),
    );
    object.insert("data".to_string(), HostValue::TypedArray(data));
    object.insert(
        "type".to_string(),
        HostValue::Number(f64::from(dtype.ordinal())),
    );
    Ok(HostValue::Object(object))
}

use std::borrow::Cow;

use bytes::Bytes;

use crate::dtype::ElementType;
use crate::engine::RawHandle;
use crate::error::{Error, Result};
use crate::shape::Shape;

/// Who owns the bytes behind a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Host buffer or engine buffer that lives only as long as the call that produced it.
    Borrowed,
    /// Bytes owned by the descriptor itself.
    Owned,
}

#[derive(Clone, Debug)]
pub enum TensorData<'a> {
    Borrowed(&'a [u8]),
    Owned(Bytes),
}

impl TensorData<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TensorData::Borrowed(bytes) => bytes,
            TensorData::Owned(bytes) => bytes,
        }
    }

    pub fn ownership(&self) -> Ownership {
        match self {
            TensorData::Borrowed(_) => Ownership::Borrowed,
            TensorData::Owned(_) => Ownership::Owned,
        }
    }
}

/// Immutable view of one tensor buffer with its type, shape and optional name.
///
/// The lifetime ties a borrowed descriptor to whatever owns its bytes: a decoded host
/// value, or the native output handle it was read from.
#[derive(Clone, Debug)]
pub struct TensorDescriptor<'a> {
    data: TensorData<'a>,
    dtype: ElementType,
    shape: Shape,
    name: Option<Cow<'a, str>>,
    native: Option<RawHandle>,
}

/// Bytes a tensor of `dtype` and `shape` must occupy.
pub fn expected_byte_len(dtype: ElementType, shape: &Shape) -> Result<usize> {
    let width = dtype.byte_width();
    if width == 0 {
        return Err(Error::UnsupportedType(format!(
            "{dtype} has no fixed element width"
        )));
    }
    shape.element_count()?.checked_mul(width).ok_or_else(|| {
        Error::InvalidShape(format!("byte length of {dtype}{shape} overflows"))
    })
}

fn check_len(dtype: ElementType, shape: &Shape, actual: usize) -> Result<()> {
    let expected = expected_byte_len(dtype, shape)?;
    if expected != actual {
        return Err(Error::ShapeSizeMismatch { expected, actual });
    }
    Ok(())
}

impl<'a> TensorDescriptor<'a> {
    /// Borrows `data` without copying.
    pub fn borrowed(
        dtype: ElementType,
        shape: Shape,
        data: &'a [u8],
        name: Option<&'a str>,
    ) -> Result<Self> {
        check_len(dtype, &shape, data.len())?;
        Ok(Self {
            data: TensorData::Borrowed(data),
            dtype,
            shape,
            name: name.map(Cow::Borrowed),
            native: None,
        })
    }

    pub(crate) fn with_native(mut self, handle: RawHandle) -> Self {
        self.native = Some(handle);
        self
    }

    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Engine value this descriptor was read from, if any.
    pub fn native_handle(&self) -> Option<RawHandle> {
        self.native
    }

    pub fn ownership(&self) -> Ownership {
        self.data.ownership()
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn byte_len(&self) -> usize {
        self.data.as_bytes().len()
    }

    pub fn element_count(&self) -> usize {
        // Validated at construction.
        self.byte_len() / self.dtype.byte_width()
    }

    /// View of the same bytes under a new shape with the same element count.
    pub fn reshape(&self, shape: Shape) -> Result<TensorDescriptor<'_>> {
        check_len(self.dtype, &shape, self.byte_len())?;
        Ok(TensorDescriptor {
            data: TensorData::Borrowed(self.bytes()),
            dtype: self.dtype,
            shape,
            name: self.name.as_deref().map(Cow::Borrowed),
            native: self.native,
        })
    }

    /// Detaches from the producing call by copying borrowed bytes. The native
    /// back-reference is dropped since the copy no longer depends on it.
    pub fn into_owned(self) -> TensorDescriptor<'static> {
        let data = match self.data {
            TensorData::Borrowed(bytes) => Bytes::copy_from_slice(bytes),
            TensorData::Owned(bytes) => bytes,
        };
        TensorDescriptor {
            data: TensorData::Owned(data),
            dtype: self.dtype,
            shape: self.shape,
            name: self.name.map(|n| Cow::Owned(n.into_owned())),
            native: None,
        }
    }
}

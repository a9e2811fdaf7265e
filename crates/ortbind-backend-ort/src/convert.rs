use anyhow::{bail, ensure, Context, Result};
use ort::{
    tensor::TensorElementType,
    value::{DynValue, ValueType},
};
use ortbind_core::{ElementType, NativeTensorData, NativeTensorInfo};

pub(crate) fn element_type_from_ort(ty: TensorElementType) -> ElementType {
    match ty {
        TensorElementType::Float32 => ElementType::Float32,
        TensorElementType::Uint8 => ElementType::Uint8,
        TensorElementType::Int8 => ElementType::Int8,
        TensorElementType::Uint16 => ElementType::Uint16,
        TensorElementType::Int16 => ElementType::Int16,
        TensorElementType::Int32 => ElementType::Int32,
        TensorElementType::Int64 => ElementType::Int64,
        TensorElementType::String => ElementType::String,
        TensorElementType::Bool => ElementType::Bool,
        TensorElementType::Float16 => ElementType::Float16,
        TensorElementType::Float64 => ElementType::Float64,
        TensorElementType::Uint32 => ElementType::Uint32,
        TensorElementType::Uint64 => ElementType::Uint64,
        TensorElementType::Bfloat16 => ElementType::Bfloat16,
        _ => ElementType::Undefined,
    }
}

/// Non-tensor IO (sequences, maps) reports as `undefined` with no dims.
pub(crate) fn tensor_info(value_type: &ValueType) -> NativeTensorInfo {
    match value_type {
        ValueType::Tensor { ty, shape, .. } => NativeTensorInfo {
            element_type: element_type_from_ort(*ty).ordinal(),
            dims: shape.iter().copied().collect(),
        },
        _ => NativeTensorInfo {
            element_type: ElementType::Undefined.ordinal(),
            dims: Vec::new(),
        },
    }
}

macro_rules! from_ne_bytes {
    ($bytes:expr, $ty:ty) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        $bytes
            .chunks_exact(WIDTH)
            .map(|chunk| {
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(chunk);
                <$ty>::from_ne_bytes(raw)
            })
            .collect::<Vec<$ty>>()
    }};
}

/// Builds an ORT value from host bytes. This is the one copy on the input path: borrowing
/// through `TensorRef::from_array_view` needs a `&[T]`, and host byte buffers carry no
/// alignment guarantee for `T`.
pub(crate) fn value_from_bytes(dtype: ElementType, dims: &[i64], bytes: &[u8]) -> Result<DynValue> {
    let shape = dims
        .iter()
        .map(|&d| usize::try_from(d).with_context(|| format!("negative dimension {d}")))
        .collect::<Result<Vec<_>>>()?;
    let expected_bytes = shape
        .iter()
        .try_fold(dtype.byte_width(), |acc, &d| acc.checked_mul(d))
        .context("input byte size overflows")?;
    ensure!(
        bytes.len() == expected_bytes,
        "input byte size mismatch: got {}, expected {}",
        bytes.len(),
        expected_bytes
    );

    macro_rules! tensor {
        ($data:expr) => {
            ort::value::Tensor::from_array((shape, $data))?.into_dyn()
        };
    }

    let value = match dtype {
        ElementType::Float32 => tensor!(from_ne_bytes!(bytes, f32)),
        ElementType::Uint8 => tensor!(bytes.to_vec()),
        ElementType::Int8 => tensor!(from_ne_bytes!(bytes, i8)),
        ElementType::Uint16 => tensor!(from_ne_bytes!(bytes, u16)),
        ElementType::Int16 => tensor!(from_ne_bytes!(bytes, i16)),
        ElementType::Int32 => tensor!(from_ne_bytes!(bytes, i32)),
        ElementType::Int64 => tensor!(from_ne_bytes!(bytes, i64)),
        ElementType::Bool => tensor!(bytes.iter().map(|&b| b != 0).collect::<Vec<bool>>()),
        ElementType::Float64 => tensor!(from_ne_bytes!(bytes, f64)),
        ElementType::Uint32 => tensor!(from_ne_bytes!(bytes, u32)),
        ElementType::Uint64 => tensor!(from_ne_bytes!(bytes, u64)),
        other => bail!("{other} tensors cannot be created from host memory"),
    };

    Ok(value)
}

/// Points at an output tensor's memory inside ORT without copying it. The pointer stays
/// valid for as long as `value` is alive. Element types without a fixed width come back
/// with their tag and dims but no bytes; the caller decides whether that is an error.
pub(crate) fn tensor_data(value: &DynValue) -> Result<NativeTensorData> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    let dtype = element_type_from_ort(*ty);
    let info = NativeTensorInfo {
        element_type: dtype.ordinal(),
        dims: shape.iter().copied().collect(),
    };

    macro_rules! borrow_out {
        ($ty:ty) => {{
            let array = value.try_extract_array::<$ty>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            (slice.as_ptr().cast::<u8>(), std::mem::size_of_val(slice))
        }};
    }

    let (data, byte_len) = match dtype {
        ElementType::Float32 => borrow_out!(f32),
        ElementType::Uint8 => borrow_out!(u8),
        ElementType::Int8 => borrow_out!(i8),
        ElementType::Uint16 => borrow_out!(u16),
        ElementType::Int16 => borrow_out!(i16),
        ElementType::Int32 => borrow_out!(i32),
        ElementType::Int64 => borrow_out!(i64),
        ElementType::Bool => borrow_out!(bool),
        ElementType::Float64 => borrow_out!(f64),
        ElementType::Uint32 => borrow_out!(u32),
        ElementType::Uint64 => borrow_out!(u64),
        _ => (std::ptr::null(), 0),
    };

    Ok(NativeTensorData { data, byte_len, info })
}

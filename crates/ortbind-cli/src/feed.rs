//! `--input` parsing: `[name=]type:d0xd1:v0,v1,...`.
//!
//! An empty dims field is a scalar; an empty values field is no elements. Element counts
//! are not checked here so the session reports size mismatches itself.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use ortbind_core::{ElementType, HostArray, HostElement, HostTensor};

pub fn parse_feed(raw: &str) -> Result<HostTensor> {
    let (name, spec) = match raw.split_once('=') {
        Some((name, spec)) if !name.contains(':') => (Some(name), spec),
        _ => (None, raw),
    };

    let mut parts = spec.splitn(3, ':');
    let (Some(ty), Some(dims), Some(values)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("expected [name=]type:dims:values, got '{raw}'");
    };

    let dtype = ElementType::parse(ty).with_context(|| format!("unknown element type '{ty}'"))?;
    let dims = parse_dims(dims)?;
    let data = parse_values(dtype, values)?;

    let tensor = HostTensor::new(&dims, data).with_type(dtype);
    Ok(match name {
        Some(name) if !name.is_empty() => tensor.with_name(name),
        _ => tensor,
    })
}

fn parse_dims(raw: &str) -> Result<Vec<usize>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split('x')
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid dimension '{d}'"))
        })
        .collect()
}

fn parse_values(dtype: ElementType, raw: &str) -> Result<HostArray> {
    Ok(match dtype {
        ElementType::Float32 => HostArray::from_slice(&parse_list::<f32>(raw)?),
        ElementType::Float64 => HostArray::from_slice(&parse_list::<f64>(raw)?),
        ElementType::Int8 => HostArray::from_slice(&parse_list::<i8>(raw)?),
        ElementType::Uint8 => HostArray::from_slice(&parse_list::<u8>(raw)?),
        ElementType::Int16 => HostArray::from_slice(&parse_list::<i16>(raw)?),
        ElementType::Uint16 => HostArray::from_slice(&parse_list::<u16>(raw)?),
        ElementType::Int32 => HostArray::from_slice(&parse_list::<i32>(raw)?),
        ElementType::Uint32 => HostArray::from_slice(&parse_list::<u32>(raw)?),
        ElementType::Int64 => HostArray::from_slice(&parse_list::<i64>(raw)?),
        ElementType::Uint64 => HostArray::from_slice(&parse_list::<u64>(raw)?),
        ElementType::Bool => HostArray::from_bools(&parse_bools(raw)?),
        other => bail!("{other} values cannot be given on the command line"),
    })
}

fn parse_list<T>(raw: &str) -> Result<Vec<T>>
where
    T: HostElement + FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|v| {
            v.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value '{v}'"))
        })
        .collect()
}

fn parse_bools(raw: &str) -> Result<Vec<bool>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|v| match v.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => bail!("invalid bool '{other}'"),
        })
        .collect()
}

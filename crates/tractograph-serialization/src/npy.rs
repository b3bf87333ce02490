// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! NumPy `.npy` (format 1.0) arrays, little-endian, C order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};

use crate::{Result, SerializationError};

const FORMAT: &str = "NPY";
const MAGIC: &[u8; 6] = b"\x93NUMPY";
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;
const ALIGNMENT: usize = 64;

/// Element types that can be stored in an `.npy` file
pub trait NpyElement: Copy {
    /// NumPy dtype descriptor
    const DESCR: &'static str;
    const SIZE: usize;

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()>;
    fn read_le(bytes: &[u8]) -> Self;
}

impl NpyElement for f64 {
    const DESCR: &'static str = "<f8";
    const SIZE: usize = 8;

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_f64::<LittleEndian>(self)
    }

    fn read_le(bytes: &[u8]) -> Self {
        LittleEndian::read_f64(bytes)
    }
}

impl NpyElement for i32 {
    const DESCR: &'static str = "<i4";
    const SIZE: usize = 4;

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<LittleEndian>(self)
    }

    fn read_le(bytes: &[u8]) -> Self {
        LittleEndian::read_i32(bytes)
    }
}

fn header_dict(descr: &str, shape: &[usize]) -> String {
    let shape = match shape {
        [single] => format!("({},)", single),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape
    );
    let unpadded = PREAMBLE_LEN + dict.len() + 1;
    dict.push_str(&" ".repeat((ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT));
    dict.push('\n');
    dict
}

/// Write an array in logical (row-major) order
pub fn write_npy_to<W, T, S, D>(mut writer: W, array: &ArrayBase<S, D>) -> Result<()>
where
    W: Write,
    T: NpyElement,
    S: Data<Elem = T>,
    D: Dimension,
{
    let dict = header_dict(T::DESCR, array.shape());
    let header_len = u16::try_from(dict.len())
        .map_err(|_| SerializationError::format(FORMAT, "header too long"))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_u16::<LittleEndian>(header_len)?;
    writer.write_all(dict.as_bytes())?;
    for value in array.iter() {
        value.write_le(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_npy<P, T, S, D>(path: P, array: &ArrayBase<S, D>) -> Result<()>
where
    P: AsRef<Path>,
    T: NpyElement,
    S: Data<Elem = T>,
    D: Dimension,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SerializationError::io(path, e))?;
    write_npy_to(BufWriter::new(file), array).map_err(|e| match e {
        SerializationError::Stream(source) => SerializationError::io(path, source),
        other => other,
    })
}

fn dict_value<'a>(dict: &'a str, key: &str) -> Result<&'a str> {
    let needle = format!("'{}':", key);
    let start = dict
        .find(&needle)
        .map(|i| i + needle.len())
        .ok_or_else(|| SerializationError::format(FORMAT, format!("header has no '{}'", key)))?;
    Ok(dict[start..].trim_start())
}

fn parse_shape(dict: &str) -> Result<Vec<usize>> {
    let rest = dict_value(dict, "shape")?;
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.split(')').next())
        .ok_or_else(|| SerializationError::format(FORMAT, "malformed shape"))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| SerializationError::format(FORMAT, format!("bad dimension '{}'", s)))
        })
        .collect()
}

/// Parse an `.npy` buffer whose dtype is `T`
pub fn parse_npy<T: NpyElement>(bytes: &[u8]) -> Result<ArrayD<T>> {
    if bytes.len() < PREAMBLE_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(SerializationError::format(FORMAT, "missing magic string"));
    }
    let (header_len, header_start) = match bytes[6] {
        1 => (LittleEndian::read_u16(&bytes[8..]) as usize, PREAMBLE_LEN),
        2 | 3 if bytes.len() >= 12 => (LittleEndian::read_u32(&bytes[8..]) as usize, 12),
        major => {
            return Err(SerializationError::format(
                FORMAT,
                format!("unsupported version {}", major),
            ))
        }
    };
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(SerializationError::format(FORMAT, "truncated header"));
    }
    let dict = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| SerializationError::format(FORMAT, "header is not text"))?;

    let descr = dict_value(dict, "descr")?;
    let expected = format!("'{}'", T::DESCR);
    if !descr.starts_with(&expected) {
        return Err(SerializationError::format(
            FORMAT,
            format!("dtype mismatch: expected {}", T::DESCR),
        ));
    }
    if dict_value(dict, "fortran_order")?.starts_with("True") {
        return Err(SerializationError::format(FORMAT, "Fortran order is not supported"));
    }
    let shape = parse_shape(dict)?;

    let count: usize = shape.iter().product();
    let body = &bytes[data_start..];
    if body.len() != count * T::SIZE {
        return Err(SerializationError::format(
            FORMAT,
            format!("expected {} bytes of data, found {}", count * T::SIZE, body.len()),
        ));
    }
    let values: Vec<T> = body.chunks_exact(T::SIZE).map(T::read_le).collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| SerializationError::format(FORMAT, e.to_string()))
}

pub fn read_npy<T: NpyElement, P: AsRef<Path>>(path: P) -> Result<ArrayD<T>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| SerializationError::io(path, e))?;
    parse_npy(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array2, Array3};

    #[test]
    fn test_header_is_aligned() {
        let mut buffer = Vec::new();
        write_npy_to(&mut buffer, &arr1(&[1.5f64, 2.5])).unwrap();
        let header_len = LittleEndian::read_u16(&buffer[8..]) as usize;
        assert_eq!((PREAMBLE_LEN + header_len) % ALIGNMENT, 0);
        assert_eq!(buffer[PREAMBLE_LEN + header_len - 1], b'\n');
        let dict = std::str::from_utf8(&buffer[PREAMBLE_LEN..PREAMBLE_LEN + header_len]).unwrap();
        assert!(dict.starts_with("{'descr': '<f8', 'fortran_order': False, 'shape': (2,), }"));
        assert_eq!(buffer.len(), PREAMBLE_LEN + header_len + 16);
    }

    #[test]
    fn test_label_rows_read_back() {
        let labels = Array2::from_shape_vec((3, 2), vec![1, 2, -1, -1, 0, 0]).unwrap();
        let mut buffer = Vec::new();
        write_npy_to(&mut buffer, &labels).unwrap();

        let loaded = parse_npy::<i32>(&buffer).unwrap();
        assert_eq!(loaded.shape(), &[3, 2]);
        assert_eq!(loaded.iter().copied().collect::<Vec<_>>(), vec![1, 2, -1, -1, 0, 0]);
    }

    #[test]
    fn test_three_dimensional_and_empty() {
        let endpoints = Array3::<f64>::from_shape_fn((2, 2, 3), |(i, j, k)| (i * 6 + j * 3 + k) as f64);
        let mut buffer = Vec::new();
        write_npy_to(&mut buffer, &endpoints).unwrap();
        let loaded = parse_npy::<f64>(&buffer).unwrap();
        assert_eq!(loaded.shape(), &[2, 2, 3]);
        assert_eq!(loaded[[1, 0, 2]], 8.0);

        let empty = Array2::<i32>::zeros((0, 2));
        let mut buffer = Vec::new();
        write_npy_to(&mut buffer, &empty).unwrap();
        assert_eq!(parse_npy::<i32>(&buffer).unwrap().shape(), &[0, 2]);
    }

    #[test]
    fn test_dtype_mismatch() {
        let mut buffer = Vec::new();
        write_npy_to(&mut buffer, &arr1(&[1i32])).unwrap();
        assert!(parse_npy::<f64>(&buffer).is_err());
        assert!(parse_npy::<i32>(b"not an array").is_err());
    }
}
